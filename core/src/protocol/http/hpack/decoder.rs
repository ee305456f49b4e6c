/*
 * decoder.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Corriere, an asynchronous HTTP client transport.
 *
 * Corriere is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Corriere is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Corriere.  If not, see <http://www.gnu.org/licenses/>.
 */

//! HPACK decoder (RFC 7541). Decodes header blocks into (name, value) pairs, maintaining the
//! dynamic table the peer's encoder indexes into.

use bytes::Buf;
use std::collections::VecDeque;
use std::io;

use super::huffman;
use super::static_table::{self, DYNAMIC_TABLE_OFFSET};

/// Per-entry overhead counted against the table size.
const ENTRY_OVERHEAD: usize = 32;

fn invalid(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

/// HPACK decoder with its dynamic table.
pub struct Decoder {
    /// Upper bound we advertised in SETTINGS_HEADER_TABLE_SIZE.
    settings_limit: usize,
    max_size: usize,
    size: usize,
    dynamic_table: VecDeque<(String, String)>,
}

impl Decoder {
    pub fn new(header_table_size: usize) -> Self {
        Self {
            settings_limit: header_table_size,
            max_size: header_table_size,
            size: 0,
            dynamic_table: VecDeque::new(),
        }
    }

    /// Decode one complete header block.
    pub fn decode(&mut self, block: &[u8]) -> io::Result<Vec<(String, String)>> {
        let mut buf = block;
        let mut headers = Vec::new();
        while buf.has_remaining() {
            let b = buf.get_u8();
            if b & 0x80 != 0 {
                // Indexed header field
                let index = decode_integer(&mut buf, b, 7)?;
                let (name, value) = self.get_indexed(index)?;
                headers.push((name, value));
            } else if b & 0x40 != 0 {
                // Literal with incremental indexing
                let (name, value) = self.get_literal(&mut buf, b, 6)?;
                self.insert(name.clone(), value.clone());
                headers.push((name, value));
            } else if b & 0x20 != 0 {
                // Dynamic table size update
                let max_size = decode_integer(&mut buf, b, 5)? as usize;
                if max_size > self.settings_limit {
                    return Err(invalid("HPACK dynamic table size exceeds SETTINGS"));
                }
                self.max_size = max_size;
                self.evict_to(max_size);
            } else {
                // Literal without indexing or never indexed
                headers.push(self.get_literal(&mut buf, b, 4)?);
            }
        }
        Ok(headers)
    }

    fn get_indexed(&self, index: u64) -> io::Result<(String, String)> {
        let index = usize::try_from(index).map_err(|_| invalid("HPACK index out of range"))?;
        if index == 0 {
            return Err(invalid("HPACK indexed header index 0"));
        }
        if let Some((name, value)) = static_table::get(index) {
            return Ok((name.to_string(), value.to_string()));
        }
        self.dynamic_table
            .get(index - DYNAMIC_TABLE_OFFSET)
            .cloned()
            .ok_or_else(|| invalid("HPACK index out of range"))
    }

    fn get_literal(&self, buf: &mut &[u8], opcode: u8, nbits: u8) -> io::Result<(String, String)> {
        let index = decode_integer(buf, opcode, nbits)?;
        let name = if index == 0 {
            decode_string(buf)?
        } else {
            self.get_indexed(index)?.0
        };
        let value = decode_string(buf)?;
        Ok((name, value))
    }

    fn insert(&mut self, name: String, value: String) {
        let entry_size = name.len() + value.len() + ENTRY_OVERHEAD;
        if entry_size > self.max_size {
            // An oversized entry empties the table and is not stored.
            self.dynamic_table.clear();
            self.size = 0;
            return;
        }
        self.evict_to(self.max_size - entry_size);
        self.size += entry_size;
        self.dynamic_table.push_front((name, value));
    }

    fn evict_to(&mut self, max: usize) {
        while self.size > max {
            match self.dynamic_table.pop_back() {
                Some((n, v)) => self.size -= n.len() + v.len() + ENTRY_OVERHEAD,
                None => {
                    self.size = 0;
                    break;
                }
            }
        }
    }
}

fn decode_integer(buf: &mut &[u8], opcode: u8, nbits: u8) -> io::Result<u64> {
    let nmask = (1u64 << nbits) - 1;
    let mut value = (opcode as u64) & nmask;
    if value < nmask {
        return Ok(value);
    }
    let mut shift = 0u32;
    loop {
        if !buf.has_remaining() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "HPACK integer truncated",
            ));
        }
        let b = buf.get_u8();
        value += ((b & 0x7f) as u64) << shift;
        if b & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 56 {
            return Err(invalid("HPACK integer too large"));
        }
    }
}

fn decode_string(buf: &mut &[u8]) -> io::Result<String> {
    if !buf.has_remaining() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "HPACK string length",
        ));
    }
    let b = buf.get_u8();
    let len = decode_integer(buf, b, 7)? as usize;
    if buf.remaining() < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "HPACK string truncated",
        ));
    }
    let (raw, rest) = buf.split_at(len);
    *buf = rest;
    let bytes = if b & 0x80 != 0 {
        huffman::decode(raw)?
    } else {
        raw.to_vec()
    };
    String::from_utf8(bytes).map_err(|_| invalid("HPACK string not UTF-8"))
}
