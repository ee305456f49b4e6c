/*
 * encoder.rs
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

//! HPACK encoder (RFC 7541). Stateless: headers are emitted as static-table references or
//! literals without indexing, so the peer's dynamic table is never touched.

use bytes::BufMut;

use super::huffman;
use super::static_table;

/// Headers whose values must never be added to an intermediary's table.
fn is_sensitive(name: &str) -> bool {
    matches!(name, "authorization" | "proxy-authorization" | "cookie")
}

/// Encode a header list. Names must already be lowercase.
pub fn encode_headers<'a, I>(headers: I, out: &mut impl BufMut)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    for (name, value) in headers {
        let literal_prefix = if is_sensitive(name) { 0x10 } else { 0x00 };
        match static_table::find(name, value) {
            Some((index, true)) if literal_prefix == 0 => {
                encode_integer(index as u64, 7, 0x80, out);
            }
            Some((index, _)) => {
                encode_integer(index as u64, 4, literal_prefix, out);
                encode_string(value.as_bytes(), out);
            }
            None => {
                out.put_u8(literal_prefix);
                encode_string(name.as_bytes(), out);
                encode_string(value.as_bytes(), out);
            }
        }
    }
}

/// String literal, Huffman-coded when that is shorter.
fn encode_string(s: &[u8], out: &mut impl BufMut) {
    let huffman_len = huffman::encoded_len(s);
    if huffman_len < s.len() {
        let mut coded = Vec::with_capacity(huffman_len);
        huffman::encode(s, &mut coded);
        encode_integer(coded.len() as u64, 7, 0x80, out);
        out.put_slice(&coded);
    } else {
        encode_integer(s.len() as u64, 7, 0x00, out);
        out.put_slice(s);
    }
}

pub fn encode_integer(mut value: u64, nbits: u8, prefix: u8, out: &mut impl BufMut) {
    let max_prefix = (1u64 << nbits) - 1;
    if value < max_prefix {
        out.put_u8(prefix | value as u8);
        return;
    }
    out.put_u8(prefix | max_prefix as u8);
    value -= max_prefix;
    while value >= 128 {
        out.put_u8(0x80 | (value % 128) as u8);
        value /= 128;
    }
    out.put_u8(value as u8);
}
