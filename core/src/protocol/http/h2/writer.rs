/*
 * writer.rs
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

//! HTTP/2 frame writer: serializes frames into a buffer.

use bytes::{BufMut, Bytes, BytesMut};
use std::io;

use super::frame::*;

/// Writes HTTP/2 frames into a BytesMut. Caller is responsible for sending the buffer to the stream.
pub struct H2Writer {
    buf: BytesMut,
}

impl H2Writer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(DEFAULT_MAX_FRAME_SIZE + FRAME_HEADER_LENGTH),
        }
    }

    fn write_frame_header(&mut self, length: usize, frame_type: u8, flags: u8, stream_id: u32) {
        self.buf.put_u8((length >> 16) as u8);
        self.buf.put_u8((length >> 8) as u8);
        self.buf.put_u8(length as u8);
        self.buf.put_u8(frame_type);
        self.buf.put_u8(flags);
        self.buf.put_u32(stream_id & 0x7fff_ffff);
    }

    fn require_stream(stream_id: u32, name: &str) -> io::Result<()> {
        if stream_id == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} frame stream_id must be non-zero", name),
            ));
        }
        Ok(())
    }

    /// Append one DATA frame. The caller keeps `data` within the peer's max frame size.
    pub fn write_data(&mut self, stream_id: u32, data: &[u8], end_stream: bool) -> io::Result<()> {
        Self::require_stream(stream_id, "DATA")?;
        if data.len() > MAX_MAX_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "DATA payload exceeds the largest frame size",
            ));
        }
        let flags = if end_stream { FLAG_END_STREAM } else { 0 };
        self.write_frame_header(data.len(), TYPE_DATA, flags, stream_id);
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Append a header block as HEADERS followed by as many CONTINUATION frames as needed to
    /// keep every frame within `max_frame_size`.
    pub fn write_headers(
        &mut self,
        stream_id: u32,
        header_block: &[u8],
        end_stream: bool,
        max_frame_size: usize,
    ) -> io::Result<()> {
        Self::require_stream(stream_id, "HEADERS")?;
        let max = max_frame_size.max(1);
        let mut fragments = header_block.chunks(max);
        let first = fragments.next().unwrap_or(&[]);
        let rest: Vec<&[u8]> = fragments.collect();

        let mut flags = 0u8;
        if end_stream {
            flags |= FLAG_END_STREAM;
        }
        if rest.is_empty() {
            flags |= FLAG_END_HEADERS;
        }
        self.write_frame_header(first.len(), TYPE_HEADERS, flags, stream_id);
        self.buf.extend_from_slice(first);

        let last = rest.len();
        for (i, fragment) in rest.into_iter().enumerate() {
            let flags = if i + 1 == last { FLAG_END_HEADERS } else { 0 };
            self.write_frame_header(fragment.len(), TYPE_CONTINUATION, flags, stream_id);
            self.buf.extend_from_slice(fragment);
        }
        Ok(())
    }

    pub fn write_rst_stream(&mut self, stream_id: u32, error_code: u32) -> io::Result<()> {
        Self::require_stream(stream_id, "RST_STREAM")?;
        self.write_frame_header(4, TYPE_RST_STREAM, 0, stream_id);
        self.buf.put_u32(error_code);
        Ok(())
    }

    pub fn write_settings(&mut self, settings: &[(u16, u32)]) {
        self.write_frame_header(settings.len() * 6, TYPE_SETTINGS, 0, 0);
        for (id, value) in settings {
            self.buf.put_u16(*id);
            self.buf.put_u32(*value);
        }
    }

    pub fn write_settings_ack(&mut self) {
        self.write_frame_header(0, TYPE_SETTINGS, FLAG_ACK, 0);
    }

    pub fn write_ping(&mut self, opaque_data: u64, ack: bool) {
        let flags = if ack { FLAG_ACK } else { 0 };
        self.write_frame_header(8, TYPE_PING, flags, 0);
        self.buf.put_u64(opaque_data);
    }

    pub fn write_goaway(&mut self, last_stream_id: u32, error_code: u32, debug_data: &[u8]) {
        self.write_frame_header(8 + debug_data.len(), TYPE_GOAWAY, 0, 0);
        self.buf.put_u32(last_stream_id & 0x7fff_ffff);
        self.buf.put_u32(error_code);
        self.buf.extend_from_slice(debug_data);
    }

    /// Stream 0 updates the connection window.
    pub fn write_window_update(&mut self, stream_id: u32, increment: u32) -> io::Result<()> {
        if increment == 0 || increment > 0x7fff_ffff {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "WINDOW_UPDATE increment out of range",
            ));
        }
        self.write_frame_header(4, TYPE_WINDOW_UPDATE, 0, stream_id);
        self.buf.put_u32(increment);
        Ok(())
    }

    /// Take the accumulated buffer. Writer remains usable (buffer is replaced with new empty).
    pub fn take_buffer(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Default for H2Writer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::h2::H2Parser;

    #[test]
    fn large_header_block_uses_continuation() {
        let mut writer = H2Writer::new();
        let block = vec![0x82u8; 40];
        writer.write_headers(1, &block, true, 16).unwrap();
        let mut buf = BytesMut::from(&writer.take_buffer()[..]);
        let mut parser = H2Parser::new();
        let mut frames = Vec::new();
        while let Some(frame) = parser.next_frame(&mut buf).unwrap() {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 3);
        match &frames[0] {
            Frame::Headers {
                end_stream,
                end_headers,
                block,
                ..
            } => {
                assert!(*end_stream);
                assert!(!*end_headers);
                assert_eq!(block.len(), 16);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            frames[2],
            Frame::Continuation {
                stream_id: 1,
                end_headers: true,
                block: Bytes::from(vec![0x82u8; 8]),
            }
        );
        assert!(writer.is_empty());
    }

    #[test]
    fn control_frames() {
        let mut writer = H2Writer::new();
        writer.write_settings(&[(SETTINGS_ENABLE_PUSH, 0)]);
        writer.write_settings_ack();
        writer.write_ping(42, true);
        writer.write_window_update(0, 1000).unwrap();
        assert!(writer.write_window_update(1, 0).is_err());
        assert!(writer.write_data(0, b"x", false).is_err());
        let mut buf = BytesMut::from(&writer.take_buffer()[..]);
        let mut parser = H2Parser::new();
        assert_eq!(
            parser.next_frame(&mut buf).unwrap(),
            Some(Frame::Settings {
                ack: false,
                settings: vec![(SETTINGS_ENABLE_PUSH, 0)],
            })
        );
        assert_eq!(
            parser.next_frame(&mut buf).unwrap(),
            Some(Frame::Settings {
                ack: true,
                settings: vec![],
            })
        );
        assert_eq!(
            parser.next_frame(&mut buf).unwrap(),
            Some(Frame::Ping { ack: true, opaque: 42 })
        );
        assert_eq!(
            parser.next_frame(&mut buf).unwrap(),
            Some(Frame::WindowUpdate {
                stream_id: 0,
                increment: 1000,
            })
        );
    }
}
