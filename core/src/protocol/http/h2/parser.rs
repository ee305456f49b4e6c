/*
 * parser.rs
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

//! HTTP/2 frame parser: splits complete frames off a buffer and decodes them into [`Frame`]s.

use bytes::{Buf, Bytes, BytesMut};
use std::io;

use super::frame::*;

/// Connection error raised by the parser, carrying the HTTP/2 error code in its message.
pub fn connection_error(code: u32, message: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("HTTP/2 {}: {}", error_to_string(code), message),
    )
}

/// Frame parser. Call `next_frame` until it returns `None`, then read more bytes.
pub struct H2Parser {
    max_frame_size: usize,
}

impl H2Parser {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Largest payload accepted (our advertised SETTINGS_MAX_FRAME_SIZE).
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Take one complete frame off the front of `buf`. Partial frames stay in `buf`.
    pub fn next_frame(&mut self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        if buf.len() < FRAME_HEADER_LENGTH {
            return Ok(None);
        }
        let length = (buf[0] as usize) << 16 | (buf[1] as usize) << 8 | (buf[2] as usize);
        if length > self.max_frame_size {
            return Err(connection_error(
                ERROR_FRAME_SIZE_ERROR,
                &format!("frame size {} exceeds {}", length, self.max_frame_size),
            ));
        }
        if buf.len() < FRAME_HEADER_LENGTH + length {
            return Ok(None);
        }
        let frame_type = buf[3];
        let flags = buf[4];
        let stream_id = ((buf[5] & 0x7f) as u32) << 24
            | (buf[6] as u32) << 16
            | (buf[7] as u32) << 8
            | (buf[8] as u32);
        buf.advance(FRAME_HEADER_LENGTH);
        let payload = buf.split_to(length).freeze();
        decode_frame(frame_type, flags, stream_id, payload).map(Some)
    }
}

impl Default for H2Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_frame(frame_type: u8, flags: u8, stream_id: u32, payload: Bytes) -> io::Result<Frame> {
    match frame_type {
        TYPE_DATA => decode_data(flags, stream_id, payload),
        TYPE_HEADERS => decode_headers(flags, stream_id, payload),
        TYPE_PRIORITY => {
            require_stream(stream_id, "PRIORITY")?;
            require_len(&payload, 5, "PRIORITY")?;
            Ok(Frame::Priority { stream_id })
        }
        TYPE_RST_STREAM => {
            require_stream(stream_id, "RST_STREAM")?;
            require_len(&payload, 4, "RST_STREAM")?;
            let mut p = payload;
            Ok(Frame::RstStream {
                stream_id,
                error_code: p.get_u32(),
            })
        }
        TYPE_SETTINGS => decode_settings(flags, stream_id, payload),
        TYPE_PUSH_PROMISE => decode_push_promise(flags, stream_id, payload),
        TYPE_PING => {
            require_connection(stream_id, "PING")?;
            require_len(&payload, 8, "PING")?;
            let mut p = payload;
            Ok(Frame::Ping {
                ack: flags & FLAG_ACK != 0,
                opaque: p.get_u64(),
            })
        }
        TYPE_GOAWAY => {
            require_connection(stream_id, "GOAWAY")?;
            if payload.len() < 8 {
                return Err(connection_error(
                    ERROR_FRAME_SIZE_ERROR,
                    "GOAWAY frame must be at least 8 bytes",
                ));
            }
            let mut p = payload;
            let last_stream_id = p.get_u32() & 0x7fff_ffff;
            let error_code = p.get_u32();
            Ok(Frame::GoAway {
                last_stream_id,
                error_code,
                debug_data: p,
            })
        }
        TYPE_WINDOW_UPDATE => {
            require_len(&payload, 4, "WINDOW_UPDATE")?;
            let mut p = payload;
            let increment = p.get_u32() & 0x7fff_ffff;
            if increment == 0 {
                return Err(connection_error(
                    ERROR_PROTOCOL_ERROR,
                    "WINDOW_UPDATE increment must be non-zero",
                ));
            }
            Ok(Frame::WindowUpdate {
                stream_id,
                increment,
            })
        }
        TYPE_CONTINUATION => {
            require_stream(stream_id, "CONTINUATION")?;
            Ok(Frame::Continuation {
                stream_id,
                end_headers: flags & FLAG_END_HEADERS != 0,
                block: payload,
            })
        }
        _ => Ok(Frame::Unknown { frame_type }),
    }
}

fn require_stream(stream_id: u32, name: &str) -> io::Result<()> {
    if stream_id == 0 {
        return Err(connection_error(
            ERROR_PROTOCOL_ERROR,
            &format!("{} frame with stream ID 0", name),
        ));
    }
    Ok(())
}

fn require_connection(stream_id: u32, name: &str) -> io::Result<()> {
    if stream_id != 0 {
        return Err(connection_error(
            ERROR_PROTOCOL_ERROR,
            &format!("{} frame with non-zero stream ID", name),
        ));
    }
    Ok(())
}

fn require_len(payload: &Bytes, len: usize, name: &str) -> io::Result<()> {
    if payload.len() != len {
        return Err(connection_error(
            ERROR_FRAME_SIZE_ERROR,
            &format!("{} frame must be {} bytes", name, len),
        ));
    }
    Ok(())
}

/// Strip the pad length octet and trailing padding.
fn strip_padding(flags: u8, mut payload: Bytes, name: &str) -> io::Result<Bytes> {
    if flags & FLAG_PADDED == 0 {
        return Ok(payload);
    }
    if payload.is_empty() {
        return Err(connection_error(
            ERROR_PROTOCOL_ERROR,
            &format!("{} frame PADDED but no pad length", name),
        ));
    }
    let pad_len = payload.get_u8() as usize;
    if payload.len() < pad_len {
        return Err(connection_error(
            ERROR_PROTOCOL_ERROR,
            &format!("{} frame padding exceeds payload", name),
        ));
    }
    payload.truncate(payload.len() - pad_len);
    Ok(payload)
}

fn decode_data(flags: u8, stream_id: u32, payload: Bytes) -> io::Result<Frame> {
    require_stream(stream_id, "DATA")?;
    let flow_len = payload.len() as u32;
    let data = strip_padding(flags, payload, "DATA")?;
    Ok(Frame::Data {
        stream_id,
        end_stream: flags & FLAG_END_STREAM != 0,
        data,
        flow_len,
    })
}

fn decode_headers(flags: u8, stream_id: u32, payload: Bytes) -> io::Result<Frame> {
    require_stream(stream_id, "HEADERS")?;
    let mut block = strip_padding(flags, payload, "HEADERS")?;
    if flags & FLAG_PRIORITY != 0 {
        if block.len() < 5 {
            return Err(connection_error(
                ERROR_FRAME_SIZE_ERROR,
                "HEADERS frame with PRIORITY too short",
            ));
        }
        block.advance(5);
    }
    Ok(Frame::Headers {
        stream_id,
        end_stream: flags & FLAG_END_STREAM != 0,
        end_headers: flags & FLAG_END_HEADERS != 0,
        block,
    })
}

fn decode_settings(flags: u8, stream_id: u32, payload: Bytes) -> io::Result<Frame> {
    require_connection(stream_id, "SETTINGS")?;
    let ack = flags & FLAG_ACK != 0;
    if ack && !payload.is_empty() {
        return Err(connection_error(
            ERROR_FRAME_SIZE_ERROR,
            "SETTINGS ACK frame must be empty",
        ));
    }
    if payload.len() % 6 != 0 {
        return Err(connection_error(
            ERROR_FRAME_SIZE_ERROR,
            "SETTINGS frame size must be a multiple of 6",
        ));
    }
    let mut settings = Vec::with_capacity(payload.len() / 6);
    let mut p = payload;
    while p.len() >= 6 {
        let id = p.get_u16();
        let value = p.get_u32();
        settings.push((id, value));
    }
    Ok(Frame::Settings { ack, settings })
}

fn decode_push_promise(flags: u8, stream_id: u32, payload: Bytes) -> io::Result<Frame> {
    require_stream(stream_id, "PUSH_PROMISE")?;
    let mut block = strip_padding(flags, payload, "PUSH_PROMISE")?;
    if block.len() < 4 {
        return Err(connection_error(
            ERROR_FRAME_SIZE_ERROR,
            "PUSH_PROMISE frame too short",
        ));
    }
    let promised_stream_id = block.get_u32() & 0x7fff_ffff;
    Ok(Frame::PushPromise {
        stream_id,
        promised_stream_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn frame(frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        let len = payload.len();
        buf.put_u8((len >> 16) as u8);
        buf.put_u8((len >> 8) as u8);
        buf.put_u8(len as u8);
        buf.put_u8(frame_type);
        buf.put_u8(flags);
        buf.put_u32(stream_id);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn partial_frame_waits() {
        let mut parser = H2Parser::new();
        let full = frame(TYPE_PING, 0, 0, &[0; 8]);
        let mut buf = BytesMut::from(&full[..10]);
        assert_eq!(parser.next_frame(&mut buf).unwrap(), None);
        buf.extend_from_slice(&full[10..]);
        assert_eq!(
            parser.next_frame(&mut buf).unwrap(),
            Some(Frame::Ping { ack: false, opaque: 0 })
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn padded_data_keeps_flow_length() {
        let mut parser = H2Parser::new();
        let mut payload = vec![2u8];
        payload.extend_from_slice(b"hi");
        payload.extend_from_slice(&[0, 0]);
        let mut buf = frame(TYPE_DATA, FLAG_PADDED | FLAG_END_STREAM, 1, &payload);
        match parser.next_frame(&mut buf).unwrap() {
            Some(Frame::Data {
                stream_id,
                end_stream,
                data,
                flow_len,
            }) => {
                assert_eq!(stream_id, 1);
                assert!(end_stream);
                assert_eq!(&data[..], b"hi");
                assert_eq!(flow_len, 5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn headers_with_priority_are_skipped_to_block() {
        let mut parser = H2Parser::new();
        let mut payload = vec![0, 0, 0, 0, 15];
        payload.extend_from_slice(&[0x88]);
        let mut buf = frame(TYPE_HEADERS, FLAG_PRIORITY | FLAG_END_HEADERS, 3, &payload);
        assert_eq!(
            parser.next_frame(&mut buf).unwrap(),
            Some(Frame::Headers {
                stream_id: 3,
                end_stream: false,
                end_headers: true,
                block: Bytes::from_static(&[0x88]),
            })
        );
    }

    #[test]
    fn settings_and_goaway() {
        let mut parser = H2Parser::new();
        let mut buf = frame(TYPE_SETTINGS, 0, 0, &[0, 4, 0, 0, 0x10, 0]);
        buf.extend_from_slice(&frame(TYPE_GOAWAY, 0, 0, &[0, 0, 0, 5, 0, 0, 0, 0]));
        assert_eq!(
            parser.next_frame(&mut buf).unwrap(),
            Some(Frame::Settings {
                ack: false,
                settings: vec![(SETTINGS_INITIAL_WINDOW_SIZE, 0x1000)],
            })
        );
        match parser.next_frame(&mut buf).unwrap() {
            Some(Frame::GoAway {
                last_stream_id,
                error_code,
                ..
            }) => {
                assert_eq!(last_stream_id, 5);
                assert_eq!(error_code, ERROR_NO_ERROR);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_malformed_frames() {
        let mut parser = H2Parser::new();
        let mut buf = frame(TYPE_DATA, 0, 0, b"x");
        assert!(parser.next_frame(&mut buf).is_err());
        let mut buf = frame(TYPE_WINDOW_UPDATE, 0, 0, &[0, 0, 0, 0]);
        assert!(parser.next_frame(&mut buf).is_err());
        let mut buf = frame(TYPE_PING, 0, 1, &[0; 8]);
        assert!(parser.next_frame(&mut buf).is_err());
        let mut buf = frame(TYPE_DATA, 0, 1, &vec![0; DEFAULT_MAX_FRAME_SIZE + 1]);
        let err = parser.next_frame(&mut buf).unwrap_err();
        assert!(err.to_string().contains("FRAME_SIZE_ERROR"));
    }

    #[test]
    fn unknown_types_are_ignored() {
        let mut parser = H2Parser::new();
        let mut buf = frame(0xfa, 0, 0, b"abc");
        assert_eq!(
            parser.next_frame(&mut buf).unwrap(),
            Some(Frame::Unknown { frame_type: 0xfa })
        );
    }
}
