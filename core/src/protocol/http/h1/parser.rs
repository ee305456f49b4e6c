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

//! HTTP/1.1 response push parser: status line, headers, body (Content-Length, chunked or
//! delimited by connection close).

use bytes::{Buf, Bytes, BytesMut};
use std::io;

use crate::protocol::http::connection::HttpVersion;

/// Longest status line, header line or chunk-size line accepted.
const MAX_LINE: usize = 64 * 1024;

/// Events produced while parsing a response.
pub trait H1ResponseHandler {
    fn status(&mut self, version: HttpVersion, code: u16, reason: Option<&str>);
    fn header(&mut self, name: &str, value: &str);
    fn body_chunk(&mut self, data: Bytes);
    fn trailer(&mut self, name: &str, value: &str);
    fn complete(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Idle,
    StatusLine,
    Headers,
    /// Headers done; the connection must call `set_body_mode()`.
    HeadersComplete,
    Body,
    ChunkSize,
    ChunkData,
    ChunkDataEnd,
    ChunkTrailer,
}

/// How the response body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// No body (HEAD, 1xx, 204, 304, or Content-Length: 0).
    Empty,
    Length(u64),
    Chunked,
    /// Read until the peer closes the connection.
    UntilClose,
}

/// Push parser for HTTP/1.1 responses. Feed bytes via `receive`; the handler is invoked as
/// complete tokens are parsed.
pub struct ResponseParser {
    state: ParseState,
    mode: BodyMode,
    remaining: u64,
}

fn invalid(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::StatusLine,
            mode: BodyMode::Empty,
            remaining: 0,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = ParseState::StatusLine;
        self.mode = BodyMode::Empty;
        self.remaining = 0;
    }

    /// Split off one CRLF-terminated line, without the CRLF.
    fn take_line(buf: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        match buf.windows(2).position(|w| w == b"\r\n") {
            Some(n) => {
                let line = buf.split_to(n);
                buf.advance(2);
                Ok(Some(line))
            }
            None if buf.len() > MAX_LINE => Err(invalid("HTTP line too long")),
            None => Ok(None),
        }
    }

    fn parse_status_line(line: &[u8]) -> io::Result<(HttpVersion, u16, Option<String>)> {
        let line = std::str::from_utf8(line).map_err(|_| invalid("invalid status line UTF-8"))?;
        let mut parts = line.splitn(3, ' ');
        let version = match parts.next() {
            Some("HTTP/1.1") => HttpVersion::Http1_1,
            Some("HTTP/1.0") => HttpVersion::Http1_0,
            _ => return Err(invalid("invalid HTTP version in status line")),
        };
        let code = parts
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .filter(|c| (100..1000).contains(c))
            .ok_or_else(|| invalid("invalid status code"))?;
        let reason = parts.next().map(str::to_string).filter(|r| !r.is_empty());
        Ok((version, code, reason))
    }

    fn parse_field(line: &[u8]) -> io::Result<Option<(&str, &str)>> {
        let line = std::str::from_utf8(line).map_err(|_| invalid("invalid header UTF-8"))?;
        Ok(line
            .split_once(':')
            .map(|(name, value)| (name.trim(), value.trim())))
    }

    /// Consume and parse as much as possible from buf. Partial data remains in buf.
    pub fn receive<H: H1ResponseHandler>(
        &mut self,
        buf: &mut BytesMut,
        handler: &mut H,
    ) -> io::Result<()> {
        loop {
            match self.state {
                ParseState::StatusLine => {
                    let Some(line) = Self::take_line(buf)? else {
                        return Ok(());
                    };
                    let (version, code, reason) = Self::parse_status_line(&line)?;
                    handler.status(version, code, reason.as_deref());
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    let Some(line) = Self::take_line(buf)? else {
                        return Ok(());
                    };
                    if line.is_empty() {
                        self.state = ParseState::HeadersComplete;
                        return Ok(());
                    }
                    if let Some((name, value)) = Self::parse_field(&line)? {
                        handler.header(name, value);
                    }
                }
                ParseState::HeadersComplete | ParseState::Idle => return Ok(()),
                ParseState::Body => {
                    if buf.is_empty() {
                        return Ok(());
                    }
                    if self.mode == BodyMode::UntilClose {
                        handler.body_chunk(buf.split().freeze());
                        return Ok(());
                    }
                    let n = (self.remaining.min(buf.len() as u64)) as usize;
                    handler.body_chunk(buf.split_to(n).freeze());
                    self.remaining -= n as u64;
                    if self.remaining == 0 {
                        self.finish(handler);
                    }
                }
                ParseState::ChunkSize => {
                    let Some(line) = Self::take_line(buf)? else {
                        return Ok(());
                    };
                    let line =
                        std::str::from_utf8(&line).map_err(|_| invalid("invalid chunk size"))?;
                    let hex = line.split(';').next().unwrap_or(line).trim();
                    self.remaining =
                        u64::from_str_radix(hex, 16).map_err(|_| invalid("invalid chunk size"))?;
                    self.state = if self.remaining == 0 {
                        ParseState::ChunkTrailer
                    } else {
                        ParseState::ChunkData
                    };
                }
                ParseState::ChunkData => {
                    if buf.is_empty() {
                        return Ok(());
                    }
                    let n = (self.remaining.min(buf.len() as u64)) as usize;
                    handler.body_chunk(buf.split_to(n).freeze());
                    self.remaining -= n as u64;
                    if self.remaining == 0 {
                        self.state = ParseState::ChunkDataEnd;
                    }
                }
                ParseState::ChunkDataEnd => {
                    if buf.len() < 2 {
                        return Ok(());
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(invalid("missing CRLF after chunk data"));
                    }
                    buf.advance(2);
                    self.state = ParseState::ChunkSize;
                }
                ParseState::ChunkTrailer => {
                    let Some(line) = Self::take_line(buf)? else {
                        return Ok(());
                    };
                    if line.is_empty() {
                        self.finish(handler);
                    } else if let Some((name, value)) = Self::parse_field(&line)? {
                        handler.trailer(name, value);
                    }
                }
            }
        }
    }

    fn finish<H: H1ResponseHandler>(&mut self, handler: &mut H) {
        self.state = ParseState::Idle;
        handler.complete();
    }

    /// Called by the connection once headers are complete.
    pub fn set_body_mode<H: H1ResponseHandler>(&mut self, mode: BodyMode, handler: &mut H) {
        if self.state != ParseState::HeadersComplete {
            return;
        }
        self.mode = mode;
        match mode {
            BodyMode::Empty | BodyMode::Length(0) => self.finish(handler),
            BodyMode::Length(n) => {
                self.remaining = n;
                self.state = ParseState::Body;
            }
            BodyMode::Chunked => self.state = ParseState::ChunkSize,
            BodyMode::UntilClose => self.state = ParseState::Body,
        }
    }

    /// The peer closed the connection. Completes a close-delimited body; anything else is a
    /// truncated message.
    pub fn eof<H: H1ResponseHandler>(&mut self, handler: &mut H) -> io::Result<()> {
        match (self.state, self.mode) {
            (ParseState::Idle, _) => Ok(()),
            (ParseState::Body, BodyMode::UntilClose) => {
                self.finish(handler);
                Ok(())
            }
            _ => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before the response was complete",
            )),
        }
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        status: Option<(HttpVersion, u16, Option<String>)>,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        trailers: Vec<(String, String)>,
        complete: bool,
    }

    impl H1ResponseHandler for Recorder {
        fn status(&mut self, version: HttpVersion, code: u16, reason: Option<&str>) {
            self.status = Some((version, code, reason.map(str::to_string)));
        }
        fn header(&mut self, name: &str, value: &str) {
            self.headers.push((name.to_string(), value.to_string()));
        }
        fn body_chunk(&mut self, data: Bytes) {
            self.body.extend_from_slice(&data);
        }
        fn trailer(&mut self, name: &str, value: &str) {
            self.trailers.push((name.to_string(), value.to_string()));
        }
        fn complete(&mut self) {
            self.complete = true;
        }
    }

    #[test]
    fn content_length_body() {
        let mut parser = ResponseParser::new();
        let mut rec = Recorder::default();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhel"[..]);
        parser.receive(&mut buf, &mut rec).unwrap();
        assert_eq!(parser.state(), ParseState::HeadersComplete);
        assert_eq!(
            rec.status,
            Some((HttpVersion::Http1_1, 200, Some("OK".to_string())))
        );
        assert_eq!(rec.headers, vec![("Content-Length".to_string(), "5".to_string())]);
        parser.set_body_mode(BodyMode::Length(5), &mut rec);
        parser.receive(&mut buf, &mut rec).unwrap();
        assert!(!rec.complete);
        buf.extend_from_slice(b"lo");
        parser.receive(&mut buf, &mut rec).unwrap();
        assert_eq!(rec.body, b"hello");
        assert!(rec.complete);
        assert_eq!(parser.state(), ParseState::Idle);
        assert!(buf.is_empty());
    }

    #[test]
    fn chunked_body_split_across_reads() {
        let mut parser = ResponseParser::new();
        let mut rec = Recorder::default();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n"[..]);
        parser.receive(&mut buf, &mut rec).unwrap();
        parser.set_body_mode(BodyMode::Chunked, &mut rec);
        let pieces: [&[u8]; 4] = [
            b"4;ext=1\r\nWi",
            b"ki\r",
            b"\n5\r\npedia\r\n0\r\nX-Sum: 1\r\n",
            b"\r\n",
        ];
        for piece in pieces {
            buf.extend_from_slice(piece);
            parser.receive(&mut buf, &mut rec).unwrap();
        }
        assert_eq!(rec.body, b"Wikipedia");
        assert_eq!(rec.trailers, vec![("X-Sum".to_string(), "1".to_string())]);
        assert!(rec.complete);
    }

    #[test]
    fn empty_body_completes_immediately() {
        let mut parser = ResponseParser::new();
        let mut rec = Recorder::default();
        let mut buf = BytesMut::from(&b"HTTP/1.1 204 No Content\r\n\r\n"[..]);
        parser.receive(&mut buf, &mut rec).unwrap();
        parser.set_body_mode(BodyMode::Empty, &mut rec);
        assert!(rec.complete);
        assert_eq!(parser.state(), ParseState::Idle);
    }

    #[test]
    fn until_close_body_ends_at_eof() {
        let mut parser = ResponseParser::new();
        let mut rec = Recorder::default();
        let mut buf = BytesMut::from(&b"HTTP/1.0 200 OK\r\n\r\nabc"[..]);
        parser.receive(&mut buf, &mut rec).unwrap();
        assert_eq!(rec.status.as_ref().map(|s| s.0), Some(HttpVersion::Http1_0));
        parser.set_body_mode(BodyMode::UntilClose, &mut rec);
        parser.receive(&mut buf, &mut rec).unwrap();
        assert_eq!(rec.body, b"abc");
        assert!(!rec.complete);
        parser.eof(&mut rec).unwrap();
        assert!(rec.complete);
    }

    #[test]
    fn truncated_body_is_an_error() {
        let mut parser = ResponseParser::new();
        let mut rec = Recorder::default();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc"[..]);
        parser.receive(&mut buf, &mut rec).unwrap();
        parser.set_body_mode(BodyMode::Length(10), &mut rec);
        parser.receive(&mut buf, &mut rec).unwrap();
        let err = parser.eof(&mut rec).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn rejects_garbage() {
        let mut parser = ResponseParser::new();
        let mut rec = Recorder::default();
        let mut buf = BytesMut::from(&b"SSH-2.0-OpenSSH\r\n"[..]);
        assert!(parser.receive(&mut buf, &mut rec).is_err());

        let mut parser = ResponseParser::new();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n"[..]);
        parser.receive(&mut buf, &mut rec).unwrap();
        parser.set_body_mode(BodyMode::Chunked, &mut rec);
        assert!(parser.receive(&mut buf, &mut rec).is_err());
    }

    #[test]
    fn interim_response_then_final() {
        let mut parser = ResponseParser::new();
        let mut rec = Recorder::default();
        let mut buf =
            BytesMut::from(&b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n"[..]);
        parser.receive(&mut buf, &mut rec).unwrap();
        assert_eq!(rec.status.as_ref().map(|s| s.1), Some(100));
        parser.reset();
        parser.receive(&mut buf, &mut rec).unwrap();
        assert_eq!(rec.status.as_ref().map(|s| s.1), Some(200));
        assert_eq!(parser.state(), ParseState::HeadersComplete);
    }
}
