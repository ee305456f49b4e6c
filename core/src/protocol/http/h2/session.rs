/*
 * session.rs
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

//! HTTP/2 connection session: preface, one request stream at a time, send-side flow control,
//! and the control frames (SETTINGS, PING, WINDOW_UPDATE, GOAWAY, RST_STREAM) that must be
//! answered while a request is in flight.

use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::io;

use tokio::time::Instant;

use super::frame::*;
use super::parser::connection_error;
use super::{H2Parser, H2Writer, CONNECTION_PREFACE};
use crate::protocol::http::connection::ConnIo;
use crate::protocol::http::hpack::{self, DEFAULT_HEADER_TABLE_SIZE};
use crate::protocol::http::request::{find_header, BodyLength, RequestHead};
use crate::transport::timeout::RequestDeadlines;

/// Connection-specific headers that must not appear in an HTTP/2 request.
const CONNECTION_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

const LAST_STREAM_ID: u32 = 0x7fff_ffff;

/// Build the HTTP/2 header list for a request: pseudo-headers first, then lowercased
/// caller headers minus connection-specific ones.
pub fn request_header_list(head: &RequestHead<'_>) -> Vec<(String, String)> {
    let authority = find_header(head.headers, "host")
        .map(str::to_string)
        .unwrap_or_else(|| head.target.destination.authority());
    let mut list = vec![
        (":method".to_string(), head.method.as_str().to_string()),
        (
            ":scheme".to_string(),
            head.target.destination.scheme().as_str().to_string(),
        ),
        (":authority".to_string(), authority),
        (":path".to_string(), head.target.path_and_query.clone()),
    ];
    for (name, value) in head.headers {
        let name = name.to_ascii_lowercase();
        if CONNECTION_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if name == "te" && !value.eq_ignore_ascii_case("trailers") {
            continue;
        }
        list.push((name, value.clone()));
    }
    if let BodyLength::Known(n) = head.body {
        if find_header(head.headers, "content-length").is_none() {
            list.push(("content-length".to_string(), n.to_string()));
        }
    }
    list
}

struct StreamState {
    id: u32,
    send_window: i64,
    local_closed: bool,
    remote_closed: bool,
    head_seen: bool,
    head: Option<(u16, Vec<(String, String)>)>,
    chunks: VecDeque<Bytes>,
    reset: Option<u32>,
}

impl StreamState {
    fn new(id: u32, send_window: i64) -> Self {
        Self {
            id,
            send_window,
            local_closed: false,
            remote_closed: false,
            head_seen: false,
            head: None,
            chunks: VecDeque::new(),
            reset: None,
        }
    }
}

/// Header block split across HEADERS and CONTINUATION frames.
struct PendingBlock {
    stream_id: u32,
    end_stream: bool,
    block: BytesMut,
}

fn stream_reset(code: u32) -> io::Error {
    io::Error::new(
        io::ErrorKind::ConnectionReset,
        format!("HTTP/2 stream reset by peer: {}", error_to_string(code)),
    )
}

pub struct H2Session {
    parser: H2Parser,
    writer: H2Writer,
    decoder: hpack::Decoder,
    next_stream_id: u32,
    stream: Option<StreamState>,
    conn_send_window: i64,
    initial_send_window: i64,
    peer_max_frame_size: usize,
    pending_block: Option<PendingBlock>,
    goaway: Option<(u32, u32)>,
    broken: bool,
}

impl H2Session {
    pub fn new() -> Self {
        Self {
            parser: H2Parser::new(),
            writer: H2Writer::new(),
            decoder: hpack::Decoder::new(DEFAULT_HEADER_TABLE_SIZE),
            next_stream_id: 1,
            stream: None,
            conn_send_window: DEFAULT_WINDOW_SIZE as i64,
            initial_send_window: DEFAULT_WINDOW_SIZE as i64,
            peer_max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            pending_block: None,
            goaway: None,
            broken: false,
        }
    }

    /// Connection preface and our SETTINGS, to be written once before anything else.
    pub fn preface(&mut self) -> Bytes {
        let mut out = BytesMut::from(CONNECTION_PREFACE);
        self.writer.write_settings(&[(SETTINGS_ENABLE_PUSH, 0)]);
        out.extend_from_slice(&self.writer.take_buffer());
        out.freeze()
    }

    /// A new stream can be opened and every earlier one finished cleanly.
    pub fn is_reusable(&self) -> bool {
        !self.broken
            && self.goaway.is_none()
            && self.stream.is_none()
            && self.pending_block.is_none()
            && self.next_stream_id < LAST_STREAM_ID
    }

    /// The current stream has been fully received.
    pub fn stream_finished(&self) -> bool {
        self.stream.is_none()
    }

    pub(crate) async fn start_stream(
        &mut self,
        io: &mut ConnIo,
        headers: &[(String, String)],
        end_stream: bool,
        deadlines: &RequestDeadlines,
    ) -> io::Result<()> {
        if self.stream.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "HTTP/2 stream already in progress",
            ));
        }
        if let Some((_, code)) = self.goaway {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                format!("HTTP/2 connection is going away: {}", error_to_string(code)),
            ));
        }
        let id = self.next_stream_id;
        self.next_stream_id += 2;

        let mut block = BytesMut::new();
        hpack::encode_headers(
            headers.iter().map(|(n, v)| (n.as_str(), v.as_str())),
            &mut block,
        );
        self.writer
            .write_headers(id, &block, end_stream, self.peer_max_frame_size)?;
        let mut stream = StreamState::new(id, self.initial_send_window);
        stream.local_closed = end_stream;
        self.stream = Some(stream);
        self.flush(io, || deadlines.write()).await
    }

    /// Send request body bytes, waiting for window updates when flow control blocks us.
    pub(crate) async fn send_data(
        &mut self,
        io: &mut ConnIo,
        mut data: Bytes,
        deadlines: &RequestDeadlines,
    ) -> io::Result<()> {
        while !data.is_empty() {
            let conn_window = self.conn_send_window;
            let (id, window) = {
                let stream = self.active_stream()?;
                if let Some(code) = stream.reset {
                    return Err(stream_reset(code));
                }
                (stream.id, stream.send_window.min(conn_window))
            };
            if window <= 0 {
                self.flush(io, || deadlines.write()).await?;
                self.pump(io, || deadlines.write()).await?;
                continue;
            }
            let n = data.len().min(window as usize).min(self.peer_max_frame_size);
            let chunk = data.split_to(n);
            self.writer.write_data(id, &chunk, false)?;
            self.conn_send_window -= n as i64;
            if let Some(stream) = self.stream.as_mut() {
                stream.send_window -= n as i64;
            }
            self.flush(io, || deadlines.write()).await?;
        }
        Ok(())
    }

    /// Half-close our side of the stream.
    pub(crate) async fn end_stream(
        &mut self,
        io: &mut ConnIo,
        deadlines: &RequestDeadlines,
    ) -> io::Result<()> {
        let stream = self.active_stream()?;
        if stream.local_closed {
            return Ok(());
        }
        let id = stream.id;
        stream.local_closed = true;
        self.writer.write_data(id, &[], true)?;
        self.flush(io, || deadlines.write()).await
    }

    /// Wait for the final (non-1xx) response headers of the current stream.
    pub(crate) async fn read_head(
        &mut self,
        io: &mut ConnIo,
        deadlines: &RequestDeadlines,
    ) -> io::Result<(u16, Vec<(String, String)>)> {
        loop {
            let stream = self.active_stream()?;
            if let Some(head) = stream.head.take() {
                if stream.remote_closed && stream.chunks.is_empty() {
                    self.stream = None;
                }
                return Ok(head);
            }
            if let Some(code) = stream.reset {
                return Err(stream_reset(code));
            }
            if stream.remote_closed {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "HTTP/2 stream ended without response headers",
                ));
            }
            self.pump(io, || deadlines.read()).await?;
        }
    }

    /// Next chunk of response data, or `None` once the peer ended the stream.
    pub(crate) async fn read_data(
        &mut self,
        io: &mut ConnIo,
        deadlines: &RequestDeadlines,
    ) -> io::Result<Option<Bytes>> {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };
            if let Some(chunk) = stream.chunks.pop_front() {
                return Ok(Some(chunk));
            }
            if let Some(code) = stream.reset {
                return Err(stream_reset(code));
            }
            if stream.remote_closed {
                self.stream = None;
                return Ok(None);
            }
            self.pump(io, || deadlines.read()).await?;
        }
    }

    /// Process frames already sitting in the read buffer without touching the socket.
    /// Replies (acks, window updates) stay queued until the next write.
    pub(crate) fn process_buffered(&mut self, buf: &mut BytesMut) -> io::Result<()> {
        let result = self.drain_frames(buf);
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    fn drain_frames(&mut self, buf: &mut BytesMut) -> io::Result<()> {
        while let Some(frame) = self.parser.next_frame(buf)? {
            self.handle_frame(frame)?;
        }
        Ok(())
    }

    fn active_stream(&mut self) -> io::Result<&mut StreamState> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no active HTTP/2 stream"))
    }

    async fn flush<D>(&mut self, io: &mut ConnIo, deadline: D) -> io::Result<()>
    where
        D: Fn() -> Option<Instant>,
    {
        if self.writer.is_empty() {
            return Ok(());
        }
        let out = self.writer.take_buffer();
        io.write_all(&out, deadline).await
    }

    /// Read once from the socket, handle every complete frame, send any replies.
    async fn pump<D>(&mut self, io: &mut ConnIo, deadline: D) -> io::Result<()>
    where
        D: Fn() -> Option<Instant>,
    {
        let n = io.fill(deadline()).await?;
        if n == 0 {
            self.broken = true;
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "HTTP/2 connection closed by peer",
            ));
        }
        self.process_buffered(&mut io.read_buf)?;
        self.flush(io, deadline).await
    }

    fn handle_frame(&mut self, frame: Frame) -> io::Result<()> {
        if let Some(pending) = &self.pending_block {
            let continues = matches!(&frame, Frame::Continuation { stream_id, .. } if *stream_id == pending.stream_id);
            if !continues {
                return Err(connection_error(
                    ERROR_PROTOCOL_ERROR,
                    "expected CONTINUATION frame",
                ));
            }
        }
        match frame {
            Frame::Data {
                stream_id,
                end_stream,
                data,
                flow_len,
            } => {
                if flow_len > 0 {
                    self.writer.write_window_update(0, flow_len)?;
                }
                if let Some(stream) = self.stream.as_mut().filter(|s| s.id == stream_id) {
                    if !data.is_empty() {
                        stream.chunks.push_back(data);
                    }
                    if end_stream {
                        stream.remote_closed = true;
                    } else if flow_len > 0 {
                        self.writer.write_window_update(stream_id, flow_len)?;
                    }
                }
            }
            Frame::Headers {
                stream_id,
                end_stream,
                end_headers,
                block,
            } => {
                if end_headers {
                    self.header_block(stream_id, end_stream, &block)?;
                } else {
                    self.pending_block = Some(PendingBlock {
                        stream_id,
                        end_stream,
                        block: BytesMut::from(&block[..]),
                    });
                }
            }
            Frame::Continuation {
                end_headers, block, ..
            } => {
                let Some(mut pending) = self.pending_block.take() else {
                    return Err(connection_error(
                        ERROR_PROTOCOL_ERROR,
                        "unexpected CONTINUATION frame",
                    ));
                };
                pending.block.extend_from_slice(&block);
                if end_headers {
                    self.header_block(pending.stream_id, pending.end_stream, &pending.block)?;
                } else {
                    self.pending_block = Some(pending);
                }
            }
            Frame::RstStream {
                stream_id,
                error_code,
            } => {
                if let Some(stream) = self.stream.as_mut().filter(|s| s.id == stream_id) {
                    stream.reset = Some(error_code);
                }
            }
            Frame::Settings { ack: true, .. } => {}
            Frame::Settings {
                ack: false,
                settings,
            } => {
                for (id, value) in settings {
                    self.apply_setting(id, value)?;
                }
                self.writer.write_settings_ack();
            }
            Frame::PushPromise { .. } => {
                return Err(connection_error(
                    ERROR_PROTOCOL_ERROR,
                    "PUSH_PROMISE received with push disabled",
                ));
            }
            Frame::Ping { ack: false, opaque } => self.writer.write_ping(opaque, true),
            Frame::Ping { ack: true, .. } => {}
            Frame::GoAway {
                last_stream_id,
                error_code,
                ..
            } => {
                tracing::debug!(
                    last_stream_id,
                    error = error_to_string(error_code),
                    "HTTP/2 GOAWAY received"
                );
                self.goaway = Some((last_stream_id, error_code));
                if let Some(stream) = self.stream.as_mut() {
                    if stream.id > last_stream_id {
                        stream.reset = Some(ERROR_REFUSED_STREAM);
                    }
                }
            }
            Frame::WindowUpdate {
                stream_id: 0,
                increment,
            } => {
                self.conn_send_window += increment as i64;
                if self.conn_send_window > MAX_WINDOW_SIZE {
                    return Err(connection_error(
                        ERROR_FLOW_CONTROL_ERROR,
                        "connection window overflow",
                    ));
                }
            }
            Frame::WindowUpdate {
                stream_id,
                increment,
            } => {
                if let Some(stream) = self.stream.as_mut().filter(|s| s.id == stream_id) {
                    stream.send_window += increment as i64;
                }
            }
            Frame::Priority { .. } | Frame::Unknown { .. } => {}
        }
        Ok(())
    }

    fn apply_setting(&mut self, id: u16, value: u32) -> io::Result<()> {
        match id {
            SETTINGS_INITIAL_WINDOW_SIZE => {
                if value as i64 > MAX_WINDOW_SIZE {
                    return Err(connection_error(
                        ERROR_FLOW_CONTROL_ERROR,
                        "SETTINGS_INITIAL_WINDOW_SIZE too large",
                    ));
                }
                let delta = value as i64 - self.initial_send_window;
                self.initial_send_window = value as i64;
                if let Some(stream) = self.stream.as_mut() {
                    stream.send_window += delta;
                }
            }
            SETTINGS_MAX_FRAME_SIZE => {
                let size = value as usize;
                if !(DEFAULT_MAX_FRAME_SIZE..=MAX_MAX_FRAME_SIZE).contains(&size) {
                    return Err(connection_error(
                        ERROR_PROTOCOL_ERROR,
                        "SETTINGS_MAX_FRAME_SIZE out of range",
                    ));
                }
                self.peer_max_frame_size = size;
            }
            // Our encoder never indexes, so the peer's table size does not matter.
            SETTINGS_HEADER_TABLE_SIZE
            | SETTINGS_ENABLE_PUSH
            | SETTINGS_MAX_CONCURRENT_STREAMS
            | SETTINGS_MAX_HEADER_LIST_SIZE => {}
            _ => {}
        }
        Ok(())
    }

    /// Decode a complete header block. Every block is decoded so the HPACK table stays in
    /// step with the peer, even for streams we no longer track.
    fn header_block(&mut self, stream_id: u32, end_stream: bool, block: &[u8]) -> io::Result<()> {
        let headers = self
            .decoder
            .decode(block)
            .map_err(|e| connection_error(ERROR_COMPRESSION_ERROR, &e.to_string()))?;
        let Some(stream) = self.stream.as_mut().filter(|s| s.id == stream_id) else {
            return Ok(());
        };
        if !stream.head_seen {
            let status = headers
                .iter()
                .find(|(n, _)| n == ":status")
                .and_then(|(_, v)| v.parse::<u16>().ok())
                .ok_or_else(|| {
                    connection_error(ERROR_PROTOCOL_ERROR, "response without valid :status")
                })?;
            if (100..200).contains(&status) {
                return Ok(());
            }
            let regular = headers
                .into_iter()
                .filter(|(n, _)| !n.starts_with(':'))
                .collect();
            stream.head = Some((status, regular));
            stream.head_seen = true;
        }
        if end_stream {
            stream.remote_closed = true;
        }
        Ok(())
    }
}

impl Default for H2Session {
    fn default() -> Self {
        Self::new()
    }
}
