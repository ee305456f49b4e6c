/*
 * connection.rs
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

//! HTTP connection: one TCP or TLS stream speaking HTTP/1.1 or HTTP/2, carrying one request
//! at a time. The connection tracks whether it can safely be reused; any I/O failure taints
//! it for good.

use bytes::{Bytes, BytesMut};
use futures_util::FutureExt;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_rustls::client::TlsStream as TokioTlsStream;

use crate::protocol::http::h1::{
    encode_chunk_header, encode_request_head, BodyMode, Framing, H1ResponseHandler, ParseState,
    ResponseParser, LAST_CHUNK,
};
use crate::protocol::http::h2::{request_header_list, H2Session};
use crate::protocol::http::request::{find_header, header_has_token, BodyLength, Method, RequestHead};
use crate::protocol::http::response::ResponseHead;
use crate::transport::timeout::{with_deadline, RequestDeadlines};
use crate::uri::Destination;

/// Negotiated protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpVersion {
    /// Only ever seen in a response status line.
    Http1_0,
    Http1_1,
    Http2,
}

impl HttpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http1_0 => "HTTP/1.0",
            HttpVersion::Http1_1 => "HTTP/1.1",
            HttpVersion::Http2 => "HTTP/2",
        }
    }
}

/// Unified stream: plain TCP or TLS. Implements AsyncRead + AsyncWrite.
pub enum HttpStream {
    Plain(TcpStream),
    Tls(Box<TokioTlsStream<TcpStream>>),
    /// TLS to the destination inside a CONNECT tunnel through an `https://` proxy.
    ProxiedTls(Box<TokioTlsStream<TokioTlsStream<TcpStream>>>),
}

impl AsyncRead for HttpStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            HttpStream::ProxiedTls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for HttpStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            HttpStream::ProxiedTls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_flush(cx),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            HttpStream::ProxiedTls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            HttpStream::ProxiedTls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Socket plus the bytes read from it but not yet parsed.
pub(crate) struct ConnIo {
    stream: HttpStream,
    pub(crate) read_buf: BytesMut,
}

impl ConnIo {
    fn new(stream: HttpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(8192),
        }
    }

    /// Write and flush `data`. `deadline` is asked again before every socket write, so the
    /// write timeout bounds each write rather than the whole buffer.
    pub(crate) async fn write_all<D>(&mut self, data: &[u8], deadline: D) -> io::Result<()>
    where
        D: Fn() -> Option<Instant>,
    {
        self.write_parts(&[data], deadline).await
    }

    pub(crate) async fn write_parts<D>(&mut self, parts: &[&[u8]], deadline: D) -> io::Result<()>
    where
        D: Fn() -> Option<Instant>,
    {
        for part in parts {
            let mut rest = *part;
            while !rest.is_empty() {
                let n = with_deadline(deadline(), self.stream.write(rest)).await?;
                if n == 0 {
                    return Err(io::ErrorKind::WriteZero.into());
                }
                rest = &rest[n..];
            }
        }
        with_deadline(deadline(), self.stream.flush()).await
    }

    /// Read more bytes into the buffer. Returns 0 at end of stream.
    pub(crate) async fn fill(&mut self, deadline: Option<Instant>) -> io::Result<usize> {
        if self.read_buf.capacity() - self.read_buf.len() < 4096 {
            self.read_buf.reserve(8192);
        }
        with_deadline(deadline, self.stream.read_buf(&mut self.read_buf)).await
    }
}

/// Reuse state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// No request in progress; may carry another.
    Reusable,
    /// A request has started and not yet been fully received.
    InFlight,
    /// Failed or interrupted; must be closed.
    Tainted,
}

/// Collects H1 parser events until the connection hands them out.
#[derive(Default)]
struct H1Events {
    status: Option<(HttpVersion, u16, Option<String>)>,
    headers: Vec<(String, String)>,
    chunks: VecDeque<Bytes>,
}

impl H1ResponseHandler for H1Events {
    fn status(&mut self, version: HttpVersion, code: u16, reason: Option<&str>) {
        self.status = Some((version, code, reason.map(str::to_string)));
        self.headers.clear();
    }

    fn header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn body_chunk(&mut self, data: Bytes) {
        if !data.is_empty() {
            self.chunks.push_back(data);
        }
    }

    fn trailer(&mut self, name: &str, _value: &str) {
        tracing::trace!(trailer = name, "ignoring response trailer");
    }

    fn complete(&mut self) {}
}

struct H1State {
    parser: ResponseParser,
    events: H1Events,
    framing: Framing,
    head_request: bool,
    keep_alive: bool,
}

impl H1State {
    fn new() -> Self {
        Self {
            parser: ResponseParser::new(),
            events: H1Events::default(),
            framing: Framing::None,
            head_request: false,
            keep_alive: true,
        }
    }
}

enum Protocol {
    H1(H1State),
    H2(Box<H2Session>),
}

/// How an HTTP/1.x response body is delimited, from the request method and response head.
fn response_body_mode(
    head_request: bool,
    status: u16,
    headers: &[(String, String)],
) -> io::Result<BodyMode> {
    if head_request || (100..200).contains(&status) || status == 204 || status == 304 {
        return Ok(BodyMode::Empty);
    }
    if let Some(te) = find_header(headers, "transfer-encoding") {
        let last = te.rsplit(',').next().unwrap_or("").trim();
        if last.eq_ignore_ascii_case("chunked") {
            return Ok(BodyMode::Chunked);
        }
        return Ok(BodyMode::UntilClose);
    }
    match find_header(headers, "content-length") {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(BodyMode::Length)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid Content-Length")),
        None => Ok(BodyMode::UntilClose),
    }
}

/// One established connection to a destination.
pub struct HttpConnection {
    io: ConnIo,
    destination: Destination,
    version: HttpVersion,
    state: ConnState,
    /// Set when plain-HTTP requests are forwarded through a proxy: extra headers for it.
    forward_headers: Option<Vec<(String, String)>>,
    protocol: Protocol,
}

impl HttpConnection {
    /// Wrap an established stream. For HTTP/2 the preface must already have been written,
    /// using the session passed in `h2`.
    pub(crate) fn new(
        stream: HttpStream,
        destination: Destination,
        version: HttpVersion,
        h2: Option<H2Session>,
    ) -> Self {
        let protocol = match (version, h2) {
            (HttpVersion::Http2, Some(session)) => Protocol::H2(Box::new(session)),
            (HttpVersion::Http2, None) => Protocol::H2(Box::default()),
            _ => Protocol::H1(H1State::new()),
        };
        Self {
            io: ConnIo::new(stream),
            destination,
            version,
            state: ConnState::Reusable,
            forward_headers: None,
            protocol,
        }
    }

    /// Send requests in absolute form with these extra headers (plain HTTP via a proxy).
    pub(crate) fn forward_through_proxy(&mut self, headers: Vec<(String, String)>) {
        self.forward_headers = Some(headers);
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Mark the connection unusable.
    pub fn taint(&mut self) {
        self.state = ConnState::Tainted;
    }

    /// The last request was fully exchanged and the protocol allows another.
    pub fn is_reusable(&self) -> bool {
        if self.state != ConnState::Reusable {
            return false;
        }
        match &self.protocol {
            Protocol::H1(h1) => h1.keep_alive && self.io.read_buf.is_empty(),
            Protocol::H2(session) => session.is_reusable(),
        }
    }

    /// The response to the current request has been received in full.
    pub fn message_complete(&self) -> bool {
        match &self.protocol {
            Protocol::H1(h1) => h1.parser.state() == ParseState::Idle && h1.events.chunks.is_empty(),
            Protocol::H2(session) => session.stream_finished(),
        }
    }

    /// Check an idle connection without blocking: closed sockets, stray bytes on HTTP/1.1,
    /// or a GOAWAY on HTTP/2 make it unusable.
    pub fn poll_liveness(&mut self) -> bool {
        if !self.is_reusable() {
            return false;
        }
        let read = self.io.stream.read_buf(&mut self.io.read_buf).now_or_never();
        let alive = match read {
            None => true,
            Some(Ok(0)) | Some(Err(_)) => false,
            Some(Ok(_)) => match &mut self.protocol {
                Protocol::H1(_) => false,
                Protocol::H2(session) => {
                    session.process_buffered(&mut self.io.read_buf).is_ok() && session.is_reusable()
                }
            },
        };
        if !alive {
            self.taint();
        }
        alive
    }

    /// Write the request head. The body, if any, follows via `send_body_chunk`.
    pub async fn begin_request(
        &mut self,
        head: &RequestHead<'_>,
        deadlines: &RequestDeadlines,
    ) -> io::Result<()> {
        if self.state != ConnState::Reusable {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "connection is not ready for a new request",
            ));
        }
        self.state = ConnState::InFlight;
        let result = match &mut self.protocol {
            Protocol::H1(h1) => {
                h1.parser.reset();
                h1.events = H1Events::default();
                h1.head_request = *head.method == Method::Head;
                h1.keep_alive = !header_has_token(head.headers, "connection", "close");
                let mut out = BytesMut::with_capacity(512);
                h1.framing = encode_request_head(head, self.forward_headers.as_deref(), &mut out);
                self.io.write_all(&out, || deadlines.write()).await
            }
            Protocol::H2(session) => {
                let headers = request_header_list(head);
                let end_stream = head.body == BodyLength::Empty;
                session
                    .start_stream(&mut self.io, &headers, end_stream, deadlines)
                    .await
            }
        };
        self.check(result)
    }

    pub async fn send_body_chunk(
        &mut self,
        data: Bytes,
        deadlines: &RequestDeadlines,
    ) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let result = match &mut self.protocol {
            Protocol::H1(h1) => match h1.framing {
                Framing::Chunked => {
                    let mut header = BytesMut::with_capacity(16);
                    encode_chunk_header(data.len(), &mut header);
                    self.io
                        .write_parts(&[&header[..], &data[..], &b"\r\n"[..]], || {
                            deadlines.write()
                        })
                        .await
                }
                Framing::Length => self.io.write_all(&data, || deadlines.write()).await,
                Framing::None => Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "request body without framing",
                )),
            },
            Protocol::H2(session) => session.send_data(&mut self.io, data, deadlines).await,
        };
        self.check(result)
    }

    /// Terminate the request body.
    pub async fn finish_request(&mut self, deadlines: &RequestDeadlines) -> io::Result<()> {
        let result = match &mut self.protocol {
            Protocol::H1(h1) => match h1.framing {
                Framing::Chunked => self.io.write_all(LAST_CHUNK, || deadlines.write()).await,
                Framing::Length | Framing::None => Ok(()),
            },
            Protocol::H2(session) => session.end_stream(&mut self.io, deadlines).await,
        };
        self.check(result)
    }

    /// Wait for the final response head. Interim 1xx responses (other than 101) are skipped.
    pub async fn read_response_head(
        &mut self,
        deadlines: &RequestDeadlines,
    ) -> io::Result<ResponseHead> {
        let result = match &mut self.protocol {
            Protocol::H1(h1) => Self::read_h1_head(&mut self.io, h1, deadlines).await,
            Protocol::H2(session) => session
                .read_head(&mut self.io, deadlines)
                .await
                .map(|(status, headers)| ResponseHead {
                    version: HttpVersion::Http2,
                    status,
                    reason: None,
                    headers,
                }),
        };
        let head = self.check(result)?;
        self.settle();
        Ok(head)
    }

    async fn read_h1_head(
        io: &mut ConnIo,
        h1: &mut H1State,
        deadlines: &RequestDeadlines,
    ) -> io::Result<ResponseHead> {
        loop {
            h1.parser.receive(&mut io.read_buf, &mut h1.events)?;
            if h1.parser.state() == ParseState::HeadersComplete {
                let (version, status, reason) = h1.events.status.take().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "response without status line")
                })?;
                let headers = std::mem::take(&mut h1.events.headers);
                if (100..200).contains(&status) && status != 101 {
                    h1.parser.reset();
                    continue;
                }
                let mode = response_body_mode(h1.head_request, status, &headers)?;
                if header_has_token(&headers, "connection", "close")
                    || (version == HttpVersion::Http1_0
                        && !header_has_token(&headers, "connection", "keep-alive"))
                    || mode == BodyMode::UntilClose
                    || status == 101
                {
                    h1.keep_alive = false;
                }
                h1.parser.set_body_mode(mode, &mut h1.events);
                return Ok(ResponseHead {
                    version,
                    status,
                    reason,
                    headers,
                });
            }
            let n = io.fill(deadlines.read()).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before response headers",
                ));
            }
        }
    }

    /// Next chunk of the response body, or `None` when the body is complete.
    pub async fn read_body_chunk(
        &mut self,
        deadlines: &RequestDeadlines,
    ) -> io::Result<Option<Bytes>> {
        let result = match &mut self.protocol {
            Protocol::H1(h1) => Self::read_h1_chunk(&mut self.io, h1, deadlines).await,
            Protocol::H2(session) => session.read_data(&mut self.io, deadlines).await,
        };
        let chunk = self.check(result)?;
        if chunk.is_none() {
            self.settle();
        }
        Ok(chunk)
    }

    async fn read_h1_chunk(
        io: &mut ConnIo,
        h1: &mut H1State,
        deadlines: &RequestDeadlines,
    ) -> io::Result<Option<Bytes>> {
        loop {
            if let Some(chunk) = h1.events.chunks.pop_front() {
                return Ok(Some(chunk));
            }
            if h1.parser.state() == ParseState::Idle {
                return Ok(None);
            }
            h1.parser.receive(&mut io.read_buf, &mut h1.events)?;
            if !h1.events.chunks.is_empty() || h1.parser.state() == ParseState::Idle {
                continue;
            }
            if io.fill(deadlines.read()).await? == 0 {
                h1.parser.eof(&mut h1.events)?;
            }
        }
    }

    /// Back to Reusable once the whole exchange is done.
    fn settle(&mut self) {
        if self.state == ConnState::InFlight && self.message_complete() {
            self.state = ConnState::Reusable;
        }
    }

    fn check<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if result.is_err() {
            self.taint();
        }
        result
    }
}
