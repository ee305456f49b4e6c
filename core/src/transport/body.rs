/*
 * body.rs
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

//! Request and response bodies as lazy sequences of byte chunks.
//!
//! A request body is empty, eager bytes, or a [`BodyStream`] whose cleanup closure runs
//! exactly once however the stream ends: exhaustion, a source error, an explicit close or
//! drop (which is how cancellation shows up). A [`ResponseBody`] owns the connection it is
//! read from and returns it to the pool only when read to the end.

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream, StreamExt};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use crate::protocol::http::BodyLength;
use crate::transport::error::TransportError;
use crate::transport::executor::{enter, map_io_error, Phase};
use crate::transport::pool::PooledConnection;
use crate::transport::timeout::RequestDeadlines;

type ChunkStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Runs its closure at most once, at the latest on drop.
struct CleanupGuard(Option<Box<dyn FnOnce() + Send>>);

impl CleanupGuard {
    fn run(&mut self) {
        if let Some(cleanup) = self.0.take() {
            cleanup();
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.run();
    }
}

/// Lazily produced request body.
pub struct BodyStream {
    stream: Option<ChunkStream>,
    cleanup: CleanupGuard,
}

impl BodyStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            stream: Some(Box::pin(stream)),
            cleanup: CleanupGuard(None),
        }
    }

    /// Run `cleanup` once the stream is finished with, whichever way that happens.
    pub fn with_cleanup<F>(mut self, cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.cleanup = CleanupGuard(Some(Box::new(cleanup)));
        self
    }

    /// Next non-empty chunk.
    pub async fn next_chunk(&mut self) -> Option<io::Result<Bytes>> {
        self.next().await
    }

    /// Stop early. The source is dropped and cleanup runs; later reads yield nothing.
    pub fn close(&mut self) {
        self.stream = None;
        self.cleanup.run();
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl Stream for BodyStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let Some(stream) = this.stream.as_mut() else {
                return Poll::Ready(None);
            };
            match ready!(stream.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => return Poll::Ready(Some(Ok(chunk))),
                Some(Err(e)) => {
                    this.close();
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.close();
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Request body.
#[derive(Debug, Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
    Stream(BodyStream),
}

impl Body {
    /// Streaming body from any `Send` stream of chunks.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Body::Stream(BodyStream::new(stream))
    }

    pub fn length(&self) -> BodyLength {
        match self {
            Body::Empty => BodyLength::Empty,
            Body::Bytes(b) if b.is_empty() => BodyLength::Empty,
            Body::Bytes(b) => BodyLength::Known(b.len() as u64),
            Body::Stream(_) => BodyLength::Streaming,
        }
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Bytes(b)
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(v))
    }
}

impl From<&'static [u8]> for Body {
    fn from(b: &'static [u8]) -> Self {
        Body::Bytes(Bytes::from_static(b))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Bytes(Bytes::from(s))
    }
}

impl From<BodyStream> for Body {
    fn from(s: BodyStream) -> Self {
        Body::Stream(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Streaming,
    /// Read to the end; the connection went back to the pool.
    Done,
    /// Closed early; the connection was discarded.
    Closed,
    /// A read failed; the connection was discarded.
    Failed,
}

/// Response body, readable once. Holds the connection until finished.
pub struct ResponseBody {
    conn: Option<PooledConnection>,
    deadlines: RequestDeadlines,
    state: ReadState,
    /// A chunk read is in progress. Still set on entry means the last read was cancelled.
    pending: bool,
}

impl ResponseBody {
    pub(crate) fn new(conn: PooledConnection, deadlines: RequestDeadlines) -> Self {
        let mut body = Self {
            conn: Some(conn),
            deadlines,
            state: ReadState::Streaming,
            pending: false,
        };
        if body.conn.as_ref().map_or(false, |c| c.message_complete()) {
            body.finish();
        }
        body
    }

    /// Next chunk, or `None` at the end. After an error the body yields nothing more.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        if self.state != ReadState::Streaming {
            return Ok(None);
        }
        let Some(conn) = self.conn.as_mut() else {
            self.state = ReadState::Done;
            return Ok(None);
        };
        if self.pending {
            conn.taint();
        }
        self.pending = true;
        let result = conn.read_body_chunk(&self.deadlines).await;
        self.pending = false;
        match result {
            Ok(Some(chunk)) => Ok(Some(chunk)),
            Ok(None) => {
                self.finish();
                Ok(None)
            }
            Err(e) => {
                enter(Phase::Failed);
                self.state = ReadState::Failed;
                self.conn = None;
                Err(map_io_error(Phase::StreamingBody, e, &self.deadlines))
            }
        }
    }

    fn finish(&mut self) {
        enter(Phase::Released);
        self.state = ReadState::Done;
        if let Some(conn) = self.conn.take() {
            conn.release();
        }
    }

    /// Stop reading. A partially read body discards its connection; closing a body that was
    /// read to the end does nothing.
    pub fn close(&mut self) {
        if self.state == ReadState::Streaming {
            self.state = ReadState::Closed;
            self.conn = None;
        }
    }

    /// Read to the end.
    pub fn is_complete(&self) -> bool {
        self.state == ReadState::Done
    }

    pub fn is_closed(&self) -> bool {
        self.state != ReadState::Streaming
    }

    /// Read the remaining body into one buffer.
    pub async fn bytes(mut self) -> Result<Bytes, TransportError> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, TransportError>> + Send {
        stream::unfold(self, |mut body| async move {
            match body.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), body)),
                Ok(None) => None,
                Err(e) => Some((Err(e), body)),
            }
        })
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("state", &self.state)
            .finish()
    }
}
