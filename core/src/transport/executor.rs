/*
 * executor.rs
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

//! Request executor: drives one request from pool acquisition through the response head,
//! running the tracing hooks around it and classifying failures by phase.

use bytes::Bytes;
use std::io;
use std::sync::Arc;

use crate::protocol::http::{validate_header, HttpVersion, Method, ResponseHead, RequestHead};
use crate::transport::body::{Body, ResponseBody};
use crate::transport::error::TransportError;
use crate::transport::extensions::{self, ExtensionValue, Extensions, HTTP_VERSION};
use crate::transport::pool::{Pool, PooledConnection};
use crate::transport::request::Request;
use crate::transport::response::Response;
use crate::transport::timeout::{resolve, with_deadline, RequestDeadlines, TimeoutConfig};
use crate::transport::trace::{RequestTraceInfo, ResponseTraceData, ResponseTraceInfo, Tracer};
use crate::uri::{parse_target, Target};

/// Lifecycle of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Acquiring,
    Sending,
    AwaitingHeaders,
    StreamingBody,
    Released,
    Failed,
}

pub(crate) fn enter(phase: Phase) {
    tracing::trace!(?phase, "request phase");
}

/// Classify an I/O failure by the phase it happened in. When the overall budget is what
/// expired, anything before the response head is a write timeout and anything after is a
/// read timeout.
pub(crate) fn map_io_error(phase: Phase, e: io::Error, deadlines: &RequestDeadlines) -> TransportError {
    let timed_out = e.kind() == io::ErrorKind::TimedOut;
    if timed_out && deadlines.overall_elapsed() {
        match phase {
            Phase::Sending | Phase::AwaitingHeaders => return TransportError::WriteTimeout,
            Phase::StreamingBody => return TransportError::ReadTimeout,
            _ => {}
        }
    }
    match (phase, timed_out) {
        (Phase::Sending, true) => TransportError::WriteTimeout,
        (Phase::Sending, false) => TransportError::Write(e),
        (Phase::AwaitingHeaders | Phase::StreamingBody, true) => TransportError::ReadTimeout,
        (Phase::AwaitingHeaders | Phase::StreamingBody, false) => TransportError::Read(e),
        _ => TransportError::Connect(e),
    }
}

fn version_extension(version: HttpVersion) -> ExtensionValue {
    ExtensionValue::Bytes(Bytes::from_static(version.as_str().as_bytes()))
}

/// Send `request` and return once the response head is in.
pub(crate) async fn execute(
    pool: &Arc<Pool>,
    default_timeout: &TimeoutConfig,
    tracer: Option<&dyn Tracer>,
    request: Request,
) -> Result<Response, TransportError> {
    if tokio::runtime::Handle::try_current().is_err() {
        return Err(TransportError::Usage(
            "requests must be sent from within a tokio runtime".to_string(),
        ));
    }
    let Request {
        method,
        url,
        headers,
        body,
        mut extensions,
        timeout,
    } = request;
    enter(Phase::Idle);

    let target =
        parse_target(&url).map_err(|reason| TransportError::unsupported(&url, reason))?;
    for (name, value) in &headers {
        validate_header(name, value).map_err(TransportError::Usage)?;
    }
    let deadlines = RequestDeadlines::start(resolve(timeout.as_ref().unwrap_or(default_timeout)));

    let info = RequestTraceInfo {
        method: method.to_string(),
        url,
    };
    if let Some(tracer) = tracer {
        tracer
            .on_request_start(&info, &mut extensions)
            .await
            .map_err(TransportError::Hook)?;
    }

    let outcome = exchange(pool, &method, &target, &headers, body, &deadlines).await;
    let (head, conn) = match outcome {
        Ok(exchanged) => exchanged,
        Err(e) => {
            enter(Phase::Failed);
            tracing::debug!(error = %e, "request failed");
            if let Some(tracer) = tracer {
                let data = ResponseTraceData {
                    request: info,
                    response: None,
                    error: Some(e.to_string()),
                };
                tracer
                    .on_request_end(&data, &mut extensions)
                    .await
                    .map_err(TransportError::Hook)?;
            }
            return Err(e);
        }
    };

    if let Some(tracer) = tracer {
        let data = ResponseTraceData {
            request: info,
            response: Some(ResponseTraceInfo {
                status: head.status,
                headers: head.headers.clone(),
                version: head.version,
            }),
            error: None,
        };
        // A failing hook drops the lease, which discards the connection.
        tracer
            .on_request_end(&data, &mut extensions)
            .await
            .map_err(TransportError::Hook)?;
    }

    let mut protocol_extensions = Extensions::new();
    protocol_extensions.insert(HTTP_VERSION.to_string(), version_extension(head.version));
    let extensions = extensions::merge(protocol_extensions, extensions);

    enter(Phase::StreamingBody);
    let body = ResponseBody::new(conn, deadlines);
    Ok(Response::new(head, extensions, body))
}

/// Acquire, send the request, wait for the final response head.
async fn exchange(
    pool: &Arc<Pool>,
    method: &Method,
    target: &Target,
    headers: &[(String, String)],
    body: Body,
    deadlines: &RequestDeadlines,
) -> Result<(ResponseHead, PooledConnection), TransportError> {
    enter(Phase::Acquiring);
    let mut conn = pool.acquire(&target.destination, deadlines).await?;

    enter(Phase::Sending);
    let head = RequestHead {
        method,
        target,
        headers,
        body: body.length(),
    };
    let sending = |e: io::Error| map_io_error(Phase::Sending, e, deadlines);
    conn.begin_request(&head, deadlines).await.map_err(sending)?;
    match body {
        Body::Empty => {}
        Body::Bytes(bytes) => conn.send_body_chunk(bytes, deadlines).await.map_err(sending)?,
        Body::Stream(mut stream) => loop {
            // Producing chunks counts against the overall budget only.
            let next = with_deadline(deadlines.overall(), async {
                Ok::<_, io::Error>(stream.next_chunk().await)
            })
            .await
            .map_err(sending)?;
            match next {
                Some(Ok(chunk)) => conn.send_body_chunk(chunk, deadlines).await.map_err(sending)?,
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "request body source failed");
                    return Err(TransportError::Write(e));
                }
                None => break,
            }
        },
    }
    conn.finish_request(deadlines).await.map_err(sending)?;

    enter(Phase::AwaitingHeaders);
    let head = conn
        .read_response_head(deadlines)
        .await
        .map_err(|e| map_io_error(Phase::AwaitingHeaders, e, deadlines))?;
    tracing::debug!(status = head.status, version = head.version.as_str(), "response head");
    Ok((head, conn))
}
