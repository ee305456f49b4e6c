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

//! HTTP/1.1 request serialization.

use bytes::{BufMut, BytesMut};

use crate::protocol::http::request::{find_header, BodyLength, RequestHead};

/// Terminating chunk of a chunked body (no trailers).
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// How body bytes follow the head on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    None,
    /// Raw bytes, delimited by Content-Length.
    Length,
    Chunked,
}

fn put_header(out: &mut BytesMut, name: &str, value: &str) {
    out.put_slice(name.as_bytes());
    out.put_slice(b": ");
    out.put_slice(value.as_bytes());
    out.put_slice(b"\r\n");
}

/// Write the request line and headers. `Host` is added unless the caller set one, and body
/// framing headers are added unless the caller set them. `proxy_headers` is present when the
/// request is forwarded through a proxy: the target is then sent in absolute form.
pub fn encode_request_head(
    head: &RequestHead<'_>,
    proxy_headers: Option<&[(String, String)]>,
    out: &mut BytesMut,
) -> Framing {
    let target = match proxy_headers {
        Some(_) => head.target.absolute_form(),
        None => head.target.path_and_query.clone(),
    };
    out.put_slice(head.method.as_str().as_bytes());
    out.put_u8(b' ');
    out.put_slice(target.as_bytes());
    out.put_slice(b" HTTP/1.1\r\n");

    if find_header(head.headers, "host").is_none() {
        put_header(out, "Host", &head.target.destination.authority());
    }
    for (name, value) in head.headers {
        put_header(out, name, value);
    }

    let has_length = find_header(head.headers, "content-length").is_some();
    let chunked_by_caller = find_header(head.headers, "transfer-encoding")
        .map_or(false, |te| te.to_ascii_lowercase().contains("chunked"));
    let framing = match head.body {
        BodyLength::Empty => {
            if head.method.expects_body() && !has_length && !chunked_by_caller {
                put_header(out, "Content-Length", "0");
            }
            Framing::None
        }
        BodyLength::Known(n) => {
            if chunked_by_caller {
                Framing::Chunked
            } else {
                if !has_length {
                    put_header(out, "Content-Length", &n.to_string());
                }
                Framing::Length
            }
        }
        BodyLength::Streaming => {
            if chunked_by_caller {
                Framing::Chunked
            } else if has_length {
                Framing::Length
            } else {
                put_header(out, "Transfer-Encoding", "chunked");
                Framing::Chunked
            }
        }
    };

    if let Some(extra) = proxy_headers {
        for (name, value) in extra {
            put_header(out, name, value);
        }
    }
    out.put_slice(b"\r\n");
    framing
}

/// Chunk-size line for a chunk of `len` bytes.
pub fn encode_chunk_header(len: usize, out: &mut BytesMut) {
    out.put_slice(format!("{:x}\r\n", len).as_bytes());
}
