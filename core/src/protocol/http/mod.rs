/*
 * mod.rs
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

//! HTTP/1.1 and HTTP/2 wire protocols.
//!
//! - Buffers: `bytes` crate (BytesMut for parse buffers, Bytes for payload slices).
//! - HTTP/1.1: push-parsed responses and a request serializer.
//! - HTTP/2: our own frame parser/writer, HPACK and a single-stream session.
//! - TLS with ALPN `h2`, `http/1.1`; plaintext HTTP/2 uses prior knowledge.

mod request;
mod response;

pub mod h1;
pub mod h2;
pub mod hpack;

pub use h1::H1ResponseHandler;
pub use request::{
    find_header, header_has_token, is_token, validate_header, BodyLength, Method, RequestHead,
};
pub use response::{canonical_reason, ResponseHead};

pub mod client;
pub mod connection;
pub mod socks;

pub use client::{Connector, ProxyKind, ProxyRoute};
pub use connection::{ConnState, HttpConnection, HttpStream, HttpVersion};
