/*
 * lib.rs
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

//! Corriere core: an asynchronous HTTP/1.1 and HTTP/2 client transport with a bounded
//! connection pool, per-phase timeouts and streaming bodies.

pub mod config;
pub mod net;
pub mod protocol;
pub mod transport;
pub mod uri;

pub use config::{ClientConfig, Limits, ProxyConfig, TransportSettings};
pub use protocol::http::{HttpVersion, Method};
pub use transport::{
    AsyncTransport, Body, BodyStream, ConfigError, ErrorKind, ExtensionValue, Extensions,
    Request, Response, ResponseBody, TimeoutConfig, TransportError,
};
