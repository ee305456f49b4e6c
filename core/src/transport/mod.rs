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

//! Transport engine: timeout policy, connection pool, protocol negotiation, request
//! execution and streaming bodies.

pub mod body;
pub mod client;
pub mod error;
pub mod executor;
pub mod extensions;
pub mod negotiate;
pub mod pool;
pub mod request;
pub mod response;
pub mod timeout;
pub mod trace;

pub use body::{Body, BodyStream, ResponseBody};
pub use client::AsyncTransport;
pub use error::{ConfigError, ErrorKind, HookError, TransportError};
pub use extensions::{ExtensionValue, Extensions};
pub use negotiate::ProtocolPolicy;
pub use pool::PoolStats;
pub use request::Request;
pub use response::Response;
pub use timeout::{resolve, PhaseTimeouts, RequestDeadlines, TimeoutConfig};
pub use trace::{HookFuture, RequestTraceInfo, ResponseTraceData, ResponseTraceInfo, Tracer};
