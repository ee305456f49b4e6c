/*
 * trace.rs
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

//! Tracing hooks: user code called before a request is sent and after its response head (or
//! failure) is known. Hooks may read and mutate the request's extensions.

use std::future::Future;
use std::pin::Pin;

use crate::protocol::http::HttpVersion;
use crate::transport::error::HookError;
use crate::transport::extensions::Extensions;

/// Future returned by a hook.
pub type HookFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HookError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTraceInfo {
    pub method: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTraceInfo {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub version: HttpVersion,
}

/// What `on_request_end` sees: the response head, or the error message when the request
/// failed before one arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTraceData {
    pub request: RequestTraceInfo,
    pub response: Option<ResponseTraceInfo>,
    pub error: Option<String>,
}

/// Hooks around each request. An error from either hook fails the request with
/// [`TransportError::Hook`](crate::transport::TransportError::Hook).
pub trait Tracer: Send + Sync {
    fn on_request_start<'a>(
        &'a self,
        request: &'a RequestTraceInfo,
        extensions: &'a mut Extensions,
    ) -> HookFuture<'a>;

    fn on_request_end<'a>(
        &'a self,
        data: &'a ResponseTraceData,
        extensions: &'a mut Extensions,
    ) -> HookFuture<'a>;
}
