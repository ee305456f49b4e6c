/*
 * request.rs
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

//! Request descriptor handed to the transport.

use crate::protocol::http::Method;
use crate::transport::body::Body;
use crate::transport::error::TransportError;
use crate::transport::extensions::{ExtensionValue, Extensions};
use crate::transport::timeout::TimeoutConfig;

/// One HTTP request: method, URL, ordered headers (names may repeat), body, extensions and
/// an optional timeout overriding the client's.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Body,
    pub extensions: Extensions,
    pub timeout: Option<TimeoutConfig>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Body::Empty,
            extensions: Extensions::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Request with a method given by name. Invalid names are a usage error.
    pub fn with_method(method: &str, url: impl Into<String>) -> Result<Self, TransportError> {
        let method = method.parse::<Method>().map_err(TransportError::Usage)?;
        Ok(Self::new(method, url))
    }

    /// Append a header. Existing headers with the same name are kept.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn extension(mut self, key: impl Into<String>, value: impl Into<ExtensionValue>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let request = Request::post("http://example.org/")
            .header("X-A", "1")
            .header("X-A", "2")
            .body("abc")
            .extension("foo", "bar");
        assert_eq!(request.headers.len(), 2);
        assert!(matches!(request.body, Body::Bytes(ref b) if b.as_ref() == b"abc"));
        assert_eq!(request.extensions["foo"].as_str(), Some("bar"));
    }

    #[test]
    fn invalid_method_is_a_usage_error() {
        assert!(matches!(
            Request::with_method("BAD METHOD", "http://example.org/"),
            Err(TransportError::Usage(_))
        ));
        assert_eq!(
            Request::with_method("PURGE", "http://example.org/").unwrap().method,
            Method::Other("PURGE".to_string())
        );
    }
}
