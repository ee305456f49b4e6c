/*
 * negotiate.rs
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

//! Protocol negotiation: which HTTP versions to offer via ALPN and which one a new connection
//! speaks.

use crate::protocol::http::HttpVersion;
use crate::transport::error::ConfigError;

pub const ALPN_H2: &[u8] = b"h2";
pub const ALPN_HTTP11: &[u8] = b"http/1.1";

/// Enabled protocol versions and the preference between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolPolicy {
    http1: bool,
    http2: bool,
    prefer_http2: bool,
}

impl ProtocolPolicy {
    pub fn new(http1: bool, http2: bool, prefer_http2: bool) -> Result<Self, ConfigError> {
        if !http1 && !http2 {
            return Err(ConfigError::NoProtocol);
        }
        Ok(Self {
            http1,
            http2,
            prefer_http2,
        })
    }

    /// ALPN protocol list to offer during the TLS handshake, most preferred first.
    pub fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        let mut protocols = Vec::with_capacity(2);
        if self.http2 {
            protocols.push(ALPN_H2.to_vec());
        }
        if self.http1 {
            protocols.push(ALPN_HTTP11.to_vec());
        }
        protocols
    }

    /// Version for a new connection, given what ALPN agreed on (`None` for plain TCP or when
    /// the server did not pick a protocol).
    pub fn select(&self, alpn: Option<&[u8]>) -> HttpVersion {
        match alpn {
            Some(ALPN_H2) if self.http2 => return HttpVersion::Http2,
            Some(ALPN_HTTP11) if self.http1 => return HttpVersion::Http1_1,
            _ => {}
        }
        match (self.http1, self.http2) {
            (true, false) => HttpVersion::Http1_1,
            (false, true) => HttpVersion::Http2,
            _ if self.prefer_http2 => HttpVersion::Http2,
            _ => HttpVersion::Http1_1,
        }
    }
}

impl Default for ProtocolPolicy {
    fn default() -> Self {
        Self {
            http1: true,
            http2: false,
            prefer_http2: false,
        }
    }
}
