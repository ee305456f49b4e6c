/*
 * error.rs
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

//! Error taxonomy surfaced to callers of the transport.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error type returned by tracing hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Stable classification of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedTarget,
    Connect,
    PoolTimeout,
    WriteTimeout,
    Write,
    ReadTimeout,
    Read,
    Hook,
    Usage,
}

/// Failure of a single request.
///
/// Every variant is terminal for the request; the transport never retries. Connections
/// implicated in a failure have already been discarded when the error is observed.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The URL was malformed or named a scheme this transport does not speak.
    #[error("unsupported target {url:?}: {reason}")]
    UnsupportedTarget { url: String, reason: String },

    /// TCP, TLS or proxy establishment failed (including a connect timeout).
    #[error("connection failed: {0}")]
    Connect(#[source] io::Error),

    #[error("timed out waiting for a pooled connection")]
    PoolTimeout,

    #[error("timed out sending the request")]
    WriteTimeout,

    #[error("failed to send the request: {0}")]
    Write(#[source] io::Error),

    #[error("timed out reading the response")]
    ReadTimeout,

    #[error("failed to read the response: {0}")]
    Read(#[source] io::Error),

    /// A tracing hook returned an error. Not a transport failure.
    #[error("send hook error: {0}")]
    Hook(#[source] HookError),

    /// Invalid request (bad method or header), no runtime, or a closed transport.
    #[error("{0}")]
    Usage(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::UnsupportedTarget { .. } => ErrorKind::UnsupportedTarget,
            TransportError::Connect(_) => ErrorKind::Connect,
            TransportError::PoolTimeout => ErrorKind::PoolTimeout,
            TransportError::WriteTimeout => ErrorKind::WriteTimeout,
            TransportError::Write(_) => ErrorKind::Write,
            TransportError::ReadTimeout => ErrorKind::ReadTimeout,
            TransportError::Read(_) => ErrorKind::Read,
            TransportError::Hook(_) => ErrorKind::Hook,
            TransportError::Usage(_) => ErrorKind::Usage,
        }
    }

    /// True for pool, write and read timeouts, and for connect failures caused by a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::PoolTimeout
            | TransportError::WriteTimeout
            | TransportError::ReadTimeout => true,
            TransportError::Connect(e) => e.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    pub(crate) fn unsupported(url: &str, reason: impl Into<String>) -> Self {
        TransportError::UnsupportedTarget {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn closed() -> Self {
        TransportError::Usage("transport is closed".to_string())
    }
}

/// Invalid client configuration, reported at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at least one of HTTP/1.1 and HTTP/2 must be enabled")]
    NoProtocol,

    #[error("max_connections must be greater than zero")]
    ZeroConnections,

    #[error("invalid proxy URL {url:?}: {reason}")]
    InvalidProxy { url: String, reason: String },

    #[error("invalid root certificate: {0}")]
    InvalidCertificate(String),

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid settings document: {0}")]
    Settings(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct_for_timeouts() {
        assert_eq!(TransportError::PoolTimeout.kind(), ErrorKind::PoolTimeout);
        assert_eq!(TransportError::WriteTimeout.kind(), ErrorKind::WriteTimeout);
        assert_eq!(TransportError::ReadTimeout.kind(), ErrorKind::ReadTimeout);
        let connect = TransportError::Connect(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert_eq!(connect.kind(), ErrorKind::Connect);
        assert!(connect.is_timeout());
        let refused =
            TransportError::Connect(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert!(!refused.is_timeout());
    }

    #[test]
    fn hook_error_keeps_message() {
        let e = TransportError::Hook("boom".into());
        assert_eq!(e.kind(), ErrorKind::Hook);
        assert!(e.to_string().contains("boom"));
        assert!(!e.is_timeout());
    }

    #[test]
    fn hook_error_is_the_source() {
        let inner = io::Error::new(io::ErrorKind::Other, "hook failed");
        let e = TransportError::Hook(Box::new(inner));
        let source = std::error::Error::source(&e).expect("hook source");
        assert_eq!(source.to_string(), "hook failed");
        assert!(source.downcast_ref::<io::Error>().is_some());
    }

    #[test]
    fn unsupported_target_names_url() {
        let e = TransportError::unsupported("invalid://", "unsupported scheme");
        assert_eq!(e.kind(), ErrorKind::UnsupportedTarget);
        assert!(e.to_string().contains("invalid://"));
    }
}
