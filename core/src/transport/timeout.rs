/*
 * timeout.rs
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

//! Timeout policy: resolves a timeout configuration into per-phase limits and turns those
//! into deadlines when a request starts.
//!
//! The decomposition is literal and must not be made smarter:
//! - connect = connect + pool (the pool wait and establishment share one budget), unbounded
//!   when neither is set;
//! - write and read apply to each socket operation of their phase;
//! - total = write + connect + read + pool, derived only when write is set and non-zero.
//!
//! A zero duration counts as unset wherever the rule tests for presence.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::time::Instant;

/// User supplied timeouts. Each phase falls back to `default` when not set explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub default: Option<Duration>,
    pub connect: Option<Duration>,
    pub read: Option<Duration>,
    pub write: Option<Duration>,
    pub pool: Option<Duration>,
}

impl TimeoutConfig {
    /// No timeouts at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// The same timeout for every phase.
    pub fn all(timeout: Duration) -> Self {
        Self {
            default: Some(timeout),
            ..Self::default()
        }
    }

    pub fn with_connect(mut self, timeout: Duration) -> Self {
        self.connect = Some(timeout);
        self
    }

    pub fn with_read(mut self, timeout: Duration) -> Self {
        self.read = Some(timeout);
        self
    }

    pub fn with_write(mut self, timeout: Duration) -> Self {
        self.write = Some(timeout);
        self
    }

    pub fn with_pool(mut self, timeout: Duration) -> Self {
        self.pool = Some(timeout);
        self
    }

    pub fn effective_connect(&self) -> Option<Duration> {
        self.connect.or(self.default)
    }

    pub fn effective_read(&self) -> Option<Duration> {
        self.read.or(self.default)
    }

    pub fn effective_write(&self) -> Option<Duration> {
        self.write.or(self.default)
    }

    pub fn effective_pool(&self) -> Option<Duration> {
        self.pool.or(self.default)
    }
}

/// Per-phase limits derived from a [`TimeoutConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimeouts {
    /// Pool wait plus connection establishment.
    pub connect: Option<Duration>,
    /// Each socket write while sending the request.
    pub write: Option<Duration>,
    /// Each socket read while receiving the response.
    pub read: Option<Duration>,
    /// Ceiling for the whole request lifecycle.
    pub total: Option<Duration>,
}

fn present(d: Option<Duration>) -> Option<Duration> {
    d.filter(|d| !d.is_zero())
}

/// Resolve a configuration into phase timeouts. Pure.
pub fn resolve(config: &TimeoutConfig) -> PhaseTimeouts {
    let connect = config.effective_connect();
    let read = config.effective_read();
    let write = config.effective_write();
    let pool = config.effective_pool();

    let combined_connect = match (present(connect), present(pool)) {
        (None, None) => None,
        (c, p) => Some(c.unwrap_or_default() + p.unwrap_or_default()),
    };
    let total = present(write).map(|w| {
        w + connect.unwrap_or_default() + read.unwrap_or_default() + pool.unwrap_or_default()
    });

    PhaseTimeouts {
        connect: combined_connect,
        write: present(write),
        read: present(read),
        total,
    }
}

/// Deadlines of one request, anchored at the moment the request started.
#[derive(Debug, Clone, Copy)]
pub struct RequestDeadlines {
    phases: PhaseTimeouts,
    overall: Option<Instant>,
}

impl RequestDeadlines {
    pub fn start(phases: PhaseTimeouts) -> Self {
        Self::starting_at(phases, Instant::now())
    }

    pub fn starting_at(phases: PhaseTimeouts, start: Instant) -> Self {
        let overall = phases.total.and_then(|t| start.checked_add(t));
        Self { phases, overall }
    }

    /// No limits.
    pub fn unbounded() -> Self {
        Self::starting_at(PhaseTimeouts::default(), Instant::now())
    }

    pub fn phases(&self) -> &PhaseTimeouts {
        &self.phases
    }

    pub fn overall(&self) -> Option<Instant> {
        self.overall
    }

    /// Deadline for the pool wait and for establishing a connection.
    pub fn connect(&self) -> Option<Instant> {
        self.bounded(self.phases.connect)
    }

    /// Deadline for a single write starting now.
    pub fn write(&self) -> Option<Instant> {
        self.bounded(self.phases.write)
    }

    /// Deadline for a single read starting now.
    pub fn read(&self) -> Option<Instant> {
        self.bounded(self.phases.read)
    }

    /// Whether the overall ceiling has passed. Decides how an expiry is classified.
    pub fn overall_elapsed(&self) -> bool {
        self.overall.map_or(false, |at| Instant::now() >= at)
    }

    fn bounded(&self, phase: Option<Duration>) -> Option<Instant> {
        let phase = phase.and_then(|d| Instant::now().checked_add(d));
        match (phase, self.overall) {
            (Some(p), Some(o)) => Some(p.min(o)),
            (p, o) => p.or(o),
        }
    }
}

/// Run an I/O future until `deadline`. Expiry becomes `io::ErrorKind::TimedOut`.
pub async fn with_deadline<F, T>(deadline: Option<Instant>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match deadline {
        None => fut.await,
        Some(at) => match tokio::time::timeout_at(at, fut).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "deadline elapsed")),
        },
    }
}
