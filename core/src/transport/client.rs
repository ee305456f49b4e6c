/*
 * client.rs
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

//! The transport handle: validated configuration, one shared pool, and `send`.

use std::sync::Arc;
use tracing::Instrument;

use crate::config::ClientConfig;
use crate::transport::error::{ConfigError, TransportError};
use crate::transport::executor::execute;
use crate::transport::pool::{Pool, PoolStats};
use crate::transport::request::Request;
use crate::transport::response::Response;
use crate::transport::timeout::TimeoutConfig;
use crate::transport::trace::Tracer;

struct Inner {
    pool: Arc<Pool>,
    timeout: TimeoutConfig,
    tracer: Option<Arc<dyn Tracer>>,
}

/// Asynchronous HTTP transport. Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct AsyncTransport {
    inner: Arc<Inner>,
}

impl AsyncTransport {
    /// Validate `config` and set up the pool. Call from within a tokio runtime to get
    /// background eviction of expired idle connections.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let connector = config.build_connector()?;
        let pool = Pool::new(config.limits, connector);
        Ok(Self {
            inner: Arc::new(Inner {
                pool,
                timeout: config.timeout,
                tracer: config.tracer,
            }),
        })
    }

    /// Send a request. Resolves once the response head has arrived; the body is read
    /// from the returned [`Response`].
    pub async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let span = tracing::debug_span!("request", method = %request.method, url = %request.url);
        execute(
            &self.inner.pool,
            &self.inner.timeout,
            self.inner.tracer.as_deref(),
            request,
        )
        .instrument(span)
        .await
    }

    /// Close idle connections and refuse further requests. Responses still being read keep
    /// their connections until they finish; those are then closed.
    pub fn close(&self) {
        self.inner.pool.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.pool.is_closed()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }
}

impl std::fmt::Debug for AsyncTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTransport")
            .field("stats", &self.pool_stats())
            .finish()
    }
}
