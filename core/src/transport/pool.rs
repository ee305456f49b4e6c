/*
 * pool.rs
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

//! Connection pool: bounded set of reusable connections keyed by destination.
//!
//! One mutex guards the idle table, the connection counter and the FIFO waiter queue; it is
//! never held across an await. Waiters park on a oneshot channel and are handed either a
//! released connection for their destination or a free slot to establish one.

use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::Limits;
use crate::protocol::http::{Connector, HttpConnection};
use crate::transport::error::TransportError;
use crate::transport::timeout::{with_deadline, RequestDeadlines};
use crate::uri::Destination;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(100);
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Connection counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Open connections, idle or leased (plus slots reserved for connections being opened).
    pub connections: usize,
    pub idle: usize,
    /// Connections opened since the pool was created.
    pub established: u64,
    /// Acquisitions served by an existing connection.
    pub reused: u64,
}

/// What a waiter receives when it reaches the front of the queue.
enum Grant {
    Connection(HttpConnection),
    /// A reserved slot under max-connections; the waiter opens the connection itself.
    Slot,
}

impl Grant {
    fn into_connection(self) -> Option<HttpConnection> {
        match self {
            Grant::Connection(conn) => Some(conn),
            Grant::Slot => None,
        }
    }
}

struct Waiter {
    id: u64,
    destination: Destination,
    tx: oneshot::Sender<Grant>,
}

struct IdleConnection {
    conn: HttpConnection,
    idle_since: Instant,
}

#[derive(Default)]
struct PoolState {
    idle: HashMap<Destination, VecDeque<IdleConnection>>,
    waiters: VecDeque<Waiter>,
    /// Connections counted against max-connections, including reserved slots.
    total: usize,
    next_waiter_id: u64,
    closed: bool,
    established: u64,
    reused: u64,
}

impl PoolState {
    fn idle_count(&self) -> usize {
        self.idle.values().map(VecDeque::len).sum()
    }
}

pub struct Pool {
    state: Mutex<PoolState>,
    limits: Limits,
    connector: Connector,
}

impl Pool {
    /// Create a pool. When called inside a tokio runtime, a background task also sweeps
    /// expired idle connections; expiry is otherwise enforced lazily on acquire.
    pub fn new(limits: Limits, connector: Connector) -> Arc<Self> {
        let pool = Arc::new(Self {
            state: Mutex::new(PoolState::default()),
            limits,
            connector,
        });
        Self::spawn_sweeper(&pool);
        pool
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lease a connection to `destination`, waiting until the connect deadline if the pool
    /// is at capacity.
    pub async fn acquire(
        self: &Arc<Self>,
        destination: &Destination,
        deadlines: &RequestDeadlines,
    ) -> Result<PooledConnection, TransportError> {
        // Pool wait and establishment share one budget.
        let deadline = deadlines.connect();
        let ticket = {
            let mut state = self.lock();
            if state.closed {
                return Err(TransportError::closed());
            }
            self.evict_expired_locked(&mut state, Instant::now());

            if !state.waiters.iter().any(|w| &w.destination == destination) {
                if let Some(conn) = self.take_idle_locked(&mut state, destination) {
                    state.reused += 1;
                    tracing::trace!(%destination, "reusing idle connection");
                    return Ok(self.lease(conn));
                }
            }

            if state.waiters.is_empty() && self.reserve_slot_locked(&mut state) {
                None
            } else {
                Some(self.enqueue_locked(&mut state, destination))
            }
        };

        let Some(mut ticket) = ticket else {
            return self.establish(destination, deadline, SlotGuard::new(self)).await;
        };
        tracing::trace!(%destination, "waiting for a pooled connection");
        let received = match deadline {
            Some(at) => match tokio::time::timeout_at(at, &mut ticket.rx).await {
                Ok(received) => received,
                Err(_) => return Err(TransportError::PoolTimeout),
            },
            None => (&mut ticket.rx).await,
        };
        match received {
            Ok(Grant::Connection(conn)) => {
                self.lock().reused += 1;
                Ok(self.lease(conn))
            }
            Ok(Grant::Slot) => {
                let guard = SlotGuard::new(self);
                drop(ticket);
                self.establish(destination, deadline, guard).await
            }
            // Waiters are dropped when the pool closes.
            Err(_) => Err(TransportError::closed()),
        }
    }

    /// Pop idle connections for `destination` (most recent first) until one is alive.
    fn take_idle_locked(
        &self,
        state: &mut PoolState,
        destination: &Destination,
    ) -> Option<HttpConnection> {
        let mut found = None;
        while let Some(mut idle) = state.idle.get_mut(destination).and_then(VecDeque::pop_back) {
            if idle.conn.poll_liveness() {
                found = Some(idle.conn);
                break;
            }
            tracing::debug!(%destination, "dropping dead idle connection");
            drop(idle);
            self.free_slot_locked(state);
        }
        if state.idle.get(destination).map_or(false, VecDeque::is_empty) {
            state.idle.remove(destination);
        }
        found
    }

    /// Count a new connection against max-connections, closing the oldest idle connection
    /// of another destination if that is the only way to make room.
    fn reserve_slot_locked(&self, state: &mut PoolState) -> bool {
        if self.limits.max_connections.map_or(true, |max| state.total < max) {
            state.total += 1;
            return true;
        }
        let oldest = state
            .idle
            .iter()
            .filter_map(|(dest, queue)| queue.front().map(|idle| (idle.idle_since, dest.clone())))
            .min_by_key(|(since, _)| *since);
        let Some((_, dest)) = oldest else {
            return false;
        };
        if let Some(queue) = state.idle.get_mut(&dest) {
            queue.pop_front();
            if queue.is_empty() {
                state.idle.remove(&dest);
            }
        }
        tracing::debug!(destination = %dest, "closing idle connection to make room");
        // The evicted connection's slot passes straight to the caller.
        true
    }

    fn enqueue_locked(self: &Arc<Self>, state: &mut PoolState, destination: &Destination) -> WaitTicket {
        let id = state.next_waiter_id;
        state.next_waiter_id += 1;
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(Waiter {
            id,
            destination: destination.clone(),
            tx,
        });
        WaitTicket {
            pool: Arc::clone(self),
            id,
            rx,
        }
    }

    async fn establish(
        self: &Arc<Self>,
        destination: &Destination,
        deadline: Option<Instant>,
        mut guard: SlotGuard,
    ) -> Result<PooledConnection, TransportError> {
        let conn = with_deadline(deadline, self.connector.connect(destination))
            .await
            .map_err(|e| {
                tracing::debug!(%destination, error = %e, "connection failed");
                TransportError::Connect(e)
            })?;
        guard.disarm();
        self.lock().established += 1;
        Ok(self.lease(conn))
    }

    fn lease(self: &Arc<Self>, conn: HttpConnection) -> PooledConnection {
        PooledConnection {
            pool: Arc::clone(self),
            conn: Some(conn),
        }
    }

    /// Return a connection after use. Unusable connections are closed and their slot freed.
    fn put_back(&self, conn: HttpConnection) {
        let mut state = self.lock();
        self.put_back_locked(&mut state, conn);
    }

    fn put_back_locked(&self, state: &mut PoolState, mut conn: HttpConnection) {
        if state.closed || !conn.is_reusable() || !self.keepalive_enabled() {
            drop(conn);
            self.free_slot_locked(state);
            return;
        }
        while let Some(pos) = state
            .waiters
            .iter()
            .position(|w| &w.destination == conn.destination())
        {
            let Some(waiter) = state.waiters.remove(pos) else {
                break;
            };
            match waiter.tx.send(Grant::Connection(conn)) {
                Ok(()) => return,
                Err(grant) => match grant.into_connection() {
                    Some(returned) => conn = returned,
                    None => return,
                },
            }
        }
        if !state.waiters.is_empty() {
            // Someone else is waiting for capacity: trade this connection for their slot.
            drop(conn);
            self.free_slot_locked(state);
            return;
        }
        let max_idle = self.limits.max_keepalive_connections;
        let queue = state.idle.entry(conn.destination().clone()).or_default();
        if max_idle.map_or(true, |max| queue.len() < max) {
            queue.push_back(IdleConnection {
                conn,
                idle_since: Instant::now(),
            });
            return;
        }
        drop(conn);
        self.free_slot_locked(state);
    }

    fn keepalive_enabled(&self) -> bool {
        self.limits.max_keepalive_connections != Some(0)
            && self.limits.keepalive_expiry != Some(Duration::ZERO)
    }

    /// A slot became free: hand it to the oldest waiter, or shrink the count.
    fn free_slot_locked(&self, state: &mut PoolState) {
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.tx.send(Grant::Slot).is_ok() {
                return;
            }
        }
        state.total = state.total.saturating_sub(1);
    }

    fn evict_expired_locked(&self, state: &mut PoolState, now: Instant) {
        let Some(expiry) = self.limits.keepalive_expiry else {
            return;
        };
        let mut evicted = 0;
        for queue in state.idle.values_mut() {
            while queue
                .front()
                .map_or(false, |idle| now.saturating_duration_since(idle.idle_since) >= expiry)
            {
                queue.pop_front();
                evicted += 1;
            }
        }
        state.idle.retain(|_, queue| !queue.is_empty());
        for _ in 0..evicted {
            self.free_slot_locked(state);
        }
        if evicted > 0 {
            tracing::debug!(evicted, "evicted expired idle connections");
        }
    }

    /// One sweep of expired idle connections. Returns false once the pool is closed.
    fn sweep(&self) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        self.evict_expired_locked(&mut state, Instant::now());
        true
    }

    fn spawn_sweeper(pool: &Arc<Self>) {
        let Some(expiry) = pool.limits.keepalive_expiry.filter(|d| !d.is_zero()) else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let weak: Weak<Self> = Arc::downgrade(pool);
        let period = expiry.clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL);
        handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(pool) = weak.upgrade() else {
                    break;
                };
                if !pool.sweep() {
                    break;
                }
            }
        });
    }

    /// Close idle connections and fail current and future acquisitions.
    pub fn close(&self) {
        // Dropped after the lock is released.
        let (idle, waiters) = {
            let mut state = self.lock();
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            let count: usize = idle.values().map(VecDeque::len).sum();
            state.total = state.total.saturating_sub(count);
            (idle, std::mem::take(&mut state.waiters))
        };
        tracing::debug!(
            idle = idle.values().map(VecDeque::len).sum::<usize>(),
            waiters = waiters.len(),
            "pool closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            connections: state.total,
            idle: state.idle_count(),
            established: state.established,
            reused: state.reused,
        }
    }
}

/// A reserved slot. Freed again unless a connection was established into it.
struct SlotGuard {
    pool: Arc<Pool>,
    armed: bool,
}

impl SlotGuard {
    fn new(pool: &Arc<Pool>) -> Self {
        Self {
            pool: Arc::clone(pool),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.pool.lock();
            self.pool.free_slot_locked(&mut state);
        }
    }
}

/// A place in the waiter queue. Dropping it leaves the queue; a grant that raced with the
/// drop is given back to the pool.
struct WaitTicket {
    pool: Arc<Pool>,
    id: u64,
    rx: oneshot::Receiver<Grant>,
}

impl Drop for WaitTicket {
    fn drop(&mut self) {
        let mut state = self.pool.lock();
        if let Some(pos) = state.waiters.iter().position(|w| w.id == self.id) {
            state.waiters.remove(pos);
            return;
        }
        match self.rx.try_recv() {
            Ok(Grant::Connection(conn)) => self.pool.put_back_locked(&mut state, conn),
            Ok(Grant::Slot) => self.pool.free_slot_locked(&mut state),
            Err(_) => {}
        }
    }
}

/// A connection leased from the pool. `release` returns it; dropping it closes it.
pub struct PooledConnection {
    pool: Arc<Pool>,
    conn: Option<HttpConnection>,
}

impl PooledConnection {
    /// Give the connection back. It is parked or handed on only if it is reusable.
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection").finish_non_exhaustive()
    }
}

impl Deref for PooledConnection {
    type Target = HttpConnection;

    fn deref(&self) -> &HttpConnection {
        self.conn.as_ref().expect("connection present until release")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut HttpConnection {
        self.conn.as_mut().expect("connection present until release")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.taint();
            self.pool.put_back(conn);
        }
    }
}
