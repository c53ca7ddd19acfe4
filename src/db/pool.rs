//! Connection pooling over any [`Connector`].
//!
//! A [`Pool`] bounds concurrent leases with a semaphore sized `pool_size + max_overflow`
//! (one for singleton pools) and keeps released connections in an idle queue. Waiting
//! for a lease is bounded by `pool_timeout`. Idle connections past `pool_recycle` are
//! closed instead of reused, and with `pool_pre_ping` each reused connection is pinged
//! first.

use crate::config::PoolConfig;
use crate::db::driver::{BackendConnection, Connector};
use crate::error::{DbError, DbResult};
use crate::models::{PoolStats, PoolType, RowSet};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

struct IdleConnection {
    conn: Box<dyn BackendConnection>,
    created_at: Instant,
}

struct PoolInner {
    name: String,
    pool_type: PoolType,
    /// Number of idle connections worth keeping
    idle_limit: usize,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConnection>>,
    checked_out: AtomicUsize,
    closed: AtomicBool,
}

impl PoolInner {
    fn pop_idle(&self) -> Option<IdleConnection> {
        self.idle.lock().ok().and_then(|mut q| q.pop_front())
    }

    fn idle_len(&self) -> usize {
        self.idle.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Keep a released connection if there is room, otherwise hand it back.
    fn retain(&self, idle: IdleConnection) -> Option<IdleConnection> {
        if self.closed.load(Ordering::Acquire) || self.pool_type == PoolType::Null {
            return Some(idle);
        }
        match self.idle.lock() {
            Ok(mut q) if q.len() < self.idle_limit => {
                q.push_back(idle);
                None
            }
            _ => Some(idle),
        }
    }
}

/// Close a connection without blocking the caller.
fn close_detached(conn: Box<dyn BackendConnection>, pool: &str) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let pool = pool.to_string();
            handle.spawn(async move {
                if let Err(e) = conn.close().await {
                    debug!(pool = %pool, error = %e, "Error closing connection");
                }
            });
        }
        Err(_) => drop(conn),
    }
}

/// A named pool of backend connections.
pub struct Pool {
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.name)
            .field("pool_type", &self.inner.pool_type)
            .field("target", &self.connector.target())
            .finish()
    }
}

impl Pool {
    /// Create a pool. No connection is opened until the first lease.
    pub fn new(name: impl Into<String>, config: PoolConfig, connector: Arc<dyn Connector>) -> Self {
        let pool_type = config.pool_type_or_default();
        let pool_size = config.pool_size_or_default().max(1) as usize;
        let (capacity, idle_limit) = match pool_type {
            PoolType::Singleton => (1, 1),
            PoolType::Queue => (pool_size + config.max_overflow_or_default() as usize, pool_size),
            PoolType::Null => (pool_size + config.max_overflow_or_default() as usize, 0),
        };

        Self {
            config,
            connector,
            inner: Arc::new(PoolInner {
                name: name.into(),
                pool_type,
                idle_limit,
                permits: Arc::new(Semaphore::new(capacity)),
                idle: Mutex::new(VecDeque::with_capacity(idle_limit)),
                checked_out: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Connection target with credentials masked.
    pub fn target(&self) -> String {
        self.connector.target()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Lease a connection, waiting at most `pool_timeout`.
    pub async fn acquire(&self) -> DbResult<PooledConnection> {
        if self.is_closed() {
            return Err(DbError::internal(format!("pool '{}' is closed", self.name())));
        }

        let wait = self.config.pool_timeout_or_default();
        match tokio::time::timeout(wait, self.acquire_inner()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(pool = %self.name(), timeout_secs = wait.as_secs(), "Connection acquisition timed out");
                Err(DbError::pool_timeout(self.name(), wait.as_secs()))
            }
        }
    }

    async fn acquire_inner(&self) -> DbResult<PooledConnection> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DbError::internal(format!("pool '{}' is closed", self.name())))?;

        let recycle = self.config.recycle_age();
        while let Some(mut idle) = self.inner.pop_idle() {
            if recycle.is_some_and(|max_age| idle.created_at.elapsed() >= max_age) {
                debug!(pool = %self.name(), "Recycling aged connection");
                close_detached(idle.conn, self.name());
                continue;
            }
            if self.config.pool_pre_ping_or_default() {
                if let Err(e) = idle.conn.ping().await {
                    debug!(pool = %self.name(), error = %e, "Discarding dead connection");
                    close_detached(idle.conn, self.name());
                    continue;
                }
            }
            return Ok(self.lease(idle.conn, idle.created_at, permit));
        }

        let conn = self.connector.connect().await?;
        debug!(pool = %self.name(), target = %self.target(), "Opened new connection");
        Ok(self.lease(conn, Instant::now(), permit))
    }

    fn lease(
        &self,
        conn: Box<dyn BackendConnection>,
        created_at: Instant,
        permit: OwnedSemaphorePermit,
    ) -> PooledConnection {
        self.inner.checked_out.fetch_add(1, Ordering::AcqRel);
        PooledConnection {
            conn,
            created_at,
            discard: false,
            dirty: false,
            inner: Arc::clone(&self.inner),
            _permit: permit,
        }
    }

    /// Point-in-time utilization snapshot.
    pub fn stats(&self) -> PoolStats {
        let checked_out = self.inner.checked_out.load(Ordering::Acquire);
        let checked_in = self.inner.idle_len();
        let pool_size = self.config.pool_size_or_default();
        PoolStats {
            pool_name: self.name().to_string(),
            pool_type: self.inner.pool_type.to_string(),
            pool_size,
            max_overflow: self.config.max_overflow_or_default(),
            checked_out,
            checked_in,
            overflow: (checked_out + checked_in).saturating_sub(pool_size as usize),
            recycle_secs: self.config.pool_recycle_or_default(),
        }
    }

    /// Close idle connections and refuse further leases. Leased connections are closed
    /// when they are released.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.permits.close();

        let drained: Vec<IdleConnection> = match self.inner.idle.lock() {
            Ok(mut q) => q.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for idle in drained {
            if let Err(e) = idle.conn.close().await {
                debug!(pool = %self.name(), error = %e, "Error closing idle connection");
            }
        }
        debug!(pool = %self.name(), "Pool closed");
    }
}

/// A leased connection. Dropping it returns the connection to its pool.
///
/// A lease marked dirty holds session state (an open transaction, a toggled session
/// option) that the next borrower must not inherit, so it is closed on release.
pub struct PooledConnection {
    conn: Box<dyn BackendConnection>,
    created_at: Instant,
    discard: bool,
    dirty: bool,
    inner: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("created_at", &self.created_at)
            .field("discard", &self.discard)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    /// Close the connection on release instead of keeping it.
    pub fn discard(&mut self) {
        self.discard = true;
    }

    /// Flag the session as carrying state that must not outlive this lease.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// The session is back to a neutral state.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl Deref for PooledConnection {
    type Target = dyn BackendConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref()
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = std::mem::replace(&mut self.conn, Box::new(Released));
        self.inner.checked_out.fetch_sub(1, Ordering::AcqRel);

        let idle = IdleConnection {
            conn,
            created_at: self.created_at,
        };
        let rejected = if self.discard || self.dirty {
            if self.dirty {
                debug!(pool = %self.inner.name, "Closing connection released mid-session");
            }
            Some(idle)
        } else {
            self.inner.retain(idle)
        };
        if let Some(idle) = rejected {
            close_detached(idle.conn, &self.inner.name);
        }
    }
}

/// Placeholder left inside a lease while it is being returned.
struct Released;

#[async_trait]
impl BackendConnection for Released {
    async fn query(&mut self, _sql: &str) -> DbResult<RowSet> {
        Err(DbError::internal("connection already released"))
    }

    async fn execute(&mut self, _sql: &str) -> DbResult<u64> {
        Err(DbError::internal("connection already released"))
    }

    async fn ping(&mut self) -> DbResult<()> {
        Err(DbError::internal("connection already released"))
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        Ok(())
    }
}
