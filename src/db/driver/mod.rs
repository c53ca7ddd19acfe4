//! Backend drivers.
//!
//! A [`Connector`] knows how to open connections to one configured target; a
//! [`BackendConnection`] runs raw SQL on one open connection. Pools only ever see these
//! two traits, so every dialect gets the same pooling and transaction semantics.
//!
//! Each module below provides the same interface adapted to its driver:
//! - `mysql` and `postgres`: sqlx connections, text protocol
//! - `mssql`: tiberius over a tokio TCP stream
//! - `oci`: the `oracle` crate (Oracle and Dameng), behind the `oci` feature

use crate::error::DbResult;
use crate::models::RowSet;
use async_trait::async_trait;

pub mod mssql;
pub mod mysql;
#[cfg(feature = "oci")]
pub mod oci;
pub mod postgres;

/// Opens connections to one backend target.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Connection target with credentials masked, safe for logs.
    fn target(&self) -> String;

    async fn connect(&self) -> DbResult<Box<dyn BackendConnection>>;
}

/// One open backend connection.
#[async_trait]
pub trait BackendConnection: Send {
    /// Run a statement and collect its rows. Statements without a result set yield an
    /// empty [`RowSet`].
    async fn query(&mut self, sql: &str) -> DbResult<RowSet>;

    /// Run a statement and return the affected-row count.
    async fn execute(&mut self, sql: &str) -> DbResult<u64>;

    async fn begin(&mut self) -> DbResult<()> {
        self.execute("BEGIN").await.map(|_| ())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.execute("COMMIT").await.map(|_| ())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.execute("ROLLBACK").await.map(|_| ())
    }

    /// Liveness check used before reusing an idle connection.
    async fn ping(&mut self) -> DbResult<()>;

    async fn close(self: Box<Self>) -> DbResult<()>;
}

/// Replace the password of a URL-shaped target with `****`.
pub fn mask_url(url: &url::Url) -> String {
    let mut masked = url.clone();
    if masked.password().is_some() {
        let _ = masked.set_password(Some("****"));
    }
    masked.to_string()
}
