//! PostgreSQL driver on a single sqlx connection.

use super::{BackendConnection, Connector};
use crate::db::types::rows_to_set;
use crate::error::DbResult;
use crate::models::RowSet;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{ConnectOptions, Connection, Executor};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PgConnector {
    options: PgConnectOptions,
    target: String,
}

impl PgConnector {
    pub fn new(options: PgConnectOptions, target: String) -> Self {
        Self { options, target }
    }
}

#[async_trait]
impl Connector for PgConnector {
    fn target(&self) -> String {
        self.target.clone()
    }

    async fn connect(&self) -> DbResult<Box<dyn BackendConnection>> {
        debug!(target = %self.target, "Opening PostgreSQL connection");
        let conn = self.options.connect().await?;
        Ok(Box::new(PgBackend { conn }))
    }
}

struct PgBackend {
    conn: PgConnection,
}

#[async_trait]
impl BackendConnection for PgBackend {
    async fn query(&mut self, sql: &str) -> DbResult<RowSet> {
        // Without arguments sqlx uses the simple query protocol
        let rows: Vec<PgRow> = (&mut self.conn).fetch_all(sql).await?;
        Ok(rows_to_set(&rows))
    }

    async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        let result = (&mut self.conn).execute(sql).await?;
        Ok(result.rows_affected())
    }

    async fn ping(&mut self) -> DbResult<()> {
        self.conn.ping().await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.conn.close().await?;
        Ok(())
    }
}
