//! MySQL driver on a single sqlx connection.

use super::{BackendConnection, Connector};
use crate::db::types::rows_to_set;
use crate::error::DbResult;
use crate::models::RowSet;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{ConnectOptions, Connection, Executor};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct MySqlConnector {
    options: MySqlConnectOptions,
    target: String,
}

impl MySqlConnector {
    pub fn new(options: MySqlConnectOptions, target: String) -> Self {
        Self { options, target }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    fn target(&self) -> String {
        self.target.clone()
    }

    async fn connect(&self) -> DbResult<Box<dyn BackendConnection>> {
        debug!(target = %self.target, "Opening MySQL connection");
        let conn = self.options.connect().await?;
        Ok(Box::new(MySqlBackend { conn }))
    }
}

struct MySqlBackend {
    conn: MySqlConnection,
}

#[async_trait]
impl BackendConnection for MySqlBackend {
    async fn query(&mut self, sql: &str) -> DbResult<RowSet> {
        // Raw SQL avoids prepared statements, some DDL and SHOW variants reject them
        let rows: Vec<MySqlRow> = (&mut self.conn).fetch_all(sql).await?;
        Ok(rows_to_set(&rows))
    }

    async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        let result = (&mut self.conn).execute(sql).await?;
        Ok(result.rows_affected())
    }

    async fn begin(&mut self) -> DbResult<()> {
        (&mut self.conn).execute("START TRANSACTION").await?;
        Ok(())
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
