//! Oracle and Dameng driver on the synchronous `oracle` crate.
//!
//! Every call moves the connection into `spawn_blocking` and takes it back afterwards.
//! Dameng is reached through its OCI-compatible client library; after connecting, the
//! session is switched to the configured schema.

use super::{BackendConnection, Connector};
use crate::error::{DbError, DbResult};
use crate::models::RowSet;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;

#[derive(Clone)]
pub struct OciConnector {
    user: String,
    password: String,
    connect_string: String,
    /// Schema selected with `SET SCHEMA` right after connecting
    session_schema: Option<String>,
    target: String,
}

impl std::fmt::Debug for OciConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OciConnector")
            .field("target", &self.target)
            .field("session_schema", &self.session_schema)
            .finish()
    }
}

impl OciConnector {
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        connect_string: impl Into<String>,
        session_schema: Option<String>,
    ) -> Self {
        let user = user.into();
        let connect_string = connect_string.into();
        let target = format!("{}/****@{}", user, connect_string);
        Self {
            user,
            password: password.into(),
            connect_string,
            session_schema,
            target,
        }
    }
}

#[async_trait]
impl Connector for OciConnector {
    fn target(&self) -> String {
        self.target.clone()
    }

    async fn connect(&self) -> DbResult<Box<dyn BackendConnection>> {
        debug!(target = %self.target, "Opening OCI connection");
        let this = self.clone();
        let conn = tokio::task::spawn_blocking(move || -> DbResult<oracle::Connection> {
            let conn = oracle::Connection::connect(&this.user, &this.password, &this.connect_string)?;
            if let Some(schema) = &this.session_schema {
                conn.execute(&format!("SET SCHEMA \"{}\"", schema.replace('"', "\"\"")), &[])?;
            }
            Ok(conn)
        })
        .await
        .map_err(|e| DbError::internal(format!("blocking connect task failed: {}", e)))??;

        Ok(Box::new(OciBackend { conn: Some(conn) }))
    }
}

struct OciBackend {
    conn: Option<oracle::Connection>,
}

impl OciBackend {
    async fn with_conn<T, F>(&mut self, f: F) -> DbResult<T>
    where
        F: FnOnce(&oracle::Connection) -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| DbError::internal("OCI connection lost by a previous failure"))?;
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = f(&conn);
            (conn, result)
        })
        .await
        .map_err(|e| DbError::internal(format!("blocking OCI task failed: {}", e)))?;
        self.conn = Some(conn);
        result
    }
}

fn run_query(conn: &oracle::Connection, sql: &str) -> DbResult<RowSet> {
    let mut stmt = conn.statement(sql).build()?;
    if !stmt.is_query() {
        stmt.execute(&[])?;
        return Ok(RowSet::default());
    }

    let result_set = stmt.query(&[])?;
    let columns: Vec<String> = result_set
        .column_info()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let mut rows = Vec::new();
    for row in result_set {
        let row = row?;
        let mut cells = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            let value: Option<String> = row.get(idx)?;
            cells.push(value.map(JsonValue::String).unwrap_or(JsonValue::Null));
        }
        rows.push(cells);
    }
    Ok(RowSet::new(columns, rows))
}

#[async_trait]
impl BackendConnection for OciBackend {
    async fn query(&mut self, sql: &str) -> DbResult<RowSet> {
        let sql = sql.to_string();
        self.with_conn(move |conn| run_query(conn, &sql)).await
    }

    async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.statement(&sql).build()?;
            stmt.execute(&[])?;
            Ok(stmt.row_count()?)
        })
        .await
    }

    /// OCI sessions open a transaction implicitly with the first DML statement.
    async fn begin(&mut self) -> DbResult<()> {
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.with_conn(|conn| Ok(conn.commit()?)).await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.with_conn(|conn| Ok(conn.rollback()?)).await
    }

    async fn ping(&mut self) -> DbResult<()> {
        self.with_conn(|conn| Ok(conn.ping()?)).await
    }

    async fn close(mut self: Box<Self>) -> DbResult<()> {
        match self.conn.take() {
            Some(conn) => tokio::task::spawn_blocking(move || conn.close())
                .await
                .map_err(|e| DbError::internal(format!("blocking OCI task failed: {}", e)))?
                .map_err(DbError::from),
            None => Ok(()),
        }
    }
}
