//! SQL Server driver on tiberius.

use super::{BackendConnection, Connector};
use crate::db::types::{decode_binary_value, float_value};
use crate::error::{DbError, DbResult};
use crate::models::RowSet;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tiberius::{Client, ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

type TdsClient = Client<Compat<TcpStream>>;

#[derive(Debug, Clone)]
pub struct MsSqlConnector {
    config: Config,
    target: String,
}

impl MsSqlConnector {
    pub fn new(config: Config, target: String) -> Self {
        Self { config, target }
    }
}

#[async_trait]
impl Connector for MsSqlConnector {
    fn target(&self) -> String {
        self.target.clone()
    }

    async fn connect(&self) -> DbResult<Box<dyn BackendConnection>> {
        debug!(target = %self.target, "Opening SQL Server connection");
        let tcp = TcpStream::connect(self.config.get_addr())
            .await
            .map_err(|e| {
                DbError::backend(
                    format!("cannot reach {}: {}", self.target, e),
                    None,
                    "Check host, port and that TCP/IP is enabled on the server",
                )
            })?;
        tcp.set_nodelay(true)
            .map_err(|e| DbError::internal(format!("set_nodelay failed: {}", e)))?;

        let client = Client::connect(self.config.clone(), tcp.compat_write()).await?;
        Ok(Box::new(MsSqlBackend { client }))
    }
}

struct MsSqlBackend {
    client: TdsClient,
}

impl MsSqlBackend {
    /// Run a plain batch and drop whatever it returns.
    ///
    /// Transaction control and session `SET` options must go through a batch; inside
    /// `sp_executesql` they would be scoped to the call.
    async fn batch(&mut self, sql: &str) -> DbResult<()> {
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }
}

#[async_trait]
impl BackendConnection for MsSqlBackend {
    /// Batches with several result sets (`SHOWPLAN_TEXT` echoes the statement before the
    /// plan) yield their last non-empty one.
    async fn query(&mut self, sql: &str) -> DbResult<RowSet> {
        let mut stream = self.client.simple_query(sql).await?;
        let first_columns: Vec<String> = stream
            .columns()
            .await?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let results = stream.into_results().await?;

        let Some(rows) = results.into_iter().rev().find(|set| !set.is_empty()) else {
            return Ok(RowSet::new(first_columns, Vec::new()));
        };
        let columns = rows[0].columns().iter().map(|c| c.name().to_string()).collect();
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(column_to_json).collect())
            .collect();
        Ok(RowSet::new(columns, rows))
    }

    async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        let result = self.client.execute(sql, &[]).await?;
        Ok(result.rows_affected().iter().sum())
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.batch("BEGIN TRANSACTION").await
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.batch("COMMIT TRANSACTION").await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }

    async fn ping(&mut self) -> DbResult<()> {
        self.batch("SELECT 1").await
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.client.close().await?;
        Ok(())
    }
}

fn temporal<'a, T>(data: &'a ColumnData<'static>, render: impl Fn(T) -> String) -> JsonValue
where
    T: FromSql<'a>,
{
    match T::from_sql(data) {
        Ok(Some(v)) => JsonValue::String(render(v)),
        Ok(None) => JsonValue::Null,
        Err(e) => {
            tracing::error!(error = %e, "Failed to decode temporal column");
            JsonValue::Null
        }
    }
}

pub(crate) fn column_to_json(data: ColumnData<'static>) -> JsonValue {
    use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

    match &data {
        ColumnData::Bit(v) => v.map(JsonValue::Bool).unwrap_or(JsonValue::Null),
        ColumnData::U8(v) => v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null),
        ColumnData::I16(v) => v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null),
        ColumnData::I32(v) => v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null),
        ColumnData::I64(v) => v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null),
        ColumnData::F32(v) => v.map(|f| float_value(f as f64)).unwrap_or(JsonValue::Null),
        ColumnData::F64(v) => v.map(float_value).unwrap_or(JsonValue::Null),
        ColumnData::String(v) => v
            .as_ref()
            .map(|s| JsonValue::String(s.to_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::Guid(v) => v
            .as_ref()
            .map(|g| JsonValue::String(g.to_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::Binary(v) => v
            .as_ref()
            .map(|b| decode_binary_value(b))
            .unwrap_or(JsonValue::Null),
        ColumnData::Numeric(v) => v
            .as_ref()
            .map(|n| JsonValue::String(n.to_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| JsonValue::String(x.clone().into_owned().into_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal(&data, |v: NaiveDateTime| v.to_string())
        }
        ColumnData::DateTimeOffset(_) => temporal(&data, |v: DateTime<FixedOffset>| v.to_rfc3339()),
        ColumnData::Date(_) => temporal(&data, |v: NaiveDate| v.to_string()),
        ColumnData::Time(_) => temporal(&data, |v: NaiveTime| v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_column_to_json_scalars() {
        assert_eq!(column_to_json(ColumnData::I32(Some(7))), serde_json::json!(7));
        assert_eq!(column_to_json(ColumnData::I32(None)), JsonValue::Null);
        assert_eq!(column_to_json(ColumnData::Bit(Some(true))), JsonValue::Bool(true));
        assert_eq!(
            column_to_json(ColumnData::String(Some(Cow::Borrowed("abc")))),
            JsonValue::String("abc".to_string())
        );
    }

    #[test]
    fn test_column_to_json_binary() {
        assert_eq!(
            column_to_json(ColumnData::Binary(Some(Cow::Owned(vec![0xFF, 0x00])))),
            JsonValue::String("/wA=".to_string())
        );
    }
}
