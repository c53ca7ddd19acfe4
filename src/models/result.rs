//! Execution results and pool statistics.

use serde::Serialize;
use serde_json::Value as JsonValue;

/// Separator placed between formatted results of a batch.
pub const RESULT_SEPARATOR: &str = "\n---\n";

pub const MSG_QUERY_OK: &str = "Query executed successfully";
pub const MSG_STATEMENT_OK: &str = "Statement executed successfully";

/// Column names plus row tuples, in backend order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.rows.is_empty()
    }
}

/// Normalized outcome of one statement.
///
/// `rows` is `Some` only for successful query-type statements, so column names and row
/// tuples are always present together. Mutations report `affected_rows` instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlResult {
    pub success: bool,
    pub message: String,
    pub rows: Option<RowSet>,
    pub affected_rows: u64,
}

impl SqlResult {
    pub fn query(rows: RowSet) -> Self {
        Self {
            success: true,
            message: MSG_QUERY_OK.to_string(),
            rows: Some(rows),
            affected_rows: 0,
        }
    }

    pub fn mutation(affected_rows: u64) -> Self {
        Self {
            success: true,
            message: MSG_STATEMENT_OK.to_string(),
            rows: None,
            affected_rows,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            rows: None,
            affected_rows: 0,
        }
    }

    pub fn columns(&self) -> &[String] {
        self.rows.as_ref().map(|r| r.columns.as_slice()).unwrap_or(&[])
    }

    /// Render as plain delimited text.
    ///
    /// Failures render as their message. A result carrying both column names and at
    /// least one row renders as a comma-joined header followed by one line per row.
    /// Everything else renders as the message plus the affected-row count.
    pub fn format(&self) -> String {
        if !self.success {
            return self.message.clone();
        }

        match &self.rows {
            Some(set) if !set.is_empty() => {
                let mut lines = Vec::with_capacity(set.rows.len() + 1);
                lines.push(set.columns.join(","));
                for row in &set.rows {
                    let cells: Vec<String> = row.iter().map(format_value).collect();
                    lines.push(cells.join(","));
                }
                lines.join("\n")
            }
            _ => format!("{}. Affected rows: {}", self.message, self.affected_rows),
        }
    }
}

/// Format every result and join them with [`RESULT_SEPARATOR`].
pub fn format_results(results: &[SqlResult]) -> String {
    results
        .iter()
        .map(SqlResult::format)
        .collect::<Vec<_>>()
        .join(RESULT_SEPARATOR)
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(arr) => serde_json::to_string(arr).unwrap_or_default(),
        JsonValue::Object(obj) => serde_json::to_string(obj).unwrap_or_default(),
    }
}

/// Point-in-time utilization snapshot of one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub pool_name: String,
    pub pool_type: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub checked_out: usize,
    pub checked_in: usize,
    pub overflow: usize,
    /// Seconds; -1 when recycling is disabled
    pub recycle_secs: i64,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] size={} max_overflow={} checked_out={} checked_in={} overflow={} recycle={}",
            self.pool_name,
            self.pool_type,
            self.pool_size,
            self.max_overflow,
            self.checked_out,
            self.checked_in,
            self.overflow,
            self.recycle_secs
        )
    }
}
