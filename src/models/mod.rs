//! Data models shared across the pool, executor and capability layers.

pub mod dialect;
pub mod result;

pub use dialect::{Dialect, PoolType};
pub use result::{
    MSG_QUERY_OK, MSG_STATEMENT_OK, PoolStats, RESULT_SEPARATOR, RowSet, SqlResult,
    format_results, format_value,
};
