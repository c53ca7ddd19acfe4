//! Error types for sqlgate.
//!
//! Every failure the execution layer can surface is a variant of [`DbError`]. Variants
//! carry enough context to be rendered straight to a caller, and some carry a
//! suggestion describing how to recover.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Configuration { message: String, suggestion: String },

    #[error("Unsupported database type: {dialect}")]
    UnsupportedDialect { dialect: String },

    #[error("Timeout: acquiring a connection from pool '{pool}' exceeded {elapsed_secs}s")]
    PoolTimeout { pool: String, elapsed_secs: u64 },

    #[error("Permission denied for role '{role}': {operations} not allowed")]
    Permission { role: String, operations: String },

    #[error(
        "Cross-database access is not supported: requested '{requested}', pool is bound to '{configured}'"
    )]
    CrossDatabase {
        requested: String,
        configured: String,
    },

    #[error("Backend error: {message}")]
    Backend {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Pool not found: {pool}")]
    PoolNotFound { pool: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error with a helpful suggestion.
    pub fn configuration(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn unsupported_dialect(dialect: impl Into<String>) -> Self {
        Self::UnsupportedDialect {
            dialect: dialect.into(),
        }
    }

    pub fn pool_timeout(pool: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::PoolTimeout {
            pool: pool.into(),
            elapsed_secs,
        }
    }

    /// Create a permission error naming the rejected operations.
    pub fn permission(role: impl Into<String>, operations: impl Into<String>) -> Self {
        Self::Permission {
            role: role.into(),
            operations: operations.into(),
        }
    }

    pub fn cross_database(requested: impl Into<String>, configured: impl Into<String>) -> Self {
        Self::CrossDatabase {
            requested: requested.into(),
            configured: configured.into(),
        }
    }

    /// Create a backend error with optional SQL state.
    pub fn backend(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Backend {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn pool_not_found(pool: impl Into<String>) -> Self {
        Self::PoolNotFound { pool: pool.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Configuration { suggestion, .. } => Some(suggestion),
            Self::Backend { suggestion, .. } => Some(suggestion),
            Self::PoolTimeout { .. } => {
                Some("Increase pool_timeout or pool_size, or reduce concurrent load")
            }
            Self::CrossDatabase { .. } => {
                Some("Register a separate pool for the other database and target that pool")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolTimeout { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::configuration(
                msg.to_string(),
                "Check host, port, credentials and database in the pool configuration",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::backend(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::backend(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::pool_timeout("sqlx", 0),
            sqlx::Error::Io(io_err) => DbError::backend(
                format!("I/O error: {}", io_err),
                None,
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::backend(
                format!("TLS error: {}", tls_err),
                None,
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::backend(
                format!("Protocol error: {}", msg),
                None,
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::backend(
                format!("Database error: {}", err),
                None,
                "Check the statement and the backend logs",
            ),
        }
    }
}

impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        match err {
            tiberius::error::Error::Server(token) => DbError::backend(
                token.message().to_string(),
                Some(token.code().to_string()),
                "Check the SQL syntax and referenced objects",
            ),
            tiberius::error::Error::Io { kind, message } => DbError::backend(
                format!("I/O error ({:?}): {}", kind, message),
                None,
                "Check network connectivity and database server status",
            ),
            other => DbError::backend(
                other.to_string(),
                None,
                "Check the statement and the SQL Server error log",
            ),
        }
    }
}

#[cfg(feature = "oci")]
impl From<oracle::Error> for DbError {
    fn from(err: oracle::Error) -> Self {
        let sql_state = err.db_error().map(|e| format!("ORA-{:05}", e.code()));
        DbError::backend(
            err.to_string(),
            sql_state,
            "Check the SQL syntax, referenced objects and OCI client setup",
        )
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::configuration(
            format!("Invalid JSON: {}", err),
            "Check the pool configuration document",
        )
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Render a result for a text-only boundary: errors become their message.
pub fn render(result: DbResult<String>) -> String {
    match result {
        Ok(text) => text,
        Err(err) => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::unsupported_dialect("db2");
        assert_eq!(err.to_string(), "Unsupported database type: db2");
    }

    #[test]
    fn test_permission_names_operations() {
        let err = DbError::permission("readonly", "DELETE, DROP");
        let text = err.to_string();
        assert!(text.contains("readonly"));
        assert!(text.contains("DELETE, DROP"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::backend("Syntax error", Some("42601".to_string()), "Check SQL syntax");
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert!(DbError::invalid_argument("x").suggestion().is_none());
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::pool_timeout("p", 30).is_retryable());
        assert!(!DbError::permission("readonly", "DROP").is_retryable());
        assert!(!DbError::cross_database("a", "b").is_retryable());
    }

    #[test]
    fn test_render_passes_text_and_errors() {
        assert_eq!(render(Ok("ok".to_string())), "ok");
        assert_eq!(
            render(Err(DbError::invalid_argument("bad kind"))),
            "Invalid argument: bad kind"
        );
    }

    #[test]
    fn test_sqlx_pool_timeout_maps_to_pool_timeout() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::PoolTimeout { .. }));
    }
}
