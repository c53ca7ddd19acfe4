//! Backend dialect and pool-type tags.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported relational backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Includes MariaDB
    MySql,
    PostgreSql,
    Oracle,
    /// Microsoft SQL Server
    MsSql,
    /// DM8 (Dameng)
    Dameng,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Dialect::MySql,
        Dialect::PostgreSql,
        Dialect::Oracle,
        Dialect::MsSql,
        Dialect::Dameng,
    ];

    /// Resolve a configuration key. Accepts the common aliases case-insensitively.
    pub fn from_key(key: &str) -> DbResult<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgresql" | "postgres" | "pg" => Ok(Self::PostgreSql),
            "oracle" => Ok(Self::Oracle),
            "mssql" | "mssqlserver" | "sqlserver" => Ok(Self::MsSql),
            "dameng" | "dm" => Ok(Self::Dameng),
            _ => Err(DbError::unsupported_dialect(key)),
        }
    }

    /// Canonical configuration key.
    pub fn key(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::PostgreSql => "postgresql",
            Self::Oracle => "oracle",
            Self::MsSql => "mssql",
            Self::Dameng => "dameng",
        }
    }

    /// Get the display name for this dialect.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySql => "MySQL",
            Self::PostgreSql => "PostgreSQL",
            Self::Oracle => "Oracle",
            Self::MsSql => "SQL Server",
            Self::Dameng => "Dameng",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::PostgreSql => 5432,
            Self::Oracle => 1521,
            Self::MsSql => 1433,
            Self::Dameng => 5236,
        }
    }
}

impl FromStr for Dialect {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Connection retention strategy of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolType {
    /// Keeps up to `pool_size` idle connections and allows `max_overflow` extra leases.
    #[default]
    Queue,
    /// A single connection, leased serially.
    Singleton,
    /// No retention: every lease opens a new connection and closes it on release.
    Null,
}

impl PoolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Singleton => "singleton",
            Self::Null => "null",
        }
    }
}

impl std::fmt::Display for PoolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_key_aliases() {
        assert_eq!(Dialect::from_key("mysql").unwrap(), Dialect::MySql);
        assert_eq!(Dialect::from_key("PostgreSQL").unwrap(), Dialect::PostgreSql);
        assert_eq!(Dialect::from_key("postgres").unwrap(), Dialect::PostgreSql);
        assert_eq!(Dialect::from_key("mssqlserver").unwrap(), Dialect::MsSql);
        assert_eq!(Dialect::from_key("sqlserver").unwrap(), Dialect::MsSql);
        assert_eq!(Dialect::from_key(" dm ").unwrap(), Dialect::Dameng);
    }

    #[test]
    fn test_dialect_unknown_key() {
        let err = Dialect::from_key("db2").unwrap_err();
        assert!(matches!(err, DbError::UnsupportedDialect { ref dialect } if dialect == "db2"));
    }

    #[test]
    fn test_dialect_key_round_trips() {
        for dialect in Dialect::ALL {
            assert_eq!(Dialect::from_key(dialect.key()).unwrap(), dialect);
        }
    }

    #[test]
    fn test_pool_type_serde() {
        let t: PoolType = serde_json::from_str("\"singleton\"").unwrap();
        assert_eq!(t, PoolType::Singleton);
        assert_eq!(PoolType::default(), PoolType::Queue);
    }
}
