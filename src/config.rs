//! Configuration handling for sqlgate.
//!
//! Two layers live here: [`PoolConfig`], the per-pool document loaded from a JSON file or
//! the environment, and [`Config`], the command-line configuration of the binary.

use crate::error::{DbError, DbResult};
use crate::models::{Dialect, PoolType};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_ROLE: &str = "readonly";
pub const DEFAULT_POOL_NAME: &str = "default";
pub const DEFAULT_CONFIG_FILE: &str = "database_config.json";
pub const DEFAULT_ORACLE_SERVICE_NAME: &str = "ORCL";

// Pool configuration defaults
pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_MAX_OVERFLOW: u32 = 20;
pub const DEFAULT_POOL_RECYCLE_SECS: i64 = 3600;
pub const DEFAULT_POOL_TIMEOUT_SECS: u64 = 30;

/// Configuration of one named pool.
///
/// Numeric fields accept JSON numbers or numeric strings. Absent fields fall back to the
/// `DEFAULT_*` constants through the `*_or_default()` getters.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Dialect key, e.g. "mysql", "postgresql", "oracle", "mssql", "dameng"
    #[serde(rename = "type", default)]
    pub dialect: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: String,
    /// Sensitive - never log
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub pool_type: Option<PoolType>,
    #[serde(default, deserialize_with = "lenient")]
    pub pool_size: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub max_overflow: Option<u32>,
    /// Seconds; -1 disables recycling
    #[serde(default, deserialize_with = "lenient")]
    pub pool_recycle: Option<i64>,
    /// Acquisition timeout in seconds
    #[serde(default, deserialize_with = "lenient")]
    pub pool_timeout: Option<u64>,
    #[serde(default)]
    pub pool_pre_ping: Option<bool>,
}

impl std::fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"****")
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("service_name", &self.service_name)
            .field("role", &self.role)
            .field("pool_type", &self.pool_type)
            .field("pool_size", &self.pool_size)
            .field("max_overflow", &self.max_overflow)
            .field("pool_recycle", &self.pool_recycle)
            .field("pool_timeout", &self.pool_timeout)
            .field("pool_pre_ping", &self.pool_pre_ping)
            .finish()
    }
}

impl PoolConfig {
    /// Minimal configuration for a dialect; everything else takes its default.
    pub fn new(
        dialect: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            dialect: dialect.into(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn dialect(&self) -> DbResult<Dialect> {
        Dialect::from_key(&self.dialect)
    }

    pub fn host_or_default(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    /// Get port with the dialect's well-known port as default.
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or_else(|| {
            self.dialect()
                .map(|d| d.default_port())
                .unwrap_or(Dialect::MySql.default_port())
        })
    }

    pub fn role_or_default(&self) -> &str {
        self.role.as_deref().unwrap_or(DEFAULT_ROLE)
    }

    pub fn pool_type_or_default(&self) -> PoolType {
        self.pool_type.unwrap_or_default()
    }

    pub fn pool_size_or_default(&self) -> u32 {
        self.pool_size.unwrap_or(DEFAULT_POOL_SIZE)
    }

    pub fn max_overflow_or_default(&self) -> u32 {
        self.max_overflow.unwrap_or(DEFAULT_MAX_OVERFLOW)
    }

    pub fn pool_recycle_or_default(&self) -> i64 {
        self.pool_recycle.unwrap_or(DEFAULT_POOL_RECYCLE_SECS)
    }

    /// Maximum idle-connection age, `None` when recycling is disabled.
    pub fn recycle_age(&self) -> Option<Duration> {
        match self.pool_recycle_or_default() {
            secs if secs < 0 => None,
            secs => Some(Duration::from_secs(secs as u64)),
        }
    }

    pub fn pool_timeout_or_default(&self) -> Duration {
        Duration::from_secs(self.pool_timeout.unwrap_or(DEFAULT_POOL_TIMEOUT_SECS))
    }

    pub fn pool_pre_ping_or_default(&self) -> bool {
        self.pool_pre_ping.unwrap_or(true)
    }

    /// Configured schema, or `fallback` when none is set.
    pub fn schema_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.schema
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback)
    }

    pub fn service_name_or_default(&self) -> &str {
        self.service_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_ORACLE_SERVICE_NAME)
    }

    /// Validate the configuration.
    ///
    /// The dialect is checked first so that an unknown `type` surfaces as
    /// [`DbError::UnsupportedDialect`] rather than a generic configuration error.
    pub fn validate(&self) -> DbResult<()> {
        self.dialect()?;

        let missing: Vec<&str> = [
            ("user", self.user.as_str()),
            ("password", self.password.as_str()),
            ("database", self.database.as_str()),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();
        if !missing.is_empty() {
            return Err(DbError::configuration(
                format!("missing required field(s): {}", missing.join(", ")),
                "Set user, password and database for every pool",
            ));
        }

        if self.pool_size == Some(0) {
            return Err(DbError::configuration(
                "pool_size must be greater than 0",
                "Use a positive pool_size",
            ));
        }
        if self.pool_timeout == Some(0) {
            return Err(DbError::configuration(
                "pool_timeout must be greater than 0",
                "Use a positive pool_timeout in seconds",
            ));
        }
        if let Some(recycle) = self.pool_recycle {
            if recycle < -1 {
                return Err(DbError::configuration(
                    format!("pool_recycle ({}) must be -1 or a non-negative number", recycle),
                    "Use -1 to disable recycling",
                ));
            }
        }
        Ok(())
    }
}

/// Accept `42` as well as `"42"` for numeric fields.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
    T::Err: std::fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr<T> {
        Num(T),
        Str(String),
    }

    match Option::<NumOrStr<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrStr::Num(v)) => Ok(Some(v)),
        Some(NumOrStr::Str(s)) => s
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Ordered pool configurations as they appear in the source document.
pub type PoolConfigs = Vec<(String, PoolConfig)>;

/// Parse a JSON object of `name -> PoolConfig`, keeping document order.
pub fn parse_pool_configs(json: &str) -> DbResult<PoolConfigs> {
    let doc: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
    doc.into_iter()
        .map(|(name, value)| {
            serde_json::from_value::<PoolConfig>(value)
                .map(|cfg| (name.clone(), cfg))
                .map_err(|e| {
                    DbError::configuration(
                        format!("pool '{}': {}", name, e),
                        "Check field types in the pool configuration",
                    )
                })
        })
        .collect()
}

/// Load pool configurations.
///
/// The file wins when it exists and parses; an unreadable or malformed file is logged
/// and the inline JSON (usually `DATABASE_CONFIGS`) is tried next. With neither source
/// the result is empty.
pub fn load_pool_configs(file: &Path, inline_json: Option<&str>) -> DbResult<PoolConfigs> {
    if file.exists() {
        match std::fs::read_to_string(file)
            .map_err(|e| DbError::configuration(e.to_string(), "Check file permissions"))
            .and_then(|text| parse_pool_configs(&text))
        {
            Ok(configs) => {
                debug!(file = %file.display(), count = configs.len(), "Loaded pool configuration file");
                return Ok(configs);
            }
            Err(e) => warn!(file = %file.display(), error = %e, "Cannot read configuration file"),
        }
    }

    match inline_json.map(str::trim).filter(|s| !s.is_empty()) {
        Some(json) => parse_pool_configs(json),
        None => Ok(Vec::new()),
    }
}

/// Role of the first configured pool, which governs permission checks by default.
pub fn active_role(configs: &[(String, PoolConfig)]) -> String {
    configs
        .first()
        .map(|(_, cfg)| cfg.role_or_default().to_string())
        .unwrap_or_else(|| DEFAULT_ROLE.to_string())
}

/// Output style for `exec` results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Comma-delimited text
    #[default]
    Plain,
    /// ASCII table (like the MySQL CLI)
    Table,
}

/// Operations available from the command line.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Execute one or more `;`-separated statements
    Exec {
        sql: String,
        #[arg(long, value_enum, default_value = "plain")]
        format: OutputFormat,
    },
    /// Show the backend version
    Version,
    /// Search tables by name or comment (SEARCH_ALL_TABLES lists every table)
    Tables {
        #[arg(default_value = crate::capabilities::SEARCH_ALL_TABLES)]
        keyword: String,
        #[arg(long)]
        database: Option<String>,
        #[arg(long)]
        schema: Option<String>,
    },
    /// Describe columns of comma-separated tables
    Describe {
        tables: String,
        #[arg(long)]
        database: Option<String>,
        #[arg(long)]
        schema: Option<String>,
    },
    /// List indexes of comma-separated tables
    Indexes {
        tables: String,
        #[arg(long)]
        database: Option<String>,
        #[arg(long)]
        schema: Option<String>,
    },
    /// Run health diagnostics: connection, blocking, resources or all
    Health {
        #[arg(default_value = "all")]
        kind: String,
    },
    /// Show the execution plan of a statement
    Explain { sql: String },
    /// Show the size of comma-separated tables
    Size {
        tables: String,
        #[arg(long)]
        database: Option<String>,
        #[arg(long)]
        schema: Option<String>,
    },
    /// Show utilization of the selected pool
    Stats,
    /// List registered pools
    Pools,
}

/// Command-line configuration of the sqlgate binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sqlgate",
    about = "Multi-backend SQL execution with named pools and role-based permissions",
    version,
    author
)]
pub struct Config {
    /// Pool configuration file (JSON object of pool name -> settings)
    #[arg(
        long,
        value_name = "FILE",
        default_value = DEFAULT_CONFIG_FILE,
        env = "DATABASE_CONFIG_FILE"
    )]
    pub config_file: PathBuf,

    /// Inline pool configuration, used when the file is absent
    #[arg(long, value_name = "JSON", env = "DATABASE_CONFIGS", hide_env_values = true)]
    pub configs_json: Option<String>,

    /// Role permission table (JSON object of role -> verb list)
    #[arg(long, value_name = "FILE", env = "SQLGATE_PERMISSIONS")]
    pub permissions: Option<PathBuf>,

    /// Check permissions against the targeted pool's role instead of the first pool's
    #[arg(long, env = "SQLGATE_PER_POOL_ROLES")]
    pub per_pool_roles: bool,

    /// Pool to run the command against
    #[arg(short, long, default_value = DEFAULT_POOL_NAME, env = "SQLGATE_POOL")]
    pub pool: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "SQLGATE_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "SQLGATE_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}
