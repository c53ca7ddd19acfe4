//! Dialect capabilities.
//!
//! Six operations are offered for every dialect: version, table-name search, table
//! description, index listing, health diagnostics and plan/size inspection. Each is a
//! trait whose provided method holds the shared flow (resolve the scope, build the SQL,
//! run it through [`SqlExecutor`], format). A dialect only supplies its SQL text and its
//! scope rules, in one struct that implements all six traits.
//!
//! Every capability returns text. Argument problems surface as typed errors; anything
//! that fails while running SQL is reported in the returned text.

pub mod dameng;
pub mod mssql;
pub mod mysql;
pub mod oracle;
pub mod postgres;
pub mod registry;

pub use registry::CapabilityRegistry;

use crate::config::PoolConfig;
use crate::db::SqlExecutor;
use crate::error::{DbError, DbResult};
use crate::models::Dialect;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Keyword that lists every table instead of filtering.
pub const SEARCH_ALL_TABLES: &str = "SEARCH_ALL_TABLES";

/// Namespace a table-scoped capability runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub database: String,
    pub schema: String,
}

/// How a dialect fills in an absent database or schema.
pub trait ScopeRules: Send + Sync {
    fn resolve_scope(
        &self,
        config: &PoolConfig,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> DbResult<Scope>;
}

#[async_trait]
pub trait DbVersion: Send + Sync {
    fn version_sql(&self) -> &'static str;

    async fn get_version(&self, exec: &SqlExecutor, pool: &str) -> DbResult<String> {
        Ok(exec.execute(pool, self.version_sql()).await.format())
    }
}

#[async_trait]
pub trait TableNameSearch: ScopeRules {
    /// `keyword` is `None` when every table in scope should be listed.
    fn search_sql(&self, scope: &Scope, keyword: Option<&str>) -> String;

    /// Find tables whose name or comment contains `keyword`, case-insensitively.
    async fn search(
        &self,
        exec: &SqlExecutor,
        pool: &str,
        database: Option<&str>,
        schema: Option<&str>,
        keyword: &str,
    ) -> DbResult<String> {
        let config = exec.pool_config(pool).await?;
        let scope = self.resolve_scope(&config, database, schema)?;
        let keyword = keyword.trim();
        let filter = (keyword != SEARCH_ALL_TABLES).then_some(keyword);
        let sql = self.search_sql(&scope, filter);
        debug!(pool = %pool, schema = %scope.schema, "Searching table names");
        Ok(exec.execute(pool, &sql).await.format())
    }
}

#[async_trait]
pub trait TableDescription: ScopeRules {
    fn describe_sql(&self, scope: &Scope, tables: &[String]) -> String;

    /// Columns of the comma-separated tables, by table then ordinal position.
    async fn describe(
        &self,
        exec: &SqlExecutor,
        pool: &str,
        database: Option<&str>,
        schema: Option<&str>,
        table_names: &str,
    ) -> DbResult<String> {
        let tables = split_table_names(table_names)?;
        let config = exec.pool_config(pool).await?;
        let scope = self.resolve_scope(&config, database, schema)?;
        let sql = self.describe_sql(&scope, &tables);
        Ok(exec.execute(pool, &sql).await.format())
    }
}

#[async_trait]
pub trait TableIndex: ScopeRules {
    fn index_sql(&self, scope: &Scope, tables: &[String]) -> String;

    /// Index rows: TABLE_NAME, INDEX_NAME, COLUMN_NAME, SEQ_IN_INDEX, NON_UNIQUE,
    /// INDEX_TYPE.
    async fn list(
        &self,
        exec: &SqlExecutor,
        pool: &str,
        database: Option<&str>,
        schema: Option<&str>,
        table_names: &str,
    ) -> DbResult<String> {
        let tables = split_table_names(table_names)?;
        let config = exec.pool_config(pool).await?;
        let scope = self.resolve_scope(&config, database, schema)?;
        let sql = self.index_sql(&scope, &tables);
        Ok(exec.execute(pool, &sql).await.format())
    }
}

/// Category of health diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthKind {
    Connection,
    Blocking,
    Resources,
}

impl HealthKind {
    pub const ALL: [HealthKind; 3] = [
        HealthKind::Connection,
        HealthKind::Blocking,
        HealthKind::Resources,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Blocking => "blocking",
            Self::Resources => "resources",
        }
    }

    /// Parse a kind selector. `all` expands to every kind in fixed order.
    pub fn parse_selection(kind: &str) -> DbResult<Vec<HealthKind>> {
        let key = kind.trim().to_ascii_lowercase();
        if key == "all" {
            return Ok(Self::ALL.to_vec());
        }
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == key)
            .map(|k| vec![k])
            .ok_or_else(|| {
                DbError::invalid_argument(format!(
                    "unknown health check kind '{}', expected connection, blocking, resources or all",
                    kind
                ))
            })
    }
}

impl std::fmt::Display for HealthKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labelled diagnostic: its statements' results are printed under `- label`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub label: &'static str,
    pub statements: Vec<String>,
}

impl HealthCheck {
    pub fn new(label: &'static str, sql: impl Into<String>) -> Self {
        Self {
            label,
            statements: vec![sql.into()],
        }
    }

    pub fn many<I, S>(label: &'static str, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label,
            statements: statements.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
pub trait DbHealth: Send + Sync {
    fn checks(&self, kind: HealthKind, config: &PoolConfig) -> Vec<HealthCheck>;

    /// Run the diagnostics of `kind` (`connection`, `blocking`, `resources` or `all`).
    ///
    /// Sections are separated by a blank line.
    async fn check(&self, exec: &SqlExecutor, pool: &str, kind: &str) -> DbResult<String> {
        let kinds = HealthKind::parse_selection(kind)?;
        let config = exec.pool_config(pool).await?;

        let mut sections = Vec::with_capacity(kinds.len());
        for kind in kinds {
            debug!(pool = %pool, kind = %kind, "Running health checks");
            let mut lines = Vec::new();
            for check in self.checks(kind, &config) {
                lines.push(format!("- {}", check.label));
                for sql in &check.statements {
                    lines.push(exec.execute(pool, sql).await.format());
                }
            }
            sections.push(lines.join("\n"));
        }
        Ok(sections.join("\n\n"))
    }
}

#[async_trait]
pub trait SqlOptimize: ScopeRules {
    /// Statements that produce the plan of `sql`, run in one session. The plan is the
    /// last row set they return.
    fn explain_steps(&self, sql: &str) -> Vec<String>;

    fn table_size_sql(&self, scope: &Scope, tables: &[String]) -> String;

    async fn explain(&self, exec: &SqlExecutor, pool: &str, sql: &str) -> DbResult<String> {
        let sql = sql.trim().trim_end_matches(';').trim_end();
        if sql.is_empty() {
            return Err(DbError::invalid_argument("no statement to explain"));
        }

        let steps = self.explain_steps(sql);
        let result = match steps.as_slice() {
            [single] => exec.execute(pool, single).await,
            _ => exec.execute_in_session(pool, &steps).await,
        };
        Ok(result.format())
    }

    /// Size in MB of the comma-separated tables.
    async fn get_table_size(
        &self,
        exec: &SqlExecutor,
        pool: &str,
        database: Option<&str>,
        schema: Option<&str>,
        table_names: &str,
    ) -> DbResult<String> {
        let tables = split_table_names(table_names)?;
        let config = exec.pool_config(pool).await?;
        let scope = self.resolve_scope(&config, database, schema)?;
        let sql = self.table_size_sql(&scope, &tables);
        Ok(exec.execute(pool, &sql).await.format())
    }
}

/// The six capability handlers of one dialect.
#[derive(Clone)]
pub struct CapabilitySet {
    pub dialect: Dialect,
    pub version: Arc<dyn DbVersion>,
    pub table_names: Arc<dyn TableNameSearch>,
    pub table_description: Arc<dyn TableDescription>,
    pub table_index: Arc<dyn TableIndex>,
    pub health: Arc<dyn DbHealth>,
    pub optimize: Arc<dyn SqlOptimize>,
}

impl CapabilitySet {
    /// Serve all six capabilities from one handler.
    pub fn from_handler<H>(dialect: Dialect, handler: H) -> Self
    where
        H: DbVersion + TableNameSearch + TableDescription + TableIndex + DbHealth + SqlOptimize + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            dialect,
            version: handler.clone(),
            table_names: handler.clone(),
            table_description: handler.clone(),
            table_index: handler.clone(),
            health: handler.clone(),
            optimize: handler,
        }
    }
}

impl std::fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilitySet")
            .field("dialect", &self.dialect)
            .finish_non_exhaustive()
    }
}

/// Split a comma-separated table list, trimming names and dropping empty ones.
pub fn split_table_names(csv: &str) -> DbResult<Vec<String>> {
    let tables: Vec<String> = csv
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if tables.is_empty() {
        return Err(DbError::invalid_argument(format!(
            "no table names in '{}'",
            csv
        )));
    }
    Ok(tables)
}

/// SQL string literal with embedded single quotes doubled.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `'a', 'b'` for use inside `IN (...)`.
pub fn literal_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| quote_literal(v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Escape character for [`upper_like_pattern`]. `!` has no special meaning in string
/// literals on any supported dialect, unlike `\\` on MySQL.
const LIKE_ESCAPE: char = '!';

/// `'%KEYWORD%' ESCAPE '!'`, upper-cased for case-insensitive matching against
/// `UPPER(col)`. Wildcards in the keyword match literally.
pub fn upper_like_pattern(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len() + 2);
    for c in keyword.to_uppercase().chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    format!(
        "{} ESCAPE '{}'",
        quote_literal(&format!("%{}%", escaped)),
        LIKE_ESCAPE
    )
}

/// An explicitly requested database or schema, ignoring blank values.
pub(crate) fn explicit(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
