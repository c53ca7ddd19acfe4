//! Statement execution.
//!
//! Every statement follows the same path: extract its verbs, authorize them against the
//! caller's role, lease a connection, run it, then commit or roll back and format. The
//! authorization step happens before a lease is taken, so rejected statements never
//! touch a pool.
//!
//! Query-type statements (see [`classify`]) return rows and are never wrapped in a
//! transaction. Everything else runs inside begin/commit and is rolled back on failure.

use crate::config::PoolConfig;
use crate::db::classifier::{extract_operations, is_query_type, split_statements};
use crate::db::pool::{Pool, PooledConnection};
use crate::db::registry::PoolRegistry;
use crate::error::{DbError, DbResult};
use crate::models::{RowSet, SqlResult, format_results};
use crate::permission::{PermissionPolicy, Verb};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// How a statement is run and what its result carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Returns rows; runs outside a transaction.
    Query,
    /// Returns an affected-row count; runs in a transaction.
    Mutation,
}

pub fn classify(sql: &str) -> StatementKind {
    if is_query_type(sql) {
        StatementKind::Query
    } else {
        StatementKind::Mutation
    }
}

/// Executes SQL against registered pools under a permission policy.
#[derive(Debug, Clone)]
pub struct SqlExecutor {
    registry: PoolRegistry,
    policy: Arc<PermissionPolicy>,
    /// Role applied to every pool unless `per_pool_roles` is set
    role: String,
    per_pool_roles: bool,
}

impl SqlExecutor {
    pub fn new(registry: PoolRegistry, policy: PermissionPolicy, role: impl Into<String>) -> Self {
        Self {
            registry,
            policy: Arc::new(policy),
            role: role.into(),
            per_pool_roles: false,
        }
    }

    /// Check each statement against the targeted pool's own role.
    pub fn with_per_pool_roles(mut self, enabled: bool) -> Self {
        self.per_pool_roles = enabled;
        self
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &PermissionPolicy {
        &self.policy
    }

    pub fn extract_operations(&self, sql: &str) -> BTreeSet<Verb> {
        extract_operations(sql)
    }

    pub fn authorize(&self, operations: &BTreeSet<Verb>, role: &str) -> DbResult<()> {
        self.policy.authorize(operations, role)
    }

    pub fn classify(&self, sql: &str) -> StatementKind {
        classify(sql)
    }

    pub fn format(&self, result: &SqlResult) -> String {
        result.format()
    }

    async fn pool(&self, name: &str) -> DbResult<Arc<Pool>> {
        self.registry
            .get(name)
            .await
            .ok_or_else(|| DbError::pool_not_found(name))
    }

    /// Configuration of a registered pool.
    pub async fn pool_config(&self, name: &str) -> DbResult<PoolConfig> {
        Ok(self.pool(name).await?.config().clone())
    }

    fn role_for<'a>(&'a self, pool: &'a Pool) -> &'a str {
        if self.per_pool_roles {
            pool.config().role_or_default()
        } else {
            &self.role
        }
    }

    /// Run one statement. Failures are reported in the result, never raised.
    pub async fn execute(&self, pool_name: &str, sql: &str) -> SqlResult {
        match self.try_execute(pool_name, sql).await {
            Ok(result) => result,
            Err(e) => {
                warn!(pool = %pool_name, error = %e, "Statement failed");
                SqlResult::failure(format!("Execution failed: {}", e))
            }
        }
    }

    /// Run one statement, surfacing failures as typed errors.
    pub async fn try_execute(&self, pool_name: &str, sql: &str) -> DbResult<SqlResult> {
        let pool = self.pool(pool_name).await?;
        self.authorize(&extract_operations(sql), self.role_for(&pool))?;

        let start = Instant::now();
        let mut conn = pool.acquire().await?;
        debug!(pool = %pool_name, sql = %sql, "Executing statement");

        let result = match classify(sql) {
            StatementKind::Query => conn.query(sql).await.map(SqlResult::query),
            StatementKind::Mutation => run_mutation(&mut conn, pool_name, sql).await,
        }?;

        debug!(
            pool = %pool_name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            affected_rows = result.affected_rows,
            "Statement completed"
        );
        Ok(result)
    }

    /// Split `script` on `;` and run each statement independently.
    ///
    /// The split is naive: semicolons inside string literals or procedural blocks break
    /// statements apart. A failing statement yields a failed result and the rest still
    /// run.
    pub async fn execute_multiple(&self, pool_name: &str, script: &str) -> Vec<SqlResult> {
        let statements = split_statements(script);
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            results.push(self.execute(pool_name, statement).await);
        }
        results
    }

    /// [`execute_multiple`](Self::execute_multiple), formatted.
    pub async fn execute_script(&self, pool_name: &str, script: &str) -> String {
        format_results(&self.execute_multiple(pool_name, script).await)
    }

    /// Run `steps` in order on one connection without transaction wrapping and return the
    /// last non-empty row set.
    ///
    /// Every step is authorized before the lease. A connection whose session failed part
    /// way is discarded rather than returned to the pool.
    pub async fn execute_in_session(&self, pool_name: &str, steps: &[String]) -> SqlResult {
        match self.try_execute_in_session(pool_name, steps).await {
            Ok(result) => result,
            Err(e) => {
                warn!(pool = %pool_name, error = %e, "Session failed");
                SqlResult::failure(format!("Execution failed: {}", e))
            }
        }
    }

    async fn try_execute_in_session(&self, pool_name: &str, steps: &[String]) -> DbResult<SqlResult> {
        let pool = self.pool(pool_name).await?;
        let operations: BTreeSet<Verb> = steps
            .iter()
            .flat_map(|step| extract_operations(step))
            .collect();
        self.authorize(&operations, self.role_for(&pool))?;

        let mut conn = pool.acquire().await?;
        conn.mark_dirty();
        let mut last = RowSet::default();
        for step in steps {
            debug!(pool = %pool_name, sql = %step, "Executing session step");
            match conn.query(step).await {
                Ok(rows) if !rows.is_empty() => last = rows,
                Ok(_) => {}
                Err(e) => {
                    conn.discard();
                    return Err(e);
                }
            }
        }
        conn.mark_clean();
        Ok(SqlResult::query(last))
    }
}

/// Dropping the future part way leaves the lease dirty, so an abandoned transaction is
/// closed with its connection instead of being handed to the next caller.
async fn run_mutation(conn: &mut PooledConnection, pool_name: &str, sql: &str) -> DbResult<SqlResult> {
    conn.mark_dirty();
    conn.begin().await?;

    let outcome = match conn.execute(sql).await {
        Ok(affected) => conn.commit().await.map(|_| affected),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(affected) => {
            conn.mark_clean();
            Ok(SqlResult::mutation(affected))
        }
        Err(e) => {
            if let Err(rollback_err) = conn.rollback().await {
                warn!(pool = %pool_name, error = %rollback_err, "Rollback failed, discarding connection");
                conn.discard();
            } else {
                conn.mark_clean();
                debug!(pool = %pool_name, "Transaction rolled back");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("select 1"), StatementKind::Query);
        assert_eq!(classify("  WITH x AS (SELECT 1) SELECT * FROM x"), StatementKind::Query);
        assert_eq!(classify("desc orders"), StatementKind::Query);
        assert_eq!(classify("-- note\nSHOW TABLES"), StatementKind::Query);
        assert_eq!(classify("DESCRIPTION_UPDATE()"), StatementKind::Mutation);
        assert_eq!(classify("UPDATE t SET a = 1"), StatementKind::Mutation);
        assert_eq!(classify("SET SHOWPLAN_TEXT ON"), StatementKind::Mutation);
    }

    #[tokio::test]
    async fn test_unknown_pool_fails_in_result() {
        let executor = SqlExecutor::new(PoolRegistry::new(), PermissionPolicy::default(), "readonly");
        let result = executor.execute("missing", "SELECT 1").await;
        assert!(!result.success);
        assert_eq!(result.message, "Execution failed: Pool not found: missing");
    }
}
