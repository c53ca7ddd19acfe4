//! PostgreSQL capabilities.
//!
//! A connection is bound to one database, so a request for any other database fails
//! with [`DbError::CrossDatabase`]. The schema defaults to the configured one, then
//! `public`.

use super::{
    CapabilitySet, DbHealth, DbVersion, HealthCheck, HealthKind, Scope, ScopeRules, SqlOptimize,
    TableDescription, TableIndex, TableNameSearch, explicit, literal_list, quote_literal,
    upper_like_pattern,
};
use crate::config::PoolConfig;
use crate::error::{DbError, DbResult};
use crate::models::Dialect;

pub const DEFAULT_SCHEMA: &str = "public";

pub struct PostgresCapabilities;

pub fn capability_set() -> CapabilitySet {
    CapabilitySet::from_handler(Dialect::PostgreSql, PostgresCapabilities)
}

impl ScopeRules for PostgresCapabilities {
    fn resolve_scope(
        &self,
        config: &PoolConfig,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> DbResult<Scope> {
        if let Some(requested) = explicit(database) {
            if requested != config.database {
                return Err(DbError::cross_database(requested, &config.database));
            }
        }
        let schema = explicit(schema).unwrap_or_else(|| config.schema_or(DEFAULT_SCHEMA));
        Ok(Scope {
            database: config.database.clone(),
            schema: schema.to_string(),
        })
    }
}

impl DbVersion for PostgresCapabilities {
    fn version_sql(&self) -> &'static str {
        "SELECT version()"
    }
}

/// `regclass` of a `pg_tables` row, safe for mixed-case names.
const TABLE_REGCLASS: &str = "format('%I.%I', schemaname, tablename)::regclass";

impl TableNameSearch for PostgresCapabilities {
    fn search_sql(&self, scope: &Scope, keyword: Option<&str>) -> String {
        let mut sql = format!(
            "SELECT schemaname AS table_schema, tablename AS table_name, \
             obj_description({rc}, 'pg_class') AS table_comment \
             FROM pg_tables WHERE schemaname = {schema}",
            rc = TABLE_REGCLASS,
            schema = quote_literal(&scope.schema)
        );
        if let Some(keyword) = keyword {
            sql.push_str(&format!(
                " AND (UPPER(tablename) LIKE {p} OR UPPER(obj_description({rc}, 'pg_class')) LIKE {p})",
                p = upper_like_pattern(keyword),
                rc = TABLE_REGCLASS
            ));
        }
        sql.push_str(" ORDER BY tablename");
        sql
    }
}

impl TableDescription for PostgresCapabilities {
    fn describe_sql(&self, scope: &Scope, tables: &[String]) -> String {
        format!(
            "SELECT col.table_name AS \"TABLE_NAME\", col.column_name AS \"COLUMN_NAME\", \
             col.data_type AS \"DATA_TYPE\", pgd.description AS \"COLUMN_COMMENT\" \
             FROM information_schema.columns col \
             LEFT JOIN pg_namespace n ON n.nspname = col.table_schema \
             LEFT JOIN pg_class c ON c.relnamespace = n.oid AND c.relname = col.table_name \
             LEFT JOIN pg_attribute a ON a.attrelid = c.oid AND a.attname = col.column_name \
             LEFT JOIN pg_description pgd ON pgd.objoid = c.oid AND pgd.objsubid = a.attnum \
             WHERE col.table_schema = {} AND col.table_name IN ({}) \
             ORDER BY col.table_name, col.ordinal_position",
            quote_literal(&scope.schema),
            literal_list(tables)
        )
    }
}

impl TableIndex for PostgresCapabilities {
    fn index_sql(&self, scope: &Scope, tables: &[String]) -> String {
        format!(
            "SELECT t.relname AS \"TABLE_NAME\", i.relname AS \"INDEX_NAME\", \
             a.attname AS \"COLUMN_NAME\", k.ordinality AS \"SEQ_IN_INDEX\", \
             NOT ix.indisunique AS \"NON_UNIQUE\", \
             CASE WHEN ix.indisprimary THEN 'PRIMARY' WHEN ix.indisunique THEN 'UNIQUE' \
             ELSE 'NORMAL' END AS \"INDEX_TYPE\" \
             FROM pg_class t \
             JOIN pg_index ix ON t.oid = ix.indrelid \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             JOIN LATERAL unnest(ix.indkey::smallint[]) WITH ORDINALITY AS k(attnum, ordinality) ON true \
             JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
             WHERE n.nspname = {} AND t.relname IN ({}) AND t.relkind IN ('r', 'p') \
             ORDER BY t.relname, i.relname, k.ordinality",
            quote_literal(&scope.schema),
            literal_list(tables)
        )
    }
}

impl DbHealth for PostgresCapabilities {
    fn checks(&self, kind: HealthKind, config: &PoolConfig) -> Vec<HealthCheck> {
        match kind {
            HealthKind::Connection => vec![
                HealthCheck::new(
                    "Maximum connections",
                    "SELECT setting AS max_connections FROM pg_settings WHERE name = 'max_connections'",
                ),
                HealthCheck::new(
                    "Connection details",
                    format!(
                        "SELECT pid, usename, application_name, client_addr, backend_start, state, \
                         query, query_start, state_change FROM pg_stat_activity \
                         WHERE datname = {} ORDER BY backend_start",
                        quote_literal(&config.database)
                    ),
                ),
            ],
            HealthKind::Blocking => vec![HealthCheck::new(
                "Lock waits",
                "SELECT blocked_locks.pid AS blocked_pid, blocked_activity.usename AS blocked_user, \
                 blocking_locks.pid AS blocking_pid, blocking_activity.usename AS blocking_user, \
                 blocked_activity.query AS blocked_statement, \
                 blocking_activity.query AS current_statement_in_blocking_process \
                 FROM pg_catalog.pg_locks blocked_locks \
                 JOIN pg_catalog.pg_stat_activity blocked_activity ON blocked_activity.pid = blocked_locks.pid \
                 JOIN pg_catalog.pg_locks blocking_locks ON blocking_locks.locktype = blocked_locks.locktype \
                 AND blocking_locks.database IS NOT DISTINCT FROM blocked_locks.database \
                 AND blocking_locks.relation IS NOT DISTINCT FROM blocked_locks.relation \
                 AND blocking_locks.page IS NOT DISTINCT FROM blocked_locks.page \
                 AND blocking_locks.tuple IS NOT DISTINCT FROM blocked_locks.tuple \
                 AND blocking_locks.virtualxid IS NOT DISTINCT FROM blocked_locks.virtualxid \
                 AND blocking_locks.transactionid IS NOT DISTINCT FROM blocked_locks.transactionid \
                 AND blocking_locks.classid IS NOT DISTINCT FROM blocked_locks.classid \
                 AND blocking_locks.objid IS NOT DISTINCT FROM blocked_locks.objid \
                 AND blocking_locks.objsubid IS NOT DISTINCT FROM blocked_locks.objsubid \
                 AND blocking_locks.pid != blocked_locks.pid \
                 JOIN pg_catalog.pg_stat_activity blocking_activity ON blocking_activity.pid = blocking_locks.pid \
                 WHERE NOT blocked_locks.granted",
            )],
            HealthKind::Resources => vec![
                HealthCheck::new(
                    "Database size",
                    "SELECT pg_size_pretty(pg_database_size(current_database())) AS database_size",
                ),
                HealthCheck::new(
                    "Cache hit ratio",
                    "SELECT SUM(blks_hit) * 100.0 / NULLIF(SUM(blks_hit) + SUM(blks_read), 0) \
                     AS buffer_hit_ratio FROM pg_stat_database WHERE datname = current_database()",
                ),
                HealthCheck::new(
                    "Top 10 tables by size",
                    "SELECT schemaname, tablename, \
                     pg_size_pretty(pg_total_relation_size(format('%I.%I', schemaname, tablename))) AS total_size, \
                     pg_size_pretty(pg_relation_size(format('%I.%I', schemaname, tablename))) AS table_size \
                     FROM pg_tables WHERE schemaname NOT IN ('information_schema', 'pg_catalog') \
                     ORDER BY pg_total_relation_size(format('%I.%I', schemaname, tablename)) DESC LIMIT 10",
                ),
                HealthCheck::new(
                    "Background writer",
                    "SELECT checkpoints_timed, checkpoints_req, checkpoint_write_time, \
                     checkpoint_sync_time, buffers_checkpoint, buffers_clean, buffers_backend, \
                     buffers_backend_fsync, buffers_alloc FROM pg_stat_bgwriter",
                ),
                HealthCheck::new(
                    "Dead tuples",
                    "SELECT schemaname, relname, n_live_tup, n_dead_tup, last_vacuum, last_autovacuum, \
                     last_analyze, last_autoanalyze, (n_dead_tup::float / n_live_tup) AS dead_ratio, \
                     pg_size_pretty(pg_relation_size(relid)) AS size \
                     FROM pg_stat_user_tables WHERE n_live_tup > 0 ORDER BY dead_ratio DESC",
                ),
                HealthCheck::new(
                    "Temporary files",
                    "SELECT temp_files, temp_bytes FROM pg_stat_database WHERE datname = current_database()",
                ),
                HealthCheck::new(
                    "IO",
                    "SELECT datname AS database, blks_read, \
                     ROUND((blk_read_time / 1000.0)::numeric, 2) AS read_time_s, \
                     ROUND((blk_write_time / 1000.0)::numeric, 2) AS write_time_s, \
                     CASE WHEN blks_read > 0 THEN ROUND((blk_read_time::numeric / blks_read), 3) \
                     ELSE 0 END AS avg_read_latency_ms \
                     FROM pg_stat_database WHERE datname NOT LIKE 'template%' AND datname IS NOT NULL \
                     ORDER BY blk_read_time DESC",
                ),
                HealthCheck::new(
                    "Transaction ID age",
                    "SELECT datname, age(datfrozenxid) AS xid_age, mxid_age(datminmxid) AS mxid_age \
                     FROM pg_database WHERE datallowconn",
                ),
            ],
        }
    }
}

impl SqlOptimize for PostgresCapabilities {
    /// `EXPLAIN ANALYZE` runs the statement, so it is wrapped in a transaction that is
    /// always rolled back.
    fn explain_steps(&self, sql: &str) -> Vec<String> {
        vec![
            "BEGIN".to_string(),
            format!("EXPLAIN ANALYZE {}", sql),
            "ROLLBACK".to_string(),
        ]
    }

    fn table_size_sql(&self, scope: &Scope, tables: &[String]) -> String {
        format!(
            "SELECT c.relname AS table_name, \
             ROUND(pg_relation_size(c.oid) / 1024.0 / 1024.0, 2) AS data_mb, \
             ROUND(pg_indexes_size(c.oid) / 1024.0 / 1024.0, 2) AS index_mb, \
             ROUND(pg_total_relation_size(c.oid) / 1024.0 / 1024.0, 2) AS total_mb \
             FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = {} AND c.relname IN ({}) AND c.relkind IN ('r', 'p') \
             ORDER BY c.relname",
            quote_literal(&scope.schema),
            literal_list(tables)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PoolConfig {
        PoolConfig::new("postgresql", "u", "p", "shop")
    }

    #[test]
    fn test_schema_defaults() {
        let scope = PostgresCapabilities.resolve_scope(&config(), None, None).unwrap();
        assert_eq!(scope.schema, "public");

        let configured = PoolConfig {
            schema: Some("sales".to_string()),
            ..config()
        };
        let scope = PostgresCapabilities.resolve_scope(&configured, None, None).unwrap();
        assert_eq!(scope.schema, "sales");

        let scope = PostgresCapabilities
            .resolve_scope(&configured, Some("shop"), Some("audit"))
            .unwrap();
        assert_eq!(scope.schema, "audit");
    }

    #[test]
    fn test_cross_database_rejected() {
        let err = PostgresCapabilities
            .resolve_scope(&config(), Some("other"), None)
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::CrossDatabase { ref requested, ref configured }
                if requested == "other" && configured == "shop"
        ));
    }

    #[test]
    fn test_explain_rolls_back() {
        let steps = PostgresCapabilities.explain_steps("DELETE FROM t");
        assert_eq!(steps.first().map(String::as_str), Some("BEGIN"));
        assert_eq!(steps[1], "EXPLAIN ANALYZE DELETE FROM t");
        assert_eq!(steps.last().map(String::as_str), Some("ROLLBACK"));
    }

    #[test]
    fn test_index_sql_scoped_to_schema() {
        let scope = PostgresCapabilities.resolve_scope(&config(), None, None).unwrap();
        let sql = PostgresCapabilities.index_sql(&scope, &["orders".to_string()]);
        assert!(sql.contains("n.nspname = 'public'"));
        assert!(sql.contains("t.relname IN ('orders')"));
    }
}
