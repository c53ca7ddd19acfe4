//! MySQL / MariaDB capabilities.
//!
//! Tables are scoped by `TABLE_SCHEMA`, which is the configured database unless another
//! one is requested.

use super::{
    CapabilitySet, DbHealth, DbVersion, HealthCheck, HealthKind, Scope, ScopeRules, SqlOptimize,
    TableDescription, TableIndex, TableNameSearch, explicit, literal_list, quote_literal,
    upper_like_pattern,
};
use crate::config::PoolConfig;
use crate::error::DbResult;
use crate::models::Dialect;

pub struct MySqlCapabilities;

pub fn capability_set() -> CapabilitySet {
    CapabilitySet::from_handler(Dialect::MySql, MySqlCapabilities)
}

impl ScopeRules for MySqlCapabilities {
    fn resolve_scope(
        &self,
        config: &PoolConfig,
        database: Option<&str>,
        _schema: Option<&str>,
    ) -> DbResult<Scope> {
        let database = explicit(database).unwrap_or(&config.database).to_string();
        Ok(Scope {
            schema: database.clone(),
            database,
        })
    }
}

impl DbVersion for MySqlCapabilities {
    fn version_sql(&self) -> &'static str {
        "SELECT VERSION()"
    }
}

impl TableNameSearch for MySqlCapabilities {
    fn search_sql(&self, scope: &Scope, keyword: Option<&str>) -> String {
        let mut sql = format!(
            "SELECT TABLE_SCHEMA, TABLE_NAME, TABLE_COMMENT FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = {}",
            quote_literal(&scope.database)
        );
        if let Some(keyword) = keyword {
            let pattern = upper_like_pattern(keyword);
            sql.push_str(&format!(
                " AND (UPPER(TABLE_NAME) LIKE {p} OR UPPER(TABLE_COMMENT) LIKE {p})",
                p = pattern
            ));
        }
        sql.push_str(" ORDER BY TABLE_NAME");
        sql
    }
}

impl TableDescription for MySqlCapabilities {
    fn describe_sql(&self, scope: &Scope, tables: &[String]) -> String {
        format!(
            "SELECT TABLE_NAME, COLUMN_NAME, COLUMN_TYPE, COLUMN_COMMENT \
             FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = {} AND TABLE_NAME IN ({}) \
             ORDER BY TABLE_NAME, ORDINAL_POSITION",
            quote_literal(&scope.database),
            literal_list(tables)
        )
    }
}

impl TableIndex for MySqlCapabilities {
    fn index_sql(&self, scope: &Scope, tables: &[String]) -> String {
        format!(
            "SELECT TABLE_NAME, INDEX_NAME, COLUMN_NAME, SEQ_IN_INDEX, NON_UNIQUE, INDEX_TYPE \
             FROM information_schema.STATISTICS WHERE TABLE_SCHEMA = {} AND TABLE_NAME IN ({}) \
             ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX",
            quote_literal(&scope.database),
            literal_list(tables)
        )
    }
}

impl DbHealth for MySqlCapabilities {
    fn checks(&self, kind: HealthKind, _config: &PoolConfig) -> Vec<HealthCheck> {
        match kind {
            HealthKind::Connection => vec![
                HealthCheck::many(
                    "Current and maximum connections",
                    [
                        "SHOW VARIABLES LIKE 'max_connections'",
                        "SHOW STATUS LIKE 'Threads_connected'",
                        "SHOW STATUS LIKE 'Threads_running'",
                    ],
                ),
                HealthCheck::many(
                    "Connection errors",
                    [
                        "SHOW STATUS LIKE 'Connection_errors_%'",
                        "SHOW STATUS LIKE 'Aborted_connects'",
                    ],
                ),
                HealthCheck::new("Active processes", "SHOW FULL PROCESSLIST"),
            ],
            // innodb_locks/innodb_lock_waits exist up to 5.7, data_locks/data_lock_waits from 8.0
            HealthKind::Blocking => vec![HealthCheck::many(
                "InnoDB status, transactions and locks",
                [
                    "SHOW ENGINE INNODB STATUS",
                    "SELECT * FROM information_schema.INNODB_TRX",
                    "SHOW OPEN TABLES WHERE In_use > 0",
                    "SELECT * FROM information_schema.innodb_locks",
                    "SELECT * FROM information_schema.innodb_lock_waits",
                    "SELECT * FROM performance_schema.data_lock_waits",
                    "SELECT * FROM performance_schema.data_locks",
                ],
            )],
            HealthKind::Resources => vec![
                HealthCheck::new(
                    "Buffer pool hit ratio",
                    "SELECT ROUND((1 - (variable_value / (SELECT variable_value \
                     FROM performance_schema.global_status \
                     WHERE variable_name = 'Innodb_buffer_pool_read_requests'))) * 100, 2) \
                     AS buffer_pool_hit_ratio \
                     FROM performance_schema.global_status \
                     WHERE variable_name = 'Innodb_buffer_pool_reads'",
                ),
                HealthCheck::new(
                    "Temporary tables",
                    "SELECT variable_name, variable_value FROM performance_schema.global_status \
                     WHERE variable_name IN ('Created_tmp_tables', 'Created_tmp_disk_tables')",
                ),
                HealthCheck::new(
                    "InnoDB file IO",
                    "SELECT SUBSTR(event_name, 24) AS event, count_star AS total_count, \
                     sum_timer_wait AS total_latency, min_timer_wait AS min_latency, \
                     avg_timer_wait AS avg_latency, max_timer_wait AS max_latency \
                     FROM performance_schema.events_waits_summary_global_by_event_name \
                     WHERE event_name LIKE 'wait/io/file/innodb/%' \
                     ORDER BY sum_timer_wait DESC",
                ),
            ],
        }
    }
}

impl SqlOptimize for MySqlCapabilities {
    fn explain_steps(&self, sql: &str) -> Vec<String> {
        vec![format!("EXPLAIN {}", sql)]
    }

    fn table_size_sql(&self, scope: &Scope, tables: &[String]) -> String {
        format!(
            "SELECT TABLE_NAME, TABLE_ROWS, \
             ROUND(DATA_LENGTH / 1024 / 1024, 2) AS DATA_MB, \
             ROUND(INDEX_LENGTH / 1024 / 1024, 2) AS INDEX_MB, \
             ROUND((DATA_LENGTH + INDEX_LENGTH) / 1024 / 1024, 2) AS TOTAL_MB \
             FROM information_schema.TABLES WHERE TABLE_SCHEMA = {} AND TABLE_NAME IN ({}) \
             ORDER BY TABLE_NAME",
            quote_literal(&scope.database),
            literal_list(tables)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        MySqlCapabilities
            .resolve_scope(&PoolConfig::new("mysql", "u", "p", "shop"), None, None)
            .unwrap()
    }

    #[test]
    fn test_scope_defaults_to_config_database() {
        assert_eq!(scope().database, "shop");
        let other = MySqlCapabilities
            .resolve_scope(&PoolConfig::new("mysql", "u", "p", "shop"), Some("crm"), None)
            .unwrap();
        assert_eq!(other.database, "crm");
    }

    #[test]
    fn test_search_all_has_no_filter() {
        let sql = MySqlCapabilities.search_sql(&scope(), None);
        assert!(sql.contains("TABLE_SCHEMA = 'shop'"));
        assert!(!sql.contains("LIKE"));
    }

    #[test]
    fn test_search_keyword_is_escaped() {
        let sql = MySqlCapabilities.search_sql(&scope(), Some("o'rder"));
        assert!(sql.contains("LIKE '%O''RDER%'"));
    }

    #[test]
    fn test_describe_lists_tables() {
        let sql = MySqlCapabilities
            .describe_sql(&scope(), &["orders".to_string(), "customers".to_string()]);
        assert!(sql.contains("TABLE_NAME IN ('orders', 'customers')"));
        assert!(sql.ends_with("ORDER BY TABLE_NAME, ORDINAL_POSITION"));
    }

    #[test]
    fn test_explain_is_single_step() {
        assert_eq!(
            MySqlCapabilities.explain_steps("SELECT 1"),
            vec!["EXPLAIN SELECT 1".to_string()]
        );
    }
}
