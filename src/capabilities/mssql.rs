//! SQL Server capabilities.
//!
//! Catalog views are addressed through a `[database].` prefix so any database on the
//! server can be inspected from one pool. The schema defaults to the configured one,
//! then `dbo`.

use super::{
    CapabilitySet, DbHealth, DbVersion, HealthCheck, HealthKind, Scope, ScopeRules, SqlOptimize,
    TableDescription, TableIndex, TableNameSearch, explicit, literal_list, quote_literal,
    upper_like_pattern,
};
use crate::config::PoolConfig;
use crate::error::DbResult;
use crate::models::Dialect;

pub const DEFAULT_SCHEMA: &str = "dbo";

pub struct MsSqlCapabilities;

pub fn capability_set() -> CapabilitySet {
    CapabilitySet::from_handler(Dialect::MsSql, MsSqlCapabilities)
}

/// `[name]` with embedded `]` doubled.
fn bracket(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

impl ScopeRules for MsSqlCapabilities {
    fn resolve_scope(
        &self,
        config: &PoolConfig,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> DbResult<Scope> {
        let database = explicit(database).unwrap_or(&config.database);
        let schema = explicit(schema).unwrap_or_else(|| config.schema_or(DEFAULT_SCHEMA));
        Ok(Scope {
            database: database.to_string(),
            schema: schema.to_string(),
        })
    }
}

impl DbVersion for MsSqlCapabilities {
    fn version_sql(&self) -> &'static str {
        "SELECT @@VERSION AS version"
    }
}

impl TableNameSearch for MsSqlCapabilities {
    fn search_sql(&self, scope: &Scope, keyword: Option<&str>) -> String {
        let db = bracket(&scope.database);
        let mut sql = format!(
            "SELECT s.name AS TABLE_SCHEMA, t.name AS TABLE_NAME, \
             CAST(ep.value AS NVARCHAR(500)) AS TABLE_COMMENT \
             FROM {db}.sys.tables t \
             INNER JOIN {db}.sys.schemas s ON t.schema_id = s.schema_id \
             LEFT JOIN {db}.sys.extended_properties ep ON t.object_id = ep.major_id \
             AND ep.minor_id = 0 AND ep.name = 'MS_Description' \
             WHERE s.name = {schema}",
            db = db,
            schema = quote_literal(&scope.schema)
        );
        if let Some(keyword) = keyword {
            sql.push_str(&format!(
                " AND (UPPER(t.name) LIKE {p} OR UPPER(CAST(ep.value AS NVARCHAR(500))) LIKE {p})",
                p = upper_like_pattern(keyword)
            ));
        }
        sql.push_str(" ORDER BY t.name");
        sql
    }
}

impl TableDescription for MsSqlCapabilities {
    fn describe_sql(&self, scope: &Scope, tables: &[String]) -> String {
        let db = bracket(&scope.database);
        format!(
            "SELECT t.name AS TABLE_NAME, c.name AS COLUMN_NAME, ty.name AS DATA_TYPE, \
             ISNULL(CAST(ep.value AS NVARCHAR(4000)), '') AS COLUMN_COMMENT \
             FROM {db}.sys.columns c \
             INNER JOIN {db}.sys.tables t ON c.object_id = t.object_id \
             INNER JOIN {db}.sys.schemas s ON t.schema_id = s.schema_id \
             INNER JOIN {db}.sys.types ty ON c.user_type_id = ty.user_type_id \
             LEFT JOIN {db}.sys.extended_properties ep ON ep.major_id = c.object_id \
             AND ep.minor_id = c.column_id AND ep.name = 'MS_Description' \
             WHERE s.name = {schema} AND t.name IN ({tables}) \
             ORDER BY t.name, c.column_id",
            db = db,
            schema = quote_literal(&scope.schema),
            tables = literal_list(tables)
        )
    }
}

impl TableIndex for MsSqlCapabilities {
    fn index_sql(&self, scope: &Scope, tables: &[String]) -> String {
        let db = bracket(&scope.database);
        format!(
            "SELECT t.name AS TABLE_NAME, i.name AS INDEX_NAME, c.name AS COLUMN_NAME, \
             ic.key_ordinal AS SEQ_IN_INDEX, \
             CASE WHEN i.is_unique = 0 THEN 1 ELSE 0 END AS NON_UNIQUE, \
             i.type_desc AS INDEX_TYPE \
             FROM {db}.sys.indexes i \
             INNER JOIN {db}.sys.index_columns ic ON i.object_id = ic.object_id AND i.index_id = ic.index_id \
             INNER JOIN {db}.sys.columns c ON ic.object_id = c.object_id AND ic.column_id = c.column_id \
             INNER JOIN {db}.sys.tables t ON i.object_id = t.object_id \
             INNER JOIN {db}.sys.schemas s ON t.schema_id = s.schema_id \
             WHERE s.name = {schema} AND t.name IN ({tables}) AND i.type_desc != 'HEAP' \
             ORDER BY t.name, i.name, ic.key_ordinal",
            db = db,
            schema = quote_literal(&scope.schema),
            tables = literal_list(tables)
        )
    }
}

impl DbHealth for MsSqlCapabilities {
    fn checks(&self, kind: HealthKind, _config: &PoolConfig) -> Vec<HealthCheck> {
        match kind {
            HealthKind::Connection => vec![
                HealthCheck::new(
                    "Sessions",
                    "SELECT s.session_id, s.login_name, s.host_name, s.program_name, \
                     s.client_interface_name, s.login_time, s.last_request_start_time, \
                     s.last_request_end_time, s.status, s.cpu_time, s.memory_usage, s.reads, \
                     s.writes, s.logical_reads \
                     FROM sys.dm_exec_sessions s WHERE s.is_user_process = 1 \
                     ORDER BY s.last_request_start_time DESC",
                ),
                HealthCheck::new(
                    "Connection limit",
                    "SELECT name, value, value_in_use FROM sys.configurations \
                     WHERE name = 'user connections'",
                ),
            ],
            HealthKind::Blocking => vec![
                HealthCheck::new(
                    "Blocked requests",
                    "SELECT r.session_id AS waiting_session_id, r.blocking_session_id, r.wait_type, \
                     r.wait_time, r.wait_resource, t.text AS waiting_sql_text, r.status, r.command, \
                     r.cpu_time, r.logical_reads \
                     FROM sys.dm_exec_requests r CROSS APPLY sys.dm_exec_sql_text(r.sql_handle) t \
                     WHERE r.blocking_session_id <> 0",
                ),
                HealthCheck::new(
                    "Lock waits",
                    "SELECT tl.request_session_id AS waiting_session_id, wt.blocking_session_id, \
                     DB_NAME(tl.resource_database_id) AS database_name, tl.resource_type, \
                     tl.resource_subtype, tl.resource_description, \
                     tl.request_mode AS requested_lock_mode, tl.request_status, \
                     s.login_name AS waiting_user, s.host_name AS waiting_host, \
                     s.program_name AS waiting_program, b.login_name AS blocking_user, \
                     b.host_name AS blocking_host, b.program_name AS blocking_program \
                     FROM sys.dm_tran_locks tl \
                     INNER JOIN sys.dm_os_waiting_tasks wt ON tl.lock_owner_address = wt.resource_address \
                     INNER JOIN sys.dm_exec_sessions s ON tl.request_session_id = s.session_id \
                     INNER JOIN sys.dm_exec_sessions b ON wt.blocking_session_id = b.session_id \
                     WHERE tl.request_status = 'WAIT'",
                ),
                HealthCheck::new(
                    "Blocking sessions",
                    "SELECT s.session_id AS blocking_session_id, s.login_name, s.host_name, \
                     s.program_name, s.login_time, s.last_request_start_time, \
                     s.last_request_end_time, s.status, s.cpu_time, s.memory_usage, s.reads, \
                     s.writes, s.logical_reads, st.text AS blocking_sql_text \
                     FROM sys.dm_exec_sessions s \
                     LEFT JOIN sys.dm_exec_requests r ON r.session_id = s.session_id \
                     OUTER APPLY sys.dm_exec_sql_text(r.sql_handle) st \
                     WHERE s.is_user_process = 1 AND s.session_id IN \
                     (SELECT blocking_session_id FROM sys.dm_exec_requests WHERE blocking_session_id <> 0)",
                ),
            ],
            HealthKind::Resources => vec![
                HealthCheck::new(
                    "Buffer cache hit ratio",
                    "SELECT (CAST(SUM(CASE WHEN counter_name = 'Buffer cache hit ratio' THEN cntr_value ELSE 0 END) AS FLOAT) / \
                     NULLIF(CAST(SUM(CASE WHEN counter_name = 'Buffer cache hit ratio base' THEN cntr_value ELSE 0 END) AS FLOAT), 0)) * 100 \
                     AS buffer_cache_hit_ratio \
                     FROM sys.dm_os_performance_counters \
                     WHERE object_name LIKE '%Buffer Manager%' \
                     AND counter_name IN ('Buffer cache hit ratio', 'Buffer cache hit ratio base')",
                ),
                HealthCheck::new(
                    "Page life expectancy",
                    "SELECT instance_name AS database_name, counter_name, cntr_value \
                     FROM sys.dm_os_performance_counters \
                     WHERE object_name LIKE '%Buffer Manager%' \
                     AND counter_name IN ('Free pages', 'Page life expectancy')",
                ),
                HealthCheck::new(
                    "tempdb usage",
                    "SELECT SUM(user_object_reserved_page_count) * 8 / 1024 AS user_objects_mb, \
                     SUM(internal_object_reserved_page_count) * 8 / 1024 AS internal_objects_mb, \
                     SUM(unallocated_extent_page_count) * 8 / 1024 AS free_mb \
                     FROM tempdb.sys.dm_db_file_space_usage",
                ),
                HealthCheck::new(
                    "Memory",
                    "SELECT counter_name, cntr_value, 'KB' AS unit \
                     FROM sys.dm_os_performance_counters \
                     WHERE object_name LIKE '%Memory Manager%' AND instance_name = '' \
                     AND counter_name IN ('Total Server Memory (KB)', 'Target Server Memory (KB)', \
                     'Database Cache Memory (KB)', 'Free Memory (KB)', 'Stolen Memory (KB)')",
                ),
                HealthCheck::new(
                    "File IO",
                    "SELECT file_id, io_stall_read_ms, num_of_reads, io_stall_write_ms, num_of_writes \
                     FROM sys.dm_io_virtual_file_stats(DB_ID(), NULL)",
                ),
            ],
        }
    }
}

impl SqlOptimize for MsSqlCapabilities {
    /// With `SHOWPLAN_TEXT` on, the statement is compiled but not run.
    fn explain_steps(&self, sql: &str) -> Vec<String> {
        vec![
            "SET SHOWPLAN_TEXT ON".to_string(),
            sql.to_string(),
            "SET SHOWPLAN_TEXT OFF".to_string(),
        ]
    }

    fn table_size_sql(&self, scope: &Scope, tables: &[String]) -> String {
        let db = bracket(&scope.database);
        format!(
            "SELECT s.name AS TABLE_SCHEMA, t.name AS TABLE_NAME, \
             SUM(CASE WHEN ps.index_id IN (0, 1) THEN ps.row_count ELSE 0 END) AS TABLE_ROWS, \
             CAST(SUM(ps.reserved_page_count) * 8.0 / 1024 AS DECIMAL(18, 2)) AS TOTAL_MB \
             FROM {db}.sys.dm_db_partition_stats ps \
             INNER JOIN {db}.sys.tables t ON ps.object_id = t.object_id \
             INNER JOIN {db}.sys.schemas s ON t.schema_id = s.schema_id \
             WHERE s.name = {schema} AND t.name IN ({tables}) \
             GROUP BY s.name, t.name ORDER BY TOTAL_MB DESC",
            db = db,
            schema = quote_literal(&scope.schema),
            tables = literal_list(tables)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PoolConfig {
        PoolConfig::new("mssql", "sa", "pw", "Sales")
    }

    #[test]
    fn test_scope_defaults() {
        let scope = MsSqlCapabilities.resolve_scope(&config(), None, None).unwrap();
        assert_eq!(scope.database, "Sales");
        assert_eq!(scope.schema, "dbo");

        let scope = MsSqlCapabilities
            .resolve_scope(&config(), Some("Archive"), Some("hist"))
            .unwrap();
        assert_eq!(scope.database, "Archive");
        assert_eq!(scope.schema, "hist");
    }

    #[test]
    fn test_bracket_escapes() {
        assert_eq!(bracket("odd]name"), "[odd]]name]");
    }

    #[test]
    fn test_search_uses_database_prefix_and_valid_filter() {
        let scope = MsSqlCapabilities.resolve_scope(&config(), None, None).unwrap();
        let sql = MsSqlCapabilities.search_sql(&scope, Some("cust"));
        assert!(sql.contains("FROM [Sales].sys.tables t"));
        assert!(sql.contains("AND (UPPER(t.name) LIKE '%CUST%'"));
        assert!(!sql.contains("AND ( AND"));
    }

    #[test]
    fn test_explain_toggles_showplan() {
        let steps = MsSqlCapabilities.explain_steps("SELECT 1");
        assert_eq!(
            steps,
            vec![
                "SET SHOWPLAN_TEXT ON".to_string(),
                "SELECT 1".to_string(),
                "SET SHOWPLAN_TEXT OFF".to_string()
            ]
        );
    }
}
