//! Oracle capabilities.
//!
//! Tables are scoped by owner, which is the configured database unless another one is
//! requested. Names are matched as given, so they must use Oracle's stored case.

use super::{
    CapabilitySet, DbHealth, DbVersion, HealthCheck, HealthKind, Scope, ScopeRules, SqlOptimize,
    TableDescription, TableIndex, TableNameSearch, explicit, literal_list, quote_literal,
    upper_like_pattern,
};
use crate::config::PoolConfig;
use crate::error::DbResult;
use crate::models::Dialect;

pub struct OracleCapabilities;

pub fn capability_set() -> CapabilitySet {
    CapabilitySet::from_handler(Dialect::Oracle, OracleCapabilities)
}

impl ScopeRules for OracleCapabilities {
    fn resolve_scope(
        &self,
        config: &PoolConfig,
        database: Option<&str>,
        _schema: Option<&str>,
    ) -> DbResult<Scope> {
        let owner = explicit(database).unwrap_or(&config.database).to_string();
        Ok(Scope {
            database: owner.clone(),
            schema: owner,
        })
    }
}

impl DbVersion for OracleCapabilities {
    fn version_sql(&self) -> &'static str {
        "SELECT * FROM v$version"
    }
}

impl TableNameSearch for OracleCapabilities {
    fn search_sql(&self, scope: &Scope, keyword: Option<&str>) -> String {
        let mut sql = format!(
            "SELECT owner AS table_schema, table_name, comments AS table_comment \
             FROM all_tab_comments WHERE owner = {}",
            quote_literal(&scope.schema)
        );
        if let Some(keyword) = keyword {
            sql.push_str(&format!(
                " AND (UPPER(table_name) LIKE {p} OR (comments IS NOT NULL AND UPPER(comments) LIKE {p}))",
                p = upper_like_pattern(keyword)
            ));
        }
        sql.push_str(" ORDER BY table_name");
        sql
    }
}

impl TableDescription for OracleCapabilities {
    fn describe_sql(&self, scope: &Scope, tables: &[String]) -> String {
        format!(
            "SELECT col.table_name, col.column_name, col.data_type, com.comments AS column_comment \
             FROM all_tab_cols col \
             LEFT JOIN all_col_comments com ON col.owner = com.owner \
             AND col.table_name = com.table_name AND col.column_name = com.column_name \
             WHERE col.owner = {} AND col.table_name IN ({}) \
             ORDER BY col.table_name, col.column_id",
            quote_literal(&scope.schema),
            literal_list(tables)
        )
    }
}

impl TableIndex for OracleCapabilities {
    fn index_sql(&self, scope: &Scope, tables: &[String]) -> String {
        format!(
            "SELECT i.table_name AS TABLE_NAME, i.index_name AS INDEX_NAME, \
             c.column_name AS COLUMN_NAME, c.column_position AS SEQ_IN_INDEX, \
             CASE WHEN i.uniqueness = 'NONUNIQUE' THEN 1 ELSE 0 END AS NON_UNIQUE, \
             i.index_type AS INDEX_TYPE \
             FROM all_indexes i \
             JOIN all_ind_columns c ON i.index_name = c.index_name \
             AND i.table_owner = c.table_owner AND i.table_name = c.table_name \
             WHERE i.table_owner = {} AND i.table_name IN ({}) \
             ORDER BY i.table_name, i.index_name, c.column_position",
            quote_literal(&scope.schema),
            literal_list(tables)
        )
    }
}

impl DbHealth for OracleCapabilities {
    fn checks(&self, kind: HealthKind, _config: &PoolConfig) -> Vec<HealthCheck> {
        match kind {
            HealthKind::Connection => vec![
                HealthCheck::new(
                    "User sessions",
                    "SELECT s.sid, s.serial#, s.username, s.status, s.osuser, s.machine, s.program, \
                     s.module, s.action, s.client_info, s.logon_time, \
                     ROUND(s.last_call_et / 60, 2) AS last_call_min, s.state AS wait_state, \
                     s.event, s.wait_class, s.seconds_in_wait, s.sql_id, s.prev_sql_id, \
                     s.row_wait_obj# AS row_wait_object_id, s.row_wait_file# AS row_wait_file, \
                     s.row_wait_block# AS row_wait_block, s.blocking_session_status, \
                     s.blocking_instance, s.blocking_session \
                     FROM v$session s WHERE s.type != 'BACKGROUND'",
                ),
                HealthCheck::new(
                    "Process limit usage",
                    "SELECT resource_name, current_utilization, max_utilization, limit_value \
                     FROM v$resource_limit WHERE resource_name = 'processes'",
                ),
            ],
            HealthKind::Blocking => vec![
                HealthCheck::new(
                    "Blocking chains",
                    "WITH blocking_tree AS (\
                     SELECT SYS_CONNECT_BY_PATH(s.sid || '@' || s.inst_id, ' <- ') AS blocking_path, \
                     s.inst_id, s.sid, s.serial#, s.username, s.osuser, s.machine, s.program, \
                     s.status, s.sql_id, s.event, s.blocking_session, s.blocking_instance, \
                     CONNECT_BY_ISLEAF AS is_blocked_end, LEVEL AS blocking_level, \
                     CASE WHEN lo.xidusn IS NOT NULL THEN 'YES' ELSE 'NO' END AS holds_locked_object \
                     FROM gv$session s \
                     LEFT JOIN gv$locked_object lo ON s.sid = lo.session_id AND s.inst_id = lo.inst_id \
                     WHERE s.blocking_session IS NOT NULL \
                     CONNECT BY (s.sid || '@' || s.inst_id) = PRIOR (s.blocking_session || '@' || s.blocking_instance) \
                     START WITH s.blocking_session IS NOT NULL), \
                     sql_texts AS (SELECT DISTINCT sql_id, sql_text FROM gv$sql \
                     WHERE sql_id IN (SELECT sql_id FROM blocking_tree WHERE sql_id IS NOT NULL)) \
                     SELECT bt.blocking_path, bt.inst_id, bt.sid, bt.serial#, bt.username, bt.osuser, \
                     bt.machine, bt.program, bt.status, bt.event, bt.blocking_level, \
                     bt.holds_locked_object, st.sql_text \
                     FROM blocking_tree bt LEFT JOIN sql_texts st ON bt.sql_id = st.sql_id \
                     ORDER BY bt.blocking_level DESC, bt.sid",
                ),
                HealthCheck::new(
                    "Locked objects",
                    "SELECT obj.object_name, lo.session_id, lo.inst_id, lo.oracle_username, \
                     lo.os_user_name, lo.process, lo.locked_mode \
                     FROM gv$locked_object lo JOIN dba_objects obj ON lo.object_id = obj.object_id \
                     ORDER BY lo.inst_id, lo.session_id",
                ),
                HealthCheck::new(
                    "Transactions open longer than 5 minutes",
                    "SELECT s.inst_id, s.sid, s.serial#, s.username, s.status, s.machine, s.program, \
                     t.start_time, \
                     ROUND((SYSDATE - TO_DATE(t.start_time, 'MM/DD/YY HH24:MI:SS')) * 24 * 60, 2) AS duration_minutes, \
                     s.sql_id, sq.sql_text \
                     FROM gv$transaction t \
                     JOIN gv$session s ON t.addr = s.taddr AND t.inst_id = s.inst_id \
                     LEFT JOIN gv$sql sq ON s.sql_id = sq.sql_id AND sq.inst_id = s.inst_id AND sq.child_number = 0 \
                     WHERE (SYSDATE - TO_DATE(t.start_time, 'MM/DD/YY HH24:MI:SS')) * 24 * 60 > 5 \
                     ORDER BY duration_minutes DESC",
                ),
            ],
            HealthKind::Resources => vec![
                HealthCheck::new(
                    "Buffer cache hit ratio",
                    "SELECT (1 - (phy.value / (cur.value + con.value))) * 100 AS buffer_hit_ratio \
                     FROM v$sysstat cur, v$sysstat con, v$sysstat phy \
                     WHERE cur.name = 'db block gets' AND con.name = 'consistent gets' \
                     AND phy.name = 'physical reads'",
                ),
                HealthCheck::new(
                    "Temporary tablespace",
                    "SELECT h.tablespace_name, \
                     ROUND(SUM(h.bytes_used) / 1024 / 1024, 2) AS used_mb, \
                     ROUND(SUM(h.bytes_free) / 1024 / 1024, 2) AS free_mb, \
                     ROUND(SUM(h.bytes_used + h.bytes_free) / 1024 / 1024, 2) AS total_mb, \
                     ROUND((SUM(h.bytes_used) / GREATEST(SUM(h.bytes_used + h.bytes_free), 1)) * 100, 2) AS pct_used \
                     FROM v$temp_space_header h GROUP BY h.tablespace_name",
                ),
                HealthCheck::new(
                    "User IO waits",
                    "SELECT event, total_waits, time_waited * 10 AS time_waited_ms, \
                     average_wait * 10 AS avg_wait_ms FROM v$system_event \
                     WHERE wait_class = 'User I/O' ORDER BY time_waited DESC",
                ),
                HealthCheck::new(
                    "SGA free memory",
                    "SELECT pool, name, ROUND(bytes / 1024 / 1024, 2) AS size_mb FROM v$sgastat \
                     WHERE name = 'free memory' AND pool IN ('shared pool', 'large pool', 'java pool') \
                     ORDER BY pool, bytes DESC",
                ),
                HealthCheck::new(
                    "PGA usage",
                    "SELECT name, ROUND(value / 1024 / 1024, 2) AS mb FROM v$pgastat \
                     WHERE name IN ('aggregate PGA target parameter', 'total PGA allocated', \
                     'total PGA used', 'maximum PGA allocated', 'global memory bound')",
                ),
                HealthCheck::new("SGA size", "SELECT * FROM v$sga"),
            ],
        }
    }
}

impl SqlOptimize for OracleCapabilities {
    /// The plan lands in the session's PLAN_TABLE, so both steps share a connection.
    fn explain_steps(&self, sql: &str) -> Vec<String> {
        vec![
            format!("EXPLAIN PLAN FOR {}", sql),
            "SELECT * FROM TABLE(DBMS_XPLAN.DISPLAY)".to_string(),
        ]
    }

    fn table_size_sql(&self, scope: &Scope, tables: &[String]) -> String {
        format!(
            "SELECT owner, segment_name AS table_name, ROUND(SUM(bytes) / 1024 / 1024, 2) AS size_mb \
             FROM dba_segments WHERE segment_type = 'TABLE' AND owner = {} AND segment_name IN ({}) \
             GROUP BY owner, segment_name ORDER BY SUM(bytes) DESC",
            quote_literal(&scope.schema),
            literal_list(tables)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::classifier::extract_operations;
    use crate::permission::{Role, Verb};

    #[test]
    fn test_owner_is_database() {
        let config = PoolConfig::new("oracle", "scott", "tiger", "HR");
        let scope = OracleCapabilities.resolve_scope(&config, None, Some("ignored")).unwrap();
        assert_eq!(scope.schema, "HR");
        let scope = OracleCapabilities.resolve_scope(&config, Some("SALES"), None).unwrap();
        assert_eq!(scope.schema, "SALES");
    }

    #[test]
    fn test_explain_uses_plan_table() {
        let steps = OracleCapabilities.explain_steps("SELECT * FROM emp");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0], "EXPLAIN PLAN FOR SELECT * FROM emp");
    }

    #[test]
    fn test_health_queries_are_readonly() {
        let config = PoolConfig::new("oracle", "scott", "tiger", "HR");
        let allowed = Role::ReadOnly.default_verbs();
        for kind in HealthKind::ALL {
            for check in OracleCapabilities.checks(kind, &config) {
                for sql in &check.statements {
                    let ops = extract_operations(sql);
                    assert!(ops.is_subset(&allowed), "{}: {:?}", check.label, ops);
                    assert!(ops.contains(&Verb::Select));
                }
            }
        }
    }
}
