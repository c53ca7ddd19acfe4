//! Dameng (DM) capabilities.
//!
//! DM follows Oracle's dictionary layout, but scopes by schema. The schema defaults to
//! the configured one, then the upper-cased login user.

use super::{
    CapabilitySet, DbHealth, DbVersion, HealthCheck, HealthKind, Scope, ScopeRules, SqlOptimize,
    TableDescription, TableIndex, TableNameSearch, explicit, literal_list, quote_literal,
    upper_like_pattern,
};
use crate::config::PoolConfig;
use crate::error::DbResult;
use crate::models::Dialect;

pub struct DamengCapabilities;

pub fn capability_set() -> CapabilitySet {
    CapabilitySet::from_handler(Dialect::Dameng, DamengCapabilities)
}

impl ScopeRules for DamengCapabilities {
    fn resolve_scope(
        &self,
        config: &PoolConfig,
        _database: Option<&str>,
        schema: Option<&str>,
    ) -> DbResult<Scope> {
        let schema = match explicit(schema) {
            Some(schema) => schema.to_string(),
            None => match config.schema.as_deref().filter(|s| !s.is_empty()) {
                Some(schema) => schema.to_string(),
                None => config.user.to_uppercase(),
            },
        };
        Ok(Scope {
            database: config.database.clone(),
            schema,
        })
    }
}

impl DbVersion for DamengCapabilities {
    fn version_sql(&self) -> &'static str {
        "SELECT * FROM V$INSTANCE"
    }
}

impl TableNameSearch for DamengCapabilities {
    fn search_sql(&self, scope: &Scope, keyword: Option<&str>) -> String {
        let mut sql = format!(
            "SELECT OWNER AS TABLE_SCHEMA, TABLE_NAME, COMMENTS AS TABLE_COMMENT \
             FROM ALL_TAB_COMMENTS WHERE OWNER = {} AND TABLE_TYPE = 'TABLE'",
            quote_literal(&scope.schema)
        );
        if let Some(keyword) = keyword {
            sql.push_str(&format!(
                " AND (UPPER(TABLE_NAME) LIKE {p} OR UPPER(COMMENTS) LIKE {p})",
                p = upper_like_pattern(keyword)
            ));
        }
        sql.push_str(" ORDER BY TABLE_NAME");
        sql
    }
}

impl TableDescription for DamengCapabilities {
    fn describe_sql(&self, scope: &Scope, tables: &[String]) -> String {
        format!(
            "SELECT A.TABLE_NAME, A.COLUMN_NAME, A.DATA_TYPE, A.DATA_LENGTH, A.DATA_PRECISION, \
             A.DATA_SCALE, A.NULLABLE, B.COMMENTS \
             FROM ALL_TAB_COLUMNS A \
             LEFT JOIN ALL_COL_COMMENTS B ON A.OWNER = B.SCHEMA_NAME \
             AND A.TABLE_NAME = B.TABLE_NAME AND A.COLUMN_NAME = B.COLUMN_NAME \
             WHERE A.OWNER = {} AND A.TABLE_NAME IN ({}) \
             ORDER BY A.TABLE_NAME, A.COLUMN_ID",
            quote_literal(&scope.schema),
            literal_list(tables)
        )
    }
}

impl TableIndex for DamengCapabilities {
    fn index_sql(&self, scope: &Scope, tables: &[String]) -> String {
        format!(
            "SELECT A.TABLE_NAME, A.INDEX_NAME, A.COLUMN_NAME, A.COLUMN_POSITION AS SEQ_IN_INDEX, \
             CASE WHEN B.UNIQUENESS = 'UNIQUE' THEN 0 ELSE 1 END AS NON_UNIQUE, B.INDEX_TYPE \
             FROM ALL_IND_COLUMNS A \
             JOIN ALL_INDEXES B ON A.INDEX_OWNER = B.OWNER AND A.INDEX_NAME = B.INDEX_NAME \
             AND A.TABLE_NAME = B.TABLE_NAME \
             WHERE A.INDEX_OWNER = {} AND A.TABLE_NAME IN ({}) \
             ORDER BY A.TABLE_NAME, A.INDEX_NAME, A.COLUMN_POSITION",
            quote_literal(&scope.schema),
            literal_list(tables)
        )
    }
}

impl DbHealth for DamengCapabilities {
    fn checks(&self, kind: HealthKind, _config: &PoolConfig) -> Vec<HealthCheck> {
        match kind {
            HealthKind::Connection => vec![
                HealthCheck::new("Sessions", "SELECT * FROM V$SESSIONS"),
                HealthCheck::new(
                    "Session limit",
                    "SELECT PARA_VALUE AS MAX_SESSIONS FROM V$DM_INI WHERE PARA_NAME = 'MAX_SESSIONS'",
                ),
                HealthCheck::new(
                    "Active sessions",
                    "SELECT * FROM V$SESSIONS WHERE STATE = 'ACTIVE'",
                ),
            ],
            HealthKind::Blocking => vec![
                HealthCheck::new(
                    "Locked objects",
                    "SELECT s.CLNT_IP, s.USER_NAME, s.SQL_TEXT, l.LTYPE, l.LMODE, l.BLOCKED, \
                     o.NAME AS TABLE_NAME \
                     FROM V$LOCK l \
                     JOIN V$SESSIONS s ON l.TRX_ID = s.TRX_ID \
                     JOIN SYSOBJECTS o ON l.TABLE_ID = o.ID \
                     ORDER BY l.BLOCKED DESC, l.LMODE",
                ),
                HealthCheck::new(
                    "Blocking chains",
                    "SELECT blocker.SESS_ID AS BLOCKER_SESS_ID, blocker.CLNT_IP AS BLOCKER_IP, \
                     blocker.USER_NAME AS BLOCKER_USER, blocker.SQL_TEXT AS BLOCKER_SQL, \
                     waiter.SESS_ID AS WAITER_SESS_ID, waiter.CLNT_IP AS WAITER_IP, \
                     waiter.USER_NAME AS WAITER_USER, waiter.SQL_TEXT AS WAITER_SQL, \
                     tab.NAME AS LOCKED_TABLE, lk.LTYPE AS LOCK_TYPE, lk.LMODE AS LOCK_MODE \
                     FROM V$TRXWAIT tw \
                     JOIN V$SESSIONS waiter ON tw.ID = waiter.TRX_ID \
                     JOIN V$SESSIONS blocker ON tw.WAIT_FOR_ID = blocker.TRX_ID \
                     JOIN V$LOCK lk ON waiter.TRX_ID = lk.TRX_ID AND lk.BLOCKED = 1 \
                     JOIN SYSOBJECTS tab ON lk.TABLE_ID = tab.ID",
                ),
            ],
            HealthKind::Resources => vec![
                HealthCheck::new(
                    "Buffer pool hit ratio",
                    "SELECT NAME AS BUFFER_POOL_NAME, SUM(PAGE_SIZE) / 1024 AS BUFFER_POOL_SIZE_MB, \
                     SUM(RAT_HIT) / COUNT(*) AS HIT_RATIO FROM V$BUFFERPOOL GROUP BY NAME",
                ),
                HealthCheck::new(
                    "Temporary tablespace",
                    "SELECT DF.ID AS FILE_ID, DF.PATH AS FILE_PATH, \
                     DF.TOTAL_SIZE * DF.PAGE_SIZE / 1024 / 1024 AS TOTAL_SIZE_MB, \
                     DF.FREE_SIZE * DF.PAGE_SIZE / 1024 / 1024 AS FREE_SIZE_MB, \
                     ROUND((DF.TOTAL_SIZE - DF.FREE_SIZE) / GREATEST(DF.TOTAL_SIZE, 1) * 100, 2) AS PCT_USED \
                     FROM V$DATAFILE DF JOIN V$TABLESPACE TS ON DF.GROUP_ID = TS.ID \
                     WHERE TS.NAME = 'TEMP'",
                ),
                HealthCheck::new(
                    "Tablespaces",
                    "SELECT TS.NAME AS TABLESPACE_NAME, \
                     DF.TOTAL_SIZE * DF.PAGE_SIZE / 1024 / 1024 AS TOTAL_SIZE_MB, \
                     (DF.TOTAL_SIZE - DF.FREE_SIZE) * DF.PAGE_SIZE / 1024 / 1024 AS USED_SIZE_MB, \
                     ROUND((DF.TOTAL_SIZE - DF.FREE_SIZE) / GREATEST(DF.TOTAL_SIZE, 1) * 100, 2) AS USED_PERCENTAGE \
                     FROM V$TABLESPACE TS JOIN V$DATAFILE DF ON TS.ID = DF.GROUP_ID",
                ),
                HealthCheck::new(
                    "User IO waits",
                    "SELECT EVENT, TOTAL_WAITS, TIME_WAITED_MICRO / 1000 AS TIME_WAITED_MS, \
                     AVERAGE_WAIT_MICRO / 1000 AS AVG_WAIT_MS FROM V$SYSTEM_EVENT \
                     WHERE WAIT_CLASS = 'User I/O' ORDER BY TIME_WAITED_MICRO DESC",
                ),
                HealthCheck::new(
                    "Memory pools",
                    "SELECT NAME AS MEMORY_POOL, SUM(TOTAL_SIZE) / 1024 / 1024 AS TOTAL_SIZE_MB, \
                     SUM(DATA_SIZE) / 1024 / 1024 AS USED_SIZE_MB, \
                     SUM(RESERVED_SIZE) / 1024 / 1024 AS RESERVED_SIZE_MB \
                     FROM V$MEM_POOL GROUP BY NAME",
                ),
                HealthCheck::new(
                    "Memory pool statistics",
                    "SELECT NAME, STAT_VAL FROM V$SYSSTAT \
                     WHERE NAME IN ('memory pool size in bytes', 'memory pool used bytes')",
                ),
            ],
        }
    }
}

impl SqlOptimize for DamengCapabilities {
    fn explain_steps(&self, sql: &str) -> Vec<String> {
        vec![format!("EXPLAIN FOR {}", sql)]
    }

    fn table_size_sql(&self, scope: &Scope, tables: &[String]) -> String {
        format!(
            "SELECT OWNER, SEGMENT_NAME AS TABLE_NAME, ROUND(SUM(BYTES) / 1024 / 1024, 2) AS SIZE_MB \
             FROM DBA_SEGMENTS WHERE SEGMENT_TYPE = 'TABLE' AND OWNER = {} AND SEGMENT_NAME IN ({}) \
             GROUP BY OWNER, SEGMENT_NAME ORDER BY SUM(BYTES) DESC",
            quote_literal(&scope.schema),
            literal_list(tables)
        )
    }
}
