//! Integration tests for dialect capabilities over a stub backend.

mod common;

use common::{StubBackend, register, register_backend};
use sqlgate::capabilities::{CapabilityRegistry, SEARCH_ALL_TABLES};
use sqlgate::config::PoolConfig;
use sqlgate::db::{PoolRegistry, SqlExecutor};
use sqlgate::error::DbError;
use sqlgate::permission::PermissionPolicy;
use std::sync::Arc;

fn pool_config(dialect: &str, schema: Option<&str>) -> PoolConfig {
    let mut config = PoolConfig::new(dialect, "app", "secret", "shop");
    config.schema = schema.map(str::to_string);
    config
}

async fn setup(dialect: &str, schema: Option<&str>) -> (SqlExecutor, StubBackend) {
    let registry = PoolRegistry::new();
    let backend = register(&registry, "main", pool_config(dialect, schema)).await;
    let executor = SqlExecutor::new(registry, PermissionPolicy::default(), "readonly");
    (executor, backend)
}

#[tokio::test]
async fn test_resolve_by_pool_name_follows_config() {
    let (executor, _backend) = setup("sqlserver", None).await;
    let caps = CapabilityRegistry::global()
        .resolve_by_pool_name(executor.registry(), "main")
        .await
        .unwrap();
    let again = CapabilityRegistry::global().resolve_by_dialect("mssql").unwrap();
    assert!(Arc::ptr_eq(&caps, &again));
}

#[tokio::test]
async fn test_unknown_dialect_key() {
    let err = CapabilityRegistry::global()
        .resolve_by_dialect("informix")
        .unwrap_err();
    assert!(matches!(err, DbError::UnsupportedDialect { ref dialect } if dialect == "informix"));
}

#[tokio::test]
async fn test_postgres_schema_defaults_to_config() {
    let (executor, backend) = setup("postgresql", Some("sales")).await;
    let caps = CapabilityRegistry::global().resolve_by_dialect("postgresql").unwrap();

    caps.table_names
        .search(&executor, "main", None, None, SEARCH_ALL_TABLES)
        .await
        .unwrap();

    let log = backend.statements();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("schemaname = 'sales'"), "{}", log[0]);
    assert!(!log[0].contains("LIKE"));
}

#[tokio::test]
async fn test_postgres_schema_falls_back_to_public() {
    let (executor, backend) = setup("postgresql", None).await;
    let caps = CapabilityRegistry::global().resolve_by_dialect("postgres").unwrap();

    caps.table_description
        .describe(&executor, "main", None, None, "orders, customers")
        .await
        .unwrap();

    let log = backend.statements();
    assert!(log[0].contains("'public'"), "{}", log[0]);
    assert!(log[0].contains("'orders', 'customers'"), "{}", log[0]);
}

#[tokio::test]
async fn test_postgres_rejects_other_database() {
    let (executor, backend) = setup("postgresql", None).await;
    let caps = CapabilityRegistry::global().resolve_by_dialect("postgresql").unwrap();

    let err = caps
        .table_index
        .list(&executor, "main", Some("warehouse"), None, "orders")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::CrossDatabase { .. }));
    assert!(backend.statements().is_empty());
}

#[tokio::test]
async fn test_keyword_search_filters() {
    let (executor, backend) = setup("mysql", None).await;
    let caps = CapabilityRegistry::global().resolve_by_dialect("mysql").unwrap();

    let text = caps
        .table_names
        .search(&executor, "main", None, None, "order")
        .await
        .unwrap();

    let log = backend.statements();
    assert!(log[0].contains("TABLE_SCHEMA = 'shop'"));
    assert!(log[0].contains("'%ORDER%'"));
    assert!(text.starts_with("statement\n"));
}

#[tokio::test]
async fn test_keyword_wildcards_match_literally() {
    for dialect in ["mysql", "postgresql", "oracle", "mssql", "dameng"] {
        let (executor, backend) = setup(dialect, None).await;
        let caps = CapabilityRegistry::global().resolve_by_dialect(dialect).unwrap();
        caps.table_names
            .search(&executor, "main", None, None, "user_role")
            .await
            .unwrap();
        let log = backend.statements();
        assert!(log[0].contains("LIKE '%USER!_ROLE%' ESCAPE '!'"), "{}: {}", dialect, log[0]);
    }
}

#[tokio::test]
async fn test_empty_table_list_is_rejected() {
    let (executor, backend) = setup("mysql", None).await;
    let caps = CapabilityRegistry::global().resolve_by_dialect("mysql").unwrap();

    let err = caps
        .optimize
        .get_table_size(&executor, "main", None, None, " , ")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidArgument { .. }));
    assert!(backend.statements().is_empty());
}

#[tokio::test]
async fn test_health_sections() {
    let (executor, backend) = setup("mysql", None).await;
    let caps = CapabilityRegistry::global().resolve_by_dialect("mysql").unwrap();

    let text = caps.health.check(&executor, "main", "connection").await.unwrap();
    assert!(text.starts_with("- Current and maximum connections\n"));
    assert!(text.contains("SHOW FULL PROCESSLIST"));
    assert!(!text.contains("Execution failed"));
    assert_eq!(backend.statements().len(), 6);

    let all = caps.health.check(&executor, "main", "all").await.unwrap();
    assert_eq!(all.matches("\n\n- ").count(), 2);

    let err = caps.health.check(&executor, "main", "disk").await.unwrap_err();
    assert!(matches!(err, DbError::InvalidArgument { .. }));
}

#[tokio::test]
async fn test_mysql_explain_single_statement() {
    let (executor, backend) = setup("mysql", None).await;
    let caps = CapabilityRegistry::global().resolve_by_dialect("mysql").unwrap();

    let text = caps
        .optimize
        .explain(&executor, "main", "SELECT * FROM orders;")
        .await
        .unwrap();
    assert_eq!(text, "statement\nEXPLAIN SELECT * FROM orders");
    assert_eq!(backend.statements(), vec!["EXPLAIN SELECT * FROM orders"]);
}

#[tokio::test]
async fn test_postgres_explain_runs_in_rolled_back_session() {
    let (executor, backend) = setup("postgresql", None).await;
    let caps = CapabilityRegistry::global().resolve_by_dialect("postgresql").unwrap();

    caps.optimize
        .explain(&executor, "main", "SELECT * FROM orders")
        .await
        .unwrap();
    assert_eq!(
        backend.statements(),
        vec!["BEGIN", "EXPLAIN ANALYZE SELECT * FROM orders", "ROLLBACK"]
    );
    assert_eq!(backend.opened(), 1);
}

#[tokio::test]
async fn test_explain_respects_permissions() {
    let (executor, backend) = setup("postgresql", None).await;
    let caps = CapabilityRegistry::global().resolve_by_dialect("postgresql").unwrap();

    let text = caps
        .optimize
        .explain(&executor, "main", "DELETE FROM orders")
        .await
        .unwrap();
    assert!(text.contains("Permission denied"));
    assert!(backend.statements().is_empty());
}

#[tokio::test]
async fn test_backend_failure_is_reported_as_text() {
    let registry = PoolRegistry::new();
    let backend =
        register_backend(&registry, "main", pool_config("mysql", None), StubBackend::new()).await;
    let executor = SqlExecutor::new(registry, PermissionPolicy::default(), "readonly");
    let caps = CapabilityRegistry::global().resolve_by_dialect("mysql").unwrap();

    let text = caps
        .table_description
        .describe(&executor, "main", Some("BAD SQL"), None, "orders")
        .await
        .unwrap();
    assert!(text.starts_with("Execution failed: "));
    assert_eq!(backend.statements().len(), 1);
}

#[tokio::test]
async fn test_unknown_pool() {
    let (executor, _backend) = setup("mysql", None).await;
    let caps = CapabilityRegistry::global().resolve_by_dialect("mysql").unwrap();
    let err = caps
        .table_names
        .search(&executor, "ghost", None, None, "x")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::PoolNotFound { .. }));
}
