//! Scripted in-memory backend shared by the integration tests.
//!
//! Every statement a connection receives is appended to a shared log. Query-type
//! statements answer with one row echoing the statement; anything containing
//! `BAD SQL` fails.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use sqlgate::config::PoolConfig;
use sqlgate::db::driver::{BackendConnection, Connector};
use sqlgate::db::{Pool, PoolRegistry, SqlExecutor};
use sqlgate::error::{DbError, DbResult};
use sqlgate::models::RowSet;
use sqlgate::permission::PermissionPolicy;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FAILING_SQL: &str = "BAD SQL";

#[derive(Debug, Default, Clone)]
pub struct StubBackend {
    pub log: Arc<Mutex<Vec<String>>>,
    pub opened: Arc<AtomicU32>,
    pub delay: Option<Duration>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn opened(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for StubBackend {
    fn target(&self) -> String {
        "stub://memory".to_string()
    }

    async fn connect(&self) -> DbResult<Box<dyn BackendConnection>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubConnection {
            backend: self.clone(),
        }))
    }
}

struct StubConnection {
    backend: StubBackend,
}

impl StubConnection {
    async fn record(&self, sql: &str) -> DbResult<()> {
        self.backend.log.lock().unwrap().push(sql.to_string());
        if let Some(delay) = self.backend.delay {
            tokio::time::sleep(delay).await;
        }
        if sql.contains(FAILING_SQL) {
            return Err(DbError::backend(
                format!("syntax error near '{}'", sql),
                Some("42000".to_string()),
                "Check the SQL syntax",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BackendConnection for StubConnection {
    async fn query(&mut self, sql: &str) -> DbResult<RowSet> {
        self.record(sql).await?;
        Ok(RowSet::new(vec!["statement".to_string()], vec![vec![json!(sql)]]))
    }

    async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        self.record(sql).await?;
        Ok(1)
    }

    async fn ping(&mut self) -> DbResult<()> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        Ok(())
    }
}

/// A MySQL-flavoured pool configuration.
pub fn stub_config(role: &str) -> PoolConfig {
    let mut config = PoolConfig::new("mysql", "app", "secret", "shop");
    config.role = Some(role.to_string());
    config
}

/// Register a stub-backed pool named `name` and return its backend.
pub async fn register(registry: &PoolRegistry, name: &str, config: PoolConfig) -> StubBackend {
    register_backend(registry, name, config, StubBackend::new()).await
}

pub async fn register_backend(
    registry: &PoolRegistry,
    name: &str,
    config: PoolConfig,
    backend: StubBackend,
) -> StubBackend {
    let pool = Pool::new(name, config, Arc::new(backend.clone()));
    registry.insert(Arc::new(pool)).await;
    backend
}

/// Executor over a fresh registry holding one stub pool named `main`.
pub async fn executor_with_role(role: &str) -> (SqlExecutor, StubBackend) {
    let registry = PoolRegistry::new();
    let backend = register(&registry, "main", stub_config(role)).await;
    let executor = SqlExecutor::new(registry, PermissionPolicy::default(), role);
    (executor, backend)
}
