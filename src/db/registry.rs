//! Named pool registry.

use crate::config::PoolConfig;
use crate::db::builder::build_pool;
use crate::db::pool::Pool;
use crate::error::DbResult;
use crate::models::PoolStats;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Map of pool name to live pool.
///
/// Mutations take the write lock; pools that leave the map are closed after the lock is
/// released so slow backends never stall lookups.
#[derive(Debug, Clone, Default)]
pub struct PoolRegistry {
    pools: Arc<RwLock<HashMap<String, Arc<Pool>>>>,
}

static GLOBAL: OnceLock<PoolRegistry> = OnceLock::new();

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry, created on first use.
    pub fn global() -> &'static PoolRegistry {
        GLOBAL.get_or_init(PoolRegistry::new)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Pool>> {
        self.pools.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.pools.read().await.contains_key(name)
    }

    /// Build a pool from `config` and register it under `name`.
    pub async fn add(&self, name: &str, config: &PoolConfig) -> DbResult<Arc<Pool>> {
        let pool = Arc::new(build_pool(name, config)?);
        self.insert(Arc::clone(&pool)).await;
        Ok(pool)
    }

    /// Register an already built pool, replacing (and closing) any pool of the same name.
    pub async fn insert(&self, pool: Arc<Pool>) {
        let name = pool.name().to_string();
        let replaced = self.pools.write().await.insert(name.clone(), pool);

        if let Some(old) = replaced {
            info!(pool = %name, "Replacing existing pool");
            old.close().await;
        }
    }

    /// Close and unregister a pool. Returns false when no such pool exists.
    pub async fn remove(&self, name: &str) -> bool {
        let removed = self.pools.write().await.remove(name);
        match removed {
            Some(pool) => {
                pool.close().await;
                info!(pool = %name, "Pool removed");
                true
            }
            None => {
                debug!(pool = %name, "Remove requested for unknown pool");
                false
            }
        }
    }

    /// Register every configured pool, skipping entries that fail to build.
    ///
    /// Pools are built first and then registered under a single write lock, so a
    /// concurrent `add` or `remove` lands entirely before or after the batch. Returns the
    /// number of pools created.
    pub async fn init_from_config(&self, configs: &[(String, PoolConfig)]) -> usize {
        let built: Vec<Arc<Pool>> = configs
            .iter()
            .filter_map(|(name, config)| match build_pool(name, config) {
                Ok(pool) => Some(Arc::new(pool)),
                Err(e) => {
                    warn!(pool = %name, error = %e, "Skipping pool");
                    None
                }
            })
            .collect();
        let created = built.len();

        let replaced: Vec<Arc<Pool>> = {
            let mut pools = self.pools.write().await;
            built
                .into_iter()
                .filter_map(|pool| pools.insert(pool.name().to_string(), pool))
                .collect()
        };
        for old in replaced {
            info!(pool = %old.name(), "Replacing existing pool");
            old.close().await;
        }

        info!(created, configured = configs.len(), "Pool registry initialized");
        created
    }

    pub async fn stats(&self, name: &str) -> Option<PoolStats> {
        self.get(name).await.map(|pool| pool.stats())
    }

    /// Registered pool names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Close every pool and clear the registry.
    pub async fn shutdown_all(&self) {
        let drained: Vec<Arc<Pool>> = {
            let mut pools = self.pools.write().await;
            pools.drain().map(|(_, pool)| pool).collect()
        };

        let count = drained.len();
        for pool in drained {
            pool.close().await;
        }
        info!(count, "All pools closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PoolConfig {
        PoolConfig::new("mysql", "u", "p", "d")
    }

    #[tokio::test]
    async fn test_add_get_remove() {
        let registry = PoolRegistry::new();
        registry.add("p", &config()).await.unwrap();
        assert!(registry.get("p").await.is_some());

        assert!(registry.remove("p").await);
        assert!(registry.get("p").await.is_none());
        assert!(!registry.remove("p").await);
    }

    #[tokio::test]
    async fn test_add_replaces_and_closes_previous() {
        let registry = PoolRegistry::new();
        let first = registry.add("p", &config()).await.unwrap();
        let second = registry.add("p", &config()).await.unwrap();

        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(registry.names().await, vec!["p".to_string()]);
    }

    #[tokio::test]
    async fn test_init_skips_bad_entries() {
        let registry = PoolRegistry::new();
        let configs = vec![
            ("good".to_string(), config()),
            ("bad".to_string(), PoolConfig::new("mysql", "", "", "")),
            ("unknown".to_string(), PoolConfig::new("db2", "u", "p", "d")),
            ("also_good".to_string(), PoolConfig::new("postgresql", "u", "p", "d")),
        ];
        assert_eq!(registry.init_from_config(&configs).await, 2);
        assert_eq!(
            registry.names().await,
            vec!["also_good".to_string(), "good".to_string()]
        );
    }

    #[tokio::test]
    async fn test_shutdown_all_clears() {
        let registry = PoolRegistry::new();
        let pool = registry.add("a", &config()).await.unwrap();
        registry.add("b", &config()).await.unwrap();

        registry.shutdown_all().await;
        assert!(registry.names().await.is_empty());
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_stats_for_unknown_pool() {
        assert!(PoolRegistry::new().stats("missing").await.is_none());
    }
}
