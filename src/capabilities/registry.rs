//! Dialect to capability-set lookup.

use super::{CapabilitySet, dameng, mssql, mysql, oracle, postgres};
use crate::db::PoolRegistry;
use crate::error::{DbError, DbResult};
use crate::models::Dialect;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Lazily built, cached capability sets, one slot per dialect.
///
/// The factory table is a plain `match`; dialects never register themselves.
pub struct CapabilityRegistry {
    slots: [OnceLock<Arc<CapabilitySet>>; 5],
}

static GLOBAL: OnceLock<CapabilityRegistry> = OnceLock::new();

fn factory(dialect: Dialect) -> fn() -> CapabilitySet {
    match dialect {
        Dialect::MySql => mysql::capability_set,
        Dialect::PostgreSql => postgres::capability_set,
        Dialect::Oracle => oracle::capability_set,
        Dialect::MsSql => mssql::capability_set,
        Dialect::Dameng => dameng::capability_set,
    }
}

fn slot_index(dialect: Dialect) -> usize {
    match dialect {
        Dialect::MySql => 0,
        Dialect::PostgreSql => 1,
        Dialect::Oracle => 2,
        Dialect::MsSql => 3,
        Dialect::Dameng => 4,
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            slots: [const { OnceLock::new() }; 5],
        }
    }

    pub fn global() -> &'static CapabilityRegistry {
        GLOBAL.get_or_init(CapabilityRegistry::new)
    }

    /// Cached set for `dialect`, built on first request.
    pub fn resolve(&self, dialect: Dialect) -> Arc<CapabilitySet> {
        self.slots[slot_index(dialect)]
            .get_or_init(|| {
                debug!(dialect = %dialect, "Instantiating capability set");
                Arc::new(factory(dialect)())
            })
            .clone()
    }

    /// Resolve a configuration key such as `postgres` or `sqlserver`.
    pub fn resolve_by_dialect(&self, key: &str) -> DbResult<Arc<CapabilitySet>> {
        Ok(self.resolve(Dialect::from_key(key)?))
    }

    /// Resolve the dialect configured for a registered pool.
    pub async fn resolve_by_pool_name(
        &self,
        pools: &PoolRegistry,
        pool_name: &str,
    ) -> DbResult<Arc<CapabilitySet>> {
        let pool = pools
            .get(pool_name)
            .await
            .ok_or_else(|| DbError::pool_not_found(pool_name))?;
        Ok(self.resolve(pool.config().dialect()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_is_cached() {
        let registry = CapabilityRegistry::new();
        let a = registry.resolve_by_dialect("postgresql").unwrap();
        let b = registry.resolve_by_dialect("Postgres").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.dialect, Dialect::PostgreSql);
    }

    #[test]
    fn test_every_dialect_has_a_set() {
        let registry = CapabilityRegistry::new();
        for dialect in Dialect::ALL {
            assert_eq!(registry.resolve(dialect).dialect, dialect);
        }
    }

    #[test]
    fn test_unknown_dialect() {
        let err = CapabilityRegistry::new().resolve_by_dialect("sqlite").unwrap_err();
        assert!(matches!(err, DbError::UnsupportedDialect { .. }));
    }

    #[tokio::test]
    async fn test_unknown_pool() {
        let err = CapabilityRegistry::new()
            .resolve_by_pool_name(&PoolRegistry::new(), "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::PoolNotFound { .. }));
    }
}
