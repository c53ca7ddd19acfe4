//! Integration tests for pool bounds and timeouts.

mod common;

use common::{StubBackend, register_backend, stub_config};
use sqlgate::config::PoolConfig;
use sqlgate::db::{Pool, PoolRegistry, SqlExecutor};
use sqlgate::error::DbError;
use sqlgate::models::PoolType;
use sqlgate::permission::PermissionPolicy;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn bounded_config(pool_size: u32, max_overflow: u32, timeout_secs: u64) -> PoolConfig {
    PoolConfig {
        pool_size: Some(pool_size),
        max_overflow: Some(max_overflow),
        pool_timeout: Some(timeout_secs),
        ..stub_config("readonly")
    }
}

#[tokio::test]
async fn test_oversubscribed_pool_times_out() {
    let backend = StubBackend::new();
    let pool = Pool::new("tight", bounded_config(1, 1, 1), Arc::new(backend.clone()));

    let _a = pool.acquire().await.unwrap();
    let _b = pool.acquire().await.unwrap();
    assert_eq!(pool.stats().checked_out, 2);
    assert_eq!(pool.stats().overflow, 1);

    let start = Instant::now();
    let err = pool.acquire().await.unwrap_err();
    let waited = start.elapsed();

    assert!(matches!(err, DbError::PoolTimeout { ref pool, elapsed_secs: 1 } if pool == "tight"));
    assert!(waited >= Duration::from_millis(900), "returned too early: {:?}", waited);
    assert!(waited < Duration::from_secs(3), "waited too long: {:?}", waited);
    assert_eq!(backend.opened(), 2);
}

#[tokio::test]
async fn test_waiter_gets_released_connection() {
    let backend = StubBackend::new();
    let pool = Arc::new(Pool::new("one", bounded_config(1, 0, 5), Arc::new(backend.clone())));

    let held = pool.acquire().await.unwrap();
    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(held);

    tokio_test::assert_ok!(waiter.await.unwrap());
    assert_eq!(backend.opened(), 1);
}

#[tokio::test]
async fn test_concurrent_statements_respect_capacity() {
    let registry = PoolRegistry::new();
    let backend = register_backend(
        &registry,
        "busy",
        bounded_config(2, 0, 10),
        StubBackend::with_delay(Duration::from_millis(20)),
    )
    .await;
    let executor = SqlExecutor::new(registry, PermissionPolicy::default(), "readonly");

    let mut handles = Vec::new();
    for i in 0..8 {
        let executor = executor.clone();
        handles.push(tokio::spawn(async move {
            executor.execute("busy", &format!("SELECT {}", i)).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().success);
    }

    assert!(backend.opened() <= 2);
    assert_eq!(backend.statements().len(), 8);
}

#[tokio::test]
async fn test_singleton_serializes_leases() {
    let backend = StubBackend::new();
    let config = PoolConfig {
        pool_type: Some(PoolType::Singleton),
        ..bounded_config(5, 5, 1)
    };
    let pool = Pool::new("single", config, Arc::new(backend.clone()));

    let held = pool.acquire().await.unwrap();
    assert!(matches!(
        pool.acquire().await,
        Err(DbError::PoolTimeout { .. })
    ));
    drop(held);
    tokio_test::assert_ok!(pool.acquire().await);
    assert_eq!(backend.opened(), 1);
}

#[tokio::test]
async fn test_null_pool_never_retains() {
    let backend = StubBackend::new();
    let config = PoolConfig {
        pool_type: Some(PoolType::Null),
        ..stub_config("readonly")
    };
    let pool = Pool::new("null", config, Arc::new(backend.clone()));

    for _ in 0..3 {
        drop(pool.acquire().await.unwrap());
    }
    assert_eq!(backend.opened(), 3);
    assert_eq!(pool.stats().checked_in, 0);
}
