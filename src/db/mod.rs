//! Database abstraction layer.
//!
//! This module provides:
//! - Backend drivers behind the [`driver::Connector`] / [`driver::BackendConnection`] traits
//! - Connection pooling ([`Pool`]) and per-dialect pool builders
//! - The named pool registry
//! - Statement classification and execution
//! - Row decoding into JSON values

pub mod builder;
pub mod classifier;
pub mod driver;
pub mod executor;
pub mod pool;
pub mod registry;
pub mod types;

pub use builder::{PoolBuilder, build_pool, builder_for};
pub use executor::{SqlExecutor, StatementKind, classify};
pub use pool::{Pool, PooledConnection};
pub use registry::PoolRegistry;
