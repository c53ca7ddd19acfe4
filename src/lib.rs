//! sqlgate library
//!
//! Named connection pools over MySQL, PostgreSQL, Oracle, SQL Server and Dameng, a
//! permission-checked SQL executor on top of them, and per-dialect catalog and health
//! capabilities that return plain text.

pub mod capabilities;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod models;
pub mod permission;

pub use capabilities::CapabilityRegistry;
pub use config::{Config, PoolConfig};
pub use db::{PoolRegistry, SqlExecutor};
pub use error::{DbError, DbResult};
pub use permission::{PermissionPolicy, Role, Verb};
