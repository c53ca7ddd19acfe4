//! sqlgate - main entry point.
//!
//! Loads the pool configuration, registers every pool, runs one command against the
//! selected pool and prints its text result.

use clap::Parser;
use sqlgate::capabilities::{CapabilityRegistry, CapabilitySet};
use sqlgate::config::{Command, Config, active_role, load_pool_configs};
use sqlgate::db::{PoolRegistry, SqlExecutor};
use sqlgate::error::{DbError, DbResult, render};
use sqlgate::format::render_all;
use sqlgate::permission::PermissionPolicy;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber. `RUST_LOG` overrides `--log-level`.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn capabilities(executor: &SqlExecutor, pool: &str) -> DbResult<Arc<CapabilitySet>> {
    CapabilityRegistry::global()
        .resolve_by_pool_name(executor.registry(), pool)
        .await
}

async fn run(config: &Config, executor: &SqlExecutor) -> DbResult<String> {
    let pool = config.pool.as_str();

    match &config.command {
        Command::Exec { sql, format } => {
            let results = executor.execute_multiple(pool, sql).await;
            Ok(render_all(&results, *format))
        }
        Command::Pools => Ok(executor.registry().names().await.join("\n")),
        Command::Stats => executor
            .registry()
            .stats(pool)
            .await
            .map(|s| s.to_string())
            .ok_or_else(|| DbError::pool_not_found(pool)),
        Command::Version => {
            capabilities(executor, pool)
                .await?
                .version
                .get_version(executor, pool)
                .await
        }
        Command::Tables {
            keyword,
            database,
            schema,
        } => {
            capabilities(executor, pool)
                .await?
                .table_names
                .search(executor, pool, database.as_deref(), schema.as_deref(), keyword)
                .await
        }
        Command::Describe {
            tables,
            database,
            schema,
        } => {
            capabilities(executor, pool)
                .await?
                .table_description
                .describe(executor, pool, database.as_deref(), schema.as_deref(), tables)
                .await
        }
        Command::Indexes {
            tables,
            database,
            schema,
        } => {
            capabilities(executor, pool)
                .await?
                .table_index
                .list(executor, pool, database.as_deref(), schema.as_deref(), tables)
                .await
        }
        Command::Health { kind } => {
            capabilities(executor, pool)
                .await?
                .health
                .check(executor, pool, kind)
                .await
        }
        Command::Explain { sql } => {
            capabilities(executor, pool)
                .await?
                .optimize
                .explain(executor, pool, sql)
                .await
        }
        Command::Size {
            tables,
            database,
            schema,
        } => {
            capabilities(executor, pool)
                .await?
                .optimize
                .get_table_size(executor, pool, database.as_deref(), schema.as_deref(), tables)
                .await
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting sqlgate");

    let configs = load_pool_configs(&config.config_file, config.configs_json.as_deref())?;
    if configs.is_empty() {
        eprintln!("Error: no pools configured.");
        eprintln!();
        eprintln!("Provide a JSON object of pool name -> settings, either as a file:");
        eprintln!("  sqlgate --config-file database_config.json exec 'SELECT 1'");
        eprintln!("or inline through DATABASE_CONFIGS:");
        eprintln!(
            "  DATABASE_CONFIGS='{{\"default\":{{\"type\":\"mysql\",\"user\":\"root\",\"password\":\"pw\",\"database\":\"shop\"}}}}' sqlgate version"
        );
        std::process::exit(1);
    }

    let policy = match &config.permissions {
        Some(path) => PermissionPolicy::from_file(path)?,
        None => PermissionPolicy::default(),
    };

    let registry = PoolRegistry::global().clone();
    let registered = registry.init_from_config(&configs).await;
    info!(pools = registered, "Registered pools");

    let executor = SqlExecutor::new(registry.clone(), policy, active_role(&configs))
        .with_per_pool_roles(config.per_pool_roles);

    let outcome = run(&config, &executor).await;
    registry.shutdown_all().await;

    if let Err(e) = &outcome {
        error!(error = %e, "Command failed");
    }
    println!("{}", render(outcome));
    Ok(())
}
