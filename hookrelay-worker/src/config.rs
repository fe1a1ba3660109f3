/// Configuration management for the worker
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `WORKER_QUEUE`: queue partition to serve (default: default)
/// - `WORKER_CONCURRENCY`: maximum concurrent deliveries (default: 10)
/// - `WORKER_LEASE_SECONDS`: reservation lease duration (default: 60)
/// - `WORKER_HTTP_TIMEOUT_SECONDS`: per-delivery timeout (default: 30)
/// - `WORKER_POLL_INTERVAL_SECONDS`: idle poll interval (default: 1)
/// - `RUST_LOG`: log level (default: info)
///
/// # Example
///
/// ```no_run
/// use hookrelay_worker::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Serving queue {}", config.orchestrator.queue);
/// # Ok(())
/// # }
/// ```

use std::env;

use hookrelay_shared::db::pool::DatabaseConfig;

use crate::orchestrator::OrchestratorConfig;

/// Complete worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Orchestrator configuration
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `DATABASE_URL` is missing
    /// - An environment variable has an invalid value
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()?;

        let defaults = OrchestratorConfig::default();

        let queue = env::var("WORKER_QUEUE").unwrap_or(defaults.queue);
        let concurrency = env::var("WORKER_CONCURRENCY")
            .unwrap_or_else(|_| defaults.concurrency.to_string())
            .parse::<usize>()?;
        let lease_seconds = env::var("WORKER_LEASE_SECONDS")
            .unwrap_or_else(|_| defaults.lease_seconds.to_string())
            .parse::<i64>()?;
        let http_timeout_seconds = env::var("WORKER_HTTP_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| defaults.http_timeout_seconds.to_string())
            .parse::<u64>()?;
        let poll_interval_seconds = env::var("WORKER_POLL_INTERVAL_SECONDS")
            .unwrap_or_else(|_| defaults.poll_interval_seconds.to_string())
            .parse::<u64>()?;

        if concurrency == 0 {
            anyhow::bail!("WORKER_CONCURRENCY must be at least 1");
        }
        if lease_seconds as u64 <= http_timeout_seconds {
            anyhow::bail!(
                "WORKER_LEASE_SECONDS ({lease_seconds}) must exceed \
                 WORKER_HTTP_TIMEOUT_SECONDS ({http_timeout_seconds})"
            );
        }

        Ok(Self {
            database: DatabaseConfig {
                url: database_url,
                max_connections,
                ..DatabaseConfig::default()
            },
            orchestrator: OrchestratorConfig {
                queue,
                concurrency,
                lease_seconds,
                http_timeout_seconds,
                poll_interval_seconds,
            },
        })
    }
}
