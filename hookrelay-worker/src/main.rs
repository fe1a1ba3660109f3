//! # Hookrelay Worker
//!
//! Worker process for Hookrelay: reserves due webhook attempts from its
//! queue partition, executes them against the declared endpoints, and drives
//! the scheduling state machine with the outcomes.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/hookrelay cargo run -p hookrelay-worker
//! ```

use hookrelay_shared::db::migrations::run_migrations;
use hookrelay_shared::db::pool::{close_pool, create_pool};
use hookrelay_worker::config::Config;
use hookrelay_worker::orchestrator::Orchestrator;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hookrelay_worker=debug,hookrelay_shared=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Hookrelay worker v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let pool = create_pool(config.database).await?;
    run_migrations(&pool).await?;

    let orchestrator = Orchestrator::new(pool.clone(), config.orchestrator);
    let shutdown_token = orchestrator.shutdown_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown_token.cancel();
        }
    });

    orchestrator.run().await?;
    close_pool(pool).await;

    Ok(())
}
