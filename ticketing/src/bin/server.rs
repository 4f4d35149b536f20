//! Cinema ticketing server.
//!
//! This binary:
//! - Loads configuration from the environment (and `.env`)
//! - Starts the Prometheus exporter
//! - Opens the configured stores (in-memory or `PostgreSQL`)
//! - Serves the GraphQL gateway on `/graphql`
//! - Runs the deadline sweeper until shutdown
//!
//! # Usage
//!
//! ```bash
//! # In-memory, remote services on their default ports
//! STORAGE_BACKEND=memory cargo run --bin cinema-server
//!
//! # PostgreSQL
//! DATABASE_URL=postgres://localhost/cinema cargo run --bin cinema-server
//! ```

use cinema_ticketing::{ApplicationBuilder, Config, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let builder = ApplicationBuilder::new().with_tracing()?;

    tracing::info!("Starting cinema ticketing server...");

    let config = Config::from_env()?;
    tracing::info!(
        bind = %config.bind_address(),
        metrics = %config.metrics_address(),
        backend = ?config.storage,
        "Configuration loaded"
    );

    metrics::install_exporter(config.metrics_address().parse()?)?;

    builder
        .with_config(config)
        .with_resources()
        .await?
        .with_collaborators()?
        .build()
        .await?
        .run()
        .await
}
