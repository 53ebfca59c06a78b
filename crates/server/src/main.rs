//! bloom-sw entry point.
//!
//! Boots a registration for the configured shell, runs the initial install,
//! then serves JSON-lines events on stdio. Logging goes to stderr so stdout
//! carries only replies.

use std::sync::Arc;

use anyhow::Result;
use bloom_client::{FetchConfig, HttpNetwork, Registration};
use bloom_core::{AppConfig, CacheDb};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

mod error;
mod protocol;
mod serve;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(origin = %config.origin, db = %config.db_path.display(), "Starting bloom-sw on stdio");

    let cache = CacheDb::open(&config.db_path).await?.with_quota(config.quota_bytes);
    let network = Arc::new(HttpNetwork::new(FetchConfig::from(&config))?);
    let mut registration = Registration::new(config, cache, network);

    let report = registration.install().await?;
    tracing::info!(worker = report.worker, precached = report.precached, state = %report.state, "initial install done");

    serve::run(registration, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    Ok(())
}
