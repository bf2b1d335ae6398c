mod cache;
mod config;
mod error;
mod index;
mod model;
mod parser;
mod query;
mod schedule;
mod server;
mod snapshot;
mod timestamp;
mod update;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use cache::EpgCache;
use config::Config;
use epg_common::fetch::{FeedClient, FeedClientConfig};
use update::UpdateService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_ansi(false)
        .init();

    info!("starting epg-server");

    // 1. Load config from environment
    let config = Config::from_env()?;
    info!(
        listen_addr = %config.listen_addr,
        url = %config.url,
        download_dir = %config.download_dir.display(),
        cache_file = %config.cache_file.display(),
        timezone = %config.timezone,
        refresh_schedule = %config.refresh_schedule,
        "configuration loaded"
    );
    std::fs::create_dir_all(&config.download_dir)?;

    // 2. Feed client
    let client = FeedClient::new(FeedClientConfig::from_env())?;
    info!(
        timeout_secs = client.config().timeout.as_secs(),
        max_retries = client.config().max_retries,
        "feed client configured"
    );

    // 3. Restore the last snapshot, or build the index from the feed
    let cache = Arc::new(EpgCache::default());
    let updater = Arc::new(UpdateService::new(&config, client, Arc::clone(&cache)));
    updater.restore_or_refresh().await;
    if cache.snapshot().is_empty() {
        tracing::warn!("no guide data yet, queries will miss until the next refresh");
    }

    // 4. Scheduled refresh in the background
    tokio::spawn(schedule::run_scheduled(
        Arc::clone(&updater),
        config.refresh_schedule.clone(),
        config.timezone,
    ));

    // 5. Serve queries
    server::run_server(config.listen_addr, cache).await?;
    Ok(())
}
