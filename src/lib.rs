pub mod api;
pub mod config;
pub mod document;
pub mod downloader;
pub mod error;
pub mod fetcher;
mod http;
pub mod objects;
pub mod pacing;
pub mod progress;
pub mod rooms;

#[cfg(test)]
mod testing;

use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

pub use api::{MapApi, ScreepsApi};
pub use config::Config;
pub use document::{MapDocument, RoomRecord, SkipReason, SkippedRoom};
pub use downloader::MapDownloader;
pub use error::{ConfigError, Result, ScreepsError};
pub use fetcher::{FetchOutcome, RoomFetcher};

/// Console logging with a `[HH:MM:SS]` prefix. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .with_timer(ChronoLocal::new("[%H:%M:%S]".to_string()))
        .init();
}

pub async fn download(config: Config) -> Result<MapDocument> {
    let api = ScreepsApi::connect(&config.api_settings()).await?;
    MapDownloader::new(config, Arc::new(api)).run().await
}

/// Re-applies room sanitization to a previously downloaded map file.
pub fn clean(input: &Path, output: &Path) -> Result<MapDocument> {
    let mut document = MapDocument::load(input)?;
    document.clean();
    document.save(output)?;
    info!(rooms = document.rooms.len(), "Cleaned map saved to {}", output.display());
    Ok(document)
}
