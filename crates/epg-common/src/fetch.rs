//! HTTP client for downloading the compressed guide feed.
//!
//! Downloads stream straight into a named temporary file so the whole feed never sits in
//! memory. Transient failures (timeouts, connect errors, 429, 5xx) are retried with capped
//! exponential backoff; every other failure is returned immediately.
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::CommonError;

#[derive(Clone, Debug)]
pub struct FeedClientConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for FeedClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(10_000),
        }
    }
}

impl FeedClientConfig {
    /// Optional:
    /// - `EPG_FETCH_TIMEOUT_SECS` (default: 300)
    /// - `EPG_FETCH_MAX_RETRIES` (default: 2)
    /// - `EPG_FETCH_RETRY_INITIAL_MS` (default: 500)
    /// - `EPG_FETCH_RETRY_MAX_MS` (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let timeout = std::env::var("EPG_FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let max_retries = std::env::var("EPG_FETCH_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.max_retries);

        let initial_backoff = std::env::var("EPG_FETCH_RETRY_INITIAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_backoff);

        let max_backoff = std::env::var("EPG_FETCH_RETRY_MAX_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_backoff);

        Self {
            timeout,
            max_retries,
            initial_backoff,
            max_backoff,
        }
    }

    /// Pause before retry number `retry` (1-based).
    ///
    /// Doubles from `initial_backoff` up to `max_backoff`, then adds up to a quarter of that
    /// again so that several instances restarted together do not retry in lockstep.
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let doublings = retry.saturating_sub(1).min(31);
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << doublings)
            .min(self.max_backoff);
        base + base.mul_f64(jitter_fraction() / 4.0)
    }
}

/// A value in `[0, 1)` taken from the sub-second part of the wall clock.
fn jitter_fraction() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos) / 1e9
}

#[derive(Clone)]
pub struct FeedClient {
    config: FeedClientConfig,
    http: reqwest::Client,
}

impl FeedClient {
    pub fn new(config: FeedClientConfig) -> Result<Self, CommonError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("epg-server/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &FeedClientConfig {
        &self.config
    }

    /// Download `url` into a temporary `epg_*.gz` file inside `dir`.
    ///
    /// The returned file is removed from disk when dropped. A failed attempt never leaves a
    /// partial file behind.
    pub async fn download(&self, url: &str, dir: &Path) -> Result<NamedTempFile, CommonError> {
        let mut retry = 0;
        loop {
            let err = match self.download_once(url, dir).await {
                Ok(file) => return Ok(file),
                Err(e) => e,
            };
            if retry >= self.config.max_retries || !err.is_transient() {
                return Err(err);
            }
            retry += 1;
            let delay = self.config.retry_delay(retry);
            warn!(
                retry,
                delay_ms = delay.as_millis(),
                error = %err,
                "feed download failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn download_once(&self, url: &str, dir: &Path) -> Result<NamedTempFile, CommonError> {
        let resp = self
            .http
            .get(url)
            .timeout(self.config.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CommonError::Status { status });
        }

        let mut file = tempfile::Builder::new()
            .prefix("epg_")
            .suffix(".gz")
            .tempfile_in(dir)
            .map_err(CommonError::Download)?;

        let mut stream = resp.bytes_stream();
        let mut written: u64 = 0;
        while let Some(next) = stream.next().await {
            let chunk = next?;
            file.write_all(&chunk).map_err(CommonError::Download)?;
            written += chunk.len() as u64;
        }
        file.flush().map_err(CommonError::Download)?;

        info!(
            bytes = written,
            path = %file.path().display(),
            "feed downloaded"
        );
        Ok(file)
    }
}
