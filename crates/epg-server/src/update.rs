//! Ingestion pipeline for the guide feed.
//!
//! One run goes Fetch -> Decompress -> Parse -> Build -> Persist -> Install. Any failure
//! before Install aborts the run and leaves the cache as it was; a Persist failure is logged
//! and the run still installs. Runs are serialised, and every file a run creates is removed
//! when it ends.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::cache::EpgCache;
use crate::config::Config;
use crate::error::AppError;
use crate::index::build_index;
use crate::model::CacheIndex;
use crate::parser::parse_document_file;
use crate::snapshot::SnapshotStore;
use epg_common::error::CommonError;
use epg_common::fetch::FeedClient;
use epg_common::gzip::gunzip_to_dir;

/// Summary of a successful refresh.
#[derive(Debug, Clone)]
pub struct RefreshReport {
    /// `<channel>` entries in the feed.
    pub channels: usize,
    /// Channels reachable by display name.
    pub named_channels: usize,
    /// Programme items installed.
    pub programmes: usize,
    pub elapsed: Duration,
}

pub struct UpdateService {
    url: String,
    download_dir: PathBuf,
    timezone: Tz,
    client: FeedClient,
    cache: Arc<EpgCache>,
    snapshots: SnapshotStore,
    run_lock: Mutex<()>,
}

impl UpdateService {
    pub fn new(config: &Config, client: FeedClient, cache: Arc<EpgCache>) -> Self {
        Self {
            url: config.url.clone(),
            download_dir: config.download_dir.clone(),
            timezone: config.timezone,
            client,
            cache,
            snapshots: SnapshotStore::new(config.cache_file.clone()),
            run_lock: Mutex::new(()),
        }
    }

    /// Run the pipeline once. Waits for any run already in progress to finish first.
    pub async fn refresh(&self) -> Result<RefreshReport, AppError> {
        let _running = self.run_lock.lock().await;
        let started = Instant::now();
        info!(url = %self.url, "refresh started");

        match self.run_pipeline(started).await {
            Ok(report) => {
                info!(
                    channels = report.channels,
                    named_channels = report.named_channels,
                    programmes = report.programmes,
                    elapsed_ms = report.elapsed.as_millis(),
                    "refresh complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(stage = failed_stage(&e), error = %e, "refresh failed, keeping previous index");
                Err(e)
            }
        }
    }

    /// Install the on-disk snapshot, or run one refresh if there is no usable snapshot.
    ///
    /// Never fails: if the refresh also fails the cache stays empty until the next run.
    pub async fn restore_or_refresh(&self) {
        let snapshots = self.snapshots.clone();
        let loaded = tokio::task::spawn_blocking(move || snapshots.load())
            .await
            .map_err(AppError::from)
            .and_then(|r| r);

        match loaded {
            Ok(index) => {
                info!(
                    path = %self.snapshots.path().display(),
                    named_channels = index.named_channel_count(),
                    programmes = index.programme_count(),
                    "restored snapshot"
                );
                self.cache.replace(index);
            }
            Err(e) => {
                warn!(error = %e, "no usable snapshot, running initial refresh");
                if self.refresh().await.is_err() {
                    warn!("initial refresh failed, serving an empty index until the next run");
                }
            }
        }
    }

    async fn run_pipeline(&self, started: Instant) -> Result<RefreshReport, AppError> {
        info!(stage = "fetch", "pipeline stage");
        let archive = self.client.download(&self.url, &self.download_dir).await?;

        let dir = self.download_dir.clone();
        let tz = self.timezone;
        let snapshots = self.snapshots.clone();
        let (index, channels) = tokio::task::spawn_blocking(move || {
            info!(stage = "decompress", "pipeline stage");
            let working = gunzip_to_dir(archive.path(), &dir)?;
            drop(archive);

            info!(stage = "parse", "pipeline stage");
            let doc = parse_document_file(&working)?;
            drop(working);
            info!(
                generator = doc.generator_info_name.as_deref().unwrap_or(""),
                generator_url = doc.generator_info_url.as_deref().unwrap_or(""),
                source = doc.source_info_name.as_deref().unwrap_or(""),
                source_url = doc.source_info_url.as_deref().unwrap_or(""),
                channels = doc.channels.len(),
                programmes = doc.programmes.len(),
                "guide document parsed"
            );
            let channels = doc.channels.len();

            info!(stage = "build", "pipeline stage");
            let index = build_index(doc, tz);

            info!(stage = "persist", "pipeline stage");
            if let Err(e) = snapshots.save(&index) {
                warn!(error = %e, "snapshot not saved, continuing");
            }
            Ok::<(CacheIndex, usize), AppError>((index, channels))
        })
        .await??;

        let report = RefreshReport {
            channels,
            named_channels: index.named_channel_count(),
            programmes: index.programme_count(),
            elapsed: started.elapsed(),
        };
        self.cache.replace(index);
        Ok(report)
    }
}

fn failed_stage(err: &AppError) -> &'static str {
    match err {
        AppError::Common(e) if e.is_fetch() => "fetch",
        AppError::Common(CommonError::Decompress(_)) | AppError::Common(CommonError::Io(_)) => {
            "decompress"
        }
        AppError::Document { .. } | AppError::Io(_) => "parse",
        _ => "pipeline",
    }
}
