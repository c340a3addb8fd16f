//! Bounded-concurrency download pool with watermark-driven early stop.
//!
//! Listings are newest-first, so the first candidate dated before the
//! watermark means everything after it is older material we already have.
//! That assumption is a precondition of the stop rule, not something this
//! module verifies.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::models::{CandidateFile, FetchError};
use crate::scrapers::http::HttpSource;

/// Terminal state of one candidate after the coordinator evaluated it.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Downloaded this run; bytes live at the given cache path.
    Fetched(PathBuf),
    /// Already present in the local cache; no network I/O performed.
    Cached(PathBuf),
    /// Dated before the watermark; raised the stop flag, was not fetched.
    BeforeWatermark,
    /// Fetch failed for this file only; siblings are unaffected.
    Failed(FetchError),
}

/// Schedules candidate downloads under a fixed concurrency bound.
pub struct FetchCoordinator<S> {
    source: Arc<S>,
    download_dir: PathBuf,
    watermark: NaiveDate,
    permits: Arc<Semaphore>,
    stop: Arc<AtomicBool>,
}

impl<S: HttpSource> Clone for FetchCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            download_dir: self.download_dir.clone(),
            watermark: self.watermark,
            permits: Arc::clone(&self.permits),
            stop: Arc::clone(&self.stop),
        }
    }
}

impl<S: HttpSource> FetchCoordinator<S> {
    pub fn new(
        source: Arc<S>,
        download_dir: PathBuf,
        watermark: NaiveDate,
        concurrency: usize,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            download_dir,
            watermark,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            stop,
        }
    }

    /// True once the stop flag has been raised. One-way for the whole run.
    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Schedule one candidate onto the pool.
    ///
    /// Returns `false` without spawning when the stop flag is already
    /// raised; candidates scheduled before that point always run to
    /// completion and report their outcome.
    pub fn schedule(
        &self,
        tasks: &mut JoinSet<(CandidateFile, FetchOutcome)>,
        candidate: CandidateFile,
    ) -> bool {
        if self.stopped() {
            debug!(url = %candidate.url, "stop flag raised, not scheduling");
            return false;
        }

        let coordinator = self.clone();
        tasks.spawn(async move {
            let outcome = coordinator.fetch_one(&candidate).await;
            (candidate, outcome)
        });
        true
    }

    async fn fetch_one(&self, candidate: &CandidateFile) -> FetchOutcome {
        // Files with an unknown date are fetched normally; only a resolved
        // date strictly before the watermark stops the run.
        if let Some(date) = candidate.inferred_date {
            if date < self.watermark {
                if !self.stop.swap(true, Ordering::SeqCst) {
                    info!(
                        %date,
                        watermark = %self.watermark,
                        "reached data older than the watermark, stopping scheduling"
                    );
                }
                return FetchOutcome::BeforeWatermark;
            }
        }

        let path = self.download_dir.join(candidate.file_name());
        if path.exists() {
            debug!(path = %path.display(), "already cached, skipping download");
            return FetchOutcome::Cached(path);
        }

        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return FetchOutcome::Failed(FetchError::Network("download pool closed".into())),
        };

        match self.source.get(&candidate.url).await {
            Ok(bytes) => match tokio::fs::write(&path, &bytes).await {
                Ok(()) => {
                    info!(path = %path.display(), "downloaded report");
                    FetchOutcome::Fetched(path)
                }
                Err(e) => FetchOutcome::Failed(FetchError::Io(e)),
            },
            Err(e) => {
                warn!(url = %candidate.url, "download failed: {e}");
                FetchOutcome::Failed(e)
            }
        }
    }
}
