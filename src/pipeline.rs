//! Run orchestration: list -> fetch -> normalize -> upsert.
//!
//! Per-file failures are counted, never raised; the only fatal error is an
//! unreachable listing root. Storage rejecting every single batch ends the
//! run as aborted so operators can tell an outage from "no new data".

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::ingest::normalize::normalize;
use crate::ingest::store::TradingResultsStore;
use crate::models::{CandidateFile, Config, RunResult, RunStatus};
use crate::scrapers::fetch::{FetchCoordinator, FetchOutcome};
use crate::scrapers::http::HttpSource;
use crate::scrapers::listing::ListingClient;

enum IngestReport {
    Upserted(usize),
    Empty,
    ParseFailed,
    StorageFailed,
}

/// Wires the pipeline stages together and aggregates one run's outcome.
pub struct PipelineDriver<S> {
    listing: ListingClient<S>,
    coordinator: FetchCoordinator<S>,
    store: Arc<TradingResultsStore>,
    stop: Arc<AtomicBool>,
    download_dir: PathBuf,
}

impl<S: HttpSource> PipelineDriver<S> {
    pub fn new(source: Arc<S>, store: Arc<TradingResultsStore>, config: &Config) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        Self {
            listing: ListingClient::new(Arc::clone(&source), config.base_url.clone()),
            coordinator: FetchCoordinator::new(
                source,
                config.download_dir.clone(),
                config.start_date,
                config.concurrency,
                Arc::clone(&stop),
            ),
            store,
            stop,
            download_dir: config.download_dir.clone(),
        }
    }

    pub async fn run(&self) -> Result<RunResult> {
        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create download directory {}",
                    self.download_dir.display()
                )
            })?;

        let pages = self
            .listing
            .total_pages()
            .await
            .context("listing root unreachable")?;

        let mut tasks = JoinSet::new();
        let mut listed = 0usize;
        let mut pages_visited = 0usize;

        for page in 1..=pages {
            if self.stop.load(Ordering::SeqCst) {
                debug!("stop flag raised, ending enumeration before page {page}");
                break;
            }

            let candidates = match self.listing.fetch_page(page).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!("failed to list page {page}/{pages}: {e}");
                    continue;
                }
            };

            pages_visited += 1;
            listed += candidates.len();
            for candidate in candidates {
                self.coordinator.schedule(&mut tasks, candidate);
            }
        }

        let mut fetched = 0usize;
        let mut from_cache = 0usize;
        let mut normalized = 0usize;
        let mut rows_upserted = 0usize;
        let mut failed = 0usize;
        let mut batches_ok = 0usize;
        let mut batches_failed = 0usize;

        while let Some(joined) = tasks.join_next().await {
            let (candidate, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("fetch task panicked: {e}");
                    failed += 1;
                    continue;
                }
            };

            let path = match outcome {
                FetchOutcome::Fetched(path) => {
                    fetched += 1;
                    path
                }
                FetchOutcome::Cached(path) => {
                    fetched += 1;
                    from_cache += 1;
                    path
                }
                FetchOutcome::BeforeWatermark => continue,
                FetchOutcome::Failed(e) => {
                    warn!(url = %candidate.url, "fetch failed: {e}");
                    failed += 1;
                    continue;
                }
            };

            match self.ingest_file(&candidate, &path).await {
                IngestReport::Upserted(rows) => {
                    normalized += 1;
                    rows_upserted += rows;
                    batches_ok += 1;
                }
                IngestReport::Empty => normalized += 1,
                IngestReport::ParseFailed => failed += 1,
                IngestReport::StorageFailed => {
                    failed += 1;
                    batches_failed += 1;
                }
            }
        }

        let status = if batches_failed > 0 && batches_ok == 0 {
            RunStatus::Aborted
        } else if self.stop.load(Ordering::SeqCst) {
            RunStatus::Halted
        } else {
            RunStatus::Completed
        };

        let result = RunResult {
            pages: pages_visited,
            listed,
            fetched,
            from_cache,
            normalized,
            rows_upserted,
            failed,
            status,
        };

        info!(
            "run finished: {} listed, {} fetched ({} cached), {} normalized, {} rows upserted, {} failed",
            result.listed,
            result.fetched,
            result.from_cache,
            result.normalized,
            result.rows_upserted,
            result.failed
        );

        Ok(result)
    }

    async fn ingest_file(&self, candidate: &CandidateFile, path: &Path) -> IngestReport {
        let file_name = candidate.file_name().to_string();

        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), "failed to read cached report: {e}");
                return IngestReport::ParseFailed;
            }
        };

        // Workbook decoding is pure CPU work; keep it off the async executor.
        let parsed = tokio::task::spawn_blocking(move || normalize(&file_name, &raw)).await;

        let records = match parsed {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                warn!(file = candidate.file_name(), "normalization failed: {e}");
                return IngestReport::ParseFailed;
            }
            Err(e) => {
                error!(file = candidate.file_name(), "normalization task panicked: {e}");
                return IngestReport::ParseFailed;
            }
        };

        if records.is_empty() {
            debug!(file = candidate.file_name(), "no executed trades in report");
            return IngestReport::Empty;
        }

        match self.store.upsert_batch(&records).await {
            Ok(rows) => {
                info!(file = candidate.file_name(), "upserted {rows} rows");
                IngestReport::Upserted(rows)
            }
            Err(e) => {
                error!(file = candidate.file_name(), "storage rejected batch: {e:#}");
                IngestReport::StorageFailed
            }
        }
    }
}
