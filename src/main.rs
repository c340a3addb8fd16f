//! Spimex trading-results ingestor.
//!
//! One run: crawl the results listing, download reports newer than the
//! watermark, normalize them, and upsert the rows into the local database.
//! Configuration comes from the environment (.env supported); the flags
//! below override it for ad-hoc runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spimex_ingest::{Config, PipelineDriver, ReqwestSource, RunStatus, TradingResultsStore};

#[derive(Parser, Debug)]
#[command(name = "spimex-ingest")]
#[command(about = "Harvest Spimex oil-products trading results into a local database")]
struct Args {
    /// SQLite database path (overrides DATABASE_PATH)
    #[arg(long)]
    db: Option<String>,

    /// Report cache directory (overrides DOWNLOAD_DIR)
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Ingest reports dated on or after this day, YYYY-MM-DD (overrides START_DATE)
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Maximum concurrent downloads (overrides DOWNLOAD_CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(db) = args.db {
        config.database_path = db;
    }
    if let Some(dir) = args.download_dir {
        config.download_dir = dir;
    }
    if let Some(start_date) = args.start_date {
        config.start_date = start_date;
    }
    if let Some(concurrency) = args.concurrency.filter(|&c| c > 0) {
        config.concurrency = concurrency;
    }

    info!(
        "starting ingestion run (watermark {}, {} concurrent downloads)",
        config.start_date, config.concurrency
    );
    let started = Instant::now();

    let store = Arc::new(TradingResultsStore::new(&config.database_path)?);
    let source = Arc::new(ReqwestSource::new());
    let driver = PipelineDriver::new(source, store, &config);

    let result = match driver.run().await {
        Ok(result) => result,
        Err(e) => {
            error!("run failed: {e:#}");
            return Err(e);
        }
    };

    info!(
        "run summary: {}",
        serde_json::to_string(&result).unwrap_or_default()
    );
    info!("elapsed: {:.2?}", started.elapsed());

    if result.status == RunStatus::Aborted {
        anyhow::bail!("storage rejected every batch; run aborted");
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spimex_ingest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
