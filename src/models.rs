use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One normalized row of a daily trading-results report.
///
/// The natural key is `(exchange_product_id, date)`; everything else is
/// overwritten on re-ingestion of the same report day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingRecord {
    pub exchange_product_id: String,
    pub exchange_product_name: String,
    pub oil_id: String,
    pub delivery_basis_id: String,
    pub delivery_basis_name: String,
    pub delivery_type_id: String,
    pub volume: f64,
    pub total: f64,
    pub count: i64,
    pub date: NaiveDate,
}

/// A report file discovered on a listing page. Transient: lives only for
/// the duration of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub url: String,
    /// Date parsed from the file name; `None` means ordering unknown.
    pub inferred_date: Option<NaiveDate>,
}

impl CandidateFile {
    /// Final path segment of the URL, used as the local cache file name.
    pub fn file_name(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(self.url.as_str())
    }
}

/// How one pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every listed candidate was evaluated.
    Completed,
    /// The watermark was reached and scheduling stopped early.
    Halted,
    /// Storage rejected every batch; nothing was committed.
    Aborted,
}

/// Aggregate outcome of one pipeline run, returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub pages: usize,
    pub listed: usize,
    pub fetched: usize,
    pub from_cache: usize,
    pub normalized: usize,
    pub rows_upserted: usize,
    pub failed: usize,
    pub status: RunStatus,
}

/// Failure to retrieve a listing page or a report file.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected http status {0}")]
    Status(u16),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to turn one downloaded report into trading records.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("report could not be decoded as a workbook: {0}")]
    Workbook(String),
    #[error("data block anchor row not found")]
    AnchorNotFound,
    #[error("required columns missing: {missing:?}")]
    MissingColumns { missing: Vec<String> },
    #[error("no date in file name: {0}")]
    NoDateInFilename(String),
}

const DEFAULT_BASE_URL: &str = "https://spimex.com/markets/oil_products/trades/results/";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub download_dir: PathBuf,
    pub database_path: String,
    /// Inclusive watermark: files dated before this day stop the crawl.
    pub start_date: NaiveDate,
    pub concurrency: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let base_url =
            std::env::var("SPIMEX_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let download_dir = std::env::var("DOWNLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./downloads"));

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./spimex.db".to_string());

        let start_date = match std::env::var("START_DATE") {
            Ok(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .with_context(|| format!("START_DATE is not a YYYY-MM-DD date: {raw}"))?,
            Err(_) => NaiveDate::from_ymd_opt(2025, 3, 1).expect("valid default start date"),
        };

        let concurrency = std::env::var("DOWNLOAD_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(5);

        Ok(Self {
            base_url,
            download_dir,
            database_path,
            start_date,
            concurrency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_last_path_segment() {
        let candidate = CandidateFile {
            url: "https://spimex.com/upload/reports/oil_xls/oil_xls_20230101162000.xls".to_string(),
            inferred_date: None,
        };
        assert_eq!(candidate.file_name(), "oil_xls_20230101162000.xls");
    }
}
