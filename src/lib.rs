//! Spimex trading-results ingestion pipeline.
//!
//! Crawls the paginated results listing, downloads new daily reports under
//! a concurrency bound, normalizes their tabular content, and upserts the
//! rows into a local database keyed by `(exchange_product_id, date)`.
//! Exposed as a library for the binary and the integration tests.

pub mod dates;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod scrapers;

pub use ingest::store::TradingResultsStore;
pub use models::{CandidateFile, Config, FetchError, ParseError, RunResult, RunStatus, TradingRecord};
pub use pipeline::PipelineDriver;
pub use scrapers::http::{HttpSource, ReqwestSource};
