pub mod normalize; // Workbook bytes -> normalized trading records
pub mod store; // Idempotent per-key upserts into SQLite

pub use normalize::normalize;
pub use store::TradingResultsStore;
