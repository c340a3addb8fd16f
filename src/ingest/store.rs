//! Durable store for normalized trading results.
//!
//! One table, keyed naturally by `(exchange_product_id, date)`. Batches are
//! committed per file in a single transaction; batches for distinct files
//! are independent, so one failure never rolls back a sibling's commit.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info};

use crate::models::TradingRecord;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS spimex_trading_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    exchange_product_id TEXT NOT NULL,
    exchange_product_name TEXT NOT NULL,
    oil_id TEXT NOT NULL,
    delivery_basis_id TEXT NOT NULL,
    delivery_basis_name TEXT NOT NULL,
    delivery_type_id TEXT NOT NULL,
    volume REAL NOT NULL,
    total REAL NOT NULL,
    count INTEGER NOT NULL,
    date TEXT NOT NULL,
    created_on TEXT NOT NULL DEFAULT (datetime('now')),
    updated_on TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (exchange_product_id, date)
);

CREATE INDEX IF NOT EXISTS idx_spimex_date
    ON spimex_trading_results (date);

CREATE INDEX IF NOT EXISTS idx_spimex_product_id
    ON spimex_trading_results (exchange_product_id);
"#;

const UPSERT_SQL: &str = "INSERT INTO spimex_trading_results (
    exchange_product_id, exchange_product_name, oil_id,
    delivery_basis_id, delivery_basis_name, delivery_type_id,
    volume, total, count, date
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT (exchange_product_id, date) DO UPDATE SET
    exchange_product_name = excluded.exchange_product_name,
    oil_id = excluded.oil_id,
    delivery_basis_id = excluded.delivery_basis_id,
    delivery_basis_name = excluded.delivery_basis_name,
    delivery_type_id = excluded.delivery_type_id,
    volume = excluded.volume,
    total = excluded.total,
    count = excluded.count,
    updated_on = datetime('now')";

/// SQLite-backed sink with idempotent per-key upserts.
pub struct TradingResultsStore {
    conn: Arc<Mutex<Connection>>,
}

impl TradingResultsStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize trading results schema")?;

        let existing: i64 = conn
            .query_row("SELECT COUNT(*) FROM spimex_trading_results", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        info!("📊 Trading results store ready at {db_path} ({existing} existing rows)");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Upsert one file's batch in a single transaction.
    ///
    /// Key collisions overwrite every non-key field and refresh
    /// `updated_on`. Returns the number of rows affected.
    pub async fn upsert_batch(&self, records: &[TradingRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .context("Failed to open upsert transaction")?;

        let mut affected = 0usize;
        {
            let mut stmt = tx
                .prepare_cached(UPSERT_SQL)
                .context("Failed to prepare upsert statement")?;
            for record in records {
                affected += stmt.execute(params![
                    record.exchange_product_id,
                    record.exchange_product_name,
                    record.oil_id,
                    record.delivery_basis_id,
                    record.delivery_basis_name,
                    record.delivery_type_id,
                    record.volume,
                    record.total,
                    record.count,
                    record.date.to_string(),
                ])?;
            }
        }

        tx.commit().context("Failed to commit upsert batch")?;

        debug!("📦 Upserted batch of {affected} rows");
        Ok(affected)
    }

    /// Current row count.
    pub fn len(&self) -> usize {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM spimex_trading_results", [], |row| {
            row.get::<_, i64>(0)
        })
        .unwrap_or(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up one row by its natural key.
    pub fn get(&self, exchange_product_id: &str, date: NaiveDate) -> Result<Option<TradingRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT exchange_product_id, exchange_product_name, oil_id,
                    delivery_basis_id, delivery_basis_name, delivery_type_id,
                    volume, total, count, date
             FROM spimex_trading_results
             WHERE exchange_product_id = ?1 AND date = ?2",
        )?;

        let mut rows = stmt.query(params![exchange_product_id, date.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        Ok(Some(Self::row_to_record(row)?))
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<TradingRecord> {
        let date_text: String = row.get(9)?;
        let date = NaiveDate::parse_from_str(&date_text, "%Y-%m-%d")
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        Ok(TradingRecord {
            exchange_product_id: row.get(0)?,
            exchange_product_name: row.get(1)?,
            oil_id: row.get(2)?,
            delivery_basis_id: row.get(3)?,
            delivery_basis_name: row.get(4)?,
            delivery_type_id: row.get(5)?,
            volume: row.get(6)?,
            total: row.get(7)?,
            count: row.get(8)?,
            date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, volume: f64) -> TradingRecord {
        TradingRecord {
            exchange_product_id: id.to_string(),
            exchange_product_name: "Бензин (АИ-92-К5)".to_string(),
            oil_id: id.chars().take(4).collect(),
            delivery_basis_id: id.chars().skip(4).take(3).collect(),
            delivery_basis_name: "ст. Анисовка".to_string(),
            delivery_type_id: id.chars().last().map(String::from).unwrap_or_default(),
            volume,
            total: volume * 80_000.0,
            count: 2,
            date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        }
    }

    #[tokio::test]
    async fn double_ingest_is_idempotent() {
        let store = TradingResultsStore::new(":memory:").expect("Failed to create store");
        let batch = vec![record("A100ANK060F", 60.0), record("A592ACH005A", 120.0)];

        assert_eq!(store.upsert_batch(&batch).await.unwrap(), 2);
        assert_eq!(store.len(), 2);

        store.upsert_batch(&batch).await.unwrap();
        assert_eq!(store.len(), 2);

        let row = store
            .get("A100ANK060F", NaiveDate::from_ymd_opt(2023, 1, 1).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(row.volume, 60.0);
    }

    #[tokio::test]
    async fn key_collision_updates_in_place() {
        let store = TradingResultsStore::new(":memory:").expect("Failed to create store");

        store.upsert_batch(&[record("A100ANK060F", 60.0)]).await.unwrap();
        store.upsert_batch(&[record("A100ANK060F", 90.0)]).await.unwrap();

        assert_eq!(store.len(), 1);
        let row = store
            .get("A100ANK060F", NaiveDate::from_ymd_opt(2023, 1, 1).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(row.volume, 90.0);
        assert_eq!(row.total, 90.0 * 80_000.0);
    }

    #[tokio::test]
    async fn same_product_on_different_days_keeps_both_rows() {
        let store = TradingResultsStore::new(":memory:").expect("Failed to create store");

        let monday = record("A100ANK060F", 60.0);
        let mut tuesday = record("A100ANK060F", 75.0);
        tuesday.date = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();

        store.upsert_batch(&[monday, tuesday]).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let store = TradingResultsStore::new(":memory:").expect("Failed to create store");
        assert_eq!(store.upsert_batch(&[]).await.unwrap(), 0);
        assert!(store.is_empty());
    }
}
