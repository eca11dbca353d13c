//! Durable mirror of the served snapshot
//!
//! The in-memory [`crate::store::SnapshotStore`] stays authoritative for
//! reads. The repository only keeps a copy of the last committed snapshot
//! so a restarted process has something to serve before its first refresh.

use crate::{
    error::StoreError,
    types::{MarketRecord, Snapshot},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

/// Snapshot as read back from durable storage
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub quote_currency: String,
    pub records: Vec<MarketRecord>,
}

#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Replaces everything stored with `snapshot`
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Loads the last saved snapshot, if any
    async fn load(&self) -> Result<Option<StoredSnapshot>, StoreError>;
}

/// SQLite-backed snapshot repository
pub struct SqliteSnapshotRepository {
    pool: SqlitePool,
}

impl SqliteSnapshotRepository {
    /// Opens (creating if needed) the database at `url` and ensures the schema
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wraps an existing pool and ensures the schema
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS snapshot_meta (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  fetched_at TEXT NOT NULL,
  quote_currency TEXT NOT NULL
);
"#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS market_records (
  position INTEGER PRIMARY KEY,
  name TEXT NOT NULL,
  symbol TEXT NOT NULL,
  price REAL NOT NULL,
  market_cap REAL NOT NULL,
  volume_24h REAL NOT NULL,
  percent_change_24h REAL NOT NULL
);
"#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl SnapshotRepository for SqliteSnapshotRepository {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let fetched_at = snapshot.fetched_at.unwrap_or_else(Utc::now);
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM market_records;")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
INSERT INTO snapshot_meta (id, fetched_at, quote_currency)
VALUES (1, ?, ?)
ON CONFLICT(id) DO UPDATE SET
  fetched_at = excluded.fetched_at,
  quote_currency = excluded.quote_currency;
"#,
        )
        .bind(fetched_at)
        .bind(&snapshot.quote_currency)
        .execute(&mut *tx)
        .await?;

        for (position, record) in snapshot.records.iter().enumerate() {
            sqlx::query(
                r#"
INSERT INTO market_records
  (position, name, symbol, price, market_cap, volume_24h, percent_change_24h)
VALUES (?, ?, ?, ?, ?, ?, ?);
"#,
            )
            .bind(position as i64)
            .bind(&record.name)
            .bind(&record.symbol)
            .bind(record.price)
            .bind(record.market_cap)
            .bind(record.volume_24h)
            .bind(record.percent_change_24h)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(count = snapshot.len(), "Persisted snapshot");
        Ok(())
    }

    async fn load(&self) -> Result<Option<StoredSnapshot>, StoreError> {
        let meta = sqlx::query("SELECT fetched_at, quote_currency FROM snapshot_meta WHERE id = 1;")
            .fetch_optional(&self.pool)
            .await?;

        let Some(meta) = meta else {
            return Ok(None);
        };

        let fetched_at: DateTime<Utc> = meta.try_get("fetched_at")?;
        let quote_currency: String = meta.try_get("quote_currency")?;

        let rows = sqlx::query(
            r#"
SELECT name, symbol, price, market_cap, volume_24h, percent_change_24h
FROM market_records
ORDER BY position ASC;
"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(StoredSnapshot {
            fetched_at,
            quote_currency,
            records,
        }))
    }
}

fn row_to_record(r: &sqlx::sqlite::SqliteRow) -> Result<MarketRecord, StoreError> {
    let record = MarketRecord {
        name: r.try_get("name")?,
        symbol: r.try_get("symbol")?,
        price: r.try_get("price")?,
        market_cap: r.try_get("market_cap")?,
        volume_24h: r.try_get("volume_24h")?,
        percent_change_24h: r.try_get("percent_change_24h")?,
    };

    if record.name.is_empty() || record.symbol.is_empty() {
        return Err(StoreError::CorruptRow(format!(
            "empty name or symbol in stored record {:?}",
            record
        )));
    }

    Ok(record)
}
