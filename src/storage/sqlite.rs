use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};

use crate::error::StorageError;
use crate::model::{PriceSample, now_millis};
use crate::storage::{PriceHistory, window_start};

const BUSY_TIMEOUT_SECS: u64 = 5;

pub struct SqliteStorage {
    pool: SqlitePool,
    limit: usize,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path` and run migrations.
    ///
    /// `limit` is the number of samples retained per symbol.
    pub async fn open(path: &Path, limit: usize) -> Result<Self, Report<StorageError>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .change_context(StorageError::Migration)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(StorageError::Migration)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS));

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(StorageError::Migration)
            .attach_with(|| format!("database path: {}", path.display()))?;

        Self::with_pool(pool, limit).await
    }

    /// Run migrations on an existing pool.
    pub async fn with_pool(pool: SqlitePool, limit: usize) -> Result<Self, Report<StorageError>> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StorageError::Migration)?;

        Ok(Self { pool, limit })
    }
}

impl PriceHistory for SqliteStorage {
    fn append(
        &self,
        symbol: &str,
        sample: PriceSample,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .change_context(StorageError::Insert)?;

            sqlx::query("INSERT INTO price_history (symbol, timestamp, price) VALUES (?, ?, ?)")
                .bind(&symbol)
                .bind(sample.timestamp)
                .bind(sample.price)
                .execute(&mut *tx)
                .await
                .change_context(StorageError::Insert)
                .attach_with(|| format!("symbol: {symbol}"))?;

            // Keep only the newest `limit` rows; ties on timestamp fall back to insertion order.
            let trimmed = sqlx::query(
                "DELETE FROM price_history \
                 WHERE symbol = ? AND id NOT IN ( \
                     SELECT id FROM price_history \
                     WHERE symbol = ? \
                     ORDER BY timestamp DESC, id DESC \
                     LIMIT ? \
                 )",
            )
            .bind(&symbol)
            .bind(&symbol)
            .bind(self.limit as i64)
            .execute(&mut *tx)
            .await
            .change_context(StorageError::Insert)
            .attach_with(|| format!("trim symbol: {symbol}"))?
            .rows_affected();

            tx.commit().await.change_context(StorageError::Insert)?;

            if trimmed > 0 {
                tracing::debug!(symbol = %symbol, trimmed, "evicted oldest price samples");
            }
            Ok(())
        })
    }

    fn query(
        &self,
        symbol: &str,
        window_hours: u32,
    ) -> BoxFuture<'_, Result<Vec<PriceSample>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let cutoff = window_start(now_millis(), window_hours);
            let rows: Vec<(i64, f64)> = sqlx::query_as(
                "SELECT timestamp, price FROM price_history \
                 WHERE symbol = ? AND timestamp >= ? \
                 ORDER BY timestamp ASC, id ASC",
            )
            .bind(&symbol)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)
            .attach_with(|| format!("symbol: {symbol}"))?;

            Ok(rows
                .into_iter()
                .map(|(timestamp, price)| PriceSample { price, timestamp })
                .collect())
        })
    }

    fn latest(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Option<PriceSample>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let row: Option<(i64, f64)> = sqlx::query_as(
                "SELECT timestamp, price FROM price_history \
                 WHERE symbol = ? \
                 ORDER BY timestamp DESC, id DESC \
                 LIMIT 1",
            )
            .bind(&symbol)
            .fetch_optional(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            Ok(row.map(|(timestamp, price)| PriceSample { price, timestamp }))
        })
    }
}
