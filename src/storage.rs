pub mod sqlite;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::StorageError;
use crate::model::PriceSample;

pub const DEFAULT_WINDOW_HOURS: u32 = 24;

/// Bounded, time-ordered price history keyed by symbol.
pub trait PriceHistory: Send + Sync {
    /// Append a sample, then evict the oldest samples beyond the per-symbol cap.
    fn append(
        &self,
        symbol: &str,
        sample: PriceSample,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>>;

    /// Samples with `timestamp >= now - window_hours`, oldest first.
    fn query(
        &self,
        symbol: &str,
        window_hours: u32,
    ) -> BoxFuture<'_, Result<Vec<PriceSample>, Report<StorageError>>>;

    fn latest(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Option<PriceSample>, Report<StorageError>>>;
}

/// Cut-off timestamp (epoch millis) for a window ending at `now`.
pub fn window_start(now: i64, window_hours: u32) -> i64 {
    now - i64::from(window_hours) * 60 * 60 * 1000
}
