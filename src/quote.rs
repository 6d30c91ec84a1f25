pub mod alpha_vantage;
pub mod mock;

use futures::future::BoxFuture;

use crate::model::FetchOutcome;

/// Abstraction over an external stock quote provider.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn QuoteSource`).
pub trait QuoteSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the source can reach its provider (credentials present).
    fn is_configured(&self) -> bool;

    /// Fetch the current price for `symbol`.
    ///
    /// Never fails: transport errors, throttling and missing data are all
    /// folded into the returned `FetchOutcome`.
    fn fetch_price(&self, symbol: &str) -> BoxFuture<'_, FetchOutcome>;
}
