use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::QuoteConfig;
use crate::model::FetchOutcome;
use crate::quote::QuoteSource;

const DEFAULT_BASE_PRICE: f64 = 100.0;
const DEFAULT_RANGE: f64 = 5.0;

/// Synthetic prices around a per-symbol base, for demos and offline runs.
pub struct MockQuoteSource {
    base_prices: HashMap<String, f64>,
    range: f64,
    rng: Mutex<StdRng>,
}

impl MockQuoteSource {
    pub fn new(overrides: HashMap<String, f64>, range: f64) -> Self {
        Self::with_rng(overrides, range, StdRng::from_entropy())
    }

    pub fn from_config(config: &QuoteConfig) -> Self {
        Self::new(config.mock_base_prices.clone(), config.mock_range)
    }

    fn with_rng(overrides: HashMap<String, f64>, range: f64, rng: StdRng) -> Self {
        let mut base_prices: HashMap<String, f64> =
            [("AMZN".to_owned(), 210.0), ("AAPL".to_owned(), 275.0)]
                .into_iter()
                .collect();
        base_prices.extend(overrides);

        Self {
            base_prices,
            range: if range.is_finite() && range >= 0.0 {
                range
            } else {
                DEFAULT_RANGE
            },
            rng: Mutex::new(rng),
        }
    }

    fn next_price(&self, symbol: &str) -> f64 {
        let base = self
            .base_prices
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_BASE_PRICE);
        let unit: f64 = match self.rng.lock() {
            Ok(mut rng) => rng.r#gen(),
            Err(poisoned) => poisoned.into_inner().r#gen(),
        };
        let variation = (unit - 0.5) * 2.0 * self.range;
        // Keep the quote positive even for tiny bases with a wide range.
        let price = (base + variation).max(0.01);
        (price * 100.0).round() / 100.0
    }
}

impl QuoteSource for MockQuoteSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn fetch_price(&self, symbol: &str) -> BoxFuture<'_, FetchOutcome> {
        let price = self.next_price(symbol);
        tracing::debug!(symbol, price, "mock quote generated");
        Box::pin(async move { FetchOutcome::Price(price) })
    }
}
