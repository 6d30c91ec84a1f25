//! In-process doubles for the quote, history and notifier seams.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use error_stack::Report;
use futures::future::BoxFuture;
use tokio::time::Instant;

use crate::config::StockConfig;
use crate::error::{NotifyError, StorageError};
use crate::model::{AlertType, FetchFailure, FetchOutcome, PriceSample};
use crate::notifier::{Notifier, NotifyReceipt};
use crate::quote::QuoteSource;
use crate::storage::{PriceHistory, window_start};

pub fn stock(symbol: &str, lower: f64, upper: f64, enabled: bool) -> StockConfig {
    StockConfig {
        symbol: symbol.into(),
        name: format!("{symbol} Inc."),
        lower_threshold: lower,
        upper_threshold: upper,
        enabled,
    }
}

/// Replays queued outcomes per symbol; unknown or drained symbols get `NoQuote`.
#[derive(Default)]
pub struct ScriptedQuotes {
    script: Mutex<HashMap<String, VecDeque<FetchOutcome>>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedQuotes {
    pub fn with(entries: &[(&str, FetchOutcome)]) -> Self {
        let quotes = Self::default();
        for (symbol, outcome) in entries {
            quotes.push(symbol, outcome.clone());
        }
        quotes
    }

    pub fn push(&self, symbol: &str, outcome: FetchOutcome) {
        self.script
            .lock()
            .unwrap()
            .entry(symbol.to_owned())
            .or_default()
            .push_back(outcome);
    }

    pub fn called_symbols(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(symbol, _)| symbol.clone())
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

impl QuoteSource for ScriptedQuotes {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn fetch_price(&self, symbol: &str) -> BoxFuture<'_, FetchOutcome> {
        self.calls
            .lock()
            .unwrap()
            .push((symbol.to_owned(), Instant::now()));
        let outcome = self
            .script
            .lock()
            .unwrap()
            .get_mut(symbol)
            .and_then(VecDeque::pop_front)
            .unwrap_or(FetchOutcome::Failed(FetchFailure::NoQuote));
        Box::pin(async move { outcome })
    }
}

/// Panics on every fetch, standing in for a bug inside a monitor cycle.
pub struct PanickingQuotes;

impl QuoteSource for PanickingQuotes {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn fetch_price(&self, symbol: &str) -> BoxFuture<'_, FetchOutcome> {
        panic!("quote source blew up fetching {symbol}");
    }
}

/// Unbounded history kept in a vector, for tests that run on a paused clock.
#[derive(Default)]
pub struct MemoryHistory {
    samples: Mutex<Vec<(String, PriceSample)>>,
}

impl MemoryHistory {
    pub fn samples_for(&self, symbol: &str) -> Vec<PriceSample> {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == symbol)
            .map(|(_, sample)| *sample)
            .collect()
    }
}

impl PriceHistory for MemoryHistory {
    fn append(
        &self,
        symbol: &str,
        sample: PriceSample,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        self.samples
            .lock()
            .unwrap()
            .push((symbol.to_owned(), sample));
        Box::pin(async { Ok(()) })
    }

    fn query(
        &self,
        symbol: &str,
        window_hours: u32,
    ) -> BoxFuture<'_, Result<Vec<PriceSample>, Report<StorageError>>> {
        let cutoff = window_start(crate::model::now_millis(), window_hours);
        let mut samples: Vec<PriceSample> = self
            .samples_for(symbol)
            .into_iter()
            .filter(|s| s.timestamp >= cutoff)
            .collect();
        samples.sort_by_key(|s| s.timestamp);
        Box::pin(async move { Ok(samples) })
    }

    fn latest(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Option<PriceSample>, Report<StorageError>>> {
        let latest = self
            .samples_for(symbol)
            .into_iter()
            .max_by_key(|s| s.timestamp);
        Box::pin(async move { Ok(latest) })
    }
}

/// History whose backing store is always unavailable.
pub struct FailingHistory;

impl PriceHistory for FailingHistory {
    fn append(
        &self,
        _symbol: &str,
        _sample: PriceSample,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        Box::pin(async { Err(Report::new(StorageError::Insert)) })
    }

    fn query(
        &self,
        _symbol: &str,
        _window_hours: u32,
    ) -> BoxFuture<'_, Result<Vec<PriceSample>, Report<StorageError>>> {
        Box::pin(async { Err(Report::new(StorageError::Query)) })
    }

    fn latest(
        &self,
        _symbol: &str,
    ) -> BoxFuture<'_, Result<Option<PriceSample>, Report<StorageError>>> {
        Box::pin(async { Err(Report::new(StorageError::Query)) })
    }
}

/// Records every alert; fails for symbols listed in `failing`.
#[derive(Default)]
pub struct RecordingNotifier {
    pub failing: Vec<String>,
    sent: Mutex<Vec<(String, f64, AlertType)>>,
}

impl RecordingNotifier {
    pub fn failing_for(symbols: &[&str]) -> Self {
        Self {
            failing: symbols.iter().map(|s| s.to_string()).collect(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(String, f64, AlertType)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn notify<'a>(
        &'a self,
        stock: &'a StockConfig,
        price: f64,
        alert_type: AlertType,
    ) -> BoxFuture<'a, Result<NotifyReceipt, Report<NotifyError>>> {
        Box::pin(async move {
            if self.failing.contains(&stock.symbol) {
                return Err(Report::new(NotifyError::Rejected { status: 502 }));
            }
            self.sent
                .lock()
                .unwrap()
                .push((stock.symbol.clone(), price, alert_type));
            Ok(NotifyReceipt {
                issue_url: Some(format!("https://issues.test/{}", stock.symbol)),
            })
        })
    }
}
