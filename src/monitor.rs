use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::StockConfig;
use crate::model::{Alert, CycleReport, FetchFailure, FetchOutcome, PriceSample};
use crate::notifier::Notifier;
use crate::quote::QuoteSource;
use crate::storage::PriceHistory;
use crate::strategy::evaluate;

/// Result of fetching a price and recording it in history.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Recorded(PriceSample),
    RateLimited,
    Unavailable(FetchFailure),
}

/// Runs fetch → store → threshold check → notify over the configured stocks.
pub struct Monitor {
    quotes: Arc<dyn QuoteSource>,
    history: Arc<dyn PriceHistory>,
    notifier: Arc<dyn Notifier>,
    pacing: Duration,
    cycle_lock: Mutex<()>,
}

impl Monitor {
    pub fn new(
        quotes: Arc<dyn QuoteSource>,
        history: Arc<dyn PriceHistory>,
        notifier: Arc<dyn Notifier>,
        pacing: Duration,
    ) -> Self {
        Self {
            quotes,
            history,
            notifier,
            pacing,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn quotes(&self) -> &dyn QuoteSource {
        self.quotes.as_ref()
    }

    pub fn history(&self) -> &dyn PriceHistory {
        self.history.as_ref()
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    /// Run one cycle, waiting for any cycle already in flight to finish first.
    pub async fn run_cycle(&self, stocks: &[StockConfig]) -> CycleReport {
        let _guard = self.cycle_lock.lock().await;
        self.run_exclusive(stocks).await
    }

    /// Run one cycle unless another is in flight, in which case return `None`.
    pub async fn try_run_cycle(&self, stocks: &[StockConfig]) -> Option<CycleReport> {
        let _guard = self.cycle_lock.try_lock().ok()?;
        Some(self.run_exclusive(stocks).await)
    }

    /// Fetch the current price for `symbol` and append it to history.
    ///
    /// A history write failure is logged; the observed price is still returned.
    pub async fn fetch_and_record(&self, symbol: &str) -> Observation {
        match self.quotes.fetch_price(symbol).await {
            FetchOutcome::Price(price) => {
                let sample = PriceSample::now(price);
                if let Err(e) = self.history.append(symbol, sample).await {
                    warn!(symbol, error = ?e, "failed to save price history (continuing)");
                }
                Observation::Recorded(sample)
            }
            FetchOutcome::RateLimited => Observation::RateLimited,
            FetchOutcome::Failed(failure) => Observation::Unavailable(failure),
        }
    }

    async fn run_exclusive(&self, stocks: &[StockConfig]) -> CycleReport {
        let enabled: Vec<&StockConfig> = stocks.iter().filter(|s| s.enabled).collect();
        info!(
            enabled = enabled.len(),
            configured = stocks.len(),
            "monitor cycle started"
        );

        let mut alerts = Vec::new();
        for (index, stock) in enabled.iter().enumerate() {
            if index > 0 {
                sleep(self.pacing).await;
            }
            if let Some(alert) = self.check_stock(stock).await {
                alerts.push(alert);
            }
        }

        info!(
            checked = enabled.len(),
            alerts = alerts.len(),
            "monitor cycle complete"
        );

        CycleReport {
            checked: enabled.len(),
            alerts,
        }
    }

    async fn check_stock(&self, stock: &StockConfig) -> Option<Alert> {
        let sample = match self.fetch_and_record(&stock.symbol).await {
            Observation::Recorded(sample) => sample,
            Observation::RateLimited => {
                warn!(symbol = %stock.symbol, "skipping: quote provider rate limited");
                return None;
            }
            Observation::Unavailable(failure) => {
                warn!(symbol = %stock.symbol, reason = %failure, "skipping: no price data");
                return None;
            }
        };
        info!(symbol = %stock.symbol, price = sample.price, "price checked");

        let Some(alert_type) = evaluate(stock, sample.price) else {
            debug!(
                symbol = %stock.symbol,
                price = sample.price,
                lower = stock.lower_threshold,
                upper = stock.upper_threshold,
                "price within thresholds"
            );
            return None;
        };
        info!(
            symbol = %stock.symbol,
            price = sample.price,
            alert = %alert_type,
            lower = stock.lower_threshold,
            upper = stock.upper_threshold,
            "threshold breached"
        );

        let mut alert = Alert {
            symbol: stock.symbol.clone(),
            price: sample.price,
            alert_type,
            timestamp: sample.timestamp,
            notified: false,
            issue_url: None,
        };

        match self.notifier.notify(stock, sample.price, alert_type).await {
            Ok(receipt) => {
                alert.notified = true;
                alert.issue_url = receipt.issue_url;
                info!(
                    symbol = %stock.symbol,
                    notifier = self.notifier.name(),
                    issue_url = ?alert.issue_url,
                    "notification sent"
                );
            }
            Err(e) => {
                warn!(
                    symbol = %stock.symbol,
                    notifier = self.notifier.name(),
                    error = ?e,
                    "failed to send notification (continuing)"
                );
            }
        }

        Some(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AlertType;
    use crate::storage::sqlite::tests::in_memory_storage;
    use crate::testing::{
        FailingHistory, MemoryHistory, RecordingNotifier, ScriptedQuotes, stock,
    };

    fn monitor(
        quotes: Arc<ScriptedQuotes>,
        history: Arc<dyn PriceHistory>,
        notifier: Arc<RecordingNotifier>,
    ) -> Monitor {
        Monitor::new(quotes, history, notifier, Duration::ZERO)
    }

    #[tokio::test]
    async fn amzn_thresholds_produce_buy_none_and_sell() {
        let quotes = Arc::new(ScriptedQuotes::with(&[
            ("AMZN", FetchOutcome::Price(225.0)),
            ("AMZN", FetchOutcome::Price(235.0)),
            ("AMZN", FetchOutcome::Price(245.0)),
        ]));
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = monitor(
            Arc::clone(&quotes),
            Arc::new(MemoryHistory::default()),
            Arc::clone(&notifier),
        );
        let stocks = [stock("AMZN", 230.0, 240.0, true)];

        let first = monitor.run_cycle(&stocks).await;
        assert_eq!(first.checked, 1);
        assert_eq!(first.alerts.len(), 1);
        assert_eq!(first.alerts[0].symbol, "AMZN");
        assert_eq!(first.alerts[0].price, 225.0);
        assert_eq!(first.alerts[0].alert_type, AlertType::Buy);

        let second = monitor.run_cycle(&stocks).await;
        assert!(second.alerts.is_empty());

        let third = monitor.run_cycle(&stocks).await;
        assert_eq!(third.alerts[0].alert_type, AlertType::Sell);
        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn only_enabled_stocks_are_checked() {
        let quotes = Arc::new(ScriptedQuotes::with(&[
            ("A", FetchOutcome::Price(10.0)),
            ("B", FetchOutcome::Price(1.0)),
            ("C", FetchOutcome::Price(10.0)),
        ]));
        let monitor = monitor(
            Arc::clone(&quotes),
            Arc::new(MemoryHistory::default()),
            Arc::new(RecordingNotifier::default()),
        );
        let stocks = [
            stock("A", 5.0, 15.0, true),
            stock("B", 5.0, 15.0, false),
            stock("C", 5.0, 15.0, true),
        ];

        let report = monitor.run_cycle(&stocks).await;
        assert_eq!(report.checked, 2);
        assert!(report.alerts.is_empty());
        assert_eq!(quotes.called_symbols(), vec!["A", "C"]);
    }

    #[tokio::test]
    async fn missing_price_skips_history_and_alert() {
        let quotes = Arc::new(ScriptedQuotes::with(&[
            ("A", FetchOutcome::Failed(FetchFailure::NoQuote)),
            ("B", FetchOutcome::RateLimited),
            ("C", FetchOutcome::Price(1.0)),
        ]));
        let history = Arc::new(MemoryHistory::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = monitor(Arc::clone(&quotes), history.clone(), Arc::clone(&notifier));
        let stocks = [
            stock("A", 5.0, 15.0, true),
            stock("B", 5.0, 15.0, true),
            stock("C", 5.0, 15.0, true),
        ];

        let report = monitor.run_cycle(&stocks).await;
        assert_eq!(report.checked, 3);
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].symbol, "C");
        assert!(history.samples_for("A").is_empty());
        assert!(history.samples_for("B").is_empty());
        assert_eq!(history.samples_for("C").len(), 1);
    }

    #[tokio::test]
    async fn prices_are_persisted_in_sqlite_history() {
        let quotes = Arc::new(ScriptedQuotes::with(&[
            ("AMZN", FetchOutcome::Price(235.0)),
            ("AMZN", FetchOutcome::Price(236.5)),
        ]));
        let storage = Arc::new(in_memory_storage(1000).await);
        let monitor = monitor(
            Arc::clone(&quotes),
            storage.clone(),
            Arc::new(RecordingNotifier::default()),
        );
        let stocks = [stock("AMZN", 230.0, 240.0, true)];

        monitor.run_cycle(&stocks).await;
        monitor.run_cycle(&stocks).await;

        let history = storage.query("AMZN", 24).await.unwrap();
        let prices: Vec<f64> = history.iter().map(|s| s.price).collect();
        assert_eq!(prices, vec![235.0, 236.5]);
        assert_eq!(storage.latest("AMZN").await.unwrap().unwrap().price, 236.5);
    }

    #[tokio::test]
    async fn storage_failure_does_not_block_alerts() {
        let quotes = Arc::new(ScriptedQuotes::with(&[("AMZN", FetchOutcome::Price(225.0))]));
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = monitor(Arc::clone(&quotes), Arc::new(FailingHistory), Arc::clone(&notifier));

        let report = monitor
            .run_cycle(&[stock("AMZN", 230.0, 240.0, true)])
            .await;
        assert_eq!(report.alerts.len(), 1);
        assert!(report.alerts[0].notified);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn notifier_failure_records_unnotified_alert_and_continues() {
        let quotes = Arc::new(ScriptedQuotes::with(&[
            ("AMZN", FetchOutcome::Price(225.0)),
            ("AAPL", FetchOutcome::Price(210.0)),
        ]));
        let notifier = Arc::new(RecordingNotifier::failing_for(&["AMZN"]));
        let monitor = monitor(
            Arc::clone(&quotes),
            Arc::new(MemoryHistory::default()),
            Arc::clone(&notifier),
        );
        let stocks = [
            stock("AMZN", 230.0, 240.0, true),
            stock("AAPL", 180.0, 200.0, true),
        ];

        let report = monitor.run_cycle(&stocks).await;
        assert_eq!(report.alerts.len(), 2);

        let amzn = &report.alerts[0];
        assert_eq!(amzn.symbol, "AMZN");
        assert!(!amzn.notified);
        assert_eq!(amzn.issue_url, None);

        let aapl = &report.alerts[1];
        assert_eq!(aapl.alert_type, AlertType::Sell);
        assert!(aapl.notified);
        assert_eq!(aapl.issue_url.as_deref(), Some("https://issues.test/AAPL"));
    }

    #[tokio::test]
    async fn alerts_follow_configured_order() {
        let quotes = Arc::new(ScriptedQuotes::with(&[
            ("Z", FetchOutcome::Price(1.0)),
            ("A", FetchOutcome::Price(100.0)),
            ("M", FetchOutcome::Price(1.0)),
        ]));
        let monitor = monitor(
            Arc::clone(&quotes),
            Arc::new(MemoryHistory::default()),
            Arc::new(RecordingNotifier::default()),
        );
        let stocks = [
            stock("Z", 5.0, 15.0, true),
            stock("A", 5.0, 15.0, true),
            stock("M", 5.0, 15.0, true),
        ];

        let report = monitor.run_cycle(&stocks).await;
        let symbols: Vec<&str> = report.alerts.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["Z", "A", "M"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_delay_between_fetches_only() {
        let quotes = Arc::new(ScriptedQuotes::with(&[
            ("A", FetchOutcome::Price(10.0)),
            ("B", FetchOutcome::Price(10.0)),
            ("C", FetchOutcome::Price(10.0)),
        ]));
        let monitor = Monitor::new(
            Arc::clone(&quotes) as Arc<dyn QuoteSource>,
            Arc::new(MemoryHistory::default()),
            Arc::new(RecordingNotifier::default()),
            Duration::from_millis(1500),
        );
        let stocks = [
            stock("A", 5.0, 15.0, true),
            stock("B", 5.0, 15.0, false),
            stock("C", 5.0, 15.0, true),
            stock("D", 5.0, 15.0, false),
        ];

        let start = tokio::time::Instant::now();
        monitor.run_cycle(&stocks).await;
        let elapsed = start.elapsed();

        let times = quotes.call_times();
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= Duration::from_millis(1500));
        // one gap for two enabled stocks, nothing after the last
        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn overlapping_cycle_is_refused() {
        let quotes = Arc::new(ScriptedQuotes::with(&[("A", FetchOutcome::Price(10.0))]));
        let monitor = monitor(
            Arc::clone(&quotes),
            Arc::new(MemoryHistory::default()),
            Arc::new(RecordingNotifier::default()),
        );
        let stocks = [stock("A", 5.0, 15.0, true)];

        let guard = monitor.cycle_lock.lock().await;
        assert!(monitor.try_run_cycle(&stocks).await.is_none());
        assert!(quotes.called_symbols().is_empty());
        drop(guard);

        let report = monitor.try_run_cycle(&stocks).await.unwrap();
        assert_eq!(report.checked, 1);
    }

    #[tokio::test]
    async fn fetch_and_record_reports_rate_limit() {
        let quotes = Arc::new(ScriptedQuotes::with(&[("A", FetchOutcome::RateLimited)]));
        let history = Arc::new(MemoryHistory::default());
        let monitor = monitor(
            Arc::clone(&quotes),
            history.clone(),
            Arc::new(RecordingNotifier::default()),
        );
        assert_eq!(monitor.fetch_and_record("A").await, Observation::RateLimited);
        assert!(history.samples_for("A").is_empty());
    }
}
