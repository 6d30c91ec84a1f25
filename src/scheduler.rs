use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StockConfig;
use crate::monitor::Monitor;

struct RunningPoll {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns at most one background task that runs monitor cycles on an interval.
pub struct PollingSession {
    monitor: Arc<Monitor>,
    stocks: Arc<Vec<StockConfig>>,
    current: Mutex<Option<RunningPoll>>,
}

impl PollingSession {
    pub fn new(monitor: Arc<Monitor>, stocks: Arc<Vec<StockConfig>>) -> Self {
        Self {
            monitor,
            stocks,
            current: Mutex::new(None),
        }
    }

    /// Start polling every `interval`; the first cycle runs immediately.
    ///
    /// Returns `false` without starting anything while a previous session is
    /// still alive.
    pub fn start(&self, interval: Duration) -> bool {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|poll| !poll.handle.is_finished()) {
            debug!("polling session already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.monitor),
            Arc::clone(&self.stocks),
            interval,
            cancel.clone(),
        ));
        *current = Some(RunningPoll { cancel, handle });

        info!(interval_secs = interval.as_secs(), "polling session started");
        true
    }

    pub fn is_running(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|poll| !poll.handle.is_finished())
    }

    /// Cancel the running session and wait for it to wind down.
    ///
    /// Returns `false` when nothing was running.
    pub async fn stop(&self) -> bool {
        let running = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(poll) = running else {
            return false;
        };
        poll.cancel.cancel();
        if let Err(e) = poll.handle.await {
            warn!(error = ?e, "polling task ended abnormally");
        }
        info!("polling session stopped");
        true
    }
}

async fn poll_loop(
    monitor: Arc<Monitor>,
    stocks: Arc<Vec<StockConfig>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("polling cancelled mid-cycle");
                break;
            }
            report = monitor.run_cycle(&stocks) => {
                info!(
                    checked = report.checked,
                    alerts = report.alerts.len(),
                    "scheduled cycle finished"
                );
            }
        }
    }
}
