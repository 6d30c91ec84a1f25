use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall-clock time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// One observed price for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub price: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl PriceSample {
    pub fn now(price: f64) -> Self {
        Self {
            price,
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertType {
    Buy,
    Sell,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A threshold breach observed during one monitor cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub symbol: String,
    pub price: f64,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub timestamp: i64,
    pub notified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_url: Option<String>,
}

/// Why a quote fetch produced no price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// No api key is configured for the provider.
    MissingCredentials,
    /// The provider answered but without a usable quote.
    NoQuote,
    /// Non-retryable HTTP status from the provider.
    Status(u16),
    /// Network or server failure that survived every retry.
    Transport(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredentials => write!(f, "quote provider credentials are not configured"),
            Self::NoQuote => write!(f, "no price data in provider response"),
            Self::Status(status) => write!(f, "quote provider returned HTTP {status}"),
            Self::Transport(message) => write!(f, "{message}"),
        }
    }
}

/// Normalised result of a single quote fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Price(f64),
    RateLimited,
    Failed(FetchFailure),
}

/// Result of one complete monitor cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub checked: usize,
    pub alerts: Vec<Alert>,
}
