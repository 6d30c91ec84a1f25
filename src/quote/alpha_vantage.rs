use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::QuoteConfig;
use crate::error::QuoteError;
use crate::model::{FetchFailure, FetchOutcome};
use crate::quote::QuoteSource;

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Retries for transient failures: `base_delay * 2^n` before retry `n`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

pub struct AlphaVantageClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl AlphaVantageClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        retry: RetryPolicy,
        requests_per_minute: NonZeroU32,
    ) -> Result<Self, Report<QuoteError>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .change_context(QuoteError::Request)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
            retry,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(requests_per_minute))),
        })
    }

    pub fn from_config(config: &QuoteConfig) -> Result<Self, Report<QuoteError>> {
        let retry = RetryPolicy {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        };
        // Alpha Vantage free tier allows 5 requests per minute
        let quota = NonZeroU32::new(config.requests_per_minute).unwrap_or(nonzero!(5u32));
        Self::new(&config.base_url, config.resolve_api_key(), retry, quota)
    }

    async fn request_quote(
        &self,
        symbol: &str,
        api_key: &str,
    ) -> Result<GlobalQuoteResponse, Report<QuoteError>> {
        // Wait for rate limiter before making the request
        self.rate_limiter.until_ready().await;

        let url = format!("{}/query", self.base_url);
        let params = [
            ("function", "GLOBAL_QUOTE"),
            ("symbol", symbol),
            ("apikey", api_key),
        ];

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .change_context(QuoteError::Request)
            .attach_with(|| format!("symbol: {symbol}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Report::new(QuoteError::Status {
                status: status.as_u16(),
            })
            .attach(format!("symbol: {symbol}")));
        }

        // A connection dropped mid-body is a transport failure, not a bad payload.
        let bytes = response
            .bytes()
            .await
            .change_context(QuoteError::Request)
            .attach_with(|| format!("reading body for symbol: {symbol}"))?;

        serde_json::from_slice::<GlobalQuoteResponse>(&bytes)
            .change_context(QuoteError::ResponseParse)
            .attach_with(|| format!("symbol: {symbol}"))
    }
}

impl QuoteSource for AlphaVantageClient {
    fn name(&self) -> &'static str {
        "alpha_vantage"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn fetch_price(&self, symbol: &str) -> BoxFuture<'_, FetchOutcome> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let Some(api_key) = self.api_key.as_deref() else {
                warn!(symbol = %symbol, "quote api key not configured");
                return FetchOutcome::Failed(FetchFailure::MissingCredentials);
            };

            let mut retry = 0;
            loop {
                info!(symbol = %symbol, attempt = retry + 1, "fetching quote");

                let report = match self.request_quote(&symbol, api_key).await {
                    Ok(body) => return body.into_outcome(&symbol),
                    Err(report) => report,
                };

                match classify(report.current_context()) {
                    Disposition::Retry if retry < self.retry.max_retries => {
                        let delay = self.retry.delay_for(retry);
                        warn!(
                            symbol = %symbol,
                            error = ?report,
                            delay_ms = delay.as_millis() as u64,
                            "quote request failed, retrying"
                        );
                        sleep(delay).await;
                        retry += 1;
                    }
                    Disposition::Retry => {
                        warn!(symbol = %symbol, error = ?report, "quote request failed, retries exhausted");
                        return FetchOutcome::Failed(FetchFailure::Transport(format!(
                            "{} after {} attempts",
                            report.current_context(),
                            retry + 1
                        )));
                    }
                    Disposition::RateLimited => {
                        warn!(symbol = %symbol, "quote provider returned HTTP 429");
                        return FetchOutcome::RateLimited;
                    }
                    Disposition::Fail(failure) => {
                        warn!(symbol = %symbol, error = ?report, "quote request failed");
                        return FetchOutcome::Failed(failure);
                    }
                }
            }
        })
    }
}

enum Disposition {
    Retry,
    RateLimited,
    Fail(FetchFailure),
}

fn classify(error: &QuoteError) -> Disposition {
    match error {
        QuoteError::Request => Disposition::Retry,
        QuoteError::Status { status } if *status == StatusCode::TOO_MANY_REQUESTS.as_u16() => {
            Disposition::RateLimited
        }
        QuoteError::Status { status } if *status >= 500 => Disposition::Retry,
        QuoteError::Status { status } => Disposition::Fail(FetchFailure::Status(*status)),
        QuoteError::ResponseParse => Disposition::Fail(FetchFailure::NoQuote),
    }
}

// ── REST response types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    /// Throttling notice on the legacy free tier.
    #[serde(rename = "Note")]
    note: Option<String>,
    /// Daily/minute quota notice on the current free tier.
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price")]
    price: Option<String>,
}

impl GlobalQuoteResponse {
    fn into_outcome(self, symbol: &str) -> FetchOutcome {
        if let Some(notice) = self.note.or(self.information) {
            warn!(symbol, notice = %notice, "quote provider rate limit reached");
            return FetchOutcome::RateLimited;
        }

        if let Some(message) = self.error_message {
            warn!(symbol, message = %message, "quote provider rejected symbol");
            return FetchOutcome::Failed(FetchFailure::NoQuote);
        }

        let price = self
            .global_quote
            .and_then(|quote| quote.price)
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|price| price.is_finite() && *price > 0.0);

        match price {
            Some(price) => {
                debug!(symbol, price, "quote received");
                FetchOutcome::Price(price)
            }
            None => {
                warn!(symbol, "no price data in quote response");
                FetchOutcome::Failed(FetchFailure::NoQuote)
            }
        }
    }
}
