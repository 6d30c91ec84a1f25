use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use derive_more::Display;
use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::StockConfig;
use crate::error::ServerError;
use crate::model::{CycleReport, FetchFailure, PriceSample, now_millis};
use crate::monitor::{Monitor, Observation};
use crate::storage::DEFAULT_WINDOW_HOURS;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub stocks: Arc<Vec<StockConfig>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/check-stocks", get(check_stocks))
        .route("/price", get(price))
        .route("/history", get(history))
        .route("/latest", get(latest))
        .route("/status", get(status))
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), Report<ServerError>> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "http api listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .change_context(ServerError::Serve)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Display)]
pub enum ApiError {
    #[display("Missing required query parameter: {name}")]
    MissingParameter { name: &'static str },
    #[display("Invalid query parameter: {name}")]
    InvalidParameter { name: &'static str },
    #[display("Rate limit reached while fetching {symbol}")]
    RateLimited { symbol: String },
    #[display("Failed to fetch price for symbol: {symbol} ({reason})")]
    FetchFailed { symbol: String, reason: FetchFailure },
    #[display("Quote provider credentials are not configured")]
    MissingCredentials,
    #[display("No price history for symbol: {symbol}")]
    NotFound { symbol: String },
    #[display("Failed to fetch price history")]
    Storage,
    #[display("A monitor cycle is already running")]
    CycleInProgress,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::MissingParameter { .. } | Self::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::FetchFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::MissingCredentials | Self::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::CycleInProgress => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct SymbolParams {
    pub symbol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub symbol: Option<String>,
    pub hours: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PriceResponse {
    pub symbol: String,
    pub price: f64,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub message: &'static str,
    pub timestamp: i64,
    pub quote_provider: &'static str,
    pub has_api_key: bool,
    pub has_notifier: bool,
    pub notifier: &'static str,
    pub stocks: usize,
}

fn required_symbol(symbol: Option<String>) -> Result<String, ApiError> {
    symbol
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::MissingParameter { name: "symbol" })
}

fn window_hours(hours: Option<String>) -> Result<u32, ApiError> {
    match hours.as_deref().map(str::trim) {
        None | Some("") => Ok(DEFAULT_WINDOW_HOURS),
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| ApiError::InvalidParameter { name: "hours" }),
    }
}

pub async fn check_stocks(State(state): State<AppState>) -> Result<Json<CycleReport>, ApiError> {
    state
        .monitor
        .try_run_cycle(&state.stocks)
        .await
        .map(Json)
        .ok_or_else(|| {
            warn!("check-stocks requested while a cycle is running");
            ApiError::CycleInProgress
        })
}

pub async fn price(
    State(state): State<AppState>,
    Query(params): Query<SymbolParams>,
) -> Result<Json<PriceResponse>, ApiError> {
    let symbol = required_symbol(params.symbol)?;

    match state.monitor.fetch_and_record(&symbol).await {
        Observation::Recorded(sample) => Ok(Json(PriceResponse {
            symbol,
            price: sample.price,
            timestamp: sample.timestamp,
        })),
        Observation::RateLimited => Err(ApiError::RateLimited { symbol }),
        Observation::Unavailable(FetchFailure::MissingCredentials) => {
            Err(ApiError::MissingCredentials)
        }
        Observation::Unavailable(reason) => Err(ApiError::FetchFailed { symbol, reason }),
    }
}

pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<PriceSample>>, ApiError> {
    let symbol = required_symbol(params.symbol)?;
    let hours = window_hours(params.hours)?;

    state
        .monitor
        .history()
        .query(&symbol, hours)
        .await
        .map(Json)
        .map_err(|e| {
            warn!(symbol = %symbol, error = ?e, "failed to fetch price history");
            ApiError::Storage
        })
}

pub async fn latest(
    State(state): State<AppState>,
    Query(params): Query<SymbolParams>,
) -> Result<Json<PriceResponse>, ApiError> {
    let symbol = required_symbol(params.symbol)?;

    let sample = state
        .monitor
        .history()
        .latest(&symbol)
        .await
        .map_err(|e| {
            warn!(symbol = %symbol, error = ?e, "failed to fetch latest price");
            ApiError::Storage
        })?;

    match sample {
        Some(sample) => Ok(Json(PriceResponse {
            symbol,
            price: sample.price,
            timestamp: sample.timestamp,
        })),
        None => Err(ApiError::NotFound { symbol }),
    }
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        message: "API works",
        timestamp: now_millis(),
        quote_provider: state.monitor.quotes().name(),
        has_api_key: state.monitor.quotes().is_configured(),
        has_notifier: state.monitor.notifier().is_configured(),
        notifier: state.monitor.notifier().name(),
        stocks: state.stocks.len(),
    })
}
