mod config;
mod error;
mod model;
mod monitor;
mod notifier;
mod quote;
mod scheduler;
mod server;
mod storage;
mod strategy;
#[cfg(test)]
mod testing;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use error::ServerError;
use monitor::Monitor;
use notifier::Notifier;
use notifier::github::GithubNotifier;
use notifier::terminal::TerminalNotifier;
use quote::QuoteSource;
use quote::alpha_vantage::AlphaVantageClient;
use quote::mock::MockQuoteSource;
use scheduler::PollingSession;
use server::AppState;
use storage::PriceHistory;
use storage::sqlite::SqliteStorage;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("storage error")]
    Storage,
    #[display("server error")]
    Server,
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(name = "stock-monitor", about = "Stock price threshold monitor")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand, Default)]
enum Command {
    /// Serve the HTTP API (and poll on schedule when configured)
    #[default]
    Serve,
    /// Run a single monitor cycle and print the report as JSON
    Check,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    // ── Storage ───────────────────────────────────────────────────────────────
    let data_dir = &config.general.data_dir;
    let db_path = format!("{data_dir}/stock-monitor.db");
    let history: Arc<dyn PriceHistory> = Arc::new(
        SqliteStorage::open(Path::new(&db_path), config.general.history_limit)
            .await
            .change_context(AppError::Storage)?,
    );

    // ── Collaborators ─────────────────────────────────────────────────────────
    let quotes = build_quote_source(&config)?;
    let notifier = build_notifier(&config)?;

    let monitor = Arc::new(Monitor::new(
        quotes,
        history,
        notifier,
        Duration::from_millis(config.general.pacing_delay_ms),
    ));
    let stocks = Arc::new(config.stocks);

    if stocks.iter().all(|s| !s.enabled) {
        tracing::warn!("no stocks enabled; cycles will check nothing");
    }

    match cli.command.unwrap_or_default() {
        Command::Check => {
            let report = monitor.run_cycle(&stocks).await;
            let json = serde_json::to_string_pretty(&report).change_context(AppError::Runtime)?;
            println!("{json}");
            Ok(())
        }
        Command::Serve => serve(&config.server, monitor, stocks).await,
    }
}

async fn serve(
    server_config: &config::ServerConfig,
    monitor: Arc<Monitor>,
    stocks: Arc<Vec<config::StockConfig>>,
) -> Result<(), Report<AppError>> {
    let addr = &server_config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .change_context(ServerError::Bind { addr: addr.clone() })
        .change_context(AppError::Server)?;

    let session = PollingSession::new(Arc::clone(&monitor), Arc::clone(&stocks));
    if let Some(secs) = server_config.poll_interval_secs {
        session.start(Duration::from_secs(secs));
    }

    let shutdown = CancellationToken::new();
    let state = AppState { monitor, stocks };
    let server = tokio::spawn(server::serve(listener, state, shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .change_context(AppError::Runtime)?;

    info!("ctrl+c received, shutting down");
    if session.is_running() {
        session.stop().await;
    }
    shutdown.cancel();

    match tokio::time::timeout(Duration::from_secs(5), server).await {
        Ok(joined) => joined
            .change_context(AppError::Runtime)?
            .change_context(AppError::Server)?,
        Err(_) => tracing::warn!("http server did not stop within 5s"),
    }

    info!("shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

fn build_quote_source(config: &AppConfig) -> Result<Arc<dyn QuoteSource>, Report<AppError>> {
    if config.quote.uses_mock() {
        info!("using mock quote provider");
        return Ok(Arc::new(MockQuoteSource::from_config(&config.quote)));
    }

    let client = AlphaVantageClient::from_config(&config.quote).change_context(AppError::Config)?;
    if !client.is_configured() {
        tracing::warn!(
            env = %config.quote.api_key_env,
            "quote api key not configured; price fetches will return no data"
        );
    }
    Ok(Arc::new(client))
}

fn build_notifier(config: &AppConfig) -> Result<Arc<dyn Notifier>, Report<AppError>> {
    match config.notifier.kind.as_str() {
        "github" => {
            let notifier =
                GithubNotifier::from_config(&config.notifier).change_context(AppError::Config)?;
            if !notifier.is_configured() {
                tracing::warn!(
                    env = %config.notifier.token_env,
                    "github token not configured; alerts will be reported as not notified"
                );
            }
            Ok(Arc::new(notifier))
        }
        _ => Ok(Arc::new(TerminalNotifier)),
    }
}
