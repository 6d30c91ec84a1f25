use std::collections::{HashMap, HashSet};
use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_history_limit() -> usize {
    1000
}

fn default_pacing_delay_ms() -> u64 {
    1500
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".into()
}

fn default_provider() -> String {
    "alpha_vantage".into()
}

fn default_api_key_env() -> String {
    "ALPHA_VANTAGE_KEY".into()
}

fn default_quote_base_url() -> String {
    "https://www.alphavantage.co".into()
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_requests_per_minute() -> u32 {
    5
}

fn default_mock_range() -> f64 {
    5.0
}

fn default_notifier_kind() -> String {
    "terminal".into()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}

fn default_labels() -> Vec<String> {
    vec!["stock-alert".into()]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub quote: QuoteConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub stocks: Vec<StockConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Maximum samples kept per symbol.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Delay between consecutive quote fetches within one cycle.
    #[serde(default = "default_pacing_delay_ms")]
    pub pacing_delay_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            data_dir: default_data_dir(),
            history_limit: default_history_limit(),
            pacing_delay_ms: default_pacing_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// When set, `serve` also runs a monitor cycle on this interval.
    pub poll_interval_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            poll_interval_secs: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuoteConfig {
    /// Accepted values: `"alpha_vantage"` | `"mock"`
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Forces the mock provider regardless of `provider`.
    #[serde(default)]
    pub use_mock: bool,
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_quote_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default)]
    pub mock_base_prices: HashMap<String, f64>,
    #[serde(default = "default_mock_range")]
    pub mock_range: f64,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            use_mock: false,
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_quote_base_url(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            requests_per_minute: default_requests_per_minute(),
            mock_base_prices: HashMap::new(),
            mock_range: default_mock_range(),
        }
    }
}

impl QuoteConfig {
    pub fn uses_mock(&self) -> bool {
        self.use_mock || self.provider == "mock"
    }

    /// Literal `api_key`, else the `api_key_env` variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), &self.api_key_env)
    }
}

#[derive(Debug, Deserialize)]
pub struct NotifierConfig {
    /// Accepted values: `"terminal"` | `"github"`
    #[serde(default = "default_notifier_kind")]
    pub kind: String,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub token: Option<String>,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: default_notifier_kind(),
            owner: None,
            repo: None,
            token: None,
            token_env: default_token_env(),
            api_url: default_github_api_url(),
            labels: default_labels(),
        }
    }
}

impl NotifierConfig {
    pub fn resolve_token(&self) -> Option<String> {
        resolve_secret(self.token.as_deref(), &self.token_env)
    }
}

/// A monitored ticker and its alert band.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StockConfig {
    pub symbol: String,
    pub name: String,
    pub lower_threshold: f64,
    pub upper_threshold: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn resolve_secret(literal: Option<&str>, env_var: &str) -> Option<String> {
    let non_blank = |s: &String| !s.trim().is_empty();
    literal
        .map(str::to_owned)
        .filter(non_blank)
        .or_else(|| std::env::var(env_var).ok().filter(non_blank))
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    parse(&content)
}

/// Parse, normalise and validate configuration text.
pub fn parse(content: &str) -> Result<AppConfig, Report<ConfigError>> {
    let mut config: AppConfig = toml::from_str(content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    normalize(&mut config);
    validate(&config)?;

    Ok(config)
}

const VALID_PROVIDERS: &[&str] = &["alpha_vantage", "mock"];
const VALID_NOTIFIERS: &[&str] = &["terminal", "github"];
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

fn normalize(config: &mut AppConfig) {
    for stock in &mut config.stocks {
        stock.symbol = stock.symbol.trim().to_uppercase();
    }
    config.quote.mock_base_prices = config
        .quote
        .mock_base_prices
        .drain()
        .map(|(symbol, price)| (symbol.trim().to_uppercase(), price))
        .collect();
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(config)?;
    validate_stock_symbols(config)?;
    validate_thresholds(config)?;
    validate_quote(config)?;
    validate_notifier(config)?;
    Ok(())
}

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate_general(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.general.history_limit == 0 {
        return Err(invalid("general.history_limit must be greater than 0".into()));
    }
    if !VALID_LOG_FORMATS.contains(&config.general.log_format.as_str()) {
        return Err(invalid(format!(
            "general.log_format \"{}\" is not valid",
            config.general.log_format
        )));
    }
    if config.server.poll_interval_secs == Some(0) {
        return Err(invalid("server.poll_interval_secs must be greater than 0".into()));
    }
    Ok(())
}

fn validate_stock_symbols(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let mut seen = HashSet::new();
    for (index, stock) in config.stocks.iter().enumerate() {
        if stock.symbol.is_empty() {
            return Err(invalid(format!("stocks[{index}].symbol must not be empty")));
        }
        if !seen.insert(stock.symbol.as_str()) {
            return Err(invalid(format!("stocks: duplicate symbol \"{}\"", stock.symbol)));
        }
    }
    Ok(())
}

fn validate_thresholds(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    for stock in &config.stocks {
        if !stock.lower_threshold.is_finite() || !stock.upper_threshold.is_finite() {
            return Err(invalid(format!(
                "stocks[symbol={}]: thresholds must be finite numbers",
                stock.symbol
            )));
        }
        if stock.upper_threshold <= stock.lower_threshold {
            return Err(invalid(format!(
                "stocks[symbol={}]: upper_threshold ({}) must be greater than lower_threshold ({})",
                stock.symbol, stock.upper_threshold, stock.lower_threshold
            )));
        }
    }
    Ok(())
}

fn validate_quote(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let quote = &config.quote;
    if !VALID_PROVIDERS.contains(&quote.provider.as_str()) {
        return Err(invalid(format!("quote.provider \"{}\" is not valid", quote.provider)));
    }
    if quote.requests_per_minute == 0 {
        return Err(invalid("quote.requests_per_minute must be greater than 0".into()));
    }
    if !quote.mock_range.is_finite() || quote.mock_range < 0.0 {
        return Err(invalid("quote.mock_range must be a non-negative number".into()));
    }
    if let Some((symbol, _)) = quote
        .mock_base_prices
        .iter()
        .find(|(_, price)| !price.is_finite() || **price <= 0.0)
    {
        return Err(invalid(format!(
            "quote.mock_base_prices.{symbol} must be a positive number"
        )));
    }
    Ok(())
}

fn validate_notifier(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let notifier = &config.notifier;
    if !VALID_NOTIFIERS.contains(&notifier.kind.as_str()) {
        return Err(invalid(format!("notifier.kind \"{}\" is not valid", notifier.kind)));
    }
    if notifier.kind == "github" {
        let missing = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
        if missing(&notifier.owner) || missing(&notifier.repo) {
            return Err(invalid(
                "notifier.owner and notifier.repo are required for the github notifier".into(),
            ));
        }
    }
    Ok(())
}
