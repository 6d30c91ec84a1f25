use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{NotifierConfig, StockConfig};
use crate::error::NotifyError;
use crate::model::AlertType;
use crate::notifier::{Notifier, NotifyReceipt};
use crate::strategy::{breached_threshold, headline};

const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("stock-monitor/", env!("CARGO_PKG_VERSION"));
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Opens one GitHub issue per alert.
pub struct GithubNotifier {
    client: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
    token: Option<String>,
    labels: Vec<String>,
}

impl GithubNotifier {
    pub fn new(
        api_url: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: Option<String>,
        labels: Vec<String>,
    ) -> Result<Self, Report<NotifyError>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .change_context(NotifyError::Request)?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_owned(),
            owner: owner.into(),
            repo: repo.into(),
            token,
            labels,
        })
    }

    pub fn from_config(config: &NotifierConfig) -> Result<Self, Report<NotifyError>> {
        let (Some(owner), Some(repo)) = (config.owner.as_deref(), config.repo.as_deref()) else {
            return Err(Report::new(NotifyError::NotConfigured {
                reason: "github owner and repo are required".into(),
            }));
        };
        Self::new(
            &config.api_url,
            owner,
            repo,
            config.resolve_token(),
            config.labels.clone(),
        )
    }

    fn build_issue(&self, stock: &StockConfig, price: f64, alert_type: AlertType) -> NewIssue {
        let action = match alert_type {
            AlertType::Buy => "Consider buying",
            AlertType::Sell => "Consider selling",
        };
        let body = format!(
            "## {alert_type} signal for {name} ({symbol})\n\n\
             | | |\n\
             |---|---|\n\
             | Current price | ${price:.2} |\n\
             | Breached threshold | ${threshold:.2} |\n\
             | Lower threshold | ${lower:.2} |\n\
             | Upper threshold | ${upper:.2} |\n\
             | Detected at | {time} |\n\n\
             {action} {symbol}.",
            name = stock.name,
            symbol = stock.symbol,
            threshold = breached_threshold(stock, alert_type),
            lower = stock.lower_threshold,
            upper = stock.upper_threshold,
            time = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        let mut labels = self.labels.clone();
        labels.push(alert_type.as_str().to_lowercase());

        NewIssue {
            title: headline(stock, price, alert_type),
            body,
            labels,
        }
    }
}

impl Notifier for GithubNotifier {
    fn name(&self) -> &'static str {
        "github"
    }

    fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    fn notify<'a>(
        &'a self,
        stock: &'a StockConfig,
        price: f64,
        alert_type: AlertType,
    ) -> BoxFuture<'a, Result<NotifyReceipt, Report<NotifyError>>> {
        Box::pin(async move {
            let Some(token) = self.token.as_deref() else {
                return Err(Report::new(NotifyError::NotConfigured {
                    reason: "github token is missing".into(),
                }));
            };

            let url = format!("{}/repos/{}/{}/issues", self.api_url, self.owner, self.repo);
            let issue = self.build_issue(stock, price, alert_type);

            let response = self
                .client
                .post(&url)
                .bearer_auth(token)
                .header(reqwest::header::ACCEPT, "application/vnd.github+json")
                .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
                .json(&issue)
                .send()
                .await
                .change_context(NotifyError::Request)
                .attach_with(|| format!("url: {url}"))?;

            let status = response.status();
            if !status.is_success() {
                return Err(Report::new(NotifyError::Rejected {
                    status: status.as_u16(),
                })
                .attach(format!("url: {url}")));
            }

            let created: CreatedIssue = response
                .json()
                .await
                .change_context(NotifyError::ResponseParse)?;

            info!(symbol = %stock.symbol, issue_url = %created.html_url, "github issue created");

            Ok(NotifyReceipt {
                issue_url: Some(created.html_url),
            })
        })
    }
}

// ── REST payload types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct NewIssue {
    title: String,
    body: String,
    labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    html_url: String,
}
