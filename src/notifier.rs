pub mod github;
pub mod terminal;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::config::StockConfig;
use crate::error::NotifyError;
use crate::model::AlertType;

/// What a notifier reports back after delivering an alert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyReceipt {
    pub issue_url: Option<String>,
}

/// Sink for threshold-breach notifications.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether alerts can actually be delivered with the current credentials.
    fn is_configured(&self) -> bool;

    fn notify<'a>(
        &'a self,
        stock: &'a StockConfig,
        price: f64,
        alert_type: AlertType,
    ) -> BoxFuture<'a, Result<NotifyReceipt, Report<NotifyError>>>;
}
