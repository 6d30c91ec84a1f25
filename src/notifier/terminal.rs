use error_stack::Report;
use futures::future::BoxFuture;

use crate::config::StockConfig;
use crate::error::NotifyError;
use crate::model::AlertType;
use crate::notifier::{Notifier, NotifyReceipt};
use crate::strategy::headline;

pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn name(&self) -> &'static str {
        "terminal"
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
        tracing::warn!(
            symbol = %stock.symbol,
            name = %stock.name,
            alert = %alert_type,
            price = price,
            "ALERT: {}",
            headline(stock, price, alert_type),
        );
        Box::pin(async { Ok(NotifyReceipt::default()) })
    }
}
