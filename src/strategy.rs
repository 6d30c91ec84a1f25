use crate::config::StockConfig;
use crate::model::AlertType;

/// Classify `price` against the stock's alert band.
///
/// Strictly below the lower threshold is a buy signal, strictly above the
/// upper threshold a sell signal; the band itself is inclusive and quiet.
pub fn evaluate(stock: &StockConfig, price: f64) -> Option<AlertType> {
    if price < stock.lower_threshold {
        Some(AlertType::Buy)
    } else if price > stock.upper_threshold {
        Some(AlertType::Sell)
    } else {
        None
    }
}

/// The threshold that `alert_type` breached.
pub fn breached_threshold(stock: &StockConfig, alert_type: AlertType) -> f64 {
    match alert_type {
        AlertType::Buy => stock.lower_threshold,
        AlertType::Sell => stock.upper_threshold,
    }
}

/// One-line summary, e.g. `[BUY] AMZN dropped below $230.00 (now $225.00)`.
pub fn headline(stock: &StockConfig, price: f64, alert_type: AlertType) -> String {
    let direction = match alert_type {
        AlertType::Buy => "dropped below",
        AlertType::Sell => "rose above",
    };
    format!(
        "[{}] {} {} ${:.2} (now ${:.2})",
        alert_type,
        stock.symbol,
        direction,
        breached_threshold(stock, alert_type),
        price
    )
}
