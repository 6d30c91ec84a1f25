use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum QuoteError {
    #[display("quote request failed")]
    Request,
    #[display("quote provider returned HTTP {status}")]
    Status { status: u16 },
    #[display("failed to parse quote response")]
    ResponseParse,
}

#[derive(Debug, Display, Error)]
pub enum StorageError {
    #[display("database migration failed")]
    Migration,
    #[display("failed to insert data")]
    Insert,
    #[display("failed to query data")]
    Query,
}

#[derive(Debug, Display, Error)]
pub enum NotifyError {
    #[display("notifier is not configured: {reason}")]
    NotConfigured { reason: String },
    #[display("notification request failed")]
    Request,
    #[display("notification rejected with HTTP {status}")]
    Rejected { status: u16 },
    #[display("failed to parse notification response")]
    ResponseParse,
}

#[derive(Debug, Display, Error)]
pub enum ServerError {
    #[display("failed to bind {addr}")]
    Bind { addr: String },
    #[display("http server terminated with error")]
    Serve,
}
