//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(#[from] hedge_feed::FeedError),

    #[error("Executor error: {0}")]
    Executor(#[from] hedge_executor::ExecutorError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] hedge_ledger::LedgerError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] hedge_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
