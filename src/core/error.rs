use chrono::NaiveDate;
use thiserror::Error;

/// Failures of the projection engine. None of them are fatal; each one is
/// scoped to the calculation that produced it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Too few closes to estimate a sample standard deviation of daily returns.
    #[error("insufficient price data: need at least {required} closes, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Goal date falls in the current month or earlier.
    #[error("target date must be in a future month (months remaining: {months_remaining})")]
    PastOrCurrentMonth { months_remaining: i64 },

    #[error("invalid close price {close} on {date}")]
    InvalidPrice { date: NaiveDate, close: f64 },
}
