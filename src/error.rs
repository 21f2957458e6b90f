//! Error types for intake-rs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Submit arrived before start or after shutdown began.
    #[error("service is not accepting submissions")]
    Unavailable,

    #[error("work queue is closed")]
    QueueClosed,

    #[error("worker error: {0}")]
    Worker(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
