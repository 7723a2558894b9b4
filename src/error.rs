// src/error.rs
use std::time::Duration;
use thiserror::Error;

/// Failures raised by the oracle and broker connectors.
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Runs `fut` under a deadline, mapping expiry to `ConnectorError::Timeout`.
pub async fn with_timeout<T, F>(operation: &'static str, timeout: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(ConnectorError::Timeout { operation, timeout }),
    }
}
