use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriverError {
    ConnectionError(String),
    Timeout(String),
    ProtocolError(String),
    ServerError { status: u16, message: String },
    QueryError(String),
    InvalidArgument(String),
}

impl DriverError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DriverError::ConnectionError(_) | DriverError::Timeout(_) => true,
            DriverError::ServerError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            DriverError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            DriverError::ProtocolError(msg) => write!(f, "Protocol error: {}", msg),
            DriverError::ServerError { status, message } => {
                write!(f, "Server error (HTTP {}): {}", status, message)
            }
            DriverError::QueryError(msg) => write!(f, "Query error: {}", msg),
            DriverError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<reqwest::Error> for DriverError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DriverError::Timeout(err.to_string())
        } else if err.is_decode() {
            DriverError::ProtocolError(err.to_string())
        } else {
            DriverError::ConnectionError(err.to_string())
        }
    }
}
