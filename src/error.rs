//! Error types for the market monitor

use thiserror::Error;

/// Main error type for the monitor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Bootstrap error: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Command channel closed: {0}")]
    Channel(String),
}

/// Push connection failures. Recovered locally by the reconnect timer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("Invalid stream endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Failed to establish connection: {0}")]
    EstablishmentFailed(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),
}

/// Push payloads that fail to parse or shape-check
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),
}

/// REST failures during initial load or manual refresh
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BootstrapError {
    #[error("Invalid endpoint {0}")]
    InvalidEndpoint(String),

    #[error("Request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("HTTP {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("Unexpected payload from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

/// Error severity levels
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorSeverity {
    Low,      // dropped payloads, diagnostics only
    Medium,   // transient, recovered automatically
    High,     // user-visible failure
}

impl ErrorSeverity {
    pub fn from_error(error: &MonitorError) -> Self {
        match error {
            MonitorError::Parse(_) => ErrorSeverity::Low,
            MonitorError::Connection(conn_err) => match conn_err {
                ConnectionError::InvalidEndpoint(_) => ErrorSeverity::High,
                _ => ErrorSeverity::Medium,
            },
            MonitorError::Bootstrap(_) => ErrorSeverity::High,
            MonitorError::Configuration(_) => ErrorSeverity::High,
            MonitorError::Channel(_) => ErrorSeverity::Medium,
        }
    }
}

/// Routes errors to the tracing level matching their severity
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn report(error: &MonitorError, operation: &str) {
        match ErrorSeverity::from_error(error) {
            ErrorSeverity::High => {
                tracing::error!("{} failed: {}", operation, error);
            }
            ErrorSeverity::Medium => {
                tracing::warn!("{} failed: {}", operation, error);
            }
            ErrorSeverity::Low => {
                tracing::warn!("{}: dropping payload: {}", operation, error);
            }
        }
    }
}
