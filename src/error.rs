//! Error types for the DNS alias sample.

use thiserror::Error;

/// Errors that can end (or, for cleanup, be logged during) a sample run.
#[derive(Debug, Error)]
pub enum SampleError {
    /// Missing or rejected credentials.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A control-plane create/delete call failed.
    #[error("Provisioning error during {operation}: {message}")]
    Provisioning { operation: String, message: String },

    /// Connection or statement failure against a provisioned database.
    #[error("SQL execution error: {0}")]
    SqlExecution(String),

    /// Resource group deletion failed. Logged, never propagated.
    #[error("Cleanup error: {0}")]
    Cleanup(String),

    /// Invalid optional setting.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A propagation wait was cancelled before it completed.
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl SampleError {
    pub fn provisioning(operation: impl Into<String>, message: impl Into<String>) -> Self {
        SampleError::Provisioning {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl From<tiberius::error::Error> for SampleError {
    fn from(e: tiberius::error::Error) -> Self {
        SampleError::SqlExecution(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SampleError>;
