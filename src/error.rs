use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Browser launch failed: {0}")]
    LaunchError(String),

    #[error("Navigation failed: {0}")]
    NavigationError(String),

    #[error("Page evaluation failed: {0}")]
    EvaluationError(String),

    #[error("Extraction result does not match schema: {0}")]
    SchemaValidationError(String),

    #[error("No extraction response within {0:?}")]
    ExtractionTimeout(std::time::Duration),

    #[error("Invalid extraction request: {0}")]
    InvalidRequest(String),

    #[error("LLM request failed: {0}")]
    LlmError(String),

    #[error("Failed to write {}: {source}", .path.display())]
    IoWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),
}

impl Error {
    /// Name of the workflow stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::LaunchError(_) | Error::ConfigError(_) => "setup",
            Error::NavigationError(_) | Error::CdpError(_) => "navigation",
            Error::EvaluationError(_) => "collection",
            Error::SchemaValidationError(_)
            | Error::ExtractionTimeout(_)
            | Error::InvalidRequest(_)
            | Error::LlmError(_) => "extraction",
            Error::IoWriteError { .. } => "persist",
        }
    }

    /// Process exit status for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::LaunchError(_) | Error::NavigationError(_) | Error::CdpError(_) => 2,
            Error::EvaluationError(_) => 3,
            Error::SchemaValidationError(_) | Error::InvalidRequest(_) => 4,
            Error::ExtractionTimeout(_) => 5,
            Error::IoWriteError { .. } => 6,
            Error::LlmError(_) | Error::ConfigError(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
