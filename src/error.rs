// Error taxonomy for the HOA report pipeline
// Configuration and input errors are fatal and name the offending path/field.

use std::path::Path;
use thiserror::Error;

/// Result type for report pipeline operations
pub type Result<T> = std::result::Result<T, ReportError>;

#[derive(Error, Debug)]
pub enum ReportError {
    /// Bad or missing configuration, unknown vendor type, missing input paths
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed tape, vendor, or template file
    #[error("Input error: {0}")]
    Input(String),

    /// SQL connectivity, execution, or result-set failure
    #[error("SQL enrichment failed: {0}")]
    Enrichment(String),

    /// Output write failure
    #[error("Failed to write output workbook at '{path}': {message}")]
    Io { path: String, message: String },
}

impl ReportError {
    pub fn config(message: impl Into<String>) -> Self {
        ReportError::Configuration(message.into())
    }

    pub fn input(message: impl Into<String>) -> Self {
        ReportError::Input(message.into())
    }

    pub fn enrichment(message: impl Into<String>) -> Self {
        ReportError::Enrichment(message.into())
    }

    pub fn io(path: &Path, message: impl Into<String>) -> Self {
        ReportError::Io {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    /// Process exit code for this error kind (2 = usage/input, 1 = runtime)
    pub fn exit_code(&self) -> u8 {
        match self {
            ReportError::Configuration(_) | ReportError::Input(_) => 2,
            ReportError::Enrichment(_) | ReportError::Io { .. } => 1,
        }
    }
}

impl From<rusqlite::Error> for ReportError {
    fn from(err: rusqlite::Error) -> Self {
        ReportError::Enrichment(err.to_string())
    }
}
