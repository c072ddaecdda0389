//! Error types for the Fieldload import and submission pipeline.
//!
//! One error enum per layer:
//!
//! - [`CsvError`] - reading and decoding CSV input
//! - [`MappingError`] - malformed mappings or target schemas
//! - [`SubmitError`] - failures reported by the upload/broadcast capabilities
//! - [`PipelineError`] - misuse of the submission pipeline (bad chunk size, bad index)
//! - [`RegistryError`] - mapping preset storage
//! - [`ExportError`] - CSV serialization
//! - [`ServerError`] - HTTP layer
//!
//! Parsing and transforming never fail: bad input degrades to empty or
//! `None` values. Submission failures surface as row statuses, not as `Err`.

use thiserror::Error;

// =============================================================================
// CSV Input Errors
// =============================================================================

/// Errors while obtaining CSV text.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Empty input.
    #[error("CSV input is empty")]
    EmptyFile,
}

// =============================================================================
// Mapping Errors
// =============================================================================

/// Errors while loading mappings or target schemas.
#[derive(Debug, Error)]
pub enum MappingError {
    /// JSON could not be parsed.
    #[error("Invalid mapping JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A mapping targets a field the schema does not declare.
    #[error("Mapping targets unknown field '{0}'")]
    UnknownField(String),

    /// Two schema fields share a name.
    #[error("Duplicate target field '{0}'")]
    DuplicateField(String),
}

// =============================================================================
// Submission Errors
// =============================================================================

/// Errors reported by the upload and broadcast capabilities.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SubmitError {
    /// Uploading a single record failed.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Broadcasting a chunk failed.
    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    /// The signer refused to sign the transaction.
    #[error("Signing declined by user")]
    Declined,

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(String),
}

impl SubmitError {
    /// Whether this failure must halt the whole run without retries.
    pub fn is_declined(&self) -> bool {
        matches!(self, SubmitError::Declined)
    }
}

impl From<reqwest::Error> for SubmitError {
    fn from(e: reqwest::Error) -> Self {
        SubmitError::Http(e.to_string())
    }
}

// =============================================================================
// Pipeline Errors
// =============================================================================

/// Programmer errors raised synchronously by the submission pipeline.
#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    /// Chunk size must be at least one.
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// Row index does not exist in the dataset.
    #[error("Row {index} out of range ({len} rows)")]
    RowOutOfRange { index: usize, len: usize },

    /// A run is already active for this dataset.
    #[error("A submission run is already in progress")]
    RunInProgress,
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the mapping preset registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Preset not found.
    #[error("Mapping preset not found: {0}")]
    NotFound(String),

    /// IO error.
    #[error("Registry IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Registry JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while writing CSV exports.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The CSV writer rejected a record.
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    /// Flushing the writer failed.
    #[error("Export IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Written bytes were not UTF-8.
    #[error("Export produced invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl<W> From<csv::IntoInnerError<W>> for ExportError {
    fn from(e: csv::IntoInnerError<W>) -> Self {
        ExportError::Io(e.into_error())
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Mapping error.
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Export error.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Unknown import session.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV input operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Result type for capability calls.
pub type SubmitResult<T> = Result<T, SubmitError>;

/// Result type for pipeline calls.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for exports.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let csv_err = CsvError::EmptyFile;
        let server_err: ServerError = csv_err.into();
        assert!(server_err.to_string().contains("empty"));

        let pipeline_err = PipelineError::RowOutOfRange { index: 7, len: 3 };
        let server_err: ServerError = pipeline_err.into();
        assert!(server_err.to_string().contains("Row 7"));
    }

    #[test]
    fn test_declined_is_distinguishable() {
        assert!(SubmitError::Declined.is_declined());
        assert!(!SubmitError::Broadcast("timeout".into()).is_declined());
        assert!(!SubmitError::Upload("500".into()).is_declined());
    }

    #[test]
    fn test_mapping_error_format() {
        let err = MappingError::UnknownField("crop".into());
        assert!(err.to_string().contains("'crop'"));
    }
}
