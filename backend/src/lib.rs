//! # Fieldload - spreadsheet import and batched ledger submission
//!
//! Fieldload imports a CSV of field data, maps its columns onto a fixed
//! target schema, submits the resulting records in chunks with per-row
//! status tracking, and exports whatever did not make it in the shape it
//! was imported.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌──────────┐
//! │ CSV text │──▶│  Parser  │──▶│ Transform │──▶│  Submit   │──▶│  Export  │
//! │ (bytes)  │   │  (grid)  │   │ (records) │   │ (status)  │   │  (CSV)   │
//! └──────────┘   └──────────┘   └───────────┘   └───────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fieldload::{import, HttpBroadcaster, HttpUploader, SubmissionPipeline, SubmitConfig};
//!
//! let mut dataset = import(csv_text, true, schema, mappings)?;
//! let pipeline = SubmissionPipeline::new(uploader, broadcaster, SubmitConfig::default());
//! let report = pipeline.submit_all(&mut dataset).await;
//! let leftovers = fieldload::export_failed_or_pending(&dataset)?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per layer
//! - [`config`] - Defaults and environment settings
//! - [`models`] - Target schema, records, row ids and statuses
//! - [`parser`] - CSV parsing and encoding detection
//! - [`transform`] - Field mappings and the transform engine
//! - [`dataset`] - Import sessions and the row index tracker
//! - [`submit`] - Chunked submission pipeline
//! - [`export`] - CSV exports
//! - [`cache`] - Mapping presets
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Import
pub mod dataset;
pub mod parser;
pub mod transform;

// Submission and export
pub mod export;
pub mod submit;

// Presets
pub mod cache;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Errors
// =============================================================================

pub use error::{
    CsvError, ExportError, MappingError, PipelineError, RegistryError, ServerError, SubmitError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{RowId, RowStatus, StatusCounts, TargetField, TargetSchema, TransformedRecord};

// =============================================================================
// Re-exports - Parsing and transform
// =============================================================================

pub use parser::{decode_bytes, parse, read_file, CsvTable, DecodedInput};
pub use transform::{apply_transform, transform_row, transform_table, FieldMapping, HeaderIndex, MapPair, MappingSet};

// =============================================================================
// Re-exports - Dataset, submission, export
// =============================================================================

pub use config::{ServiceConfig, SubmitConfig};
pub use dataset::{import, Dataset, RowIndexTracker};
pub use export::{export_failed_or_pending, export_successful};
pub use submit::{
    Broadcaster, HttpBroadcaster, HttpUploader, RunReport, StatusUpdate, SubmissionPipeline, TxResult, Uploader,
};

// =============================================================================
// Re-exports - Registry
// =============================================================================

pub use cache::{MappingRegistry, StoredMapping};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
