//! Batched submission of transformed records to the ledger.
//!
//! The pipeline does not talk to the network itself. It drives two
//! capabilities:
//!
//! - [`Uploader`] stores one record and returns its external id
//! - [`Broadcaster`] bundles a chunk's ids into one ledger transaction
//!
//! [`http`] provides implementations backed by HTTP services; tests use
//! in-memory fakes.
//!
//! ```text
//! rows ─▶ chunk ─▶ upload each ─▶ broadcast ids ─▶ success
//!                     │ fail          │ fail
//!                     ▼               ▼
//!                 retry each row alone ─▶ success | failed-twice ─▶ stop
//! ```

pub mod http;
pub mod pipeline;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SubmitResult;
use crate::models::{RowId, RowStatus, TransformedRecord};

pub use http::{HttpBroadcaster, HttpUploader};
pub use pipeline::{RunReport, SubmissionPipeline};

/// Uploads one record, returning an opaque external identifier.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload_one(&self, record: &TransformedRecord) -> SubmitResult<String>;
}

/// Wraps a chunk's external ids into one ledger transaction.
///
/// A signer refusal must be reported as [`crate::error::SubmitError::Declined`].
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast_chunk(&self, external_ids: &[String]) -> SubmitResult<TxResult>;
}

/// Outcome of a successful broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TxResult {
    pub tx_hash: String,
}

/// A row changed status.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    /// Position of the row when the change happened.
    pub index: usize,
    pub row_id: RowId,
    pub status: RowStatus,
}
