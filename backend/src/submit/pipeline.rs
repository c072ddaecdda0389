//! Chunked, retry-aware submission of a [`Dataset`].
//!
//! # Policy
//!
//! 1. Rows are split into chunks of `chunk_size` and processed strictly in
//!    order, one chunk at a time, one call in flight at a time.
//! 2. A chunk marks its rows `uploading`, uploads each record, then
//!    broadcasts all ids at once. An upload failure ends the chunk before
//!    the broadcast.
//! 3. On success every row of the chunk is `success`.
//! 4. On a declined signature every row of the chunk is `failed-twice` and
//!    the run stops. Nothing is retried.
//! 5. On any other failure every row is `failed` and retried alone as a
//!    one-row chunk. A row failing its retry is `failed-twice`; the run
//!    finishes retrying that chunk and then stops. Rows never reached stay
//!    `pending`.
//!
//! Failures never escape as `Err`; they are recorded as row statuses and
//! summarized in the [`RunReport`].

use serde::Serialize;
use tokio::sync::broadcast;

use super::{Broadcaster, StatusUpdate, TxResult, Uploader};
use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::config::{SubmitConfig, EVENT_CHANNEL_CAPACITY};
use crate::dataset::Dataset;
use crate::error::{PipelineError, PipelineResult, SubmitError, SubmitResult};
use crate::models::{RowId, RowStatus};

/// Summary of one submission run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Rows handed to the run.
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_twice: usize,
    /// Rows the run never reached.
    pub pending: usize,
    /// Chunks started, including one-row retries.
    pub chunks_attempted: usize,
    /// The run halted before reaching every row.
    pub stopped: bool,
    /// The halt was caused by a declined signature.
    pub declined: bool,
    /// Hashes of successful broadcasts, in order.
    pub tx_hashes: Vec<String>,
}

/// State of one run. Lives for a single `submit_*` call.
struct Run<'a> {
    dataset: &'a mut Dataset,
    stopped: bool,
    declined: bool,
    chunks_attempted: usize,
    tx_hashes: Vec<String>,
}

/// Drives uploads and broadcasts for a dataset.
pub struct SubmissionPipeline<U, B> {
    uploader: U,
    broadcaster: B,
    config: SubmitConfig,
    events: broadcast::Sender<StatusUpdate>,
}

impl<U: Uploader, B: Broadcaster> SubmissionPipeline<U, B> {
    pub fn new(uploader: U, broadcaster: B, config: SubmitConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            uploader,
            broadcaster,
            config,
            events,
        }
    }

    /// Shorthand for [`SubmitConfig::new`] + [`SubmissionPipeline::new`].
    pub fn with_chunk_size(uploader: U, broadcaster: B, chunk_size: usize) -> PipelineResult<Self> {
        Ok(Self::new(uploader, broadcaster, SubmitConfig::new(chunk_size)?))
    }

    pub fn config(&self) -> &SubmitConfig {
        &self.config
    }

    /// Receive every status transition as it happens.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.events.subscribe()
    }

    /// Submit every row that has not succeeded yet, in display order.
    pub async fn submit_all(&self, dataset: &mut Dataset) -> RunReport {
        let ids: Vec<RowId> = dataset
            .indices_where(|s| s != RowStatus::Success)
            .into_iter()
            .filter_map(|i| dataset.row_id(i))
            .collect();
        self.run(dataset, ids).await
    }

    /// Submit the rows at `indices`, in the given order.
    pub async fn submit_rows(&self, dataset: &mut Dataset, indices: &[usize]) -> PipelineResult<RunReport> {
        let ids = indices
            .iter()
            .map(|&index| {
                dataset.row_id(index).ok_or(PipelineError::RowOutOfRange {
                    index,
                    len: dataset.len(),
                })
            })
            .collect::<PipelineResult<Vec<RowId>>>()?;
        Ok(self.run(dataset, ids).await)
    }

    /// Manually resubmit one row as a one-row chunk, whatever its status.
    ///
    /// Ends `success` or `failed`; there is no automatic retry.
    pub async fn resubmit_row(&self, dataset: &mut Dataset, index: usize) -> PipelineResult<RowStatus> {
        let id = dataset.row_id(index).ok_or(PipelineError::RowOutOfRange {
            index,
            len: dataset.len(),
        })?;

        log_info(format!("🔁 Manual resubmission of row {}", index));
        let mut run = Run::new(dataset);
        let status = match self.attempt_chunk(&mut run, &[id]).await {
            Ok(tx) => {
                log_success(format!("Row {} submitted ({})", index, tx.tx_hash));
                RowStatus::Success
            }
            Err(e) => {
                log_error(format!("Row {} failed again: {}", index, e));
                RowStatus::Failed
            }
        };
        self.mark(&mut run, id, status);
        Ok(status)
    }

    async fn run(&self, dataset: &mut Dataset, ids: Vec<RowId>) -> RunReport {
        let chunk_size = self.config.chunk_size();
        let total_chunks = ids.len().div_ceil(chunk_size);
        log_info(format!(
            "📤 Submitting {} rows in {} chunk(s) of up to {}",
            ids.len(),
            total_chunks,
            chunk_size
        ));

        let mut run = Run::new(dataset);

        for (n, chunk) in ids.chunks(chunk_size).enumerate() {
            if run.stopped {
                break;
            }
            log_info(format!("Chunk {}/{}: {} rows", n + 1, total_chunks, chunk.len()));

            match self.attempt_chunk(&mut run, chunk).await {
                Ok(tx) => {
                    log_success(format!("Chunk {} broadcast: {}", n + 1, tx.tx_hash));
                    self.mark_all(&mut run, chunk, RowStatus::Success);
                    run.tx_hashes.push(tx.tx_hash);
                }
                Err(e) if e.is_declined() => {
                    log_error(format!("Chunk {}: signing declined, stopping", n + 1));
                    self.mark_all(&mut run, chunk, RowStatus::FailedTwice);
                    run.stopped = true;
                    run.declined = true;
                }
                Err(e) => {
                    log_warning(format!("Chunk {} failed: {}", n + 1, e));
                    self.mark_all(&mut run, chunk, RowStatus::Failed);
                    self.retry_individually(&mut run, chunk).await;
                }
            }
        }

        let report = run.report(&ids);
        if report.stopped {
            log_warning(format!(
                "Run stopped: {} succeeded, {} failed twice, {} not attempted",
                report.succeeded, report.failed_twice, report.pending
            ));
        } else {
            log_success(format!(
                "Run finished: {} of {} rows succeeded",
                report.succeeded, report.submitted
            ));
        }
        report
    }

    /// Retry each failed row of a chunk alone.
    async fn retry_individually(&self, run: &mut Run<'_>, chunk: &[RowId]) {
        let mut exhausted = false;

        for &id in chunk {
            if run.stopped {
                break;
            }
            if run.dataset.status_of(id) != RowStatus::Failed {
                continue;
            }

            log_info_indent(format!("↻ Retrying {}", id), 1);
            match self.attempt_chunk(run, &[id]).await {
                Ok(tx) => {
                    self.mark(run, id, RowStatus::Success);
                    run.tx_hashes.push(tx.tx_hash);
                }
                Err(e) => {
                    log_error(format!("{} failed twice: {}", id, e));
                    self.mark(run, id, RowStatus::FailedTwice);
                    exhausted = true;
                    if e.is_declined() {
                        run.stopped = true;
                        run.declined = true;
                    }
                }
            }
        }

        if exhausted {
            run.stopped = true;
        }
    }

    /// Upload every row of `ids`, then broadcast their external ids.
    ///
    /// Rows are left `uploading` on success; the caller decides the final
    /// status. A failed upload marks its row `failed` and skips the rest.
    async fn attempt_chunk(&self, run: &mut Run<'_>, ids: &[RowId]) -> SubmitResult<TxResult> {
        run.chunks_attempted += 1;
        self.mark_all(run, ids, RowStatus::Uploading);

        let mut external_ids = Vec::with_capacity(ids.len());
        for &id in ids {
            let Some(record) = run.dataset.record_by_id(id) else {
                self.mark(run, id, RowStatus::Failed);
                return Err(SubmitError::Upload(format!("{} no longer exists", id)));
            };

            let uploaded = self.uploader.upload_one(record).await;
            match uploaded {
                Ok(external_id) => external_ids.push(external_id),
                Err(e) => {
                    self.mark(run, id, RowStatus::Failed);
                    return Err(e);
                }
            }
        }

        self.broadcaster.broadcast_chunk(&external_ids).await
    }

    fn mark_all(&self, run: &mut Run<'_>, ids: &[RowId], status: RowStatus) {
        for &id in ids {
            self.mark(run, id, status);
        }
    }

    fn mark(&self, run: &mut Run<'_>, id: RowId, status: RowStatus) {
        run.dataset.set_status(id, status);
        if let Some(index) = run.dataset.index_of(id) {
            // No subscribers is fine.
            let _ = self.events.send(StatusUpdate { index, row_id: id, status });
        }
    }
}

impl<'a> Run<'a> {
    fn new(dataset: &'a mut Dataset) -> Self {
        Self {
            dataset,
            stopped: false,
            declined: false,
            chunks_attempted: 0,
            tx_hashes: Vec::new(),
        }
    }

    fn report(self, ids: &[RowId]) -> RunReport {
        let mut report = RunReport {
            submitted: ids.len(),
            chunks_attempted: self.chunks_attempted,
            stopped: self.stopped,
            declined: self.declined,
            tx_hashes: self.tx_hashes,
            ..RunReport::default()
        };
        for &id in ids {
            match self.dataset.status_of(id) {
                RowStatus::Success => report.succeeded += 1,
                RowStatus::Failed => report.failed += 1,
                RowStatus::FailedTwice => report.failed_twice += 1,
                RowStatus::Pending | RowStatus::Uploading => report.pending += 1,
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::import;
    use crate::export::export_failed_or_pending;
    use crate::models::{TargetField, TargetSchema, TransformedRecord};
    use crate::transform::{FieldMapping, MappingSet};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    type Spy = Arc<Mutex<Vec<String>>>;

    struct MockUploader {
        spy: Spy,
        rejects: HashSet<String>,
    }

    #[async_trait]
    impl Uploader for MockUploader {
        async fn upload_one(&self, record: &TransformedRecord) -> SubmitResult<String> {
            let name = record.get("farmer").unwrap_or_default().to_string();
            self.spy.lock().unwrap().push(format!("upload:{}", name));
            if self.rejects.contains(&name) {
                return Err(SubmitError::Upload(format!("{} rejected", name)));
            }
            Ok(format!("id-{}", name))
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mode {
        Accept,
        Fail,
        FailMultiRow,
        Decline,
        DeclineSingleRow,
    }

    struct MockBroadcaster {
        spy: Spy,
        mode: Arc<Mutex<Mode>>,
    }

    #[async_trait]
    impl Broadcaster for MockBroadcaster {
        async fn broadcast_chunk(&self, external_ids: &[String]) -> SubmitResult<TxResult> {
            self.spy.lock().unwrap().push(format!("broadcast:{}", external_ids.join("+")));
            let mode = *self.mode.lock().unwrap();
            match mode {
                Mode::Accept => Ok(TxResult { tx_hash: format!("0x{}", external_ids.join("-")) }),
                Mode::FailMultiRow if external_ids.len() == 1 => {
                    Ok(TxResult { tx_hash: format!("0x{}", external_ids[0]) })
                }
                Mode::DeclineSingleRow if external_ids.len() == 1 => Err(SubmitError::Declined),
                Mode::Fail | Mode::FailMultiRow | Mode::DeclineSingleRow => {
                    Err(SubmitError::Broadcast("rpc unavailable".into()))
                }
                Mode::Decline => Err(SubmitError::Declined),
            }
        }
    }

    struct Harness {
        spy: Spy,
        mode: Arc<Mutex<Mode>>,
        pipeline: SubmissionPipeline<MockUploader, MockBroadcaster>,
    }

    fn harness(mode: Mode, rejects: &[&str], chunk_size: usize) -> Harness {
        let spy: Spy = Arc::default();
        let mode = Arc::new(Mutex::new(mode));
        let uploader = MockUploader {
            spy: spy.clone(),
            rejects: rejects.iter().map(|s| s.to_string()).collect(),
        };
        let broadcaster = MockBroadcaster { spy: spy.clone(), mode: mode.clone() };
        let pipeline = SubmissionPipeline::with_chunk_size(uploader, broadcaster, chunk_size).unwrap();
        Harness { spy, mode, pipeline }
    }

    const CSV: &str = "Name,Plot Size\nA,1\nB,\"2,5\"\nC,3\nD,4\nE,5\nF,6\n";

    fn dataset() -> Dataset {
        let schema = TargetSchema::new(vec![
            TargetField::new("farmer", "Farmer"),
            TargetField::new("plot", "Plot"),
        ])
        .unwrap();
        let mut mappings = MappingSet::new();
        mappings.set("farmer", FieldMapping::csv("Name"));
        mappings.set("plot", FieldMapping::csv("Plot Size"));
        import(CSV, true, schema, mappings).unwrap()
    }

    fn calls(spy: &Spy) -> Vec<String> {
        spy.lock().unwrap().clone()
    }

    use crate::models::RowStatus::{Failed, FailedTwice, Pending, Success};

    #[tokio::test]
    async fn test_all_chunks_succeed_in_order() {
        let h = harness(Mode::Accept, &[], 2);
        let mut ds = dataset();

        let report = h.pipeline.submit_all(&mut ds).await;

        assert_eq!(ds.statuses(), vec![Success; 6]);
        assert_eq!(
            calls(&h.spy),
            vec![
                "upload:A", "upload:B", "broadcast:id-A+id-B",
                "upload:C", "upload:D", "broadcast:id-C+id-D",
                "upload:E", "upload:F", "broadcast:id-E+id-F",
            ]
        );
        assert_eq!(report.succeeded, 6);
        assert_eq!(report.chunks_attempted, 3);
        assert_eq!(report.tx_hashes, vec!["0xid-A-id-B", "0xid-C-id-D", "0xid-E-id-F"]);
        assert!(!report.stopped);
    }

    #[tokio::test]
    async fn test_failed_retry_is_terminal_and_stops_run() {
        let h = harness(Mode::Fail, &[], 2);
        let mut ds = dataset();

        let report = h.pipeline.submit_all(&mut ds).await;

        assert_eq!(ds.statuses(), vec![FailedTwice, FailedTwice, Pending, Pending, Pending, Pending]);
        assert_eq!(
            calls(&h.spy),
            vec![
                "upload:A", "upload:B", "broadcast:id-A+id-B",
                "upload:A", "broadcast:id-A",
                "upload:B", "broadcast:id-B",
            ]
        );
        assert!(report.stopped);
        assert!(!report.declined);
        assert_eq!(report.failed_twice, 2);
        assert_eq!(report.pending, 4);
    }

    #[tokio::test]
    async fn test_individual_retry_recovers_and_run_continues() {
        let h = harness(Mode::FailMultiRow, &[], 2);
        let mut ds = dataset();

        let report = h.pipeline.submit_all(&mut ds).await;

        assert_eq!(ds.statuses(), vec![Success; 6]);
        assert_eq!(report.chunks_attempted, 9);
        assert_eq!(report.tx_hashes.len(), 6);
        assert!(!report.stopped);
    }

    #[tokio::test]
    async fn test_decline_short_circuits_without_retries() {
        let h = harness(Mode::Decline, &[], 2);
        let mut ds = dataset();

        let report = h.pipeline.submit_all(&mut ds).await;

        assert_eq!(ds.statuses(), vec![FailedTwice, FailedTwice, Pending, Pending, Pending, Pending]);
        assert_eq!(calls(&h.spy), vec!["upload:A", "upload:B", "broadcast:id-A+id-B"]);
        assert!(report.stopped);
        assert!(report.declined);
        assert_eq!(report.chunks_attempted, 1);
    }

    #[tokio::test]
    async fn test_decline_during_retry_stops_immediately() {
        let h = harness(Mode::DeclineSingleRow, &[], 3);
        let mut ds = dataset();

        let report = h.pipeline.submit_all(&mut ds).await;

        // A is declined on its own retry; B and C are never retried.
        assert_eq!(ds.statuses(), vec![FailedTwice, Failed, Failed, Pending, Pending, Pending]);
        assert_eq!(
            calls(&h.spy),
            vec![
                "upload:A", "upload:B", "upload:C", "broadcast:id-A+id-B+id-C",
                "upload:A", "broadcast:id-A",
            ]
        );
        assert!(report.stopped);
        assert!(report.declined);
        assert_eq!(report.failed_twice, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.pending, 3);
        assert_eq!(report.chunks_attempted, 2);
    }

    #[tokio::test]
    async fn test_upload_failure_skips_broadcast() {
        let h = harness(Mode::Accept, &["B"], 3);
        let mut ds = dataset();

        let report = h.pipeline.submit_all(&mut ds).await;

        // B never uploads; A recovers alone, C never uploaded in the chunk but
        // succeeds on its own retry. The run then stops.
        assert_eq!(ds.statuses(), vec![Success, FailedTwice, Success, Pending, Pending, Pending]);
        assert_eq!(
            calls(&h.spy),
            vec![
                "upload:A", "upload:B",
                "upload:A", "broadcast:id-A",
                "upload:B",
                "upload:C", "broadcast:id-C",
            ]
        );
        assert!(report.stopped);
    }

    #[tokio::test]
    async fn test_status_events_trace_each_transition() {
        let h = harness(Mode::Fail, &[], 2);
        let mut rx = h.pipeline.subscribe();
        let mut ds = dataset();
        let a = ds.row_id(0).unwrap();

        h.pipeline.submit_all(&mut ds).await;

        let mut trace = Vec::new();
        while let Ok(update) = rx.try_recv() {
            if update.row_id == a {
                trace.push(update.status);
            }
        }
        assert_eq!(
            trace,
            vec![RowStatus::Uploading, RowStatus::Failed, RowStatus::Uploading, RowStatus::FailedTwice]
        );
    }

    #[tokio::test]
    async fn test_resubmit_row_after_stop() {
        let h = harness(Mode::Fail, &[], 2);
        let mut ds = dataset();
        h.pipeline.submit_all(&mut ds).await;
        assert_eq!(ds.status(1), Some(FailedTwice));

        *h.mode.lock().unwrap() = Mode::Accept;
        let status = h.pipeline.resubmit_row(&mut ds, 1).await.unwrap();

        assert_eq!(status, Success);
        assert_eq!(ds.status(1), Some(Success));
        assert_eq!(ds.status(0), Some(FailedTwice));
    }

    #[tokio::test]
    async fn test_resubmit_row_failure_is_soft() {
        let h = harness(Mode::Decline, &[], 2);
        let mut ds = dataset();

        let status = h.pipeline.resubmit_row(&mut ds, 0).await.unwrap();
        assert_eq!(status, RowStatus::Failed);
        assert_eq!(
            h.pipeline.resubmit_row(&mut ds, 6).await,
            Err(PipelineError::RowOutOfRange { index: 6, len: 6 })
        );
    }

    #[tokio::test]
    async fn test_next_run_picks_up_remaining_rows() {
        let h = harness(Mode::Decline, &[], 2);
        let mut ds = dataset();
        h.pipeline.submit_all(&mut ds).await;

        *h.mode.lock().unwrap() = Mode::Accept;
        h.spy.lock().unwrap().clear();
        let report = h.pipeline.submit_all(&mut ds).await;

        assert_eq!(report.submitted, 6);
        assert_eq!(ds.statuses(), vec![Success; 6]);

        // nothing left to do
        let report = h.pipeline.submit_all(&mut ds).await;
        assert_eq!(report.submitted, 0);
        assert_eq!(report.chunks_attempted, 0);
    }

    #[tokio::test]
    async fn test_submit_rows_validates_indices() {
        let h = harness(Mode::Accept, &[], 2);
        let mut ds = dataset();

        let err = h.pipeline.submit_rows(&mut ds, &[0, 9]).await.unwrap_err();
        assert_eq!(err, PipelineError::RowOutOfRange { index: 9, len: 6 });
        assert!(calls(&h.spy).is_empty());

        let report = h.pipeline.submit_rows(&mut ds, &[4, 5]).await.unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(ds.status(0), Some(Pending));
    }

    #[tokio::test]
    async fn test_statuses_follow_rows_after_delete() {
        let h = harness(Mode::Fail, &[], 2);
        let mut ds = dataset();
        h.pipeline.submit_all(&mut ds).await;

        ds.delete_row(0).unwrap();
        assert_eq!(ds.statuses(), vec![FailedTwice, Pending, Pending, Pending, Pending]);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let spy: Spy = Arc::default();
        let result = SubmissionPipeline::with_chunk_size(
            MockUploader { spy: spy.clone(), rejects: HashSet::new() },
            MockBroadcaster { spy, mode: Arc::new(Mutex::new(Mode::Accept)) },
            0,
        );
        assert!(matches!(result, Err(PipelineError::InvalidChunkSize(0))));
    }

    #[tokio::test]
    async fn test_every_config_has_a_usable_chunk_size() {
        assert!(SubmitConfig::default().chunk_size() >= 1);

        let spy: Spy = Arc::default();
        let config = SubmitConfig::new(1).unwrap();
        let pipeline = SubmissionPipeline::new(
            MockUploader { spy: spy.clone(), rejects: HashSet::new() },
            MockBroadcaster { spy: spy.clone(), mode: Arc::new(Mutex::new(Mode::Accept)) },
            config,
        );
        let mut ds = dataset();

        let report = pipeline.submit_all(&mut ds).await;

        assert_eq!(pipeline.config().chunk_size(), 1);
        assert_eq!(report.chunks_attempted, 6);
        assert_eq!(ds.statuses(), vec![Success; 6]);
    }

    #[tokio::test]
    async fn test_incomplete_rows_export_in_original_shape() {
        let h = harness(Mode::Fail, &[], 2);
        let mut ds = dataset();
        h.pipeline.submit_all(&mut ds).await;

        let csv = export_failed_or_pending(&ds).unwrap();
        assert_eq!(csv, "Name,Plot Size\nA,1\nB,\"2,5\"\nC,3\nD,4\nE,5\nF,6\n");

        *h.mode.lock().unwrap() = Mode::Accept;
        h.pipeline.resubmit_row(&mut ds, 1).await.unwrap();
        let csv = export_failed_or_pending(&ds).unwrap();
        assert_eq!(csv, "Name,Plot Size\nA,1\nC,3\nD,4\nE,5\nF,6\n");
    }
}
