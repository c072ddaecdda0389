//! Import sessions.
//!
//! A [`Dataset`] is everything one import produces: the untouched parsed
//! grid, the transformed records, the [`RowIndexTracker`] tying them
//! together and the per-row submission status. Re-importing builds a new
//! `Dataset`; [`Dataset::clear`] drops the current one's contents.
//!
//! Records and statuses are keyed by [`RowId`], so deleting a row only
//! touches the tracker's ordering; nothing else is renumbered.

pub mod tracker;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::api::logs::{log_info, log_success};
use crate::error::{MappingResult, PipelineError, PipelineResult};
use crate::models::{RowId, RowStatus, StatusCounts, TargetSchema, TransformedRecord};
use crate::parser::CsvTable;
use crate::transform::{transform_row, HeaderIndex, MappingSet};

pub use tracker::{RowIndexTracker, TrackedRow};

/// One import of a CSV file against a target schema.
#[derive(Debug, Clone)]
pub struct Dataset {
    id: Uuid,
    imported_at: DateTime<Utc>,
    table: CsvTable,
    schema: TargetSchema,
    mappings: MappingSet,
    tracker: RowIndexTracker,
    records: HashMap<RowId, TransformedRecord>,
    statuses: HashMap<RowId, RowStatus>,
    next_row_id: u64,
}

/// Parse `csv_text` and transform every data row.
///
/// This is the single entry point from raw text to submit-ready records.
pub fn import(
    csv_text: &str,
    has_headers: bool,
    schema: TargetSchema,
    mappings: MappingSet,
) -> MappingResult<Dataset> {
    Dataset::from_table(CsvTable::from_text(csv_text, has_headers), schema, mappings)
}

impl Dataset {
    /// Build a dataset from an already parsed table.
    ///
    /// Fails only if a mapping targets a field the schema lacks.
    pub fn from_table(table: CsvTable, schema: TargetSchema, mappings: MappingSet) -> MappingResult<Self> {
        mappings.check_against(&schema)?;

        let mut dataset = Self {
            id: Uuid::new_v4(),
            imported_at: Utc::now(),
            table,
            schema,
            mappings,
            tracker: RowIndexTracker::default(),
            records: HashMap::new(),
            statuses: HashMap::new(),
            next_row_id: 0,
        };
        dataset.rebuild();

        log_success(format!(
            "Imported {} rows ({} columns)",
            dataset.len(),
            dataset.table.width()
        ));
        Ok(dataset)
    }

    /// Re-derive tracker, records and statuses from the grid.
    /// Fresh row ids are issued; every row starts `pending`.
    fn rebuild(&mut self) {
        let count = self.table.data_rows().len();
        self.tracker = RowIndexTracker::build(count, self.table.has_headers, self.next_row_id);
        self.next_row_id += count as u64;
        self.statuses = self.tracker.iter().map(|e| (e.id, RowStatus::Pending)).collect();
        self.retransform();
    }

    /// Recompute every record from its original row with the current mappings.
    fn retransform(&mut self) {
        let header_index = HeaderIndex::from_keys(&self.table.column_keys());
        let records: HashMap<RowId, TransformedRecord> = self
            .tracker
            .iter()
            .map(|entry| {
                let row = self.table.row(entry.original_index).unwrap_or(&[]);
                (entry.id, transform_row(&self.schema, row, &header_index, &self.mappings))
            })
            .collect();
        self.records = records;
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn imported_at(&self) -> DateTime<Utc> {
        self.imported_at
    }

    pub fn table(&self) -> &CsvTable {
        &self.table
    }

    pub fn schema(&self) -> &TargetSchema {
        &self.schema
    }

    pub fn mappings(&self) -> &MappingSet {
        &self.mappings
    }

    pub fn tracker(&self) -> &RowIndexTracker {
        &self.tracker
    }

    pub fn has_headers(&self) -> bool {
        self.table.has_headers
    }

    /// Number of transformed records.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    pub fn row_id(&self, index: usize) -> Option<RowId> {
        self.tracker.id_at(index)
    }

    pub fn index_of(&self, id: RowId) -> Option<usize> {
        self.tracker.position_of(id)
    }

    pub fn record(&self, index: usize) -> Option<&TransformedRecord> {
        self.tracker.id_at(index).and_then(|id| self.records.get(&id))
    }

    pub fn record_by_id(&self, id: RowId) -> Option<&TransformedRecord> {
        self.records.get(&id)
    }

    /// Records in display order.
    pub fn records(&self) -> Vec<&TransformedRecord> {
        self.tracker.iter().filter_map(|e| self.records.get(&e.id)).collect()
    }

    /// Untransformed source cells of the row at `index`.
    pub fn original_row(&self, index: usize) -> Option<&[String]> {
        self.tracker.original_index(index).and_then(|i| self.table.row(i))
    }

    pub fn status(&self, index: usize) -> Option<RowStatus> {
        self.tracker.id_at(index).map(|id| self.status_of(id))
    }

    /// Status of a row id; rows without an entry count as `pending`.
    pub fn status_of(&self, id: RowId) -> RowStatus {
        self.statuses.get(&id).copied().unwrap_or_default()
    }

    pub(crate) fn set_status(&mut self, id: RowId, status: RowStatus) {
        if self.records.contains_key(&id) {
            self.statuses.insert(id, status);
        }
    }

    /// Statuses in display order.
    pub fn statuses(&self) -> Vec<RowStatus> {
        self.tracker.iter().map(|e| self.status_of(e.id)).collect()
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for status in self.statuses() {
            counts.add(status);
        }
        counts
    }

    /// Indices of rows whose status matches `pred`.
    pub fn indices_where(&self, pred: impl Fn(RowStatus) -> bool) -> Vec<usize> {
        self.statuses()
            .into_iter()
            .enumerate()
            .filter(|(_, s)| pred(*s))
            .map(|(i, _)| i)
            .collect()
    }

    /// Remove the row at `index`. Rows after it move down one position.
    pub fn delete_row(&mut self, index: usize) -> PipelineResult<RowId> {
        let len = self.len();
        let entry = self
            .tracker
            .remove(index)
            .ok_or(PipelineError::RowOutOfRange { index, len })?;

        self.records.remove(&entry.id);
        self.statuses.remove(&entry.id);
        log_info(format!("Deleted row {} (source row {})", index, entry.original_index));
        Ok(entry.id)
    }

    /// Reinterpret the first grid row as header or data.
    ///
    /// Deleted rows come back and every status resets to `pending`.
    pub fn set_has_headers(&mut self, has_headers: bool) {
        if self.table.has_headers == has_headers {
            return;
        }
        self.table.has_headers = has_headers;
        self.rebuild();
        log_info(format!("Header row {}", if has_headers { "enabled" } else { "disabled" }));
    }

    /// Replace the mappings and recompute records. Statuses are kept.
    pub fn set_mappings(&mut self, mappings: MappingSet) -> MappingResult<()> {
        mappings.check_against(&self.schema)?;
        self.mappings = mappings;
        self.retransform();
        Ok(())
    }

    /// Drop all rows, records and statuses.
    pub fn clear(&mut self) {
        self.table = CsvTable::default();
        self.tracker.clear();
        self.records.clear();
        self.statuses.clear();
        log_info("Cleared import data");
    }
}
