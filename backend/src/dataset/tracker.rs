//! Position-to-origin bookkeeping for imported rows.
//!
//! Entry `i` describes the row currently shown at position `i`: its stable
//! [`RowId`] and the absolute index of its source row in the parsed grid
//! (header row included). Deleting a position removes one entry; entries
//! after it move down one position but keep their original index.

use serde::Serialize;

use crate::models::RowId;

/// One tracked row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedRow {
    pub id: RowId,
    /// Absolute index into the parsed grid.
    pub original_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RowIndexTracker {
    entries: Vec<TrackedRow>,
}

impl RowIndexTracker {
    /// Track `count` data rows. Row `i` maps to grid row `i + 1` when the
    /// grid starts with a header row. Ids are `first_id, first_id + 1, ...`.
    pub fn build(count: usize, has_headers: bool, first_id: u64) -> Self {
        let offset = usize::from(has_headers);
        let entries = (0..count)
            .map(|i| TrackedRow {
                id: RowId(first_id + i as u64),
                original_index: i + offset,
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&TrackedRow> {
        self.entries.get(position)
    }

    pub fn id_at(&self, position: usize) -> Option<RowId> {
        self.entries.get(position).map(|e| e.id)
    }

    pub fn original_index(&self, position: usize) -> Option<usize> {
        self.entries.get(position).map(|e| e.original_index)
    }

    /// Current position of a row id.
    pub fn position_of(&self, id: RowId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Drop the entry at `position`.
    pub fn remove(&mut self, position: usize) -> Option<TrackedRow> {
        if position < self.entries.len() {
            Some(self.entries.remove(position))
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedRow> {
        self.entries.iter()
    }

    /// Original grid index for every position, in order.
    pub fn original_indices(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.original_index).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
