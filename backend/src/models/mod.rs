//! Domain models shared by the import, submission and export stages.
//!
//! - [`TargetField`] / [`TargetSchema`] - the fixed schema rows are mapped onto
//! - [`TransformedRecord`] - one mapped data row
//! - [`RowId`] - stable identity of an imported row
//! - [`RowStatus`] - per-row submission lifecycle

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::{MappingError, MappingResult};

// =============================================================================
// Target Schema
// =============================================================================

/// A field of the target schema.
///
/// `field_type`, `input_type` and `choices` only drive which editor a UI
/// offers for static values; the transform engine ignores them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetField {
    /// Unique key.
    pub name: String,
    /// Display title.
    pub title: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Value>>,
}

impl TargetField {
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            field_type: None,
            input_type: None,
            choices: None,
        }
    }
}

/// Ordered list of target fields. Order defines export column order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct TargetSchema {
    fields: Vec<TargetField>,
}

impl TargetSchema {
    /// Build a schema, rejecting duplicate field names.
    pub fn new(fields: Vec<TargetField>) -> MappingResult<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(MappingError::DuplicateField(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    /// Parse a schema from a JSON array of fields.
    pub fn from_json(json: &str) -> MappingResult<Self> {
        let fields: Vec<TargetField> = serde_json::from_str(json)?;
        Self::new(fields)
    }

    pub fn fields(&self) -> &[TargetField] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// =============================================================================
// Records
// =============================================================================

/// Output of applying every field mapping to one data row.
///
/// Holds one entry per target field; unmapped fields are `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct TransformedRecord {
    values: BTreeMap<String, Option<String>>,
}

impl TransformedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Option<String>) {
        self.values.insert(field.into(), value);
    }

    /// Value of a field, `None` when unmapped or absent.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(|v| v.as_deref())
    }

    /// Whether the record has an entry (possibly `None`) for this field.
    pub fn has_field(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// JSON object payload, `null` for unmapped fields.
    pub fn to_json(&self) -> Value {
        let obj: Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| {
                let value = v.as_ref().map(|s| Value::String(s.clone())).unwrap_or(Value::Null);
                (k.clone(), value)
            })
            .collect();
        Value::Object(obj)
    }
}

// =============================================================================
// Row Identity & Status
// =============================================================================

/// Identifier assigned to a row at import time. Never reused within a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row#{}", self.0)
    }
}

/// Submission lifecycle of one row.
///
/// `Pending -> Uploading -> Success | Failed`, then a failed row is retried
/// once and ends `Success | FailedTwice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowStatus {
    #[default]
    Pending,
    Uploading,
    Success,
    Failed,
    FailedTwice,
}

impl RowStatus {
    /// Rows that still need work: pending, failed, or failed twice.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, RowStatus::Pending | RowStatus::Failed | RowStatus::FailedTwice)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Pending => "pending",
            RowStatus::Uploading => "uploading",
            RowStatus::Success => "success",
            RowStatus::Failed => "failed",
            RowStatus::FailedTwice => "failed-twice",
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of rows in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: usize,
    pub uploading: usize,
    pub success: usize,
    pub failed: usize,
    pub failed_twice: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: RowStatus) {
        match status {
            RowStatus::Pending => self.pending += 1,
            RowStatus::Uploading => self.uploading += 1,
            RowStatus::Success => self.success += 1,
            RowStatus::Failed => self.failed += 1,
            RowStatus::FailedTwice => self.failed_twice += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.uploading + self.success + self.failed + self.failed_twice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_rejects_duplicates() {
        let fields = vec![TargetField::new("crop", "Crop"), TargetField::new("crop", "Crop again")];
        assert!(matches!(TargetSchema::new(fields), Err(MappingError::DuplicateField(_))));
    }

    #[test]
    fn test_schema_from_json() {
        let json = r#"[
            {"name": "farmer", "title": "Farmer"},
            {"name": "crops", "title": "Crops", "type": "checkbox", "choices": ["maize", "beans"]}
        ]"#;
        let schema = TargetSchema::from_json(json).unwrap();
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["farmer", "crops"]);
        assert_eq!(schema.fields()[1].field_type.as_deref(), Some("checkbox"));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&RowStatus::FailedTwice).unwrap(), "\"failed-twice\"");
        assert_eq!(RowStatus::default(), RowStatus::Pending);
        assert!(RowStatus::Failed.is_incomplete());
        assert!(!RowStatus::Success.is_incomplete());
        assert!(!RowStatus::Uploading.is_incomplete());
    }

    #[test]
    fn test_record_json_has_nulls() {
        let mut record = TransformedRecord::new();
        record.insert("a", Some("1".into()));
        record.insert("b", None);
        assert_eq!(record.to_json(), serde_json::json!({"a": "1", "b": null}));
        assert_eq!(record.get("b"), None);
        assert!(record.has_field("b"));
    }
}
