//! Field mappings: how each target field is derived from source columns.
//!
//! Mappings serialize as JSON objects tagged by `mode`:
//!
//! ```json
//! {
//!   "farmer":  { "mode": "csv", "source": "Name" },
//!   "country": { "mode": "static", "staticValue": "KE" },
//!   "address": { "mode": "concat", "sources": ["Village", "County"], "delimiter": ", " },
//!   "surname": { "mode": "split", "splitSource": "Name", "splitDelimiter": " ", "splitIndex": 1 },
//!   "organic": { "mode": "map", "mapSource": "Org", "mapPairs": [{ "from": "1", "to": "Yes" }] }
//! }
//! ```
//!
//! Sub-fields may be missing; they take the defaults the editor starts with.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::error::{MappingError, MappingResult};
use crate::models::TargetSchema;

/// One `from -> to` replacement for [`FieldMapping::Map`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapPair {
    pub from: String,
    pub to: String,
}

impl MapPair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into() }
    }
}

/// How one target field gets its value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum FieldMapping {
    /// Copy one column.
    Csv {
        #[serde(default)]
        source: Option<String>,
    },

    /// Same value for every row.
    #[serde(rename_all = "camelCase")]
    Static {
        #[serde(default)]
        static_value: String,
    },

    /// Join several columns.
    Concat {
        #[serde(default)]
        sources: Vec<String>,
        #[serde(default)]
        delimiter: String,
    },

    /// Take one token of a column split on a delimiter.
    #[serde(rename_all = "camelCase")]
    Split {
        #[serde(default)]
        split_source: Option<String>,
        #[serde(default = "default_split_delimiter")]
        split_delimiter: String,
        #[serde(default)]
        split_index: usize,
    },

    /// Replace known values, pass others through.
    #[serde(rename_all = "camelCase")]
    Map {
        #[serde(default)]
        map_source: Option<String>,
        #[serde(default)]
        map_pairs: Vec<MapPair>,
    },
}

fn default_split_delimiter() -> String {
    " ".to_string()
}

/// Delimiter used when a second column is dropped onto a field.
pub const DEFAULT_CONCAT_DELIMITER: &str = " ";

impl FieldMapping {
    pub fn csv(source: impl Into<String>) -> Self {
        FieldMapping::Csv { source: Some(source.into()) }
    }

    pub fn constant(value: impl Into<String>) -> Self {
        FieldMapping::Static { static_value: value.into() }
    }

    pub fn concat(sources: Vec<String>, delimiter: impl Into<String>) -> Self {
        FieldMapping::Concat { sources, delimiter: delimiter.into() }
    }

    pub fn split(source: impl Into<String>, delimiter: impl Into<String>, index: usize) -> Self {
        FieldMapping::Split {
            split_source: Some(source.into()),
            split_delimiter: delimiter.into(),
            split_index: index,
        }
    }

    pub fn map(source: impl Into<String>, pairs: Vec<MapPair>) -> Self {
        FieldMapping::Map { map_source: Some(source.into()), map_pairs: pairs }
    }

    /// Column keys this mapping reads.
    pub fn source_columns(&self) -> Vec<&str> {
        match self {
            FieldMapping::Csv { source } => source.as_deref().into_iter().collect(),
            FieldMapping::Static { .. } => Vec::new(),
            FieldMapping::Concat { sources, .. } => sources.iter().map(|s| s.as_str()).collect(),
            FieldMapping::Split { split_source, .. } => split_source.as_deref().into_iter().collect(),
            FieldMapping::Map { map_source, .. } => map_source.as_deref().into_iter().collect(),
        }
    }

    /// Short mode name as used in the JSON tag.
    pub fn mode(&self) -> &'static str {
        match self {
            FieldMapping::Csv { .. } => "csv",
            FieldMapping::Static { .. } => "static",
            FieldMapping::Concat { .. } => "concat",
            FieldMapping::Split { .. } => "split",
            FieldMapping::Map { .. } => "map",
        }
    }
}

/// Mappings keyed by target field name. Fields without an entry are unmapped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct MappingSet {
    mappings: HashMap<String, FieldMapping>,
}

impl MappingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> MappingResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> MappingResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn get(&self, field: &str) -> Option<&FieldMapping> {
        self.mappings.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, mapping: FieldMapping) {
        self.mappings.insert(field.into(), mapping);
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldMapping> {
        self.mappings.remove(field)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldMapping)> {
        self.mappings.iter()
    }

    /// Assign a column to a field the way dropping a column onto it does:
    /// an empty field becomes `csv`, a second column turns it into `concat`
    /// joined by a space, further columns are appended.
    pub fn assign_column(&mut self, field: &str, column: &str) {
        let next = match self.mappings.remove(field) {
            Some(FieldMapping::Csv { source: Some(existing) }) if existing != column => {
                FieldMapping::concat(vec![existing, column.to_string()], DEFAULT_CONCAT_DELIMITER)
            }
            Some(FieldMapping::Concat { mut sources, delimiter }) => {
                sources.push(column.to_string());
                let delimiter = if sources.len() > 1 && delimiter.is_empty() {
                    DEFAULT_CONCAT_DELIMITER.to_string()
                } else {
                    delimiter
                };
                FieldMapping::Concat { sources, delimiter }
            }
            _ => FieldMapping::csv(column),
        };
        self.mappings.insert(field.to_string(), next);
    }

    /// Every column key referenced by any mapping, sorted.
    pub fn source_columns(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self
            .mappings
            .values()
            .flat_map(|m| m.source_columns())
            .collect();
        set.into_iter().map(String::from).collect()
    }

    /// Reject mappings for fields the schema does not declare.
    pub fn check_against(&self, schema: &TargetSchema) -> MappingResult<()> {
        let mut fields: Vec<&String> = self.mappings.keys().collect();
        fields.sort();
        match fields.into_iter().find(|f| !schema.contains(f)) {
            Some(unknown) => Err(MappingError::UnknownField(unknown.clone())),
            None => Ok(()),
        }
    }
}

/// Column key to zero-based position. Build once per dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderIndex {
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    /// Index column keys; on duplicate keys the first column wins.
    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> Self {
        let mut positions = HashMap::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            positions.entry(key.as_ref().to_string()).or_insert(i);
        }
        Self { positions }
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TargetField;

    #[test]
    fn test_mapping_json_shapes() {
        let json = r#"{
            "farmer": {"mode": "csv", "source": "Name"},
            "country": {"mode": "static", "staticValue": "KE"},
            "address": {"mode": "concat", "sources": ["Village", "County"], "delimiter": ", "},
            "surname": {"mode": "split", "splitSource": "Name", "splitIndex": 1},
            "organic": {"mode": "map", "mapSource": "Org", "mapPairs": [{"from": "1", "to": "Yes"}]}
        }"#;
        let set = MappingSet::from_json(json).unwrap();

        assert_eq!(set.get("farmer"), Some(&FieldMapping::csv("Name")));
        assert_eq!(set.get("country"), Some(&FieldMapping::constant("KE")));
        assert_eq!(set.get("surname"), Some(&FieldMapping::split("Name", " ", 1)));
        assert_eq!(set.get("organic").map(|m| m.mode()), Some("map"));
        assert_eq!(set.source_columns(), vec!["County", "Name", "Org", "Village"]);
    }

    #[test]
    fn test_incomplete_mappings_deserialize() {
        let set = MappingSet::from_json(r#"{"a": {"mode": "split"}, "b": {"mode": "csv"}}"#).unwrap();
        assert_eq!(
            set.get("a"),
            Some(&FieldMapping::Split {
                split_source: None,
                split_delimiter: " ".into(),
                split_index: 0
            })
        );
        assert_eq!(set.get("b"), Some(&FieldMapping::Csv { source: None }));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(MappingSet::from_json(r#"{"a": {"mode": "regex"}}"#).is_err());
    }

    #[test]
    fn test_assign_column_builds_concat() {
        let mut set = MappingSet::new();
        set.assign_column("address", "Village");
        assert_eq!(set.get("address"), Some(&FieldMapping::csv("Village")));

        set.assign_column("address", "County");
        assert_eq!(
            set.get("address"),
            Some(&FieldMapping::concat(vec!["Village".into(), "County".into()], " "))
        );

        set.assign_column("address", "Country");
        match set.get("address") {
            Some(FieldMapping::Concat { sources, .. }) => assert_eq!(sources.len(), 3),
            other => panic!("expected concat, got {:?}", other),
        }
    }

    #[test]
    fn test_check_against_schema() {
        let schema = TargetSchema::new(vec![TargetField::new("farmer", "Farmer")]).unwrap();
        let mut set = MappingSet::new();
        set.set("farmer", FieldMapping::csv("Name"));
        assert!(set.check_against(&schema).is_ok());

        set.set("yield", FieldMapping::csv("Kg"));
        assert!(matches!(set.check_against(&schema), Err(MappingError::UnknownField(f)) if f == "yield"));
    }

    #[test]
    fn test_header_index_first_duplicate_wins() {
        let index = HeaderIndex::from_keys(&["a", "b", "a"]);
        assert_eq!(index.position("a"), Some(0));
        assert_eq!(index.position("b"), Some(1));
        assert_eq!(index.position("c"), None);
    }
}
