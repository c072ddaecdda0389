//! Transform engine: applies [`FieldMapping`]s to raw rows.
//!
//! Every function here is total. Missing mappings, unknown columns and
//! short rows resolve to `None` or `""`; nothing panics or errors. Cells are
//! used as parsed (already trimmed), no further normalization happens here.

use super::mapping::{FieldMapping, HeaderIndex, MappingSet};
use crate::models::{TargetSchema, TransformedRecord};
use crate::parser::CsvTable;

/// Value of `field_name` for one raw row.
///
/// `None` when the field is unmapped or its required source is unset.
pub fn apply_transform(
    field_name: &str,
    row: &[String],
    header_index: &HeaderIndex,
    mappings: &MappingSet,
) -> Option<String> {
    let mapping = mappings.get(field_name)?;

    match mapping {
        FieldMapping::Csv { source } => {
            let source = source.as_deref()?;
            cell(row, header_index, source).map(str::to_string)
        }

        FieldMapping::Static { static_value } => Some(static_value.clone()),

        FieldMapping::Concat { sources, delimiter } => {
            let parts: Vec<&str> = sources
                .iter()
                .map(|src| cell(row, header_index, src).unwrap_or(""))
                .collect();
            Some(parts.join(delimiter))
        }

        FieldMapping::Split { split_source, split_delimiter, split_index } => {
            let source = split_source.as_deref()?;
            let value = cell(row, header_index, source).unwrap_or("");
            Some(split_token(value, split_delimiter, *split_index))
        }

        FieldMapping::Map { map_source, map_pairs } => {
            let source = map_source.as_deref()?;
            let value = cell(row, header_index, source).unwrap_or("");

            // The last pair with a matching `from` wins.
            let mapped = map_pairs
                .iter()
                .rev()
                .find(|p| p.from == value)
                .map_or(value, |p| p.to.as_str());

            Some(mapped.to_string())
        }
    }
}

/// Cell for a column key, `None` when the key is unknown or the row is short.
fn cell<'a>(row: &'a [String], header_index: &HeaderIndex, key: &str) -> Option<&'a str> {
    header_index
        .position(key)
        .and_then(|i| row.get(i))
        .map(|s| s.as_str())
}

/// Token `index` of `value` split on `delimiter`, `""` when out of range.
///
/// An empty delimiter splits into single characters.
fn split_token(value: &str, delimiter: &str, index: usize) -> String {
    if delimiter.is_empty() {
        return value.chars().nth(index).map(String::from).unwrap_or_default();
    }
    value.split(delimiter).nth(index).unwrap_or("").to_string()
}

/// Apply every schema field's mapping to one row.
pub fn transform_row(
    schema: &TargetSchema,
    row: &[String],
    header_index: &HeaderIndex,
    mappings: &MappingSet,
) -> TransformedRecord {
    let mut record = TransformedRecord::new();
    for name in schema.names() {
        record.insert(name, apply_transform(name, row, header_index, mappings));
    }
    record
}

/// Transform every data row of a table, building the header index once.
pub fn transform_table(table: &CsvTable, schema: &TargetSchema, mappings: &MappingSet) -> Vec<TransformedRecord> {
    let header_index = HeaderIndex::from_keys(&table.column_keys());
    table
        .data_rows()
        .iter()
        .map(|row| transform_row(schema, row, &header_index, mappings))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TargetField;
    use crate::transform::mapping::MapPair;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn index() -> HeaderIndex {
        HeaderIndex::from_keys(&["Name", "Village", "Org"])
    }

    fn single(field: &str, mapping: FieldMapping) -> MappingSet {
        let mut set = MappingSet::new();
        set.set(field, mapping);
        set
    }

    #[test]
    fn test_unmapped_field_is_none() {
        let r = row(&["Amina Wanjiru", "Kisumu", "1"]);
        assert_eq!(apply_transform("farmer", &r, &index(), &MappingSet::new()), None);
    }

    #[test]
    fn test_csv_mode() {
        let r = row(&["Amina Wanjiru", "Kisumu", "1"]);
        let set = single("village", FieldMapping::csv("Village"));
        assert_eq!(apply_transform("village", &r, &index(), &set).as_deref(), Some("Kisumu"));

        let dangling = single("village", FieldMapping::csv("District"));
        assert_eq!(apply_transform("village", &r, &index(), &dangling), None);

        let unset = single("village", FieldMapping::Csv { source: None });
        assert_eq!(apply_transform("village", &r, &index(), &unset), None);
    }

    #[test]
    fn test_csv_mode_short_row() {
        let r = row(&["Amina Wanjiru"]);
        let set = single("org", FieldMapping::csv("Org"));
        assert_eq!(apply_transform("org", &r, &index(), &set), None);
    }

    #[test]
    fn test_static_mode_ignores_row() {
        let set = single("country", FieldMapping::constant("[\"KE\",\"UG\"]"));
        assert_eq!(apply_transform("country", &[], &index(), &set).as_deref(), Some("[\"KE\",\"UG\"]"));
    }

    #[test]
    fn test_concat_missing_source_is_empty_string() {
        let r = row(&["Amina Wanjiru", "Kisumu"]);
        let set = single(
            "address",
            FieldMapping::concat(vec!["Village".into(), "Org".into(), "Missing".into()], "|"),
        );
        assert_eq!(apply_transform("address", &r, &index(), &set).as_deref(), Some("Kisumu||"));
    }

    #[test]
    fn test_split_mode() {
        let r = row(&["Amina Wanjiru", "Kisumu", "1"]);
        let first = single("given", FieldMapping::split("Name", " ", 0));
        let second = single("given", FieldMapping::split("Name", " ", 1));
        let out_of_range = single("given", FieldMapping::split("Name", " ", 5));

        assert_eq!(apply_transform("given", &r, &index(), &first).as_deref(), Some("Amina"));
        assert_eq!(apply_transform("given", &r, &index(), &second).as_deref(), Some("Wanjiru"));
        assert_eq!(apply_transform("given", &r, &index(), &out_of_range).as_deref(), Some(""));
    }

    #[test]
    fn test_split_without_source_is_none() {
        let r = row(&["Amina Wanjiru"]);
        let set = single(
            "given",
            FieldMapping::Split { split_source: None, split_delimiter: " ".into(), split_index: 0 },
        );
        assert_eq!(apply_transform("given", &r, &index(), &set), None);
    }

    #[test]
    fn test_split_empty_delimiter_splits_chars() {
        let r = row(&["abc"]);
        let set = single("c", FieldMapping::split("Name", "", 2));
        assert_eq!(apply_transform("c", &r, &index(), &set).as_deref(), Some("c"));
    }

    #[test]
    fn test_map_mode_fallback_passes_through() {
        let r = row(&["Amina", "Kisumu", "2"]);
        let set = single("organic", FieldMapping::map("Org", vec![MapPair::new("1", "Yes")]));
        assert_eq!(apply_transform("organic", &r, &index(), &set).as_deref(), Some("2"));
    }

    #[test]
    fn test_map_mode_later_pair_wins() {
        let r = row(&["Amina", "Kisumu", "1"]);
        let set = single(
            "organic",
            FieldMapping::map("Org", vec![MapPair::new("1", "Yes"), MapPair::new("1", "Certified")]),
        );
        assert_eq!(apply_transform("organic", &r, &index(), &set).as_deref(), Some("Certified"));
    }

    #[test]
    fn test_map_mode_interleaved_pairs_across_rows() {
        let pairs = vec![
            MapPair::new("1", "Yes"),
            MapPair::new("0", "No"),
            MapPair::new("1", "Certified"),
        ];
        let set = single("organic", FieldMapping::map("Org", pairs));
        let values: Vec<_> = ["1", "0", "x"]
            .iter()
            .map(|v| apply_transform("organic", &row(&["Amina", "Kisumu", *v]), &index(), &set))
            .collect();
        assert_eq!(
            values,
            vec![Some("Certified".to_string()), Some("No".to_string()), Some("x".to_string())]
        );
    }

    #[test]
    fn test_transform_table_uses_schema_fields() {
        let table = CsvTable::from_text("Name,Village\nAmina,Kisumu\nOtieno,Siaya\n", true);
        let schema = TargetSchema::new(vec![
            TargetField::new("farmer", "Farmer"),
            TargetField::new("village", "Village"),
            TargetField::new("notes", "Notes"),
        ])
        .unwrap();
        let mut set = MappingSet::new();
        set.set("farmer", FieldMapping::csv("Name"));
        set.set("village", FieldMapping::csv("Village"));

        let records = transform_table(&table, &schema, &set);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("farmer"), Some("Otieno"));
        assert_eq!(records[1].get("village"), Some("Siaya"));
        assert!(records[1].has_field("notes"));
        assert_eq!(records[1].get("notes"), None);
    }

    #[test]
    fn test_transform_table_without_headers() {
        let table = CsvTable::from_text("Amina,Kisumu\n", false);
        let schema = TargetSchema::new(vec![TargetField::new("village", "Village")]).unwrap();
        let set = single("village", FieldMapping::csv("Column 2"));

        let records = transform_table(&table, &schema, &set);
        assert_eq!(records[0].get("village"), Some("Kisumu"));
    }
}
