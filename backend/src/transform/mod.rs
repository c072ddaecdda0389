//! Transformation module.
//!
//! Maps raw CSV rows onto the target schema:
//! - Mapping: per-field [`FieldMapping`] definitions and the column index
//! - Engine: applying mappings to rows

pub mod engine;
pub mod mapping;

pub use engine::{apply_transform, transform_row, transform_table};
pub use mapping::{FieldMapping, HeaderIndex, MapPair, MappingSet, DEFAULT_CONCAT_DELIMITER};
