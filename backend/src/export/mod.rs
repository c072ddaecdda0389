//! CSV exports of a dataset.
//!
//! - [`export_successful`] writes the transformed records that reached
//!   `success`, one column per target field in schema order
//! - [`export_failed_or_pending`] writes the untransformed source rows of
//!   every record that did not, under the original header row, ready to be
//!   fixed and imported again
//!
//! Cells containing a comma, quote or line break are quoted with inner
//! quotes doubled. Lines end with `\n`.

use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::api::logs::log_info;
use crate::dataset::Dataset;
use crate::error::ExportResult;
use crate::models::RowStatus;

/// Transformed records with status `success`, headed by the schema's field names.
pub fn export_successful(dataset: &Dataset) -> ExportResult<String> {
    let fields: Vec<&str> = dataset.schema().names().collect();

    let mut rows: Vec<Vec<&str>> = vec![fields.clone()];
    for index in dataset.indices_where(|s| s == RowStatus::Success) {
        if let Some(record) = dataset.record(index) {
            rows.push(fields.iter().map(|f| record.get(f).unwrap_or("")).collect());
        }
    }

    log_info(format!("Exported {} successful rows", rows.len() - 1));
    write_rows(&rows)
}

/// Original rows of every `pending`, `failed` or `failed-twice` record.
///
/// The header row is emitted only when the dataset was imported with one.
pub fn export_failed_or_pending(dataset: &Dataset) -> ExportResult<String> {
    let mut rows: Vec<&[String]> = Vec::new();
    if dataset.has_headers() {
        rows.push(dataset.table().headers());
    }

    let indices = dataset.indices_where(|s| s.is_incomplete());
    for &index in &indices {
        if let Some(original) = dataset.original_row(index) {
            rows.push(original);
        }
    }

    log_info(format!("Exported {} incomplete rows in original format", indices.len()));
    write_rows(&rows)
}

/// Serialize rows of cells. Rows may differ in length.
pub fn write_rows<R, S>(rows: &[R]) -> ExportResult<String>
where
    R: AsRef<[S]>,
    S: AsRef<[u8]>,
{
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .flexible(true)
        .from_writer(Vec::new());

    for row in rows {
        writer.write_record(row.as_ref())?;
    }

    let bytes = writer.into_inner()?;
    Ok(String::from_utf8(bytes)?)
}
