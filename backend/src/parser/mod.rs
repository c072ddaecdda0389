//! CSV text to string grid, with encoding detection for raw uploads.
//!
//! [`parse`] is a single-pass scanner that never fails: ragged rows, blank
//! lines and unbalanced quotes all produce *some* grid. Callers index rows
//! with bounds checks.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CsvError, CsvResult};

/// Parse CSV text into rows of trimmed cells.
///
/// - `"` toggles quoting; `""` inside quotes is one literal quote
/// - `,` outside quotes ends a field
/// - `\n`, `\r` or `\r\n` outside quotes ends a row, unless the row is empty
/// - a pending field or row at end of input is flushed
///
/// # Example
/// ```
/// let grid = fieldload::parse("a,\"b,c\",\"d\"\"e\"\n");
/// assert_eq!(grid, vec![vec!["a", "b,c", "d\"e"]]);
/// ```
pub fn parse(text: &str) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut current_row: Vec<String> = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;

    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    current_field.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                current_row.push(current_field.trim().to_string());
                current_field.clear();
            }
            '\n' | '\r' if !in_quotes => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                if !current_field.is_empty() || !current_row.is_empty() {
                    current_row.push(current_field.trim().to_string());
                    current_field.clear();
                    rows.push(std::mem::take(&mut current_row));
                }
            }
            _ => current_field.push(c),
        }
    }

    if !current_field.is_empty() || !current_row.is_empty() {
        current_row.push(current_field.trim().to_string());
        rows.push(current_row);
    }

    rows
}

/// A parsed import: the raw grid plus the header flag.
///
/// The grid is never modified after parsing; toggling `has_headers` only
/// changes which row is treated as the header.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CsvTable {
    /// Every parsed row, header row included.
    pub rows: Vec<Vec<String>>,
    pub has_headers: bool,
}

impl CsvTable {
    /// Parse text and wrap it with the header flag.
    pub fn from_text(text: &str, has_headers: bool) -> Self {
        Self {
            rows: parse(text),
            has_headers,
        }
    }

    /// Header cells as written in the file; empty when `has_headers` is false.
    pub fn headers(&self) -> &[String] {
        match (self.has_headers, self.rows.first()) {
            (true, Some(first)) => first.as_slice(),
            _ => &[],
        }
    }

    /// Grid offset of the first data row.
    pub fn data_offset(&self) -> usize {
        usize::from(self.has_headers)
    }

    /// Rows after the header row.
    pub fn data_rows(&self) -> &[Vec<String>] {
        self.rows.get(self.data_offset()..).unwrap_or(&[])
    }

    /// Original grid row by absolute index.
    pub fn row(&self, index: usize) -> Option<&[String]> {
        self.rows.get(index).map(|r| r.as_slice())
    }

    /// Number of columns: the widest row wins.
    pub fn width(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    /// Column keys: header text, or `"Column N"` (1-based) when the header
    /// is blank or the file has no header row.
    pub fn column_keys(&self) -> Vec<String> {
        let headers = self.headers();
        (0..self.width())
            .map(|i| match headers.get(i) {
                Some(h) if !h.trim().is_empty() => h.clone(),
                _ => synthetic_column_key(i),
            })
            .collect()
    }
}

/// `"Column N"` for zero-based position `index`.
pub fn synthetic_column_key(index: usize) -> String {
    format!("Column {}", index + 1)
}

/// Decoded upload with the encoding that was used.
#[derive(Debug, Clone)]
pub struct DecodedInput {
    pub text: String,
    pub encoding: String,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => whatwg_label(other).to_string(),
    }
}

/// Translate chardet names that are not WHATWG labels.
fn whatwg_label(charset: &str) -> &str {
    match charset {
        "maccyrillic" => "x-mac-cyrillic",
        "macroman" => "macintosh",
        "tis-620" => "windows-874",
        other => other,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let text = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => {
            let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
            String::from_utf8_lossy(bytes).into_owned()
        }
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        other => match encoding_rs::Encoding::for_label(whatwg_label(other).as_bytes()) {
            Some(codec) => codec.decode(bytes).0.into_owned(),
            // Unknown label: lossy UTF-8
            None => String::from_utf8_lossy(bytes).into_owned(),
        },
    };
    Ok(text)
}

/// Decode raw upload bytes, detecting the encoding.
pub fn decode_bytes(bytes: &[u8]) -> CsvResult<DecodedInput> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }
    let encoding = detect_encoding(bytes);
    let text = decode_content(bytes, &encoding)?;
    Ok(DecodedInput { text, encoding })
}

/// Read and decode a CSV file from disk.
pub fn read_file<P: AsRef<Path>>(path: P) -> CsvResult<DecodedInput> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_bytes(&bytes)
}
