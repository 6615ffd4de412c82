//! CSV text parser for lead imports
//!
//! Headers and values are trimmed and blank lines are skipped. Problems with
//! individual records are collected instead of aborting the parse, so a
//! single malformed line never loses the rest of the file.

use csv::{ReaderBuilder, Trim};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::lead::RawRow;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CsvError {
    #[error("CSV file exceeds the {limit} byte limit ({actual} bytes)")]
    TooLarge { limit: usize, actual: usize },

    #[error("CSV file has no header row")]
    MissingHeaders,

    #[error("Failed to read CSV headers: {0}")]
    Headers(String),
}

/// Non-fatal problem found while reading one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsvParseError {
    /// 1-based data row, `None` for header problems.
    pub row: Option<usize>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    pub errors: Vec<CsvParseError>,
}

/// Parse a whole CSV document, refusing it when it is larger than `max_bytes`.
pub fn parse_csv(text: &str, max_bytes: Option<usize>) -> Result<ParsedCsv, CsvError> {
    if let Some(limit) = max_bytes {
        if text.len() > limit {
            return Err(CsvError::TooLarge {
                limit,
                actual: text.len(),
            });
        }
    }
    read_records(text, None)
}

/// Parse the header and the first `max_rows` records. Quoted fields may
/// span lines, so the cut is made on records, not on lines.
pub fn preview_csv(text: &str, max_rows: usize) -> Result<ParsedCsv, CsvError> {
    read_records(text, Some(max_rows))
}

fn read_records(text: &str, row_limit: Option<usize>) -> Result<ParsedCsv, CsvError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| CsvError::Headers(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(String::is_empty) {
        return Err(CsvError::MissingHeaders);
    }

    let mut errors = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for header in headers.iter().filter(|h| !h.is_empty()) {
        if !seen.insert(header.as_str()) {
            errors.push(CsvParseError {
                row: None,
                message: format!("Duplicate header \"{header}\""),
            });
        }
    }

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        if row_limit.is_some_and(|limit| rows.len() >= limit) {
            break;
        }
        let row_number = index + 1;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                errors.push(CsvParseError {
                    row: Some(row_number),
                    message: e.to_string(),
                });
                continue;
            }
        };

        if record.iter().all(|value| value.trim().is_empty()) {
            continue;
        }

        if record.len() != headers.len() {
            errors.push(CsvParseError {
                row: Some(row_number),
                message: format!("Expected {} fields but found {}", headers.len(), record.len()),
            });
        }

        let mut row = RawRow::new();
        for (header, value) in headers.iter().zip(record.iter()) {
            if header.is_empty() {
                continue;
            }
            // first column wins on duplicate headers
            row.entry(header.clone()).or_insert_with(|| value.trim().to_string());
        }
        rows.push(row);
    }

    debug!(rows = rows.len(), errors = errors.len(), "parsed CSV");
    Ok(ParsedCsv { headers, rows, errors })
}
