//! Tabular decoding of uploaded beneficiary files (CSV, .xlsx, .xls).
//!
//! Runs entirely client-side of the UPAS backend: nothing here touches the
//! network. The preview exists so an operator can see what was detected in
//! the file (and which required columns are missing) before the file is
//! ever submitted for remote validation.

use calamine::{open_workbook_from_rs, Data, Reader, Xls, Xlsx};
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;

use crate::columns::{self, ColumnMapping};
use crate::file_check::extension_of;

/// Rows shown in a preview payload.
const PREVIEW_SAMPLE_ROWS: usize = 10;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("the file contains no rows")]
    Empty,
    #[error("the file could not be read: {0}")]
    Unreadable(String),
}

/// Decoded table: header row plus data rows, everything stringified.
#[derive(Debug, Clone, Serialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Preview payload: detection results plus a sample of the data.
#[derive(Debug, Clone, Serialize)]
pub struct TablePreview {
    pub headers: Vec<String>,
    pub mapping: ColumnMapping,
    pub has_required_columns: bool,
    pub missing_columns: Vec<String>,
    pub row_count: usize,
    pub sample_rows: Vec<Vec<String>>,
}

/// Decode an uploaded file into a [`RawTable`] by extension.
///
/// Spreadsheets read the first sheet only; the first row is the header row
/// and completely empty rows are dropped. An unrecognized extension is
/// reported as unreadable; callers are expected to have run the metadata
/// checks first.
pub fn parse_table(filename: &str, data: &[u8]) -> Result<RawTable, PreviewError> {
    let ext = extension_of(filename);
    let table = match ext.as_str() {
        "csv" => parse_csv(data)?,
        "xlsx" => parse_xlsx(data)?,
        "xls" => parse_xls(data)?,
        other => return Err(PreviewError::Unreadable(format!("unknown extension .{other}"))),
    };

    if table.headers.is_empty() || table.headers.iter().all(String::is_empty) {
        return Err(PreviewError::Empty);
    }

    Ok(table)
}

/// Decode a file and run column detection over its headers.
pub fn preview_table(filename: &str, data: &[u8]) -> Result<TablePreview, PreviewError> {
    let table = parse_table(filename, data)?;

    let normalized: Vec<String> = table
        .headers
        .iter()
        .map(|h| columns::normalize_header(h))
        .collect();
    let mapping = columns::map_headers(&normalized);

    let missing_columns = mapping
        .missing_required()
        .iter()
        .map(|f| f.name().to_string())
        .collect::<Vec<_>>();

    let sample_rows = table
        .rows
        .iter()
        .take(PREVIEW_SAMPLE_ROWS)
        .cloned()
        .collect();

    Ok(TablePreview {
        headers: table.headers.clone(),
        has_required_columns: missing_columns.is_empty(),
        missing_columns,
        row_count: table.rows.len(),
        sample_rows,
        mapping,
    })
}

fn parse_csv(data: &[u8]) -> Result<RawTable, PreviewError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| PreviewError::Unreadable(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(PreviewError::Empty);
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| PreviewError::Unreadable(e.to_string()))?;
        let row: Vec<String> = record.iter().map(|f| f.to_string()).collect();
        if row.iter().all(String::is_empty) {
            continue;
        }
        rows.push(row);
    }

    Ok(RawTable { headers, rows })
}

/// Read the first worksheet only. Later sheets are ignored for import.
fn parse_xlsx(data: &[u8]) -> Result<RawTable, PreviewError> {
    let cursor = Cursor::new(data);
    let mut workbook: Xlsx<_> = open_workbook_from_rs(cursor)
        .map_err(|e: calamine::XlsxError| PreviewError::Unreadable(e.to_string()))?;

    let name = workbook.sheet_names().first().cloned().ok_or(PreviewError::Empty)?;
    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| PreviewError::Unreadable(e.to_string()))?;
    range_to_table(&range)
}

fn parse_xls(data: &[u8]) -> Result<RawTable, PreviewError> {
    let cursor = Cursor::new(data);
    let mut workbook: Xls<_> = open_workbook_from_rs(cursor)
        .map_err(|e: calamine::XlsError| PreviewError::Unreadable(e.to_string()))?;

    let name = workbook.sheet_names().first().cloned().ok_or(PreviewError::Empty)?;
    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| PreviewError::Unreadable(e.to_string()))?;
    range_to_table(&range)
}

/// Convert a worksheet range into a table. First row = headers.
fn range_to_table(range: &calamine::Range<Data>) -> Result<RawTable, PreviewError> {
    let mut row_iter = range.rows();
    let header_row = row_iter.next().ok_or(PreviewError::Empty)?;
    let headers: Vec<String> = header_row.iter().map(cell_to_string).collect();

    let mut rows = Vec::new();
    for row in row_iter {
        let values: Vec<String> = row.iter().map(cell_to_string).collect();
        if values.iter().all(String::is_empty) {
            continue;
        }
        rows.push(values);
    }

    Ok(RawTable { headers, rows })
}

/// Stringify a calamine cell.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // Avoid trailing ".0" for whole numbers
            if *f == (*f as i64) as f64 && f.abs() < i64::MAX as f64 {
                format!("{}", *f as i64)
            } else {
                format!("{}", f)
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_string(dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    }
}

/// Convert an Excel serial date number to a human-readable string.
/// Excel epoch: 1899-12-30 (with the 1900 leap year bug — day 60 is "Feb 29, 1900" which doesn't exist).
fn excel_serial_to_string(serial: f64) -> String {
    use chrono::{Duration, NaiveDate};

    let days = serial as i64;
    let frac = serial - days as f64;

    // Adjust for Excel's 1900 leap year bug (serial > 59 means after fake Feb 29, 1900)
    let adjusted_days = if days > 59 { days - 1 } else { days };

    // With the bug removed, serial 1 is 1900-01-01, so day zero is 1899-12-31.
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 31).unwrap();
    let Some(date) = epoch.checked_add_signed(Duration::days(adjusted_days)) else {
        return format!("{serial}");
    };

    let total_secs = (frac * 86400.0).round() as i64;
    if total_secs == 0 {
        date.format("%Y-%m-%d").to_string()
    } else {
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;
        format!("{} {:02}:{:02}:{:02}", date.format("%Y-%m-%d"), hours, minutes, seconds)
    }
}
