//! Spreadsheet export
//!
//! Turns a row set into an `.xlsx` workbook with a bold heading row and
//! auto-fitted columns, and serves it as a file download.
//!
//! Headings and row cells are matched by position. When no headings are
//! configured they are taken from the keys of the first row's serde object;
//! when no mapper is configured each row contributes its values in the same
//! declaration order. Rows whose width differs from the heading row are
//! written as they are and logged at `warn`.

use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use rust_xlsxwriter::{ColNum, Format, RowNum, Workbook, Worksheet};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::pagination::RowMapper;

/// MIME type of `.xlsx` files
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A generated spreadsheet ready to be downloaded
#[derive(Debug, Clone)]
pub struct ExportFile {
    /// Download file name
    pub filename: String,
    /// Workbook bytes
    pub bytes: Vec<u8>,
}

impl ExportFile {
    /// Create a download from raw workbook bytes
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

impl IntoResponse for ExportFile {
    fn into_response(self) -> Response {
        let disposition = format!("attachment; filename=\"{}\"", quote_filename(&self.filename));
        (
            [
                (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            self.bytes,
        )
            .into_response()
    }
}

/// Escape a filename for a `Content-Disposition` quoted-string
///
/// Backslashes and quotes are escaped; control characters, which no header
/// value may carry, become `_`.
fn quote_filename(filename: &str) -> String {
    let mut quoted = String::with_capacity(filename.len());
    for c in filename.chars() {
        match c {
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(c);
            }
            c if c.is_control() => quoted.push('_'),
            c => quoted.push(c),
        }
    }
    quoted
}

/// `<prefix>-<UTC %Y-%m-%d_%H-%M-%S>.xlsx`
pub fn export_filename(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}.xlsx", prefix, now.format("%Y-%m-%d_%H-%M-%S"))
}

/// Keys of the first row's object representation, or nothing for an empty export
pub fn default_headings<R: Serialize>(rows: &[R]) -> Result<Vec<String>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    match serde_json::to_value(first)? {
        Value::Object(map) => Ok(map.keys().cloned().collect()),
        _ => Ok(Vec::new()),
    }
}

/// The row's values in declaration order; non-object rows become one cell
pub fn default_cells<R: Serialize>(row: &R) -> Result<Vec<Value>> {
    match serde_json::to_value(row)? {
        Value::Object(map) => Ok(map.into_iter().map(|(_, v)| v).collect()),
        other => Ok(vec![other]),
    }
}

/// Build an `.xlsx` workbook from `rows`
///
/// `headings` and `mapper` fall back to [`default_headings`] and
/// [`default_cells`] respectively.
pub fn build_workbook<R: Serialize>(
    rows: &[R],
    headings: Option<&[String]>,
    mapper: Option<&RowMapper<R>>,
) -> Result<Vec<u8>> {
    let headings = match headings {
        Some(headings) => headings.to_vec(),
        None => default_headings(rows)?,
    };

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    for (col, heading) in headings.iter().enumerate() {
        worksheet.write_string_with_format(0, col_num(col)?, heading, &bold)?;
    }

    let mut mismatched = 0usize;
    for (index, row) in rows.iter().enumerate() {
        let cells = match mapper {
            Some(mapper) => mapper(row),
            None => default_cells(row)?,
        };
        if cells.len() != headings.len() {
            mismatched += 1;
        }
        let row_num = row_num(index + 1)?;
        for (col, cell) in cells.iter().enumerate() {
            write_cell(worksheet, row_num, col_num(col)?, cell)?;
        }
    }

    if mismatched > 0 {
        tracing::warn!(
            rows = mismatched,
            columns = headings.len(),
            "Export rows do not match the heading width"
        );
    }

    worksheet.autofit();
    let bytes = workbook.save_to_buffer()?;

    tracing::info!(
        rows = rows.len(),
        columns = headings.len(),
        bytes = bytes.len(),
        "Export workbook generated"
    );
    Ok(bytes)
}

fn write_cell(worksheet: &mut Worksheet, row: RowNum, col: ColNum, cell: &Value) -> Result<()> {
    match cell {
        Value::Null => {}
        Value::Bool(b) => {
            worksheet.write_boolean(row, col, *b)?;
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) => {
                worksheet.write_number(row, col, f)?;
            }
            None => {
                worksheet.write_string(row, col, n.to_string())?;
            }
        },
        Value::String(s) => {
            worksheet.write_string(row, col, s)?;
        }
        other => {
            worksheet.write_string(row, col, other.to_string())?;
        }
    }
    Ok(())
}

fn row_num(index: usize) -> Result<RowNum> {
    RowNum::try_from(index)
        .ok()
        .filter(|row| *row < 1_048_576)
        .ok_or_else(|| Error::Export(format!("Row {} exceeds the worksheet limit", index)))
}

fn col_num(index: usize) -> Result<ColNum> {
    ColNum::try_from(index)
        .ok()
        .filter(|col| *col < 16_384)
        .ok_or_else(|| Error::Export(format!("Column {} exceeds the worksheet limit", index)))
}
