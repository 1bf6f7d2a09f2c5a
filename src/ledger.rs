//! Reading the existing ledger workbook.
//!
//! The ledger is the spreadsheet this tool has been appending to: a title
//! banner in the first rows, then a header row, then one row per scheduled
//! event. [`read_ledger`] loads the first worksheet with `calamine` and
//! returns the header labels and typed cells untouched; interpreting them is
//! left to [`crate::reconcile`].

use calamine::{Data, Reader};
use chrono::NaiveDate;
use std::io::Cursor;
use tracing::{debug, info};

use crate::dates::{format_date, parse_date};
use crate::error::{Error, Result};

/// A ledger cell as stored in the workbook.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Cell rendered as text; integral numbers drop their fraction.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            CellValue::Number(n) => Some(n.to_string()),
            CellValue::Date(d) => Some(format_date(*d)),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// Header labels and data rows of a ledger, as read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawLedger {
    pub headers: Vec<String>,
    /// Data rows, each padded or cut to `headers.len()` cells.
    pub rows: Vec<Vec<CellValue>>,
}

impl RawLedger {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Empty);
                row
            })
            .collect();
        Self { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read the first worksheet of an `.xlsx` workbook.
///
/// `skip_rows` is the number of banner rows above the header, counted from
/// the top of the sheet. Fully blank data rows are skipped. A sheet with no
/// cells at all is an empty ledger.
pub fn read_ledger(bytes: &[u8], skip_rows: u32) -> Result<RawLedger> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| Error::Ledger(format!("cannot open workbook: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::Ledger("workbook has no worksheets".to_string()))?
        .map_err(|e| Error::Ledger(format!("cannot read first worksheet: {}", e)))?;

    // Ranges start at the first used cell, not necessarily A1
    let Some((first_row, _)) = range.start() else {
        info!("ledger worksheet is empty");
        return Ok(RawLedger::default());
    };

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for (offset, row) in range.rows().enumerate() {
        let absolute = first_row + offset as u32;
        if absolute < skip_rows {
            continue;
        }
        if headers.is_none() {
            if absolute > skip_rows {
                return Err(Error::Ledger(format!(
                    "header row {} is empty",
                    skip_rows + 1
                )));
            }
            headers = Some(
                row.iter()
                    .map(|c| cell_value(c).as_text().unwrap_or_default())
                    .collect(),
            );
            continue;
        }
        let cells: Vec<CellValue> = row.iter().map(cell_value).collect();
        if cells.iter().all(CellValue::is_empty) {
            continue;
        }
        rows.push(cells);
    }

    let Some(headers) = headers else {
        info!(skip_rows, "ledger has no rows below the banner");
        return Ok(RawLedger::default());
    };

    // Trailing blank header cells come from formatting, not data
    let width = headers
        .iter()
        .rposition(|h| !h.trim().is_empty())
        .map_or(0, |i| i + 1);
    let headers: Vec<String> = headers.into_iter().take(width).collect();

    debug!(?headers, "ledger header");
    info!(rows = rows.len(), columns = headers.len(), "ledger loaded");

    Ok(RawLedger::new(headers, rows))
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::from(s.as_str()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(dt) => CellValue::Date(dt.date()),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => match parse_date(s) {
            Some(d) => CellValue::Date(d),
            None => CellValue::from(s.as_str()),
        },
        Data::DurationIso(s) => CellValue::from(s.as_str()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{write_grid, ExportLayout, GridCell};

    fn text(s: &str) -> GridCell {
        GridCell::Text(s.to_string())
    }

    fn workbook(headers: &[&str], rows: Vec<Vec<GridCell>>, header_offset: u32) -> Vec<u8> {
        let layout = ExportLayout {
            header_offset,
            title: Some("JADWAL".to_string()),
            ..ExportLayout::default()
        };
        let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        write_grid(&headers, &rows, &layout).unwrap()
    }

    #[test]
    fn reads_header_below_banner() {
        let bytes = workbook(
            &[" NO", "HARI ", "TANGGAL"],
            vec![
                vec![GridCell::Number(1.0), text("Senin"), text("12 August 2024")],
                vec![GridCell::Number(2.0), text("Selasa"), GridCell::Number(45517.0)],
            ],
            3,
        );
        let ledger = read_ledger(&bytes, 3).unwrap();
        assert_eq!(ledger.headers, vec!["NO", "HARI", "TANGGAL"]);
        assert_eq!(ledger.rows.len(), 2);
        assert_eq!(ledger.rows[0][0], CellValue::Number(1.0));
        assert_eq!(ledger.rows[0][2], CellValue::Text("12 August 2024".to_string()));
        assert_eq!(ledger.rows[1][2], CellValue::Number(45517.0));
    }

    #[test]
    fn blank_rows_and_short_rows() {
        let bytes = workbook(
            &["NO", "HARI"],
            vec![
                vec![GridCell::Number(1.0)],
                vec![GridCell::Blank, GridCell::Blank],
                vec![GridCell::Number(3.0), text("Rabu")],
            ],
            3,
        );
        let ledger = read_ledger(&bytes, 3).unwrap();
        assert_eq!(ledger.rows.len(), 2);
        assert_eq!(ledger.rows[0], vec![CellValue::Number(1.0), CellValue::Empty]);
    }

    #[test]
    fn header_only_ledger_is_empty() {
        let bytes = workbook(&["NO", "HARI"], Vec::new(), 3);
        let ledger = read_ledger(&bytes, 3).unwrap();
        assert_eq!(ledger.headers.len(), 2);
        assert!(ledger.is_empty());
    }

    #[test]
    fn garbage_is_a_ledger_error() {
        let err = read_ledger(b"definitely not a workbook", 3).unwrap_err();
        assert!(matches!(err, Error::Ledger(_)));
    }

    #[test]
    fn cell_text_rendering() {
        assert_eq!(CellValue::Number(7.0).as_text().as_deref(), Some("7"));
        assert_eq!(CellValue::Number(7.5).as_text().as_deref(), Some("7.5"));
        assert_eq!(CellValue::from("  ").as_text(), None);
        let d = NaiveDate::from_ymd_opt(2024, 8, 12).unwrap();
        assert_eq!(CellValue::Date(d).as_text().as_deref(), Some("12 August 2024"));
    }
}
