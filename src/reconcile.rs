//! Ledger reconciliation.
//!
//! [`merge`] appends newly extracted records to the rows of an existing
//! ledger. Existing rows are normalized to the canonical columns and kept in
//! order, never dropped; new records are numbered on from the ledger's
//! highest `NO`. Irregular ledger values degrade to `None` and are reported
//! as [`ReconciliationWarning`]s rather than errors.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

use crate::dates::{format_date, from_excel_serial, parse_date};
use crate::ledger::{CellValue, RawLedger};
use crate::models::{ExtractionRecord, LedgerRow, RECORD_FIELDS, SEQUENCE_COLUMN};
use crate::parse::normalize_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningKind {
    /// A `TANGGAL` cell that is not a recognisable date.
    UnparseableDate,
    /// A `NO` cell that is not an integer.
    UnparseableSequence,
    /// A canonical column absent from the ledger header.
    MissingColumn,
    /// A ledger column outside the canonical set.
    DroppedColumn,
}

/// A ledger irregularity absorbed during the merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationWarning {
    pub kind: WarningKind,
    pub column: String,
    /// Zero-based index of the ledger data row, when the warning is per row.
    pub row: Option<usize>,
    pub value: Option<String>,
}

impl fmt::Display for ReconciliationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            WarningKind::UnparseableDate => "unparseable date",
            WarningKind::UnparseableSequence => "unparseable sequence number",
            WarningKind::MissingColumn => "missing column",
            WarningKind::DroppedColumn => "dropped column",
        };
        write!(f, "{} in {}", what, self.column)?;
        if let Some(row) = self.row {
            write!(f, " (data row {})", row + 1)?;
        }
        if let Some(value) = &self.value {
            write!(f, ": {:?}", value)?;
        }
        Ok(())
    }
}

/// Existing ledger rows followed by newly numbered records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergedTable {
    pub rows: Vec<LedgerRow>,
    /// How many leading rows came from the existing ledger.
    pub existing: usize,
    pub warnings: Vec<ReconciliationWarning>,
}

impl MergedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows appended by the merge.
    pub fn appended(&self) -> &[LedgerRow] {
        &self.rows[self.existing..]
    }

    pub fn sequence_numbers(&self) -> Vec<Option<i64>> {
        self.rows.iter().map(|r| r.no).collect()
    }
}

/// Merge `new_records` after the rows of `existing`.
///
/// New records are numbered `base + 1 ..` in input order, where `base` is
/// the highest readable `NO` in the ledger, or 0.
pub fn merge(existing: &RawLedger, new_records: Vec<ExtractionRecord>) -> MergedTable {
    let mut warnings = Vec::new();
    let columns = map_columns(&existing.headers, &mut warnings);

    let mut rows: Vec<LedgerRow> = existing
        .rows
        .iter()
        .enumerate()
        .map(|(i, cells)| normalize_row(i, cells, &columns, &mut warnings))
        .collect();

    let base = rows.iter().filter_map(|r| r.no).max().unwrap_or(0);
    let existing_count = rows.len();

    rows.extend(
        new_records
            .into_iter()
            .enumerate()
            .map(|(i, record)| LedgerRow {
                no: Some(base + 1 + i as i64),
                record,
            }),
    );

    for w in &warnings {
        warn!(warning = %w, "ledger irregularity");
    }
    info!(
        existing = existing_count,
        appended = rows.len() - existing_count,
        base,
        warnings = warnings.len(),
        "ledger merged"
    );

    MergedTable {
        rows,
        existing: existing_count,
        warnings,
    }
}

/// Canonical column name to ledger column index.
fn map_columns(
    headers: &[String],
    warnings: &mut Vec<ReconciliationWarning>,
) -> HashMap<&'static str, usize> {
    let canonical: Vec<&'static str> = std::iter::once(SEQUENCE_COLUMN)
        .chain(RECORD_FIELDS)
        .collect();

    let mut columns = HashMap::new();
    for (idx, header) in headers.iter().enumerate() {
        let label = header.trim();
        if label.is_empty() {
            continue;
        }
        let key = normalize_key(label);
        match canonical.iter().find(|c| **c == key) {
            Some(col) => {
                columns.entry(*col).or_insert(idx);
            }
            None => warnings.push(ReconciliationWarning {
                kind: WarningKind::DroppedColumn,
                column: label.to_string(),
                row: None,
                value: None,
            }),
        }
    }

    if !headers.is_empty() {
        for col in &canonical {
            if !columns.contains_key(col) {
                warnings.push(ReconciliationWarning {
                    kind: WarningKind::MissingColumn,
                    column: col.to_string(),
                    row: None,
                    value: None,
                });
            }
        }
    }
    columns
}

fn normalize_row(
    row: usize,
    cells: &[CellValue],
    columns: &HashMap<&'static str, usize>,
    warnings: &mut Vec<ReconciliationWarning>,
) -> LedgerRow {
    let mut record = ExtractionRecord::default();
    for field in RECORD_FIELDS {
        let value = if field == "TANGGAL" {
            ledger_date(cell_at(cells, columns, field)).unwrap_or_else(|raw| {
                warnings.push(ReconciliationWarning {
                    kind: WarningKind::UnparseableDate,
                    column: field.to_string(),
                    row: Some(row),
                    value: Some(raw),
                });
                None
            })
        } else {
            cell_at(cells, columns, field).as_text()
        };
        record.set(field, value);
    }

    let no = sequence_number(cell_at(cells, columns, SEQUENCE_COLUMN)).unwrap_or_else(|raw| {
        warnings.push(ReconciliationWarning {
            kind: WarningKind::UnparseableSequence,
            column: SEQUENCE_COLUMN.to_string(),
            row: Some(row),
            value: Some(raw),
        });
        None
    });

    LedgerRow { no, record }
}

static EMPTY_CELL: CellValue = CellValue::Empty;

fn cell_at<'a>(
    cells: &'a [CellValue],
    columns: &HashMap<&'static str, usize>,
    col: &str,
) -> &'a CellValue {
    columns
        .get(col)
        .and_then(|&i| cells.get(i))
        .unwrap_or(&EMPTY_CELL)
}

/// Rendered date, `Ok(None)` for an empty cell, or the raw text on failure.
fn ledger_date(cell: &CellValue) -> Result<Option<String>, String> {
    match cell {
        CellValue::Empty => Ok(None),
        CellValue::Date(d) => Ok(Some(format_date(*d))),
        CellValue::Number(n) => from_excel_serial(*n)
            .map(|d| Some(format_date(d)))
            .ok_or_else(|| n.to_string()),
        CellValue::Text(s) => parse_date(s)
            .map(|d| Some(format_date(d)))
            .ok_or_else(|| s.clone()),
    }
}

/// Integer sequence key, `Ok(None)` for an empty cell, or the raw text.
fn sequence_number(cell: &CellValue) -> Result<Option<i64>, String> {
    let integral = |n: f64| {
        if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
            Some(n as i64)
        } else {
            None
        }
    };
    match cell {
        CellValue::Empty => Ok(None),
        CellValue::Number(n) => integral(*n).map(Some).ok_or_else(|| n.to_string()),
        CellValue::Text(s) => {
            let t = s.trim();
            t.parse::<i64>()
                .ok()
                .or_else(|| t.parse::<f64>().ok().and_then(integral))
                .map(Some)
                .ok_or_else(|| s.clone())
        }
        CellValue::Date(d) => Err(format_date(*d)),
    }
}
