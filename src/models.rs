//! Core data models used throughout the pipeline.
//!
//! These types represent the pages, chunks, extracted records, and ledger
//! rows that flow from the source PDF to the merged spreadsheet.

use serde::{Deserialize, Serialize};

/// Canonical content columns of an extraction record, in output order.
pub const RECORD_FIELDS: [&str; 9] = [
    "HARI",
    "TANGGAL",
    "AGENDA",
    "LOKASI",
    "REQUESTOR",
    "LAYANAN",
    "TYPE_ACARA",
    "SITE",
    "WORKING_HOUR",
];

/// Sequence-key column prepended to every merged row.
pub const SEQUENCE_COLUMN: &str = "NO";

/// All output columns: `NO` followed by the nine record fields.
pub fn ledger_columns() -> Vec<&'static str> {
    let mut cols = Vec::with_capacity(RECORD_FIELDS.len() + 1);
    cols.push(SEQUENCE_COLUMN);
    cols.extend_from_slice(&RECORD_FIELDS);
    cols
}

/// Text of a single PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDocument {
    pub text: String,
    pub page_index: usize,
    pub source_name: String,
}

/// Where a chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceMetadata {
    pub source_name: String,
    pub page_index: usize,
}

/// A bounded segment of page text, identified by its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    /// Content-derived identifier; identical text always yields the same id.
    pub content_id: String,
    pub source: SourceMetadata,
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Handle to a persistent, named collection of embedded chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionHandle {
    pub name: String,
    /// Number of entries stored in the collection.
    pub size: usize,
    /// Entries embedded and inserted by the call that produced this handle.
    pub inserted: usize,
}

/// One schedule entry extracted from a document.
///
/// Every field is optional: a missing value in the model's output is kept as
/// `None` rather than dropping the record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractionRecord {
    #[serde(rename = "HARI")]
    pub hari: Option<String>,
    /// Rendered as `"DD MonthName YYYY"` when recognisable.
    #[serde(rename = "TANGGAL")]
    pub tanggal: Option<String>,
    #[serde(rename = "AGENDA")]
    pub agenda: Option<String>,
    #[serde(rename = "LOKASI")]
    pub lokasi: Option<String>,
    #[serde(rename = "REQUESTOR")]
    pub requestor: Option<String>,
    #[serde(rename = "LAYANAN")]
    pub layanan: Option<String>,
    #[serde(rename = "TYPE_ACARA")]
    pub type_acara: Option<String>,
    #[serde(rename = "SITE")]
    pub site: Option<String>,
    #[serde(rename = "WORKING_HOUR")]
    pub working_hour: Option<String>,
}

impl ExtractionRecord {
    /// Field value by canonical column name.
    pub fn get(&self, field: &str) -> Option<&str> {
        match field {
            "HARI" => self.hari.as_deref(),
            "TANGGAL" => self.tanggal.as_deref(),
            "AGENDA" => self.agenda.as_deref(),
            "LOKASI" => self.lokasi.as_deref(),
            "REQUESTOR" => self.requestor.as_deref(),
            "LAYANAN" => self.layanan.as_deref(),
            "TYPE_ACARA" => self.type_acara.as_deref(),
            "SITE" => self.site.as_deref(),
            "WORKING_HOUR" => self.working_hour.as_deref(),
            _ => None,
        }
    }

    /// Set a field by canonical column name. Unknown names are ignored.
    pub fn set(&mut self, field: &str, value: Option<String>) {
        let slot = match field {
            "HARI" => &mut self.hari,
            "TANGGAL" => &mut self.tanggal,
            "AGENDA" => &mut self.agenda,
            "LOKASI" => &mut self.lokasi,
            "REQUESTOR" => &mut self.requestor,
            "LAYANAN" => &mut self.layanan,
            "TYPE_ACARA" => &mut self.type_acara,
            "SITE" => &mut self.site,
            "WORKING_HOUR" => &mut self.working_hour,
            _ => return,
        };
        *slot = value;
    }

    /// Values in canonical column order.
    pub fn values(&self) -> [Option<&str>; 9] {
        RECORD_FIELDS.map(|f| self.get(f))
    }
}

/// A row of the merged ledger: sequence key plus the nine content columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRow {
    #[serde(rename = "NO")]
    pub no: Option<i64>,
    #[serde(flatten)]
    pub record: ExtractionRecord,
}
