//! Tolerant parser for language-model output.
//!
//! Model output is not guaranteed to be well-formed JSON, nor to have a
//! single shape. [`parse`] works down an ordered ladder of
//! [`ParseStrategy`] values, from strict to lenient, and never fails:
//!
//! | Strategy | Applies when | Produces |
//! |----------|--------------|----------|
//! | [`JsonArray`](ParseStrategy::JsonArray) | text is `[...]` | one record per object element |
//! | [`JsonObject`](ParseStrategy::JsonObject) | text is `{...}` | one record |
//! | [`ObjectScan`](ParseStrategy::ObjectScan) | always | one record per well-formed `{...}` span without nested braces |
//!
//! A strategy that applies but cannot parse the text hands over to the next
//! one, so a truncated array still yields its complete objects through the
//! scan. Whatever the strategy, every object is then forced into the nine
//! record fields: keys are matched case-insensitively, unknown keys are
//! dropped, missing ones stay `None`, and `TANGGAL` is normalized by
//! [`crate::dates`].

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::dates::normalize_date_text;
use crate::models::{ExtractionRecord, RECORD_FIELDS};

/// One rung of the parse ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseStrategy {
    JsonArray,
    JsonObject,
    ObjectScan,
}

impl ParseStrategy {
    /// Strategies in the order they are tried.
    pub const LADDER: [ParseStrategy; 3] = [
        ParseStrategy::JsonArray,
        ParseStrategy::JsonObject,
        ParseStrategy::ObjectScan,
    ];

    fn applies(self, text: &str) -> bool {
        match self {
            ParseStrategy::JsonArray => text.starts_with('[') && text.ends_with(']'),
            ParseStrategy::JsonObject => text.starts_with('{') && text.ends_with('}'),
            ParseStrategy::ObjectScan => true,
        }
    }

    /// Parsed objects plus the number of fragments discarded, or `None` when
    /// the text cannot be read this way.
    pub fn attempt(self, text: &str) -> Option<(Vec<Map<String, Value>>, usize)> {
        if !self.applies(text) {
            return None;
        }
        match self {
            ParseStrategy::JsonArray => {
                let items: Vec<Value> = serde_json::from_str(text).ok()?;
                let total = items.len();
                let objects: Vec<Map<String, Value>> = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(map) => Some(map),
                        _ => None,
                    })
                    .collect();
                let discarded = total - objects.len();
                Some((objects, discarded))
            }
            ParseStrategy::JsonObject => {
                let map: Map<String, Value> = serde_json::from_str(text).ok()?;
                Some((vec![map], 0))
            }
            ParseStrategy::ObjectScan => {
                let mut objects = Vec::new();
                let mut discarded = 0;
                for m in object_pattern().find_iter(text) {
                    match serde_json::from_str::<Map<String, Value>>(m.as_str()) {
                        Ok(map) => objects.push(map),
                        Err(_) => discarded += 1,
                    }
                }
                if objects.is_empty() {
                    return None;
                }
                Some((objects, discarded))
            }
        }
    }
}

/// Outcome of parsing one model response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseReport {
    /// Strategy that produced the records; `None` when nothing was readable.
    pub strategy: Option<ParseStrategy>,
    pub records: Vec<ExtractionRecord>,
    /// Array elements or scanned spans that were not usable objects.
    pub discarded: usize,
}

impl ParseReport {
    /// True when the response yielded no records or lost fragments.
    pub fn is_degraded(&self) -> bool {
        self.records.is_empty() || self.discarded > 0
    }
}

/// Parse raw model output into records. Never fails.
///
/// ```rust
/// use docket_rag::parse::parse;
///
/// let records = parse("noise {\"HARI\":\"Senin\"} noise {\"HARI\":\"Selasa\"}");
/// assert_eq!(records.len(), 2);
/// assert_eq!(records[1].hari.as_deref(), Some("Selasa"));
/// assert!(parse("not json at all").is_empty());
/// ```
pub fn parse(raw: &str) -> Vec<ExtractionRecord> {
    parse_detailed(raw).records
}

pub fn parse_detailed(raw: &str) -> ParseReport {
    let text = strip_code_fences(raw);

    let mut report = ParseReport {
        strategy: None,
        records: Vec::new(),
        discarded: 0,
    };

    for strategy in ParseStrategy::LADDER {
        if let Some((objects, discarded)) = strategy.attempt(&text) {
            report.strategy = Some(strategy);
            report.records = objects.iter().map(to_record).collect();
            report.discarded = discarded;
            break;
        }
        debug!(?strategy, "parse strategy did not apply");
    }

    if report.records.is_empty() {
        warn!(
            response_chars = raw.chars().count(),
            "model response yielded no records"
        );
    } else if report.discarded > 0 {
        warn!(
            strategy = ?report.strategy,
            kept = report.records.len(),
            discarded = report.discarded,
            "discarded unreadable fragments of model response"
        );
    }

    report
}

/// Remove markdown code-fence markers and surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Uppercase a model key and map spaces and hyphens to underscores.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_uppercase().replace([' ', '-'], "_")
}

fn object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{[^{}]+\}").expect("valid regex"))
}

fn to_record(object: &Map<String, Value>) -> ExtractionRecord {
    let mut record = ExtractionRecord::default();
    for (key, value) in object {
        let field = normalize_key(key);
        if !RECORD_FIELDS.contains(&field.as_str()) || record.get(&field).is_some() {
            continue;
        }
        let text = value_text(value).map(|v| {
            if field == "TANGGAL" {
                normalize_date_text(&v)
            } else {
                v
            }
        });
        record.set(&field, text);
    }
    record
}

fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
