//! Spreadsheet and JSON export of a merged ledger.
//!
//! [`write_xlsx`] produces a single-sheet OOXML workbook laid out the way the
//! ledger is kept by hand:
//!
//! ```text
//! row 1        title banner (merged across all columns, optional)
//! rows 2..3    blank
//! row 4        header: NO HARI TANGGAL AGENDA ... WORKING_HOUR
//! row 5..      one row per ledger entry
//! ```
//!
//! The number of rows above the header and the per-column display widths
//! come from [`ExportLayout`]. Each package part is written with a
//! `quick-xml` [`Writer`] and stored with `zip`; text goes through a
//! shared-strings table.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::config::ExportConfig;
use crate::error::{Error, Result};
use crate::models::ledger_columns;
use crate::reconcile::MergedTable;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const REL_STYLES: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
const REL_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";

const STYLE_HEADER: &str = "1";
const STYLE_TITLE: &str = "2";

/// Sheet layout for export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportLayout {
    /// Rows above the header row; the header sits at this zero-based row.
    pub header_offset: u32,
    pub sheet_name: String,
    pub title: Option<String>,
    /// Display width in characters, keyed by header label.
    pub column_widths: BTreeMap<String, f64>,
}

impl Default for ExportLayout {
    fn default() -> Self {
        Self::from(&ExportConfig::default())
    }
}

impl From<&ExportConfig> for ExportLayout {
    fn from(config: &ExportConfig) -> Self {
        Self {
            header_offset: config.header_offset,
            sheet_name: config.sheet_name.clone(),
            title: config.title.clone(),
            column_widths: config.column_widths.clone(),
        }
    }
}

/// A cell of an exported grid.
#[derive(Debug, Clone, PartialEq)]
pub enum GridCell {
    Blank,
    Text(String),
    Number(f64),
}

/// Write the merged table as an `.xlsx` workbook.
pub fn write_xlsx(table: &MergedTable, layout: &ExportLayout) -> Result<Vec<u8>> {
    let headers: Vec<String> = ledger_columns().into_iter().map(String::from).collect();
    let rows: Vec<Vec<GridCell>> = table
        .rows
        .iter()
        .map(|row| {
            let mut cells = Vec::with_capacity(headers.len());
            cells.push(match row.no {
                Some(n) => GridCell::Number(n as f64),
                None => GridCell::Blank,
            });
            cells.extend(row.record.values().into_iter().map(|v| match v {
                Some(text) => GridCell::Text(text.to_string()),
                None => GridCell::Blank,
            }));
            cells
        })
        .collect();

    let bytes = write_grid(&headers, &rows, layout)?;
    info!(
        rows = rows.len(),
        bytes = bytes.len(),
        header_row = layout.header_offset,
        "workbook written"
    );
    Ok(bytes)
}

/// Write an arbitrary header and rows with the given layout.
pub fn write_grid(headers: &[String], rows: &[Vec<GridCell>], layout: &ExportLayout) -> Result<Vec<u8>> {
    let mut strings = SharedStrings::default();
    let sheet = sheet_xml(headers, rows, layout, &mut strings)?;

    let parts: [(&str, Vec<u8>); 7] = [
        ("[Content_Types].xml", content_types_xml()?),
        ("_rels/.rels", root_rels_xml()?),
        ("xl/workbook.xml", workbook_xml(&layout.sheet_name)?),
        ("xl/_rels/workbook.xml.rels", workbook_rels_xml()?),
        ("xl/styles.xml", styles_xml()?),
        ("xl/sharedStrings.xml", strings.to_xml()?),
        ("xl/worksheets/sheet1.xml", sheet),
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in parts {
        zip.start_file(name, SimpleFileOptions::default())?;
        zip.write_all(&body)
            .map_err(|e| Error::Export(format!("cannot write {}: {}", name, e)))?;
    }
    Ok(zip.finish()?.into_inner())
}

/// Render the merged rows as pretty-printed JSON.
pub fn to_json(table: &MergedTable) -> Result<String> {
    serde_json::to_string_pretty(&table.rows).map_err(|e| Error::Export(e.to_string()))
}

/// Spreadsheet column letters for a zero-based index (`0` → `A`, `26` → `AA`).
pub fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// One XML package part, written event by event.
struct XmlPart {
    writer: Writer<Vec<u8>>,
}

impl XmlPart {
    fn new() -> Result<Self> {
        let mut part = Self {
            writer: Writer::new(Vec::new()),
        };
        part.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        Ok(part)
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| Error::Export(format!("cannot write xml: {}", e)))
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        self.event(Event::Start(
            BytesStart::new(name).with_attributes(attrs.iter().copied()),
        ))
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        self.event(Event::Empty(
            BytesStart::new(name).with_attributes(attrs.iter().copied()),
        ))
    }

    /// `<name attrs>text</name>`, escaping `text`.
    fn text(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<()> {
        self.open(name, attrs)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

#[derive(Default)]
struct SharedStrings {
    ids: HashMap<String, usize>,
    values: Vec<String>,
    refs: usize,
}

impl SharedStrings {
    fn id(&mut self, text: &str) -> usize {
        self.refs += 1;
        let text = xml_safe(text);
        if let Some(&id) = self.ids.get(&text) {
            return id;
        }
        let id = self.values.len();
        self.ids.insert(text.clone(), id);
        self.values.push(text);
        id
    }

    fn to_xml(&self) -> Result<Vec<u8>> {
        let count = self.refs.to_string();
        let unique = self.values.len().to_string();
        let mut part = XmlPart::new()?;
        part.open(
            "sst",
            &[("xmlns", NS_MAIN), ("count", count.as_str()), ("uniqueCount", unique.as_str())],
        )?;
        for value in &self.values {
            part.open("si", &[])?;
            part.text("t", &[("xml:space", "preserve")], value)?;
            part.close("si")?;
        }
        part.close("sst")?;
        Ok(part.finish())
    }
}

/// Characters XML 1.0 cannot carry removed.
fn xml_safe(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

fn sheet_xml(
    headers: &[String],
    rows: &[Vec<GridCell>],
    layout: &ExportLayout,
    strings: &mut SharedStrings,
) -> Result<Vec<u8>> {
    let mut part = XmlPart::new()?;
    part.open("worksheet", &[("xmlns", NS_MAIN), ("xmlns:r", NS_REL)])?;

    let widths: Vec<(usize, f64)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| layout.column_widths.get(h.trim()).map(|w| (i, *w)))
        .collect();
    if !widths.is_empty() {
        part.open("cols", &[])?;
        for (i, width) in &widths {
            let n = (i + 1).to_string();
            let w = width.to_string();
            part.empty(
                "col",
                &[("min", n.as_str()), ("max", n.as_str()), ("width", w.as_str()), ("customWidth", "1")],
            )?;
        }
        part.close("cols")?;
    }
    debug!(columns = widths.len(), "column widths applied");

    part.open("sheetData", &[])?;

    let title = layout
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty() && layout.header_offset > 0);
    if let Some(title) = title {
        part.open("row", &[("r", "1")])?;
        text_cell(&mut part, "A1", title, Some(STYLE_TITLE), strings)?;
        part.close("row")?;
    }

    let header_row = layout.header_offset + 1;
    let r = header_row.to_string();
    part.open("row", &[("r", r.as_str())])?;
    for (i, header) in headers.iter().enumerate() {
        let cell_ref = format!("{}{}", column_letter(i), header_row);
        text_cell(&mut part, &cell_ref, header, Some(STYLE_HEADER), strings)?;
    }
    part.close("row")?;

    for (offset, row) in rows.iter().enumerate() {
        let row_number = header_row + 1 + offset as u32;
        let r = row_number.to_string();
        part.open("row", &[("r", r.as_str())])?;
        for (i, cell) in row.iter().enumerate() {
            let cell_ref = format!("{}{}", column_letter(i), row_number);
            match cell {
                GridCell::Blank => {}
                GridCell::Text(text) => text_cell(&mut part, &cell_ref, text, None, strings)?,
                GridCell::Number(n) if n.is_finite() => {
                    part.open("c", &[("r", cell_ref.as_str())])?;
                    part.text("v", &[], &n.to_string())?;
                    part.close("c")?;
                }
                GridCell::Number(n) => {
                    text_cell(&mut part, &cell_ref, &n.to_string(), None, strings)?
                }
            }
        }
        part.close("row")?;
    }

    part.close("sheetData")?;

    if title.is_some() && headers.len() > 1 {
        let range = format!("A1:{}1", column_letter(headers.len() - 1));
        part.open("mergeCells", &[("count", "1")])?;
        part.empty("mergeCell", &[("ref", range.as_str())])?;
        part.close("mergeCells")?;
    }

    part.close("worksheet")?;
    Ok(part.finish())
}

fn text_cell(
    part: &mut XmlPart,
    cell_ref: &str,
    text: &str,
    style: Option<&str>,
    strings: &mut SharedStrings,
) -> Result<()> {
    let id = strings.id(text).to_string();
    match style {
        Some(s) => part.open("c", &[("r", cell_ref), ("t", "s"), ("s", s)])?,
        None => part.open("c", &[("r", cell_ref), ("t", "s")])?,
    }
    part.text("v", &[], &id)?;
    part.close("c")
}

fn content_types_xml() -> Result<Vec<u8>> {
    const OVERRIDES: [(&str, &str); 4] = [
        (
            "/xl/workbook.xml",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml",
        ),
        (
            "/xl/worksheets/sheet1.xml",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml",
        ),
        (
            "/xl/styles.xml",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml",
        ),
        (
            "/xl/sharedStrings.xml",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml",
        ),
    ];

    let mut part = XmlPart::new()?;
    part.open("Types", &[("xmlns", NS_CONTENT_TYPES)])?;
    part.empty(
        "Default",
        &[
            ("Extension", "rels"),
            ("ContentType", "application/vnd.openxmlformats-package.relationships+xml"),
        ],
    )?;
    part.empty(
        "Default",
        &[("Extension", "xml"), ("ContentType", "application/xml")],
    )?;
    for (name, content_type) in OVERRIDES {
        part.empty("Override", &[("PartName", name), ("ContentType", content_type)])?;
    }
    part.close("Types")?;
    Ok(part.finish())
}

fn relationships_xml(targets: &[(&str, &str)]) -> Result<Vec<u8>> {
    let mut part = XmlPart::new()?;
    part.open("Relationships", &[("xmlns", NS_PKG_REL)])?;
    for (i, (kind, target)) in targets.iter().enumerate() {
        let id = format!("rId{}", i + 1);
        part.empty(
            "Relationship",
            &[("Id", id.as_str()), ("Type", *kind), ("Target", *target)],
        )?;
    }
    part.close("Relationships")?;
    Ok(part.finish())
}

fn root_rels_xml() -> Result<Vec<u8>> {
    relationships_xml(&[(REL_OFFICE_DOCUMENT, "xl/workbook.xml")])
}

fn workbook_rels_xml() -> Result<Vec<u8>> {
    relationships_xml(&[
        (REL_WORKSHEET, "worksheets/sheet1.xml"),
        (REL_STYLES, "styles.xml"),
        (REL_SHARED_STRINGS, "sharedStrings.xml"),
    ])
}

fn workbook_xml(sheet_name: &str) -> Result<Vec<u8>> {
    let sheet_name = xml_safe(sheet_name);
    let mut part = XmlPart::new()?;
    part.open("workbook", &[("xmlns", NS_MAIN), ("xmlns:r", NS_REL)])?;
    part.open("sheets", &[])?;
    part.empty(
        "sheet",
        &[("name", sheet_name.as_str()), ("sheetId", "1"), ("r:id", "rId1")],
    )?;
    part.close("sheets")?;
    part.close("workbook")?;
    Ok(part.finish())
}

/// Style 1 is the bold header, style 2 the bold centered title.
fn styles_xml() -> Result<Vec<u8>> {
    let mut part = XmlPart::new()?;
    part.open("styleSheet", &[("xmlns", NS_MAIN)])?;

    part.open("fonts", &[("count", "2")])?;
    for bold in [false, true] {
        part.open("font", &[])?;
        if bold {
            part.empty("b", &[])?;
        }
        part.empty("sz", &[("val", "11")])?;
        part.empty("name", &[("val", "Calibri")])?;
        part.close("font")?;
    }
    part.close("fonts")?;

    part.open("fills", &[("count", "2")])?;
    for pattern in ["none", "gray125"] {
        part.open("fill", &[])?;
        part.empty("patternFill", &[("patternType", pattern)])?;
        part.close("fill")?;
    }
    part.close("fills")?;

    part.open("borders", &[("count", "1")])?;
    part.open("border", &[])?;
    for side in ["left", "right", "top", "bottom", "diagonal"] {
        part.empty(side, &[])?;
    }
    part.close("border")?;
    part.close("borders")?;

    let base = [("numFmtId", "0"), ("fillId", "0"), ("borderId", "0")];
    part.open("cellStyleXfs", &[("count", "1")])?;
    part.empty("xf", &[base[0], ("fontId", "0"), base[1], base[2]])?;
    part.close("cellStyleXfs")?;

    part.open("cellXfs", &[("count", "3")])?;
    part.empty("xf", &[base[0], ("fontId", "0"), base[1], base[2], ("xfId", "0")])?;
    part.empty(
        "xf",
        &[base[0], ("fontId", "1"), base[1], base[2], ("xfId", "0"), ("applyFont", "1")],
    )?;
    part.open(
        "xf",
        &[
            base[0],
            ("fontId", "1"),
            base[1],
            base[2],
            ("xfId", "0"),
            ("applyFont", "1"),
            ("applyAlignment", "1"),
        ],
    )?;
    part.empty("alignment", &[("horizontal", "center")])?;
    part.close("xf")?;
    part.close("cellXfs")?;

    part.open("cellStyles", &[("count", "1")])?;
    part.empty(
        "cellStyle",
        &[("name", "Normal"), ("xfId", "0"), ("builtinId", "0")],
    )?;
    part.close("cellStyles")?;

    part.close("styleSheet")?;
    Ok(part.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_column_widths;
    use crate::models::{ExtractionRecord, LedgerRow};
    use quick_xml::events::Event;
    use std::io::Read;

    fn part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        out
    }

    /// `<col>` widths keyed by 1-based column number.
    fn col_widths(sheet: &str) -> BTreeMap<usize, f64> {
        let mut reader = quick_xml::Reader::from_str(sheet);
        let mut widths = BTreeMap::new();
        loop {
            match reader.read_event() {
                Ok(Event::Empty(e)) if e.local_name().as_ref() == b"col" => {
                    let mut min = 0;
                    let mut width = 0.0;
                    for attr in e.attributes().flatten() {
                        let value = String::from_utf8_lossy(&attr.value).to_string();
                        match attr.key.as_ref() {
                            b"min" => min = value.parse().unwrap(),
                            b"width" => width = value.parse().unwrap(),
                            _ => {}
                        }
                    }
                    widths.insert(min, width);
                }
                Ok(Event::Eof) => break,
                Err(e) => panic!("bad sheet xml: {}", e),
                _ => {}
            }
        }
        widths
    }

    fn table() -> MergedTable {
        let row = |no: Option<i64>, hari: &str| LedgerRow {
            no,
            record: ExtractionRecord {
                hari: Some(hari.to_string()),
                agenda: Some("Rapat <Koordinasi> & Evaluasi".to_string()),
                ..Default::default()
            },
        };
        MergedTable {
            rows: vec![row(Some(1), "Senin"), row(None, "Selasa"), row(Some(2), "Rabu")],
            existing: 2,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn column_widths_match_configuration() {
        let bytes = write_xlsx(&table(), &ExportLayout::default()).unwrap();
        let widths = col_widths(&part(&bytes, "xl/worksheets/sheet1.xml"));

        let expected = default_column_widths();
        assert_eq!(widths.len(), 10);
        for (i, col) in ledger_columns().iter().enumerate() {
            assert_eq!(widths[&(i + 1)], expected[*col], "width of {}", col);
        }
        assert_eq!(widths[&1], 5.0);
        assert_eq!(widths[&4], 30.0);
    }

    #[test]
    fn header_sits_below_reserved_rows() {
        let layout = ExportLayout {
            title: Some("JADWAL KEGIATAN".to_string()),
            ..ExportLayout::default()
        };
        let bytes = write_xlsx(&table(), &layout).unwrap();
        let sheet = part(&bytes, "xl/worksheets/sheet1.xml");

        assert!(sheet.contains(r#"<row r="1"><c r="A1" t="s" s="2">"#));
        assert!(!sheet.contains(r#"<row r="2">"#));
        assert!(sheet.contains(r#"<row r="4"><c r="A4" t="s" s="1">"#));
        assert!(sheet.contains(r#"<c r="A5"><v>1</v></c>"#));
        assert!(!sheet.contains(r#"r="A6""#));
        assert!(sheet.contains(r#"<c r="A7"><v>2</v></c>"#));
        assert!(sheet.contains(r#"<mergeCell ref="A1:J1"/>"#));

        let strings = part(&bytes, "xl/sharedStrings.xml");
        assert!(strings.contains("JADWAL KEGIATAN"));
        assert!(strings.contains("Rapat &lt;Koordinasi&gt; &amp; Evaluasi"));
    }

    #[test]
    fn every_part_is_well_formed_xml() {
        let layout = ExportLayout {
            sheet_name: "Jadwal & \"Rapat\"".to_string(),
            title: Some("Kegiatan <2024>".to_string()),
            ..ExportLayout::default()
        };
        let mut rows = table();
        rows.rows[0].record.lokasi = Some("Aula\u{1}Utama".to_string());
        let bytes = write_xlsx(&rows, &layout).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let names: Vec<String> = archive.file_names().map(String::from).collect();
        assert_eq!(names.len(), 7);
        for name in &names {
            let mut body = String::new();
            archive.by_name(name).unwrap().read_to_string(&mut body).unwrap();
            assert!(body.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#));
            let mut reader = quick_xml::Reader::from_str(&body);
            let mut depth = 0i32;
            loop {
                match reader.read_event() {
                    Ok(Event::Start(_)) => depth += 1,
                    Ok(Event::End(_)) => depth -= 1,
                    Ok(Event::Eof) => break,
                    Err(e) => panic!("{} is not well formed: {}", name, e),
                    _ => {}
                }
            }
            assert_eq!(depth, 0, "unbalanced elements in {}", name);
        }

        let workbook = part(&bytes, "xl/workbook.xml");
        assert!(workbook.contains(r#"name="Jadwal &amp; &quot;Rapat&quot;""#));
        let strings = part(&bytes, "xl/sharedStrings.xml");
        assert!(strings.contains("Kegiatan &lt;2024&gt;"));
        assert!(strings.contains("AulaUtama"));
    }

    #[test]
    fn read_back_through_ledger_reader() {
        let bytes = write_xlsx(&table(), &ExportLayout::default()).unwrap();
        let ledger = crate::ledger::read_ledger(&bytes, 3).unwrap();
        assert_eq!(ledger.headers, ledger_columns());
        assert_eq!(ledger.rows.len(), 3);
        assert_eq!(
            ledger.rows[2][0],
            crate::ledger::CellValue::Number(2.0)
        );
        assert_eq!(
            ledger.rows[0][3],
            crate::ledger::CellValue::Text("Rapat <Koordinasi> & Evaluasi".to_string())
        );
    }

    #[test]
    fn json_rows_carry_all_columns() {
        let json = to_json(&table()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["NO"], 1);
        assert!(rows[1]["NO"].is_null());
        assert_eq!(rows[2].as_object().unwrap().len(), 10);
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(9), "J");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }
}
