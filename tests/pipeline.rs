//! End-to-end pipeline tests with stub providers.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use docket_rag::config::Config;
use docket_rag::embedding::EmbeddingProvider;
use docket_rag::error::{Error, Result};
use docket_rag::export::{self, ExportLayout};
use docket_rag::ledger::{self, CellValue, RawLedger};
use docket_rag::llm::LanguageModel;
use docket_rag::models::{ledger_columns, CollectionHandle, PageDocument};
use docket_rag::pipeline::{Pipeline, PipelineContext};
use docket_rag::sqlite_store::SqliteStore;
use docket_rag::store::memory::InMemoryStore;
use docket_rag::store::IndexStorage;

const KEYWORDS: [&str; 4] = ["rapat", "jadwal", "lokasi", "phrase"];

struct KeywordEmbedder {
    texts_embedded: AtomicUsize,
}

impl KeywordEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            texts_embedded: AtomicUsize::new(0),
        })
    }

    fn count(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }
    fn dims(&self) -> usize {
        KEYWORDS.len() + 1
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let t = t.to_lowercase();
                let mut v: Vec<f32> = KEYWORDS
                    .iter()
                    .map(|k| if t.contains(k) { 1.0 } else { 0.0 })
                    .collect();
                v.push(0.1);
                v
            })
            .collect())
    }
}

/// Answers every prompt with the same text and remembers the prompts.
struct ScriptedModel {
    response: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }
    fn model(&self) -> &str {
        "scripted"
    }
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.response.clone())
    }
}

const TWO_RECORDS: &str = r#"Berikut hasilnya:
```json
[
  {"HARI": "Senin", "TANGGAL": "12 Agustus 2024", "AGENDA": "Rapat koordinasi",
   "LOKASI": "Ruang Rapat Lt. 3", "REQUESTOR": "Bagian Umum", "LAYANAN": "Zoom",
   "TYPE_ACARA": "Internal", "SITE": "Jakarta", "WORKING_HOUR": "09:00 - 12:00"},
  {"hari": "Selasa", "tanggal": "13/08/2024", "agenda": "Evaluasi jadwal",
   "lokasi": null}
]
```"#;

/// Minimal one-page PDF showing `phrase`, with a correct xref table.
fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size 6 /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            xref_start
        )
        .as_bytes(),
    );
    out
}

fn config() -> Config {
    Config::with_db_path("unused.sqlite")
}

fn memory_pipeline(embedder: Arc<KeywordEmbedder>, model: Arc<ScriptedModel>) -> Pipeline {
    Pipeline::from_config(&config(), Arc::new(InMemoryStore::new()), embedder, model)
}

fn ledger_with_numbers(numbers: &[f64]) -> RawLedger {
    let headers = ledger_columns().into_iter().map(String::from).collect();
    let rows = numbers
        .iter()
        .map(|n| {
            vec![
                CellValue::from(*n),
                CellValue::from("Jumat"),
                CellValue::from("2 August 2024"),
                CellValue::from("Apel pagi"),
            ]
        })
        .collect();
    RawLedger::new(headers, rows)
}

fn pages(texts: &[&str]) -> Vec<PageDocument> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| PageDocument {
            text: t.to_string(),
            page_index: i,
            source_name: "undangan.pdf".to_string(),
        })
        .collect()
}

#[tokio::test]
async fn process_document_appends_after_existing_ledger() {
    let model = ScriptedModel::new(TWO_RECORDS);
    let pipeline = memory_pipeline(KeywordEmbedder::new(), model.clone());
    let mut ctx = PipelineContext::new();

    let merged = pipeline
        .process_document(
            &mut ctx,
            &minimal_pdf_with_phrase("undangan rapat phrase"),
            "Undangan Rapat (2).pdf",
            &ledger_with_numbers(&[1.0, 2.0, 3.0]),
        )
        .await
        .unwrap();

    assert_eq!(merged.existing, 3);
    assert_eq!(
        merged.sequence_numbers(),
        vec![Some(1), Some(2), Some(3), Some(4), Some(5)]
    );

    let appended = merged.appended();
    assert_eq!(appended[0].record.agenda.as_deref(), Some("Rapat koordinasi"));
    assert_eq!(appended[0].record.tanggal.as_deref(), Some("12 August 2024"));
    assert_eq!(appended[1].record.hari.as_deref(), Some("Selasa"));
    assert_eq!(appended[1].record.lokasi, None);

    assert_eq!(ctx.collection.as_ref().unwrap().name, "Undangan_Rapat");
    assert_eq!(ctx.last_records.len(), 2);
    assert_eq!(ctx.last_merged.as_ref(), Some(&merged));

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(pipeline.default_instruction()));
}

#[tokio::test]
async fn merge_into_empty_ledger_starts_at_one() {
    let pipeline = memory_pipeline(KeywordEmbedder::new(), ScriptedModel::new(TWO_RECORDS));
    let handle = pipeline
        .build_index(&pages(&["Jadwal rapat minggu depan."]), "jadwal.pdf", false)
        .await
        .unwrap();

    let records = pipeline
        .extract_records(&handle, "Ekstrak jadwal")
        .await
        .unwrap();
    let merged = pipeline.reconcile(&RawLedger::default(), records);

    assert_eq!(merged.existing, 0);
    assert_eq!(merged.sequence_numbers(), vec![Some(1), Some(2)]);
    assert!(merged.warnings.is_empty());
}

#[tokio::test]
async fn prose_response_degrades_to_object_scan() {
    let model = ScriptedModel::new(
        "Saya menemukan {\"AGENDA\": \"Rapat\", \"SITE\": \"Bandung\"} dan juga {rusak}.",
    );
    let pipeline = memory_pipeline(KeywordEmbedder::new(), model);
    let handle = pipeline
        .build_index(&pages(&["Rapat di Bandung."]), "bandung.pdf", false)
        .await
        .unwrap();

    let report = pipeline.extract_report(&handle, "Ekstrak").await.unwrap();
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].site.as_deref(), Some("Bandung"));
    assert!(report.discarded >= 1);
}

#[tokio::test]
async fn unparseable_response_yields_no_records() {
    let pipeline = memory_pipeline(
        KeywordEmbedder::new(),
        ScriptedModel::new("Maaf, saya tidak menemukan jadwal."),
    );
    let handle = pipeline
        .build_index(&pages(&["Tidak ada jadwal."]), "kosong.pdf", false)
        .await
        .unwrap();

    let records = pipeline.extract_records(&handle, "Ekstrak").await.unwrap();
    assert!(records.is_empty());

    let merged = pipeline.reconcile(&ledger_with_numbers(&[7.0]), records);
    assert_eq!(merged.sequence_numbers(), vec![Some(7)]);
}

#[tokio::test]
async fn reindexing_with_sqlite_store_embeds_nothing_new() {
    let tmp = TempDir::new().unwrap();
    let db = tmp.path().join("data/docket.sqlite");
    let doc = pages(&[
        "Rapat koordinasi hari Senin.\n\nLokasi di gedung utama.",
        "Jadwal lanjutan menyusul.",
    ]);

    let embedder = KeywordEmbedder::new();
    let first = {
        let store = Arc::new(SqliteStore::open(&db).await.unwrap());
        let pipeline = Pipeline::from_config(
            &config(),
            store.clone(),
            embedder.clone(),
            ScriptedModel::new("[]"),
        );
        let handle = pipeline.build_index(&doc, "Surat.pdf", false).await.unwrap();
        store.close().await;
        handle
    };
    assert_eq!(first.name, "Surat");
    assert!(first.inserted > 0);
    assert_eq!(first.size, first.inserted);
    let embedded = embedder.count();

    let store = Arc::new(SqliteStore::open(&db).await.unwrap());
    let pipeline = Pipeline::from_config(
        &config(),
        store.clone(),
        embedder.clone(),
        ScriptedModel::new("[]"),
    );
    let second = pipeline.build_index(&doc, "Surat.pdf", false).await.unwrap();

    assert_eq!(second.inserted, 0);
    assert_eq!(second.size, first.size);
    assert_eq!(embedder.count(), embedded);

    let opened = pipeline.index().open("Surat (1).pdf").await.unwrap();
    assert_eq!(opened.size, first.size);

    let listed = store.list_collections().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].source_digest.is_some());
}

#[tokio::test]
async fn querying_unindexed_collection_is_unavailable() {
    let model = ScriptedModel::new("[]");
    let pipeline = memory_pipeline(KeywordEmbedder::new(), model.clone());
    let ghost = CollectionHandle {
        name: "ghost".to_string(),
        size: 0,
        inserted: 0,
    };

    let err = pipeline.extract_records(&ghost, "Ekstrak").await.unwrap_err();
    assert!(matches!(err, Error::IndexUnavailable { .. }));
    assert!(model.prompts().is_empty());

    let err = pipeline.index().open("ghost.pdf").await.unwrap_err();
    assert!(matches!(err, Error::IndexUnavailable { .. }));
}

#[tokio::test]
async fn corrupt_pdf_fails_extraction() {
    let pipeline = memory_pipeline(KeywordEmbedder::new(), ScriptedModel::new("[]"));
    let mut ctx = PipelineContext::new();

    let err = pipeline
        .process_document(&mut ctx, b"bukan pdf", "rusak.pdf", &RawLedger::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Extraction(_)));
    assert!(ctx.collection.is_none());
    assert!(ctx.last_merged.is_none());
}

#[tokio::test]
async fn merged_workbook_reads_back_as_ledger() {
    let pipeline = memory_pipeline(KeywordEmbedder::new(), ScriptedModel::new(TWO_RECORDS));
    let mut ctx = PipelineContext::new();
    let merged = pipeline
        .process_document(
            &mut ctx,
            &minimal_pdf_with_phrase("jadwal rapat"),
            "jadwal.pdf",
            &ledger_with_numbers(&[1.0, 2.0]),
        )
        .await
        .unwrap();

    let layout = ExportLayout::from(&config().export);
    let bytes = export::write_xlsx(&merged, &layout).unwrap();

    let reread = ledger::read_ledger(&bytes, config().ledger.skip_rows).unwrap();
    assert_eq!(
        reread.headers,
        ledger_columns()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
    );
    assert_eq!(reread.rows.len(), 4);

    // A second merge continues numbering from the exported workbook.
    let again = pipeline.reconcile(&reread, ctx.last_records.clone());
    assert_eq!(
        again.sequence_numbers(),
        vec![Some(1), Some(2), Some(3), Some(4), Some(5), Some(6)]
    );
    assert_eq!(again.rows[2].record.tanggal.as_deref(), Some("12 August 2024"));
}
