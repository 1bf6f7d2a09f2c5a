//! End-to-end document pipeline.
//!
//! [`Pipeline`] wires the stages together behind the four operations the
//! surrounding application calls:
//!
//! | Operation | Stage(s) |
//! |-----------|----------|
//! | [`extract_text`](Pipeline::extract_text) | PDF → pages |
//! | [`build_index`](Pipeline::build_index) | pages → chunks → dedup → embedded collection |
//! | [`extract_records`](Pipeline::extract_records) | collection + instruction → model output → records |
//! | [`reconcile`](Pipeline::reconcile) | ledger + records → merged table |
//!
//! State that a front end would keep between calls (the current collection,
//! the last extraction, the last merge) lives in a [`PipelineContext`] owned
//! by the caller.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::chunk::Chunker;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::Result;
use crate::extract;
use crate::index::{source_digest, IndexOptions, VectorIndex};
use crate::ledger::RawLedger;
use crate::llm::{self, LanguageModel};
use crate::models::{CollectionHandle, ExtractionRecord, PageDocument};
use crate::parse::{parse_detailed, ParseReport};
use crate::query::QueryEngine;
use crate::reconcile::{self, MergedTable};
use crate::sqlite_store::SqliteStore;
use crate::store::IndexStorage;

/// Results carried between pipeline calls.
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    pub collection: Option<CollectionHandle>,
    pub last_records: Vec<ExtractionRecord>,
    pub last_merged: Option<MergedTable>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

pub struct Pipeline {
    chunker: Chunker,
    index: Arc<VectorIndex>,
    engine: QueryEngine,
    instruction: String,
}

impl Pipeline {
    pub fn from_config(
        config: &Config,
        store: Arc<dyn IndexStorage>,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let index = Arc::new(
            VectorIndex::new(store, embedder).with_batch_size(config.embedding.batch_size),
        );
        let engine = QueryEngine::new(index.clone(), model)
            .with_top_k(config.retrieval.top_k)
            .with_timeout(Duration::from_secs(config.llm.timeout_secs));
        Self {
            chunker: Chunker::new(config.chunking.chunk_chars, config.chunking.overlap_chars),
            index,
            engine,
            instruction: config.retrieval.instruction.clone(),
        }
    }

    /// Pipeline over the configured SQLite store and providers.
    pub async fn connect(config: &Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.db.path).await?);
        let embedder = embedding::create_provider(&config.embedding)?;
        let model = llm::create_model(&config.llm)?;
        Ok(Self::from_config(config, store, embedder, model))
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Instruction used when the caller does not supply one.
    pub fn default_instruction(&self) -> &str {
        &self.instruction
    }

    pub fn extract_text(&self, pdf_bytes: &[u8], source_name: &str) -> Result<Vec<PageDocument>> {
        extract::extract_text(pdf_bytes, source_name)
    }

    /// Chunk `pages` and index them under `document_name`.
    ///
    /// With `rebuild`, entries left by earlier versions of the document are
    /// purged first.
    pub async fn build_index(
        &self,
        pages: &[PageDocument],
        document_name: &str,
        rebuild: bool,
    ) -> Result<CollectionHandle> {
        let chunks = self.chunker.chunk_pages(pages);
        info!(
            document = document_name,
            pages = pages.len(),
            chunks = chunks.len(),
            "document chunked"
        );
        let options = IndexOptions {
            rebuild,
            source_digest: Some(source_digest(pages)),
        };
        self.index.index_with(chunks, document_name, &options).await
    }

    /// The model's unprocessed answer to `instruction`.
    pub async fn raw_response(&self, handle: &CollectionHandle, instruction: &str) -> Result<String> {
        self.engine.query(handle, instruction).await
    }

    pub async fn extract_report(
        &self,
        handle: &CollectionHandle,
        instruction: &str,
    ) -> Result<ParseReport> {
        let raw = self.raw_response(handle, instruction).await?;
        let report = parse_detailed(&raw);
        info!(
            collection = %handle.name,
            strategy = ?report.strategy,
            records = report.records.len(),
            "records extracted"
        );
        Ok(report)
    }

    pub async fn extract_records(
        &self,
        handle: &CollectionHandle,
        instruction: &str,
    ) -> Result<Vec<ExtractionRecord>> {
        Ok(self.extract_report(handle, instruction).await?.records)
    }

    pub fn reconcile(&self, existing: &RawLedger, records: Vec<ExtractionRecord>) -> MergedTable {
        reconcile::merge(existing, records)
    }

    /// Run every stage for one document, recording each result in `ctx`.
    pub async fn process_document(
        &self,
        ctx: &mut PipelineContext,
        pdf_bytes: &[u8],
        document_name: &str,
        existing: &RawLedger,
    ) -> Result<MergedTable> {
        let pages = self.extract_text(pdf_bytes, document_name)?;
        let handle = self.build_index(&pages, document_name, false).await?;
        ctx.collection = Some(handle.clone());

        let records = self.extract_records(&handle, &self.instruction).await?;
        ctx.last_records = records.clone();

        let merged = self.reconcile(existing, records);
        ctx.last_merged = Some(merged.clone());
        Ok(merged)
    }
}
