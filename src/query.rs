//! Retrieval-augmented query engine.
//!
//! Retrieves the top-k chunks of a collection for an instruction, joins
//! their text into a context block, fills the extraction prompt, and returns
//! the language model's raw output. Parsing that output is the job of
//! [`crate::parse`].
//!
//! The whole call (query embedding, similarity search, completion) is bounded
//! by a single timeout. Failures surface as [`Error::QueryEngine`] and are
//! not retried here.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::llm::LanguageModel;
use crate::models::{CollectionHandle, ScoredChunk};

const DEFAULT_TOP_K: usize = 4;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Separator placed between retrieved chunks in the prompt context.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Fill the extraction prompt.
///
/// The template asks for one JSON object per record with the nine schema
/// fields, and for a JSON array when the context describes several records
/// (for example an event spanning multiple days).
pub fn render_prompt(context: &str, question: &str) -> String {
    format!(
        r#"
Anda adalah staf data entry yang bertugas mengekstrak informasi jadwal dari dokumen surat.
Buat satu objek JSON untuk setiap kegiatan. Jika sebuah agenda berlangsung lebih dari satu hari,
buat satu objek JSON untuk setiap hari dan kembalikan semuanya dalam sebuah array JSON.
Gunakan hanya potongan konteks di bawah ini untuk menjawab.
Setiap objek JSON memiliki struktur berikut:

{{
    "HARI": "string",
    "TANGGAL": "date",
    "AGENDA": "string",
    "LOKASI": "string",
    "REQUESTOR": "string",
    "LAYANAN": "string",
    "TYPE_ACARA": "string",
    "SITE": "string",
    "WORKING_HOUR": "string"
}}

Konteks:
{context}

---

Jawablah pertanyaan berikut berdasarkan konteks di atas dalam format JSON:
{question}
"#,
        context = context,
        question = question
    )
}

/// Join retrieved chunk text in retrieval order.
pub fn format_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

pub struct QueryEngine {
    index: Arc<VectorIndex>,
    model: Arc<dyn LanguageModel>,
    top_k: usize,
    timeout: Duration,
}

impl QueryEngine {
    pub fn new(index: Arc<VectorIndex>, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            index,
            model,
            top_k: DEFAULT_TOP_K,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `instruction` against `collection` and return the model's raw text.
    pub async fn query(&self, collection: &CollectionHandle, instruction: &str) -> Result<String> {
        let run = async {
            let hits = self
                .index
                .search(&collection.name, instruction, self.top_k)
                .await?;
            let context = format_context(&hits);
            let prompt = render_prompt(&context, instruction);
            debug!(
                collection = %collection.name,
                retrieved = hits.len(),
                prompt_chars = prompt.chars().count(),
                "prompt assembled"
            );
            self.model.complete(&prompt).await
        };

        let raw = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                Error::query_engine(format!(
                    "query against '{}' timed out after {:?}",
                    collection.name, self.timeout
                ))
            })??;

        info!(
            collection = %collection.name,
            provider = self.model.name(),
            model = self.model.model(),
            response_chars = raw.chars().count(),
            "query complete"
        );
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::identity::content_id;
    use crate::models::{Chunk, SourceMetadata};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FlatEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FlatEmbedder {
        fn model_name(&self) -> &str {
            "flat"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct RecordingModel {
        reply: String,
        delay: Duration,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingModel {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                delay: Duration::ZERO,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        fn name(&self) -> &str {
            "recording"
        }
        fn model(&self) -> &str {
            "stub"
        }
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.reply.clone())
        }
    }

    fn chunk(text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            content_id: content_id(text),
            source: SourceMetadata::default(),
        }
    }

    async fn indexed(texts: &[&str]) -> (Arc<VectorIndex>, CollectionHandle) {
        let index = Arc::new(VectorIndex::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(FlatEmbedder),
        ));
        let handle = index
            .index(texts.iter().map(|t| chunk(t)).collect(), "surat.pdf")
            .await
            .unwrap();
        (index, handle)
    }

    #[tokio::test]
    async fn prompt_carries_context_in_retrieval_order() {
        let (index, handle) = indexed(&["satu", "dua", "tiga"]).await;
        let model = Arc::new(RecordingModel::new("```json\n[]\n```"));
        let engine = QueryEngine::new(index, model.clone()).with_top_k(2);

        let raw = engine.query(&handle, "Ekstrak jadwal").await.unwrap();
        assert_eq!(raw, "```json\n[]\n```");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Konteks:\nsatu\n\ndua\n"));
        assert!(!prompts[0].contains("tiga"));
        assert!(prompts[0].contains("dalam format JSON:\nEkstrak jadwal"));
        assert!(prompts[0].contains("\"WORKING_HOUR\": \"string\""));
    }

    #[tokio::test]
    async fn slow_model_times_out_as_query_error() {
        let (index, handle) = indexed(&["satu"]).await;
        let mut model = RecordingModel::new("{}");
        model.delay = Duration::from_secs(5);
        let engine = QueryEngine::new(index, Arc::new(model)).with_timeout(Duration::from_millis(20));

        let err = engine.query(&handle, "x").await.unwrap_err();
        assert!(matches!(err, Error::QueryEngine(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unknown_collection_is_unavailable() {
        let (index, _) = indexed(&["satu"]).await;
        let engine = QueryEngine::new(index, Arc::new(RecordingModel::new("{}")));
        let ghost = CollectionHandle {
            name: "ghost".to_string(),
            size: 0,
            inserted: 0,
        };
        assert!(matches!(
            engine.query(&ghost, "x").await,
            Err(Error::IndexUnavailable { .. })
        ));
    }

    #[test]
    fn context_is_blank_line_joined() {
        let hits: Vec<ScoredChunk> = ["a", "b"]
            .iter()
            .map(|t| ScoredChunk {
                chunk: chunk(t),
                score: 1.0,
            })
            .collect();
        assert_eq!(format_context(&hits), "a\n\nb");
        assert_eq!(format_context(&[]), "");
    }
}
