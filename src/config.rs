use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::ledger_columns;

/// Instruction sent with every extraction query unless overridden.
pub const DEFAULT_INSTRUCTION: &str = "Ekstrak seluruh jadwal kegiatan dari surat ini: HARI, TANGGAL, \
AGENDA, LOKASI, REQUESTOR, LAYANAN, TYPE_ACARA, SITE, dan WORKING_HOUR.";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    1500
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_instruction")]
    pub instruction: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            instruction: default_instruction(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_instruction() -> String {
    DEFAULT_INSTRUCTION.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for Ollama (default: `http://localhost:11434`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_llm_model(),
            url: None,
            temperature: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    /// Rows reserved above the header for the title banner.
    #[serde(default = "default_header_offset")]
    pub header_offset: u32,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Display width, in characters, per output column.
    #[serde(default = "default_column_widths")]
    pub column_widths: BTreeMap<String, f64>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            header_offset: default_header_offset(),
            sheet_name: default_sheet_name(),
            title: None,
            column_widths: default_column_widths(),
        }
    }
}

fn default_header_offset() -> u32 {
    3
}
fn default_sheet_name() -> String {
    "Sheet1".to_string()
}

pub fn default_column_widths() -> BTreeMap<String, f64> {
    [
        ("NO", 5.0),
        ("HARI", 10.0),
        ("TANGGAL", 15.0),
        ("AGENDA", 30.0),
        ("LOKASI", 25.0),
        ("REQUESTOR", 20.0),
        ("LAYANAN", 20.0),
        ("TYPE_ACARA", 20.0),
        ("SITE", 15.0),
        ("WORKING_HOUR", 15.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Rows above the ledger's header row.
    #[serde(default = "default_skip_rows")]
    pub skip_rows: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            skip_rows: default_skip_rows(),
        }
    }
}

fn default_skip_rows() -> u32 {
    3
}

impl Config {
    /// Config with every section defaulted, pointing the database at `db_path`.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            export: ExportConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_chars == 0 {
        anyhow::bail!("chunking.chunk_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.chunk_chars {
        anyhow::bail!("chunking.overlap_chars must be smaller than chunking.chunk_chars");
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    // Validate export
    for col in ledger_columns() {
        match config.export.column_widths.get(col) {
            Some(w) if *w > 0.0 => {}
            Some(_) => anyhow::bail!("export.column_widths.{} must be > 0", col),
            None => anyhow::bail!("export.column_widths is missing column '{}'", col),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse("[db]\npath = \"./data/docket.sqlite\"\n").unwrap();
        assert_eq!(cfg.chunking.chunk_chars, 1500);
        assert_eq!(cfg.chunking.overlap_chars, 200);
        assert_eq!(cfg.retrieval.top_k, 4);
        assert_eq!(cfg.export.header_offset, 3);
        assert_eq!(cfg.export.column_widths["AGENDA"], 30.0);
        assert_eq!(cfg.ledger.skip_rows, 3);
        assert!(!cfg.embedding.is_enabled());
        assert!(!cfg.llm.is_enabled());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let err = parse(
            "[db]\npath = \"x\"\n[chunking]\nchunk_chars = 100\noverlap_chars = 100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap_chars"));
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn unknown_llm_provider_rejected() {
        let err = parse("[db]\npath = \"x\"\n[llm]\nprovider = \"mystery\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn partial_column_widths_rejected() {
        let err = parse("[db]\npath = \"x\"\n[export.column_widths]\nNO = 5.0\n").unwrap_err();
        assert!(err.to_string().contains("missing column"));
    }

    #[test]
    fn example_config_is_valid() {
        let cfg = parse(include_str!("../config/docket.example.toml")).unwrap();
        assert!(cfg.embedding.is_enabled());
        assert_eq!(cfg.export.title.as_deref(), Some("JADWAL KEGIATAN"));
        assert_eq!(cfg.export.column_widths, default_column_widths());
    }
}
