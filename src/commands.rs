//! Implementations of the `docket` subcommands.
//!
//! Each `run_*` function loads what it needs from the [`Config`], drives the
//! [`Pipeline`], and prints a short report to stdout. Logging goes to stderr,
//! so `extract` and `merge --json` output can be piped.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::export::{self, ExportLayout};
use crate::ledger::{self, RawLedger};
use crate::migrate;
use crate::pipeline::{Pipeline, PipelineContext};
use crate::sqlite_store::SqliteStore;
use crate::store::IndexStorage;

pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    println!("Database initialized successfully.");
    Ok(())
}

pub async fn run_index(
    config: &Config,
    pdf: &Path,
    name: Option<&str>,
    rebuild: bool,
) -> Result<()> {
    require_embeddings(config)?;
    let bytes = read_file(pdf)?;
    let document_name = name.map(str::to_string).unwrap_or_else(|| file_name(pdf));

    let pipeline = Pipeline::connect(config).await?;
    let pages = pipeline.extract_text(&bytes, &document_name)?;
    let handle = pipeline.build_index(&pages, &document_name, rebuild).await?;

    println!("index {}", handle.name);
    println!("  pages: {}", pages.len());
    println!("  entries: {}", handle.size);
    println!("  embedded: {}", handle.inserted);
    Ok(())
}

pub async fn run_collections(config: &Config) -> Result<()> {
    let store = SqliteStore::open(&config.db.path).await?;
    let collections = store.list_collections().await?;
    store.close().await;

    if collections.is_empty() {
        println!("No collections.");
        return Ok(());
    }
    for c in collections {
        let digest = c
            .source_digest
            .as_deref()
            .map(|d| &d[..d.len().min(12)])
            .unwrap_or("-");
        println!("{:<40} {:>6} entries  {}", c.name, c.entries, digest);
    }
    Ok(())
}

/// Extract records from a PDF (indexing it first) or an indexed collection.
pub async fn run_extract(
    config: &Config,
    source: &str,
    instruction: Option<&str>,
    raw: bool,
) -> Result<()> {
    require_embeddings(config)?;
    require_llm(config)?;
    let pipeline = Pipeline::connect(config).await?;

    let path = Path::new(source);
    let handle = if path.is_file() {
        let bytes = read_file(path)?;
        let document_name = file_name(path);
        let pages = pipeline.extract_text(&bytes, &document_name)?;
        pipeline.build_index(&pages, &document_name, false).await?
    } else {
        pipeline.index().open(source).await?
    };

    let instruction = instruction.unwrap_or(pipeline.default_instruction());
    if raw {
        println!("{}", pipeline.raw_response(&handle, instruction).await?);
        return Ok(());
    }

    let report = pipeline.extract_report(&handle, instruction).await?;
    println!("{}", serde_json::to_string_pretty(&report.records)?);
    Ok(())
}

/// Extract records from `pdf`, append them to `ledger_path`, and write `out`.
pub async fn run_merge(
    config: &Config,
    pdf: &Path,
    ledger_path: Option<&Path>,
    out: &Path,
    json: bool,
) -> Result<()> {
    require_embeddings(config)?;
    require_llm(config)?;

    let existing = match ledger_path {
        Some(path) if path.exists() => {
            ledger::read_ledger(&read_file(path)?, config.ledger.skip_rows)?
        }
        Some(path) => {
            tracing::info!(path = %path.display(), "ledger not found; starting a new one");
            RawLedger::default()
        }
        None => RawLedger::default(),
    };

    let bytes = read_file(pdf)?;
    let pipeline = Pipeline::connect(config).await?;
    let mut ctx = PipelineContext::new();
    let merged = pipeline
        .process_document(&mut ctx, &bytes, &file_name(pdf), &existing)
        .await?;

    let workbook = export::write_xlsx(&merged, &ExportLayout::from(&config.export))?;
    std::fs::write(out, workbook)
        .with_context(|| format!("Failed to write workbook: {}", out.display()))?;

    if json {
        println!("{}", export::to_json(&merged)?);
        return Ok(());
    }

    println!("merge {}", out.display());
    if let Some(handle) = &ctx.collection {
        println!("  collection: {}", handle.name);
    }
    println!("  existing rows: {}", merged.existing);
    println!("  appended rows: {}", merged.appended().len());
    println!("  warnings: {}", merged.warnings.len());
    for w in &merged.warnings {
        println!("    {}", w);
    }
    Ok(())
}

fn require_embeddings(config: &Config) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("This command requires embeddings. Set [embedding] provider in config.");
    }
    Ok(())
}

fn require_llm(config: &Config) -> Result<()> {
    if !config.llm.is_enabled() {
        bail!("This command requires a language model. Set [llm] provider in config.");
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string()
}
