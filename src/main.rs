//! # Docket CLI (`docket`)
//!
//! Extract schedule records from PDF letters and append them to a
//! spreadsheet ledger.
//!
//! ## Usage
//!
//! ```bash
//! docket --config ./config/docket.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docket init` | Create the SQLite index database |
//! | `docket index <pdf>` | Chunk, embed, and store a PDF as a collection |
//! | `docket collections` | List indexed collections |
//! | `docket extract <pdf-or-name>` | Print the records found in a document |
//! | `docket merge --pdf <pdf> --ledger <xlsx> --out <xlsx>` | Append a document's records to a ledger |
//!
//! ## Examples
//!
//! ```bash
//! # Index a letter, then extract from the stored collection
//! docket index "Undangan Rapat (2).pdf"
//! docket extract Undangan_Rapat
//!
//! # Show what the model returned, unparsed
//! docket extract Undangan_Rapat --raw
//!
//! # One step: extract and append to the ledger
//! docket merge --pdf undangan.pdf --ledger jadwal.xlsx --out jadwal-baru.xlsx
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `docket_rag=info`); logs go to
//! stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docket_rag::{commands, config};

/// Docket: retrieval-augmented extraction of schedule records from PDF
/// letters into a spreadsheet ledger.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docket.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docket",
    about = "Extract schedule records from PDF letters into a spreadsheet ledger",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docket.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database.
    ///
    /// Creates the SQLite file and its tables. Safe to run repeatedly.
    Init,

    /// Index a PDF into a named collection.
    ///
    /// The collection name is derived from the file name (or `--name`).
    /// Chunks already stored under that name are not embedded again.
    Index {
        /// Path to the PDF.
        pdf: PathBuf,

        /// Document name to derive the collection from, instead of the file name.
        #[arg(long)]
        name: Option<String>,

        /// Drop the collection first, purging entries from earlier versions.
        #[arg(long)]
        rebuild: bool,
    },

    /// List indexed collections with entry counts.
    Collections,

    /// Extract schedule records and print them as JSON.
    Extract {
        /// A PDF path (indexed first) or the name of an indexed collection.
        source: String,

        /// Extraction instruction; defaults to `[retrieval].instruction`.
        #[arg(long)]
        instruction: Option<String>,

        /// Print the model's unparsed response instead of records.
        #[arg(long)]
        raw: bool,
    },

    /// Extract records from a PDF and append them to a ledger workbook.
    Merge {
        /// The PDF to extract from.
        #[arg(long)]
        pdf: PathBuf,

        /// Existing ledger (`.xlsx`). Omitted or missing starts a new ledger.
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Where to write the merged workbook.
        #[arg(long)]
        out: PathBuf,

        /// Print the merged rows as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docket_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Index { pdf, name, rebuild } => {
            commands::run_index(&cfg, &pdf, name.as_deref(), rebuild).await?;
        }
        Commands::Collections => {
            commands::run_collections(&cfg).await?;
        }
        Commands::Extract {
            source,
            instruction,
            raw,
        } => {
            commands::run_extract(&cfg, &source, instruction.as_deref(), raw).await?;
        }
        Commands::Merge {
            pdf,
            ledger,
            out,
            json,
        } => {
            commands::run_merge(&cfg, &pdf, ledger.as_deref(), &out, json).await?;
        }
    }

    Ok(())
}
