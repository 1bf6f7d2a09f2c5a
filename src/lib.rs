//! # Docket
//!
//! Retrieval-augmented extraction of schedule records from PDF letters,
//! reconciled with an existing spreadsheet ledger.
//!
//! A letter announcing meetings or events is split into pages and chunks,
//! embedded into a per-document collection, and queried with an extraction
//! instruction. The language model's answer is parsed into fixed nine-field
//! [`ExtractionRecord`](models::ExtractionRecord)s, which are numbered on
//! from the ledger's last entry and written back as a workbook.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌─────────┐   ┌──────────┐   ┌─────────────┐
//! │ extract │──▶│  chunk  │──▶│ identity │──▶│    index     │
//! │  (PDF)  │   │         │   │ (dedup)  │   │ embed+store  │
//! └─────────┘   └─────────┘   └──────────┘   └──────┬──────┘
//!                                                   │ top-k
//! ┌─────────┐   ┌───────────┐   ┌─────────┐   ┌─────▼──────┐
//! │ export  │◀──│ reconcile │◀──│  parse  │◀──│   query    │
//! │ (xlsx)  │   │ + ledger  │   │(ladder) │   │  (LLM)     │
//! └─────────┘   └───────────┘   └─────────┘   └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`identity`] | Content-derived chunk ids and dedup |
//! | [`naming`] | Collection-name sanitation |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Language-model provider abstraction |
//! | [`store`] | Index storage trait and in-memory backend |
//! | [`sqlite_store`] | SQLite index storage |
//! | [`index`] | Vector index over named collections |
//! | [`query`] | Retrieval-augmented query engine |
//! | [`parse`] | Tolerant model-output parser |
//! | [`dates`] | Date recognition and rendering |
//! | [`ledger`] | Reading the existing ledger workbook |
//! | [`reconcile`] | Merging records into the ledger |
//! | [`export`] | Workbook and JSON output |
//! | [`pipeline`] | End-to-end pipeline and caller context |
//! | [`commands`] | CLI subcommand implementations |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod dates;
pub mod db;
pub mod embedding;
pub mod error;
pub mod export;
pub mod extract;
pub mod identity;
pub mod index;
pub mod ledger;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod naming;
pub mod parse;
pub mod pipeline;
pub mod query;
pub mod reconcile;
pub mod sqlite_store;
pub mod store;
