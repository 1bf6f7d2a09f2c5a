//! Error taxonomy for the extraction pipeline.
//!
//! Extraction and indexing failures are fatal to the current document and
//! surface as [`Error`] values. Parser and reconciler irregularities are not
//! errors: they degrade to empty or partial results and are reported through
//! [`crate::parse::ParseReport`] and [`crate::reconcile::ReconciliationWarning`].

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The source document is empty, corrupt, or not a PDF.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// A query named a collection that has never been indexed.
    #[error("collection '{collection}' does not exist; build the index first")]
    IndexUnavailable { collection: String },

    /// Embedding or language-model provider failure (including timeouts).
    #[error("query engine error: {0}")]
    QueryEngine(String),

    /// Persistent index storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The existing ledger workbook could not be read.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// The merged table could not be written.
    #[error("export error: {0}")]
    Export(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction(message.into())
    }

    pub fn query_engine(message: impl Into<String>) -> Self {
        Self::QueryEngine(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn index_unavailable(collection: impl Into<String>) -> Self {
        Self::IndexUnavailable {
            collection: collection.into(),
        }
    }

    /// Whether a caller-driven retry can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::QueryEngine(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::QueryEngine(format!("provider request timed out: {}", err))
        } else {
            Error::QueryEngine(err.to_string())
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Export(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_query_engine_errors_are_retryable() {
        assert!(Error::query_engine("timeout").is_retryable());
        assert!(!Error::extraction("bad pdf").is_retryable());
        assert!(!Error::index_unavailable("doc").is_retryable());
    }

    #[test]
    fn index_unavailable_names_collection() {
        let err = Error::index_unavailable("My_Report");
        assert!(err.to_string().contains("My_Report"));
    }
}
