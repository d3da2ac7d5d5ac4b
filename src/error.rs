//! Error taxonomy for extraction and search.
//!
//! Extraction errors never abort a batch: the ingest pipeline routes each one
//! to a per-file outcome (see [`crate::models::Outcome`]).

use thiserror::Error;

/// Failure while turning a file's bytes into text.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No reader is registered (or enabled) for this extension.
    #[error("unsupported extension: {0:?}")]
    UnsupportedExtension(String),

    /// The file is larger than the configured limit for its extension.
    #[error("{extension} file of {size} bytes exceeds limit of {limit} bytes")]
    OverSizeLimit {
        extension: String,
        size: u64,
        limit: u64,
    },

    /// The PDF only contains the "open this portfolio in Acrobat" placeholder page.
    #[error("PDF portfolios are not supported")]
    PortfolioUnsupported,

    /// Zip container could not be opened or one of its parts could not be read.
    #[error("container extraction failed: {0}")]
    Container(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("message parsing failed: {0}")]
    Message(String),

    #[error("HTML extraction failed: {0}")]
    Html(String),

    /// A blocking extraction worker panicked or was aborted.
    #[error("extraction worker failed: {0}")]
    WorkerPanicked(String),
}

impl ExtractError {
    pub fn container(message: impl ToString) -> Self {
        Self::Container(message.to_string())
    }

    pub fn pdf(message: impl ToString) -> Self {
        Self::Pdf(message.to_string())
    }

    pub fn message(message: impl ToString) -> Self {
        Self::Message(message.to_string())
    }
}

/// Failure while searching the corpus.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The caller cancelled the search before it finished.
    #[error("search cancelled")]
    Cancelled,
}
