//! PDF text extraction through a bounded worker pool.
//!
//! The page-text service is a blocking collaborator. [`PdfPool`] caps how many
//! documents are extracted at once and keeps the pages of one document on a
//! single worker, in order.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tokio::sync::Semaphore;

use crate::error::ExtractError;

/// Documents shorter than this may be the portfolio placeholder page.
pub const DEFAULT_PORTFOLIO_MAX_CHARS: usize = 500;

/// Text some readers render instead of the contents of a PDF portfolio.
static PORTFOLIO_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)for\s+the\s+best\s+experience,?\s+open\s+this\s+pdf\s+portfolio\s+in")
        .expect("static pattern")
});

/// Blocking page-text extraction for a whole PDF.
pub trait PdfTextService: Send + Sync {
    /// Text of every page, in page order.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError>;
}

/// [`PdfTextService`] backed by the `pdf-extract` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractService;

impl PdfTextService for PdfExtractService {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(ExtractError::pdf)
    }
}

/// True when `text` is the short placeholder a PDF portfolio wrapper renders.
pub fn is_portfolio_placeholder(text: &str, max_chars: usize) -> bool {
    text.chars().count() < max_chars && PORTFOLIO_PLACEHOLDER.is_match(text)
}

/// Shared pool of PDF workers.
#[derive(Clone)]
pub struct PdfPool {
    service: Arc<dyn PdfTextService>,
    permits: Arc<Semaphore>,
    portfolio_max_chars: usize,
}

impl PdfPool {
    pub fn new(service: Arc<dyn PdfTextService>, workers: usize, portfolio_max_chars: usize) -> Self {
        Self {
            service,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            portfolio_max_chars,
        }
    }

    /// Extracts and concatenates all page texts of one document.
    ///
    /// Fails with [`ExtractError::PortfolioUnsupported`] when the result is only
    /// the portfolio placeholder.
    pub async fn extract(&self, bytes: Arc<[u8]>) -> Result<String, ExtractError> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ExtractError::WorkerPanicked(e.to_string()))?;

        let service = Arc::clone(&self.service);
        let pages = tokio::task::spawn_blocking(move || service.extract_pages(&bytes))
            .await
            .map_err(|e| ExtractError::WorkerPanicked(e.to_string()))??;

        let text = pages.concat();
        if is_portfolio_placeholder(&text, self.portfolio_max_chars) {
            return Err(ExtractError::PortfolioUnsupported);
        }
        Ok(text)
    }
}
