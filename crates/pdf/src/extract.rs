use crate::backend::{DocumentBackend, ExtractError, PdfRsBackend};
use crate::layout::{layout_page, PageText};

/// Opens a statement with a backend and lays out its pages.
pub struct Extractor<B: DocumentBackend> {
    backend: B,
}

impl<B: DocumentBackend> Extractor<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Decrypt `bytes` with `password` and return every page, blank ones included.
    ///
    /// Fails before any text is returned: an empty password is `InvalidPassword`, and a
    /// document in which no page carries text is `UnsupportedDocument` (scanned images).
    pub fn extract(&self, bytes: &[u8], password: &str) -> Result<Vec<PageText>, ExtractError> {
        if password.is_empty() {
            return Err(ExtractError::InvalidPassword);
        }

        let raw = self.backend.open(bytes, password)?;
        let pages: Vec<PageText> = raw
            .into_iter()
            .enumerate()
            .map(|(idx, fragments)| layout_page(idx + 1, fragments))
            .collect();

        if pages.iter().all(PageText::is_blank) {
            tracing::warn!("Document has {} page(s) and no text layer", pages.len());
            return Err(ExtractError::UnsupportedDocument);
        }

        let tables: usize = pages.iter().map(|p| p.tables.len()).sum();
        tracing::info!("Extracted {} page(s), {} table region(s)", pages.len(), tables);
        Ok(pages)
    }
}

/// Extract with the `pdf` crate backend.
pub fn extract(bytes: &[u8], password: &str) -> Result<Vec<PageText>, ExtractError> {
    Extractor::new(PdfRsBackend).extract(bytes, password)
}
