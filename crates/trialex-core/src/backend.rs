use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("PDF is encrypted")]
    Encrypted,
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("PDF contains no extractable text")]
    NoText,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF text extraction backends.
///
/// Implementors return the text of every page concatenated in document
/// order. No separator is inserted between pages. A document without a text
/// layer yields an empty string, not an error.
pub trait PdfBackend {
    /// Extract the full text content of an in-memory PDF.
    fn extract_text(&self, bytes: &[u8]) -> Result<String, BackendError>;

    /// Read a PDF from disk and extract its text.
    fn extract_text_from_path(&self, path: &Path) -> Result<String, BackendError> {
        let bytes = std::fs::read(path)?;
        self.extract_text(&bytes)
    }
}
