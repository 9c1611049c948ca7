use mupdf::{Document, TextPageFlags};

use trialex_core::{BackendError, PdfBackend};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency
/// (which is AGPL-3.0) so that non-PDF code paths do not transitively
/// depend on it.
///
/// Text is taken line by line from each page's text blocks, each line
/// terminated by `\n`, pages concatenated in document order with nothing
/// in between.
#[derive(Debug, Default)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

impl PdfBackend for MupdfBackend {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, BackendError> {
        let document = Document::from_bytes(bytes, "application/pdf")
            .map_err(|e| BackendError::OpenError(e.to_string()))?;

        if document
            .needs_password()
            .map_err(|e| BackendError::OpenError(e.to_string()))?
        {
            return Err(BackendError::Encrypted);
        }

        let mut text = String::new();

        for page_result in document
            .pages()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?
        {
            let page = page_result.map_err(|e| BackendError::ExtractionError(e.to_string()))?;
            let text_page = page
                .to_text_page(TextPageFlags::empty())
                .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

            for block in text_page.blocks() {
                for line in block.lines() {
                    text.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
                    text.push('\n');
                }
            }
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal PDF with one Helvetica text line per page.
    fn build_pdf(pages: &[&str]) -> Vec<u8> {
        build_pdf_with_trailer(pages, "")
    }

    /// Like [`build_pdf`], with `extra` appended to the trailer dictionary.
    fn build_pdf_with_trailer(pages: &[&str], extra: &str) -> Vec<u8> {
        let n = pages.len();
        let font_id = 3 + 2 * n;
        let mut objects: Vec<String> = Vec::new();
        objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
        let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 3 + 2 * i)).collect();
        objects.push(format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            n
        ));
        for (i, line) in pages.iter().enumerate() {
            let content_id = 4 + 2 * i;
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 {font_id} 0 R >> >> /Contents {content_id} 0 R >>"
            ));
            let stream = format!("BT /F1 24 Tf 72 700 Td ({line}) Tj ET");
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                stream.len(),
                stream
            ));
        }
        objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());

        let mut out = String::from("%PDF-1.4\n");
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
        }
        let xref_at = out.len();
        out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
        for off in offsets {
            out.push_str(&format!("{off:010} 00000 n \n"));
        }
        out.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R{} >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            extra,
            xref_at
        ));
        out.into_bytes()
    }

    #[test]
    fn extracts_single_page_text() {
        let text = MupdfBackend::new()
            .extract_text(&build_pdf(&["Randomised trial of aspirin"]))
            .unwrap();
        assert!(text.contains("Randomised trial of aspirin"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn pages_are_concatenated_in_order_without_separator() {
        let text = MupdfBackend::new()
            .extract_text(&build_pdf(&["Alpha", "Beta"]))
            .unwrap();
        let alpha = text.find("Alpha").unwrap();
        let beta = text.find("Beta").unwrap();
        assert!(alpha < beta);
        assert!(!text.contains("\n\n"));
    }

    #[test]
    fn password_protected_document_is_rejected() {
        // Standard security handler, RC4 40-bit. The zeroed /O and /U hashes
        // match no password, so the empty user password does not open it.
        let zeros = "00".repeat(32);
        let encrypt = format!(
            " /Encrypt << /Filter /Standard /V 1 /R 2 /Length 40 /P -4 /O <{zeros}> /U <{zeros}> >> /ID [<{id}> <{id}>]",
            id = "0123456789abcdef0123456789abcdef"
        );
        let err = MupdfBackend::new()
            .extract_text(&build_pdf_with_trailer(&["Confidential protocol"], &encrypt))
            .unwrap_err();
        assert!(matches!(err, BackendError::Encrypted));
    }

    #[test]
    fn garbage_bytes_fail_to_open() {
        let err = MupdfBackend::new()
            .extract_text(b"this is not a pdf document")
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::OpenError(_) | BackendError::ExtractionError(_)
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = MupdfBackend::new()
            .extract_text_from_path(std::path::Path::new("/nonexistent/paper.pdf"))
            .unwrap_err();
        assert!(matches!(err, BackendError::Io(_)));
    }
}
