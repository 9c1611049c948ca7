//! Sequential per-file pipeline: PDF text, model call, parse, append.

use std::path::{Path, PathBuf};

use crate::backend::{BackendError, PdfBackend};
use crate::client::{
    MAX_INPUT_CHARS, ModelBackend, SYSTEM_PROMPT, truncate_document, user_message,
};
use crate::parser::parse_response;
use crate::record::ExtractedRecord;
use crate::session::Session;
use crate::{BatchReport, Config, FailedFile, FileError, ProgressEvent};

/// Where an uploaded document's bytes come from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// A document queued for processing.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub source: UploadSource,
}

impl Upload {
    /// Queue a file on disk. The file name (without directories) becomes the
    /// record's `filename`.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            filename,
            source: UploadSource::Path(path),
        }
    }

    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            source: UploadSource::Bytes(bytes),
        }
    }

    fn read_text(&self, pdf: &dyn PdfBackend) -> Result<String, BackendError> {
        match &self.source {
            UploadSource::Path(path) => pdf.extract_text_from_path(path),
            UploadSource::Bytes(bytes) => pdf.extract_text(bytes),
        }
    }
}

/// Whether `path` has a `.pdf` extension (case-insensitive).
pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

struct Extraction {
    record: ExtractedRecord,
    truncated: bool,
}

/// Process `uploads` one at a time, in order, appending each successful
/// record to `session`.
///
/// Per-file failures are collected in the returned report and never stop
/// the batch.
pub async fn process_files(
    uploads: &[Upload],
    session: &mut Session,
    pdf: &dyn PdfBackend,
    model: &dyn ModelBackend,
    config: &Config,
    progress: impl Fn(ProgressEvent),
) -> BatchReport {
    let total = uploads.len();
    let mut report = BatchReport {
        total,
        ..BatchReport::default()
    };

    for (index, upload) in uploads.iter().enumerate() {
        progress(ProgressEvent::Processing {
            index,
            total,
            filename: upload.filename.clone(),
        });
        tracing::info!(file = %upload.filename, index, total, "processing");

        match extract_one(upload, index, total, pdf, model, config, &progress).await {
            Ok(extraction) => {
                if extraction.truncated {
                    report.truncated.push(upload.filename.clone());
                }
                session.append(extraction.record);
                report.succeeded += 1;
                progress(ProgressEvent::Extracted {
                    index,
                    total,
                    filename: upload.filename.clone(),
                });
            }
            Err(error) => {
                tracing::debug!(file = %upload.filename, error = %error, "extraction failed");
                progress(ProgressEvent::Failed {
                    index,
                    total,
                    filename: upload.filename.clone(),
                    error: error.to_string(),
                });
                report.failures.push(FailedFile {
                    filename: upload.filename.clone(),
                    error,
                });
            }
        }
    }

    report
}

#[allow(clippy::too_many_arguments)]
async fn extract_one(
    upload: &Upload,
    index: usize,
    total: usize,
    pdf: &dyn PdfBackend,
    model: &dyn ModelBackend,
    config: &Config,
    progress: &impl Fn(ProgressEvent),
) -> Result<Extraction, FileError> {
    let text = upload.read_text(pdf).map_err(FileError::Pdf)?;
    if text.is_empty() {
        return Err(FileError::Pdf(BackendError::NoText));
    }

    let (_, truncated) = truncate_document(&text, MAX_INPUT_CHARS);
    if truncated {
        let original_chars = text.chars().count();
        tracing::info!(
            file = %upload.filename,
            original_chars,
            kept_chars = MAX_INPUT_CHARS,
            "document truncated before sending to model"
        );
        progress(ProgressEvent::Truncated {
            index,
            total,
            filename: upload.filename.clone(),
            original_chars,
            kept_chars: MAX_INPUT_CHARS,
        });
    }

    let user = user_message(&text, MAX_INPUT_CHARS);
    tracing::debug!(
        file = %upload.filename,
        backend = model.name(),
        model = %config.model,
        "sending extraction request"
    );
    let raw = model
        .complete(SYSTEM_PROMPT, &user)
        .await
        .map_err(FileError::Model)?;

    let record = parse_response(&raw).map_err(FileError::Parse)?;

    if let Some(funding) = record.funding_source()
        && !funding.is_recognized()
    {
        tracing::warn!(
            file = %upload.filename,
            funding_source = %funding,
            "funding_source outside the expected categories"
        );
    }

    Ok(Extraction {
        record: record.with_filename(upload.filename.clone()),
        truncated,
    })
}
