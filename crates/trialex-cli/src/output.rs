use std::io::Write;
use std::path::Path;

use owo_colors::OwoColorize;
use trialex_core::{API_KEY_VAR, BatchReport, ExtractedRecord, FileError, ProgressEvent};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Columns shown in the compact preview table.
const PREVIEW_COLUMNS: [&str; 6] = [
    "filename",
    "first_author",
    "pub_year",
    "journal",
    "funding_source",
    "n_included",
];

const PREVIEW_WIDTH: usize = 24;

/// Cut `s` to `max` characters, marking the cut with an ellipsis.
fn clip(s: &str, max: usize) -> String {
    let flat = s.replace(['\n', '\r'], " ");
    if flat.chars().count() > max {
        let kept: String = flat.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    } else {
        flat
    }
}

/// Format a progress event as a single line.
pub fn progress_line(event: &ProgressEvent, color: ColorMode) -> String {
    match event {
        ProgressEvent::Processing {
            index,
            total,
            filename,
        } => format!("[{}/{}] Processing: {}", index + 1, total, filename),
        ProgressEvent::Truncated {
            index,
            total,
            filename,
            original_chars,
            kept_chars,
        } => {
            let msg = format!(
                "[{}/{}] {} truncated from {} to {} characters before extraction",
                index + 1,
                total,
                filename,
                original_chars,
                kept_chars
            );
            if color.enabled() {
                format!("{}", msg.yellow())
            } else {
                msg
            }
        }
        ProgressEvent::Extracted {
            index,
            total,
            filename,
        } => {
            if color.enabled() {
                format!("[{}/{}] -> {} {}", index + 1, total, "OK".green(), filename)
            } else {
                format!("[{}/{}] -> OK {}", index + 1, total, filename)
            }
        }
        ProgressEvent::Failed {
            index,
            total,
            filename,
            error,
        } => {
            if color.enabled() {
                format!(
                    "[{}/{}] -> {} {}: {}",
                    index + 1,
                    total,
                    "FAILED".red(),
                    filename,
                    error
                )
            } else {
                format!("[{}/{}] -> FAILED {}: {}", index + 1, total, filename, error)
            }
        }
    }
}

/// Print the outcome of a batch: failure list or success message.
pub fn print_batch_summary(
    w: &mut dyn Write,
    report: &BatchReport,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    if !report.truncated.is_empty() {
        let msg = format!(
            "Truncated before extraction: {}",
            report.truncated.join(", ")
        );
        if color.enabled() {
            writeln!(w, "{}", msg.yellow())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
    }
    if report.is_clean() {
        let msg = format!(
            "Processing complete! {} of {} files extracted.",
            report.succeeded, report.total
        );
        if color.enabled() {
            writeln!(w, "{}", msg.green())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
    } else {
        let msg = format!("Failed to process: {}", report.failed_names().join(", "));
        if color.enabled() {
            writeln!(w, "{}", msg.red())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
        for failure in &report.failures {
            writeln!(w, "  {}: {}", failure.filename, failure.error)?;
        }
        for hint in failure_hints(report) {
            if color.enabled() {
                writeln!(w, "{} {}", "hint:".yellow(), hint)?;
            } else {
                writeln!(w, "hint: {}", hint)?;
            }
        }
    }
    Ok(())
}

/// Advice for model failures the user can act on.
fn failure_hints(report: &BatchReport) -> Vec<String> {
    let model_errors = || {
        report.failures.iter().filter_map(|f| match &f.error {
            FileError::Model(e) => Some(e),
            _ => None,
        })
    };
    let mut hints = Vec::new();
    if model_errors().any(|e| e.is_auth()) {
        hints.push(format!("the API rejected the credential; check {API_KEY_VAR}"));
    }
    if model_errors().any(|e| e.is_rate_limited()) {
        hints.push(
            "the API rate limit was hit; wait a moment and process the failed files again"
                .to_string(),
        );
    }
    hints
}

/// Print a compact table of the accumulated records.
pub fn print_records_table(
    w: &mut dyn Write,
    records: &[ExtractedRecord],
    color: ColorMode,
) -> std::io::Result<()> {
    if records.is_empty() {
        writeln!(w, "No extracted data.")?;
        return Ok(());
    }

    writeln!(w, "Extracted Data ({} records):", records.len())?;
    let header: Vec<String> = std::iter::once(format!("{:>3}", "#"))
        .chain(
            PREVIEW_COLUMNS
                .iter()
                .map(|c| format!("{:<width$}", clip(c, PREVIEW_WIDTH), width = PREVIEW_WIDTH)),
        )
        .collect();
    let header = header.join("  ");
    if color.enabled() {
        writeln!(w, "{}", header.bold())?;
    } else {
        writeln!(w, "{}", header)?;
    }

    for (i, record) in records.iter().enumerate() {
        let row: Vec<String> = std::iter::once(format!("{:>3}", i + 1))
            .chain(PREVIEW_COLUMNS.iter().map(|c| {
                format!(
                    "{:<width$}",
                    clip(record.get(c).unwrap_or(""), PREVIEW_WIDTH),
                    width = PREVIEW_WIDTH
                )
            }))
            .collect();
        writeln!(w, "{}", row.join("  ").trim_end())?;
    }
    Ok(())
}

/// Print every field of every record.
pub fn print_record_details(
    w: &mut dyn Write,
    records: &[ExtractedRecord],
    color: ColorMode,
) -> std::io::Result<()> {
    for (i, record) in records.iter().enumerate() {
        let title = format!(
            "[{}] {}",
            i + 1,
            record.filename().unwrap_or("(unknown file)")
        );
        if color.enabled() {
            writeln!(w, "{}", title.bold().cyan())?;
        } else {
            writeln!(w, "{}", title)?;
        }
        for (name, value) in record.iter() {
            writeln!(w, "  {name}: {value}")?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Print where an export landed.
pub fn print_export_written(
    w: &mut dyn Write,
    path: &Path,
    rows: usize,
    color: ColorMode,
) -> std::io::Result<()> {
    let msg = format!("Wrote {} ({} data rows)", path.display(), rows);
    if color.enabled() {
        writeln!(w, "{}", msg.green())
    } else {
        writeln!(w, "{}", msg)
    }
}
