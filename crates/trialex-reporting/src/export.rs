use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rust_xlsxwriter::{Format, Workbook};
use serde_json::{Map, Value};

use trialex_core::ExtractedRecord;
use trialex_core::record::default_columns;

use crate::{ExportError, ExportFormat};

/// Worksheet holding the exported records.
pub const SHEET_NAME: &str = "Extracted Data";

/// Column order for an export: the first record's field order, or the
/// canonical schema columns plus `filename` when there are no records.
pub fn resolve_columns(records: &[ExtractedRecord]) -> Vec<String> {
    match records.first() {
        Some(first) => first.field_names().map(str::to_string).collect(),
        None => default_columns().into_iter().map(str::to_string).collect(),
    }
}

/// Serialize records into a complete in-memory document.
pub fn export_records(
    records: &[ExtractedRecord],
    format: ExportFormat,
) -> Result<Vec<u8>, ExportError> {
    let columns = resolve_columns(records);
    match format {
        ExportFormat::Xlsx => export_xlsx(records, &columns),
        ExportFormat::Csv => Ok(export_csv(records, &columns).into_bytes()),
        ExportFormat::Json => export_json(records, &columns),
    }
}

/// `extracted_data_<YYYYMMDD_HHMMSS>.<ext>` for the given moment.
pub fn export_file_name(format: ExportFormat, at: NaiveDateTime) -> String {
    format!(
        "extracted_data_{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Export `records` into `dir` under a name timestamped with the current
/// local time. Returns the written path.
pub fn write_export(
    records: &[ExtractedRecord],
    format: ExportFormat,
    dir: &Path,
) -> Result<PathBuf, ExportError> {
    let content = export_records(records, format)?;
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(
        format,
        chrono::Local::now().naive_local(),
    ));
    std::fs::write(&path, content)?;
    Ok(path)
}

fn cell<'a>(record: &'a ExtractedRecord, column: &str) -> &'a str {
    record.get(column).unwrap_or("")
}

fn export_xlsx(records: &[ExtractedRecord], columns: &[String]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;
    sheet.set_freeze_panes(1, 0)?;

    for (col, name) in columns.iter().enumerate() {
        let col = col as u16;
        sheet.write_string_with_format(0, col, name, &header)?;
        sheet.set_column_width(col, 24)?;
    }

    for (row, record) in records.iter().enumerate() {
        let row = row as u32 + 1;
        for (col, name) in columns.iter().enumerate() {
            sheet.write_string(row, col as u16, cell(record, name))?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn csv_escape(s: &str) -> String {
    if s.contains('"') || s.contains(',') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn export_csv(records: &[ExtractedRecord], columns: &[String]) -> String {
    let mut out = String::new();
    let header: Vec<String> = columns.iter().map(|c| csv_escape(c)).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for record in records {
        let row: Vec<String> = columns
            .iter()
            .map(|c| csv_escape(cell(record, c)))
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn export_json(records: &[ExtractedRecord], columns: &[String]) -> Result<Vec<u8>, ExportError> {
    let rows: Vec<Value> = records
        .iter()
        .map(|record| {
            let map: Map<String, Value> = columns
                .iter()
                .map(|c| (c.clone(), Value::String(cell(record, c).to_string())))
                .collect();
            Value::Object(map)
        })
        .collect();
    let mut out = serde_json::to_vec_pretty(&rows)?;
    out.push(b'\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use trialex_core::{FILENAME_FIELD, SCHEMA_FIELDS};

    fn make_record(author: &str, filename: &str) -> ExtractedRecord {
        let mut r = ExtractedRecord::new();
        for f in SCHEMA_FIELDS {
            r.insert(f, "Not reported");
        }
        r.insert("first_author", author);
        r.with_filename(filename)
    }

    #[test]
    fn columns_follow_first_record() {
        let mut odd = ExtractedRecord::new();
        odd.insert("journal", "BMJ");
        odd.insert("first_author", "Lee");
        let odd = odd.with_filename("x.pdf");
        let cols = resolve_columns(&[odd, make_record("A", "a.pdf")]);
        assert_eq!(cols, vec!["journal", "first_author", FILENAME_FIELD]);
    }

    #[test]
    fn empty_columns_are_schema_plus_filename() {
        let cols = resolve_columns(&[]);
        assert_eq!(cols.len(), 13);
        assert_eq!(cols.last().map(String::as_str), Some(FILENAME_FIELD));
    }

    #[test]
    fn file_name_pattern() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 1)
            .unwrap();
        assert_eq!(
            export_file_name(ExportFormat::Xlsx, at),
            "extracted_data_20240309_070501.xlsx"
        );
        assert_eq!(
            export_file_name(ExportFormat::Csv, at),
            "extracted_data_20240309_070501.csv"
        );
    }

    #[test]
    fn csv_quotes_commas_quotes_and_newlines() {
        let mut r = make_record("Smith, J.", "a.pdf");
        r.insert("trial_arms", "Drug \"A\"\nPlacebo");
        let csv = String::from_utf8(export_records(&[r], ExportFormat::Csv).unwrap()).unwrap();
        assert!(csv.starts_with("first_author,pub_year,"));
        assert!(csv.contains("\"Smith, J.\""));
        assert!(csv.contains("\"Drug \"\"A\"\"\nPlacebo\""));
    }

    #[test]
    fn csv_header_only_when_empty() {
        let csv = String::from_utf8(export_records(&[], ExportFormat::Csv).unwrap()).unwrap();
        assert_eq!(csv.lines().count(), 1);
        assert!(csv.trim_end().ends_with(",filename"));
    }

    #[test]
    fn json_keeps_column_order() {
        let records = vec![make_record("Smith", "a.pdf"), make_record("Jones", "b.pdf")];
        let bytes = export_records(&records, ExportFormat::Json).unwrap();
        let parsed: Vec<Map<String, Value>> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.len(), 2);
        let keys: Vec<&String> = parsed[0].keys().collect();
        assert_eq!(keys.first().map(|k| k.as_str()), Some("first_author"));
        assert_eq!(keys.last().map(|k| k.as_str()), Some(FILENAME_FIELD));
        assert_eq!(parsed[1]["first_author"], "Jones");
    }

    #[test]
    fn xlsx_is_a_zip_container() {
        let bytes = export_records(&[make_record("A", "a.pdf")], ExportFormat::Xlsx).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
