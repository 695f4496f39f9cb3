//! CSV and XLSX writers for the prioritized list.

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};
use triage_core::{Result, TriageError};
use triage_data::export::{ExportTable, Exporter};

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Csv,
}

impl ExportFormat {
    /// Explicit `--format` first, then the output extension, then XLSX.
    pub fn resolve(explicit: Option<&str>, path: &Path) -> Self {
        let by_name = |name: &str| match name.to_ascii_lowercase().as_str() {
            "csv" | "txt" => Some(ExportFormat::Csv),
            "xlsx" => Some(ExportFormat::Xlsx),
            _ => None,
        };
        explicit
            .and_then(by_name)
            .or_else(|| path.extension().and_then(|e| e.to_str()).and_then(by_name))
            .unwrap_or(ExportFormat::Xlsx)
    }

    pub fn exporter(&self) -> Box<dyn Exporter> {
        match self {
            ExportFormat::Xlsx => Box::new(XlsxExporter),
            ExportFormat::Csv => Box::new(CsvExporter::default()),
        }
    }
}

// ── CSV ────────────────────────────────────────────────────────────────────────

/// Writes the selection to `path` and the summary next to it as
/// `<stem>_summary.csv`.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    pub delimiter: u8,
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvExporter {
    /// Where the summary lands for a given selection path.
    pub fn summary_path(path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export".to_string());
        path.with_file_name(format!("{}_summary.csv", stem))
    }

    fn write_table(&self, table: &ExportTable, path: &Path) -> Result<()> {
        let export_err = |e: csv::Error| {
            TriageError::Export(format!("failed to write {}: {}", path.display(), e))
        };
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_path(path)
            .map_err(export_err)?;

        writer.write_record(&table.headers).map_err(export_err)?;
        for row in &table.rows {
            writer.write_record(row).map_err(export_err)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Exporter for CsvExporter {
    fn export(&self, selection: &ExportTable, summary: &ExportTable, path: &Path) -> Result<()> {
        self.write_table(selection, path)?;
        self.write_table(summary, &Self::summary_path(path))
    }
}

// ── XLSX ───────────────────────────────────────────────────────────────────────

/// One workbook with a sheet per table, header row bold and frozen.
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxExporter;

impl Exporter for XlsxExporter {
    fn export(&self, selection: &ExportTable, summary: &ExportTable, path: &Path) -> Result<()> {
        let mut workbook = XlsxWorkbook::new();
        let header_format = Format::new().set_bold();

        for table in [selection, summary] {
            let worksheet = workbook
                .add_worksheet()
                .set_name(table.name)
                .map_err(|e| xlsx_err(table.name, e))?;

            for (col, header) in table.headers.iter().enumerate() {
                worksheet
                    .write_string_with_format(0, col as u16, header, &header_format)
                    .map_err(|e| xlsx_err(table.name, e))?;
            }
            for (row, values) in table.rows.iter().enumerate() {
                for (col, value) in values.iter().enumerate() {
                    if value.is_empty() {
                        continue;
                    }
                    worksheet
                        .write_string(row as u32 + 1, col as u16, value)
                        .map_err(|e| xlsx_err(table.name, e))?;
                }
            }
            worksheet
                .set_freeze_panes(1, 0)
                .map_err(|e| xlsx_err(table.name, e))?;
        }

        workbook
            .save(path)
            .map_err(|e| TriageError::Export(format!("failed to save {}: {}", path.display(), e)))
    }
}

fn xlsx_err(sheet: &str, e: rust_xlsxwriter::XlsxError) -> TriageError {
    TriageError::Export(format!("sheet '{}': {}", sheet, e))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tables() -> (ExportTable, ExportTable) {
        let selection = ExportTable {
            name: "selection",
            headers: vec!["MACHINE".into(), "monitoring_status".into(), "has_insight".into()],
            rows: vec![
                vec!["M-01".into(), "A1 | OK".into(), "YES".into()],
                vec!["M-02".into(), "".into(), "".into()],
            ],
        };
        let summary = ExportTable {
            name: "summary",
            headers: vec!["analyst".into(), "count".into()],
            rows: vec![vec!["Ana".into(), "2".into()]],
        };
        (selection, summary)
    }

    #[test]
    fn test_resolve_format() {
        let xlsx = Path::new("LISTA_FINAL_PRIORIZADA.xlsx");
        let csv = Path::new("out.CSV");
        assert_eq!(ExportFormat::resolve(None, xlsx), ExportFormat::Xlsx);
        assert_eq!(ExportFormat::resolve(None, csv), ExportFormat::Csv);
        assert_eq!(ExportFormat::resolve(Some("csv"), xlsx), ExportFormat::Csv);
        assert_eq!(ExportFormat::resolve(None, Path::new("out")), ExportFormat::Xlsx);
    }

    #[test]
    fn test_csv_summary_path() {
        assert_eq!(
            CsvExporter::summary_path(Path::new("/tmp/out/list.csv")),
            PathBuf::from("/tmp/out/list_summary.csv")
        );
    }

    #[test]
    fn test_csv_export_writes_both_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("list.csv");
        let (selection, summary) = tables();

        CsvExporter::default().export(&selection, &summary, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "MACHINE,monitoring_status,has_insight");
        assert_eq!(lines[1], "M-01,A1 | OK,YES");
        assert_eq!(lines[2], "M-02,,");

        let summary_text = std::fs::read_to_string(dir.path().join("list_summary.csv")).unwrap();
        assert_eq!(summary_text, "analyst,count\nAna,2\n");
    }

    #[test]
    fn test_xlsx_export_creates_workbook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("LISTA_FINAL_PRIORIZADA.xlsx");
        let (selection, summary) = tables();

        XlsxExporter.export(&selection, &summary, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"PK"), "xlsx is a zip container");
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("list.csv");
        let (selection, summary) = tables();

        let err = CsvExporter::default().export(&selection, &summary, &path).unwrap_err();
        assert!(matches!(err, TriageError::Export(_)));
    }
}
