//! Input discovery and decoding.
//!
//! Turns CSV and spreadsheet exports into [`Table`]s. CSVs have their
//! delimiter sniffed and fall back to Windows-1252 when they are not UTF-8;
//! spreadsheets are read from their first worksheet.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDate, TimeDelta};
use tracing::{debug, info, warn};
use triage_core::models::{Cell, Table, TableKind};
use triage_core::normalize::{parse_timestamp, DATE_FORMAT};
use triage_core::{Result, TriageError};

use crate::input::InputSet;

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods"];
const DELIMITED_EXTENSIONS: &[&str] = &["csv", "txt"];

// ── Public API ────────────────────────────────────────────────────────────────

/// Read one export from disk as a table of the given kind.
pub fn load_table(kind: TableKind, path: &Path) -> Result<Table> {
    let ext = extension(path);
    let table = if DELIMITED_EXTENSIONS.contains(&ext.as_str()) {
        read_delimited(kind, path)?
    } else if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        read_spreadsheet(kind, path)?
    } else {
        return Err(TriageError::UnsupportedFormat(path.to_path_buf()));
    };

    debug!(
        "Loaded {} table from {} ({} rows, {} columns)",
        kind,
        path.display(),
        table.len(),
        table.headers.len()
    );
    Ok(table)
}

/// Load every table in `paths` into an [`InputSet`], remembering file names.
///
/// Kinds absent from `paths` stay missing; any unreadable file is an error.
pub fn load_inputs(paths: &BTreeMap<TableKind, PathBuf>) -> Result<InputSet> {
    let mut inputs = InputSet::new();
    for (kind, path) in paths {
        let table = load_table(*kind, path)?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        inputs.insert_from(table, source);
    }
    info!("Loaded {} of {} input tables", paths.len(), TableKind::ALL.len());
    Ok(inputs)
}

/// Find the six exports under `dir` by file name.
///
/// A file belongs to a kind when its stem, lowercased with `_` and spaces
/// turned into `-`, equals one of the kind's names or starts with it followed
/// by `-` (`notas_m4_2024.xlsx` is a notes export). The longest matching name
/// wins, and the first file in path order is kept for each kind.
pub fn find_input_files(dir: &Path) -> BTreeMap<TableKind, PathBuf> {
    let mut found = BTreeMap::new();
    if !dir.exists() {
        warn!("Input directory does not exist: {}", dir.display());
        return found;
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_supported(path) && !is_lock_file(path))
        .collect();
    files.sort();

    for path in files {
        let Some(kind) = classify(&path) else {
            continue;
        };
        found.entry(kind).or_insert(path);
    }

    debug!("Discovered {} input files in {}", found.len(), dir.display());
    found
}

// ── Discovery helpers ─────────────────────────────────────────────────────────

/// File names each kind is recognised by.
fn stem_names(kind: TableKind) -> &'static [&'static str] {
    match kind {
        TableKind::Base => &["base"],
        TableKind::Mosaic => &["mosaic"],
        TableKind::Notes => &["notes", "notas"],
        TableKind::OrderNotes => &["order-notes", "ordem-notas", "ordens-notas"],
        TableKind::OrderPlans => &["order-plans", "ordem-planos", "ordens-planos"],
        TableKind::Insights => &["insights"],
    }
}

fn classify(path: &Path) -> Option<TableKind> {
    let stem = path.file_stem()?.to_string_lossy().to_lowercase().replace(['_', ' '], "-");

    TableKind::ALL
        .into_iter()
        .flat_map(|kind| stem_names(kind).iter().map(move |name| (kind, *name)))
        .filter(|(_, name)| {
            stem == *name
                || stem
                    .strip_prefix(name)
                    .is_some_and(|rest| rest.starts_with('-'))
        })
        .max_by_key(|(_, name)| name.len())
        .map(|(kind, _)| kind)
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn is_supported(path: &Path) -> bool {
    let ext = extension(path);
    DELIMITED_EXTENSIONS.contains(&ext.as_str()) || SPREADSHEET_EXTENSIONS.contains(&ext.as_str())
}

/// Office writes `~$name.xlsx` next to open workbooks.
fn is_lock_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with("~$"))
        .unwrap_or(false)
}

// ── Delimited text ────────────────────────────────────────────────────────────

fn read_delimited(kind: TableKind, path: &Path) -> Result<Table> {
    let bytes = std::fs::read(path).map_err(|source| TriageError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let content = decode_text(bytes);
    parse_delimited(kind, &content).map_err(|e| TriageError::TableDecode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// UTF-8 when valid, Windows-1252 otherwise (Excel's CSV default), without
/// a leading byte-order mark.
fn decode_text(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            debug!("Input is not UTF-8, decoding as Windows-1252");
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    };
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

/// Parse delimited text whose first record is the header row.
fn parse_delimited(kind: TableKind, content: &str) -> std::result::Result<Table, csv::Error> {
    let delimiter = sniff_delimiter(content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let headers: Vec<String> = match records.next() {
        Some(first) => first?.iter().map(|h| h.trim().to_string()).collect(),
        None => Vec::new(),
    };

    let mut table = Table::new(kind, headers);
    for record in records {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        table.push_row(record.iter().map(text_cell).collect());
    }
    Ok(table)
}

/// Pick the candidate delimiter that splits the first lines most
/// consistently, weighted by the header width it produces.
fn sniff_delimiter(content: &str) -> u8 {
    const CANDIDATES: &[u8] = &[b',', b';', b'\t', b'|'];
    let sample: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).take(10).collect();

    let mut best = b',';
    let mut best_score = 0usize;
    for &delim in CANDIDATES {
        let widths: Vec<usize> = sample
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        let Some(&header_width) = widths.first() else {
            break;
        };
        if header_width <= 1 {
            continue;
        }
        let consistent = widths.iter().filter(|&&w| w == header_width).count();
        let score = consistent * header_width;
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }
    best
}

fn text_cell(value: &str) -> Cell {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// ── Spreadsheets ──────────────────────────────────────────────────────────────

fn read_spreadsheet(kind: TableKind, path: &Path) -> Result<Table> {
    let decode_err = |message: String| TriageError::TableDecode {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook =
        open_workbook_auto(path).map_err(|e| decode_err(format!("cannot open workbook: {}", e)))?;
    let Some(sheet) = workbook.sheet_names().first().cloned() else {
        return Err(decode_err("workbook contains no sheets".to_string()));
    };
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| decode_err(format!("cannot read sheet '{}': {}", sheet, e)))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(first) => first
            .iter()
            .map(|c| sheet_cell(c).unwrap_or_default().trim().to_string())
            .collect(),
        None => Vec::new(),
    };

    let mut table = Table::new(kind, headers);
    for row in rows {
        let cells: Vec<Cell> = row.iter().map(sheet_cell).collect();
        if cells.iter().all(Option::is_none) {
            continue;
        }
        table.push_row(cells);
    }
    Ok(table)
}

/// Render one spreadsheet cell as text.
///
/// Whole floats lose their decimals. Date cells become the `dd/mm/yyyy` day
/// they fall on, the same form the date normalizers read.
fn sheet_cell(cell: &Data) -> Cell {
    let text = match cell {
        Data::Empty => return None,
        Data::String(s) => s.clone(),
        Data::Float(n) => render_number(*n),
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#{:?}", e),
        Data::DateTime(dt) if dt.is_duration() => render_number(dt.as_f64()),
        Data::DateTime(dt) => {
            excel_serial_to_text(dt.as_f64()).unwrap_or_else(|| render_number(dt.as_f64()))
        }
        Data::DateTimeIso(s) => parse_timestamp(s)
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| s.clone()),
        Data::DurationIso(s) => s.clone(),
    };
    text_cell(&text)
}

fn render_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Day of an Excel 1900-system serial; `None` when it is out of range.
fn excel_serial_to_text(serial: f64) -> Option<String> {
    if !serial.is_finite() {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let days = TimeDelta::try_days(serial.floor() as i64)?;
    let date = epoch.checked_add_signed(days)?;
    Some(date.format(DATE_FORMAT).to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{ExcelDateTime, ExcelDateTimeType};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    // ── sniff_delimiter ───────────────────────────────────────────────────────

    #[test]
    fn test_sniff_delimiter_semicolon() {
        let content = "Ordem;Status_do_sistema\n4001;LIB CONF\n4002;ENTE\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_delimiter_comma_with_quoted_semicolons() {
        let content = "a,b,c\n\"x;y\",2,3\n4,5,6\n";
        assert_eq!(sniff_delimiter(content), b',');
    }

    #[test]
    fn test_sniff_delimiter_tab() {
        assert_eq!(sniff_delimiter("a\tb\n1\t2\n"), b'\t');
    }

    #[test]
    fn test_sniff_delimiter_single_column_defaults_to_comma() {
        assert_eq!(sniff_delimiter("Machine\nM-01\nM-02\n"), b',');
        assert_eq!(sniff_delimiter(""), b',');
    }

    // ── load_table (CSV) ──────────────────────────────────────────────────────

    #[test]
    fn test_load_csv_with_blank_cells() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "order-notes.csv",
            b"Ordem;Status_do_sistema\n4001.0;LIB CONF\n4002; \n",
        );

        let table = load_table(TableKind::OrderNotes, &path).unwrap();
        assert_eq!(table.headers, vec!["Ordem", "Status_do_sistema"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][0].as_deref(), Some("4001.0"));
        assert_eq!(table.rows[1][1].as_deref(), None);
    }

    #[test]
    fn test_load_csv_strips_bom_and_skips_empty_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "mosaic.csv", "\u{feff}spotId,status\nS1,A1\n,\nS2,OK\n".as_bytes());

        let table = load_table(TableKind::Mosaic, &path).unwrap();
        assert_eq!(table.headers[0], "spotId");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_load_csv_windows_1252_fallback() {
        let dir = TempDir::new().unwrap();
        // "Conclusão" with 0xE3 for 'ã'.
        let mut bytes = b"Local_de_instalacao;Ordem;Nota;Conclus".to_vec();
        bytes.push(0xE3);
        bytes.extend_from_slice(b"o_desejada\nM-01;1;N-1;01.02.2024\n");
        let path = write_file(dir.path(), "notas.csv", &bytes);

        let table = load_table(TableKind::Notes, &path).unwrap();
        assert_eq!(table.headers[3], "Conclusão_desejada");
        assert!(table.validate_schema().is_ok());
    }

    #[test]
    fn test_load_csv_pads_short_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "plans.csv", b"a,b,c\n1,2\n");

        let table = load_table(TableKind::OrderPlans, &path).unwrap();
        assert_eq!(table.rows[0].len(), 3);
        assert_eq!(table.rows[0][2].as_deref(), None);
    }

    #[test]
    fn test_load_table_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "base.json", b"{}");
        assert!(matches!(
            load_table(TableKind::Base, &path),
            Err(TriageError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_load_table_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_table(TableKind::Base, &dir.path().join("base.csv")).unwrap_err();
        assert!(matches!(err, TriageError::FileRead { .. }));
    }

    #[test]
    fn test_load_table_corrupt_workbook() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "base.xlsx", b"not a zip archive");
        assert!(matches!(
            load_table(TableKind::Base, &path),
            Err(TriageError::TableDecode { .. })
        ));
    }

    // ── Spreadsheet cells ─────────────────────────────────────────────────────

    #[test]
    fn test_sheet_cell_numbers() {
        assert_eq!(sheet_cell(&Data::Float(4001.0)), Some("4001".to_string()));
        assert_eq!(sheet_cell(&Data::Float(2.5)), Some("2.5".to_string()));
        assert_eq!(sheet_cell(&Data::Int(7)), Some("7".to_string()));
        assert_eq!(sheet_cell(&Data::Empty), None);
        assert_eq!(sheet_cell(&Data::String("  ".into())), None);
    }

    #[test]
    fn test_excel_serial_to_text() {
        // 45323 is 01/02/2024.
        assert_eq!(excel_serial_to_text(45323.0).as_deref(), Some("01/02/2024"));
        // The time of day is dropped; only the day matters downstream.
        assert_eq!(excel_serial_to_text(45323.5).as_deref(), Some("01/02/2024"));
    }

    #[test]
    fn test_excel_serial_out_of_range() {
        assert_eq!(excel_serial_to_text(1e18), None);
        assert_eq!(excel_serial_to_text(f64::NAN), None);
        assert_eq!(excel_serial_to_text(-1e300), None);

        let huge = Data::DateTime(ExcelDateTime::new(1e18, ExcelDateTimeType::DateTime, false));
        assert_eq!(sheet_cell(&huge), Some("1000000000000000000".to_string()));
    }

    #[test]
    fn test_sheet_cell_iso_datetime_becomes_day() {
        assert_eq!(
            sheet_cell(&Data::DateTimeIso("2024-03-14T14:30:00".into())),
            Some("14/03/2024".to_string())
        );
        assert_eq!(
            sheet_cell(&Data::DurationIso("PT1H".into())),
            Some("PT1H".to_string())
        );
    }

    // ── find_input_files ──────────────────────────────────────────────────────

    #[test]
    fn test_find_input_files_by_stem() {
        let dir = TempDir::new().unwrap();
        for name in [
            "base.xlsx",
            "Mosaic Report.csv",
            "NOTAS_M4.xlsx",
            "ordem_notas.csv",
            "order-plans-2024.csv",
            "insights.csv",
            "readme.md",
            "~$base.xlsx",
        ] {
            write_file(dir.path(), name, b"x");
        }

        let found = find_input_files(dir.path());
        assert_eq!(found.len(), 6);
        assert!(found[&TableKind::Notes].ends_with("NOTAS_M4.xlsx"));
        assert!(found[&TableKind::OrderNotes].ends_with("ordem_notas.csv"));
        assert!(found[&TableKind::Base].ends_with("base.xlsx"));
    }

    #[test]
    fn test_classify_does_not_confuse_notes_with_order_notes() {
        assert_eq!(classify(Path::new("order_notes.csv")), Some(TableKind::OrderNotes));
        assert_eq!(classify(Path::new("notes.csv")), Some(TableKind::Notes));
        assert_eq!(classify(Path::new("notesheet.csv")), None);
        assert_eq!(classify(Path::new("baseline.csv")), None);
    }

    #[test]
    fn test_find_input_files_nonexistent_dir() {
        assert!(find_input_files(Path::new("/nonexistent/spot-triage/inputs")).is_empty());
    }

    #[test]
    fn test_find_input_files_first_in_path_order_wins() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "base-b.csv", b"x");
        write_file(dir.path(), "base-a.csv", b"x");

        let found = find_input_files(dir.path());
        assert!(found[&TableKind::Base].ends_with("base-a.csv"));
    }

    // ── load_inputs ───────────────────────────────────────────────────────────

    #[test]
    fn test_load_inputs_records_sources() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "insights.csv", b"Machine\nM-01\nSee more (2)\n");

        let mut paths = BTreeMap::new();
        paths.insert(TableKind::Insights, path);
        let inputs = load_inputs(&paths).unwrap();

        assert_eq!(inputs.get(TableKind::Insights).map(Table::len), Some(2));
        assert_eq!(inputs.missing().len(), 5);
        let status = inputs.status();
        assert_eq!(status[5].source.as_deref(), Some("insights.csv"));
    }
}
