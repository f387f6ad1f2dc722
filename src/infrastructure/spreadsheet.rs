//! Spreadsheet adapter (xlsx via umya-spreadsheet)
//!
//! Reads the ordered code list from the first worksheet and writes processing
//! results back next to the matching rows. Column lookup and provisioning work
//! over the [`SheetGrid`] trait so they can be exercised without files.

use chrono::Local;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use umya_spreadsheet::Worksheet;

use crate::domain::{Code, ProcessingResult};

use super::config::SpreadsheetConfig;

#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Failed to open workbook {path:?}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("Workbook {0:?} has no worksheet")]
    NoWorksheet(PathBuf),

    #[error("Column '{0}' not found in header row")]
    CodeColumnMissing(String),

    #[error("Failed to write workbook {path:?}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("Failed to copy {from:?} to {to:?}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 1-based cell grid with a header in row 1
pub trait SheetGrid {
    fn cell(&self, col: u32, row: u32) -> String;
    fn set_cell(&mut self, col: u32, row: u32, value: &str);
    /// Writes a bold header cell in row 1
    fn set_header(&mut self, col: u32, value: &str);
    fn max_column(&self) -> u32;
    fn max_row(&self) -> u32;
}

/// Case-insensitive, trimmed header lookup
pub fn find_column(grid: &impl SheetGrid, header: &str) -> Option<u32> {
    let wanted = header.trim().to_lowercase();
    (1..=grid.max_column()).find(|&col| grid.cell(col, 1).trim().to_lowercase() == wanted)
}

/// Codes from the header column, top to bottom, blanks skipped
pub fn read_codes(grid: &impl SheetGrid, code_header: &str) -> Result<Vec<Code>, SpreadsheetError> {
    let col = find_column(grid, code_header).ok_or_else(|| SpreadsheetError::CodeColumnMissing(code_header.to_string()))?;
    Ok(Code::parse_all((2..=grid.max_row()).map(|row| grid.cell(col, row))))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    pub updated_rows: usize,
    pub skipped_codes: Vec<String>,
    pub created_columns: Vec<String>,
}

/// Writes every result into the row whose code cell matches.
///
/// Missing output columns are appended after the last used column with a bold
/// header. Results without a matching row are skipped with a warning.
pub fn write_results(
    grid: &mut impl SheetGrid,
    code_header: &str,
    results: &[ProcessingResult],
) -> Result<WriteStats, SpreadsheetError> {
    let code_col = find_column(&*grid, code_header).ok_or_else(|| SpreadsheetError::CodeColumnMissing(code_header.to_string()))?;

    let mut row_by_code: HashMap<String, u32> = HashMap::new();
    for row in 2..=grid.max_row() {
        let value = grid.cell(code_col, row).trim().to_string();
        if !value.is_empty() {
            row_by_code.entry(value).or_insert(row);
        }
    }

    let mut stats = WriteStats::default();
    let mut column_cache: HashMap<&'static str, u32> = HashMap::new();

    for result in results {
        let Some(&row) = row_by_code.get(result.code.as_str()) else {
            warn!("⚠️ Code {} not found in sheet, skipping", result.code);
            stats.skipped_codes.push(result.code.to_string());
            continue;
        };

        for (field, value) in result.fields() {
            let header = field.header();
            let col = match column_cache.get(header) {
                Some(&col) => col,
                None => {
                    let col = find_column(&*grid, header).unwrap_or_else(|| {
                        let col = grid.max_column() + 1;
                        grid.set_header(col, header);
                        stats.created_columns.push(header.to_string());
                        col
                    });
                    column_cache.insert(header, col);
                    col
                }
            };
            grid.set_cell(col, row, value);
        }
        stats.updated_rows += 1;
    }

    Ok(stats)
}

/// In-memory grid, handy for previews and tests
#[derive(Debug, Clone, Default)]
pub struct MemorySheet {
    cells: HashMap<(u32, u32), String>,
    bold_headers: Vec<u32>,
}

impl MemorySheet {
    /// Builds a sheet from rows, the first row being the header
    pub fn from_rows(rows: &[&[&str]]) -> Self {
        let mut sheet = Self::default();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    sheet.cells.insert((c as u32 + 1, r as u32 + 1), (*value).to_string());
                }
            }
        }
        sheet
    }

    pub fn is_bold_header(&self, col: u32) -> bool {
        self.bold_headers.contains(&col)
    }
}

impl SheetGrid for MemorySheet {
    fn cell(&self, col: u32, row: u32) -> String {
        self.cells.get(&(col, row)).cloned().unwrap_or_default()
    }

    fn set_cell(&mut self, col: u32, row: u32, value: &str) {
        self.cells.insert((col, row), value.to_string());
    }

    fn set_header(&mut self, col: u32, value: &str) {
        self.set_cell(col, 1, value);
        self.bold_headers.push(col);
    }

    fn max_column(&self) -> u32 {
        self.cells.keys().map(|(c, _)| *c).max().unwrap_or(0)
    }

    fn max_row(&self) -> u32 {
        self.cells.keys().map(|(_, r)| *r).max().unwrap_or(0)
    }
}

/// Worksheet binding; umya coordinates are (col, row), 1-based
struct XlsxSheet<'a>(&'a mut Worksheet);

impl SheetGrid for XlsxSheet<'_> {
    fn cell(&self, col: u32, row: u32) -> String {
        self.0.get_value((col, row))
    }

    fn set_cell(&mut self, col: u32, row: u32, value: &str) {
        self.0.get_cell_mut((col, row)).set_value(value);
    }

    fn set_header(&mut self, col: u32, value: &str) {
        self.set_cell(col, 1, value);
        self.0.get_style_mut((col, 1)).get_font_mut().set_bold(true);
    }

    fn max_column(&self) -> u32 {
        self.0.get_highest_column()
    }

    fn max_row(&self) -> u32 {
        self.0.get_highest_row()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub output_path: PathBuf,
    /// True when the original could not be written and a sibling copy was used
    pub used_fallback_copy: bool,
    #[serde(flatten)]
    pub stats: WriteStats,
}

pub struct SpreadsheetAdapter {
    config: SpreadsheetConfig,
    writable: fn(&Path) -> bool,
}

impl SpreadsheetAdapter {
    pub const fn new(config: SpreadsheetConfig) -> Self {
        Self {
            config,
            writable: is_writable,
        }
    }

    /// Replaces the check that decides whether the original workbook can be
    /// overwritten in place
    #[must_use]
    pub fn with_writable_check(mut self, check: fn(&Path) -> bool) -> Self {
        self.writable = check;
        self
    }

    fn open(path: &Path) -> Result<umya_spreadsheet::Spreadsheet, SpreadsheetError> {
        umya_spreadsheet::reader::xlsx::read(path).map_err(|e| SpreadsheetError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn load_codes(&self, path: &Path) -> Result<Vec<Code>, SpreadsheetError> {
        let mut book = Self::open(path)?;
        let sheet = book
            .get_sheet_mut(&0)
            .ok_or_else(|| SpreadsheetError::NoWorksheet(path.to_path_buf()))?;

        let codes = read_codes(&XlsxSheet(sheet), &self.config.code_column_header)?;
        info!("📄 Loaded {} codes from {:?}", codes.len(), path);
        Ok(codes)
    }

    /// Merges results into the workbook, falling back to a timestamped sibling
    /// copy when the original cannot be written.
    pub fn save_results(&self, path: &Path, results: &[ProcessingResult]) -> Result<SaveReport, SpreadsheetError> {
        let mut book = Self::open(path)?;
        let sheet = book
            .get_sheet_mut(&0)
            .ok_or_else(|| SpreadsheetError::NoWorksheet(path.to_path_buf()))?;
        let stats = write_results(&mut XlsxSheet(sheet), &self.config.code_column_header, results)?;

        let (output_path, used_fallback_copy) = if (self.writable)(path) {
            match umya_spreadsheet::writer::xlsx::write(&book, path) {
                Ok(()) => (path.to_path_buf(), false),
                Err(e) => {
                    warn!("⚠️ Writing {:?} failed ({}), using a copy", path, e);
                    (self.write_fallback(&book, path)?, true)
                }
            }
        } else {
            warn!("⚠️ {:?} is not writable (open elsewhere?), using a copy", path);
            (self.write_fallback(&book, path)?, true)
        };

        info!(
            "💾 Saved {} rows to {:?} ({} skipped, {} new columns)",
            stats.updated_rows,
            output_path,
            stats.skipped_codes.len(),
            stats.created_columns.len()
        );
        Ok(SaveReport {
            output_path,
            used_fallback_copy,
            stats,
        })
    }

    fn write_fallback(&self, book: &umya_spreadsheet::Spreadsheet, original: &Path) -> Result<PathBuf, SpreadsheetError> {
        let target = fallback_path(original, &self.config.fallback_suffix, &Local::now().format("%Y-%m-%dT%H-%M-%S").to_string());
        std::fs::copy(original, &target).map_err(|source| SpreadsheetError::Copy {
            from: original.to_path_buf(),
            to: target.clone(),
            source,
        })?;
        umya_spreadsheet::writer::xlsx::write(book, &target).map_err(|e| SpreadsheetError::Write {
            path: target.clone(),
            message: e.to_string(),
        })?;
        Ok(target)
    }
}

/// A workbook held open by Excel refuses append-mode opens
pub fn is_writable(path: &Path) -> bool {
    std::fs::OpenOptions::new().append(true).open(path).is_ok()
}

/// `<dir>/<stem><suffix>_<timestamp><.ext>`
pub fn fallback_path(original: &Path, suffix: &str, timestamp: &str) -> PathBuf {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook".to_string());
    let ext = original
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    original.with_file_name(format!("{stem}{suffix}_{timestamp}{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldKey, LayoutVersion};

    fn record(code: &str, fields: &[(FieldKey, &str)]) -> ProcessingResult {
        ProcessingResult::new(
            Code::new(code).unwrap(),
            LayoutVersion::Legacy7,
            fields.iter().map(|(k, v)| (*k, (*v).to_string())).collect(),
        )
    }

    #[test]
    fn test_find_column_is_case_insensitive() {
        let sheet = MemorySheet::from_rows(&[&["Nome", " RICERCA ", "Stato"]]);
        assert_eq!(find_column(&sheet, "ricerca"), Some(2));
        assert_eq!(find_column(&sheet, "stato"), Some(3));
        assert_eq!(find_column(&sheet, "taric"), None);
    }

    #[test]
    fn test_read_codes_skips_blanks_in_order() {
        let sheet = MemorySheet::from_rows(&[
            &["Ricerca", "Altro"],
            &["C1", "x"],
            &["", "y"],
            &["  C2 ", ""],
            &["C3", ""],
        ]);
        let codes = read_codes(&sheet, "ricerca").unwrap();
        let codes: Vec<&str> = codes.iter().map(Code::as_str).collect();
        assert_eq!(codes, vec!["C1", "C2", "C3"]);
    }

    #[test]
    fn test_read_codes_requires_column() {
        let sheet = MemorySheet::from_rows(&[&["Altro"], &["C1"]]);
        assert!(matches!(
            read_codes(&sheet, "ricerca"),
            Err(SpreadsheetError::CodeColumnMissing(_))
        ));
    }

    #[test]
    fn test_write_creates_columns_and_skips_missing_rows() {
        let mut sheet = MemorySheet::from_rows(&[&["Ricerca", "Stato"], &["C1", ""], &["C2", "old"]]);
        let results = vec![
            record("C2", &[(FieldKey::Stato, "APERTA"), (FieldKey::NoteUsmaf, "n2")]),
            record("MISSING", &[(FieldKey::Stato, "CHIUSA")]),
            record("C1", &[(FieldKey::Stato, "CHIUSA"), (FieldKey::NoteUsmaf, "n1")]),
        ];

        let stats = write_results(&mut sheet, "ricerca", &results).unwrap();
        assert_eq!(stats.updated_rows, 2);
        assert_eq!(stats.skipped_codes, vec!["MISSING".to_string()]);
        assert_eq!(stats.created_columns, vec!["Note Usmaf".to_string()]);

        assert_eq!(sheet.cell(2, 3), "APERTA");
        assert_eq!(sheet.cell(2, 2), "CHIUSA");
        assert_eq!(sheet.cell(3, 1), "Note Usmaf");
        assert!(sheet.is_bold_header(3));
        assert_eq!(sheet.cell(3, 2), "n1");
        assert_eq!(sheet.cell(3, 3), "n2");
    }

    #[test]
    fn test_write_matches_trimmed_codes() {
        let mut sheet = MemorySheet::from_rows(&[&["ricerca"], &[" C1 "]]);
        let stats = write_results(&mut sheet, "ricerca", &[record("C1", &[(FieldKey::Stato, "X")])]).unwrap();
        assert_eq!(stats.updated_rows, 1);
        assert_eq!(sheet.cell(2, 2), "X");
    }

    #[test]
    fn test_fallback_path_format() {
        let path = fallback_path(Path::new("/data/codici.xlsx"), "_output", "2024-01-20T10-00-00");
        assert_eq!(path, PathBuf::from("/data/codici_output_2024-01-20T10-00-00.xlsx"));
    }
}
