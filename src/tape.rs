// Tape Loader - the loan tape defines the report's row universe
// Loan numbers come from the "Loan Number" header, else positional column G.

use crate::error::{ReportError, Result};
use crate::loan_id::{duplicate_summary, find_duplicate_ids, normalize_loan_id};
use crate::workbook::{read_sheet, CellValue, Record, Sheet, SheetSelector};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

pub const LOAN_NUMBER_HEADER: &str = "Loan Number";
/// Column G, zero-based
pub const LOAN_NUMBER_FALLBACK_INDEX: usize = 6;

/// One tape row: every tape column as a normalized field, plus `loan_id`
#[derive(Debug, Clone, PartialEq)]
pub struct LoanRow {
    pub loan_id: String,
    pub fields: Record,
}

impl LoanRow {
    pub fn new(loan_id: impl Into<String>, mut fields: Record) -> Self {
        let loan_id = loan_id.into();
        fields.insert("loan_id".to_string(), CellValue::text(loan_id.clone()));
        LoanRow { loan_id, fields }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanNumberResolution {
    Header,
    ColumnGFallback,
}

impl LoanNumberResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanNumberResolution::Header => "header",
            LoanNumberResolution::ColumnGFallback => "column_g_fallback",
        }
    }
}

/// Tape-level QA facts
#[derive(Debug, Clone, Serialize)]
pub struct TapeQa {
    pub tape_path: String,
    pub input_row_count: usize,
    pub loan_row_count: usize,
    pub dropped_blank_loan_number_rows: usize,
    pub loan_number_column: String,
    pub resolution: LoanNumberResolution,
    /// Normalized loan IDs appearing on more than one row, with row counts
    pub duplicate_loan_ids: Vec<(String, usize)>,
}

impl TapeQa {
    pub fn unique_loan_ids(&self) -> usize {
        let extra: usize = self.duplicate_loan_ids.iter().map(|(_, n)| n - 1).sum();
        self.loan_row_count - extra
    }
}

/// Loaded tape: rows in tape order plus QA facts
#[derive(Debug, Clone)]
pub struct Tape {
    pub rows: Vec<LoanRow>,
    pub qa: TapeQa,
}

impl Tape {
    /// Distinct loan IDs in tape order
    pub fn unique_loan_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|r| seen.insert(r.loan_id.as_str()))
            .map(|r| r.loan_id.clone())
            .collect()
    }
}

fn resolve_loan_number_column(sheet: &Sheet) -> Result<(usize, LoanNumberResolution)> {
    if let Some(col) = sheet.column_index(LOAN_NUMBER_HEADER) {
        return Ok((col, LoanNumberResolution::Header));
    }

    if sheet.column_count() <= LOAN_NUMBER_FALLBACK_INDEX {
        return Err(ReportError::input(format!(
            "Tape {} is missing '{}' header and has fewer than 7 columns; cannot fall back to column G",
            sheet.source.display(),
            LOAN_NUMBER_HEADER
        )));
    }

    let has_values = (0..sheet.row_count()).any(|row| !sheet.cell(row, LOAN_NUMBER_FALLBACK_INDEX).is_blank());
    if !has_values {
        return Err(ReportError::input(format!(
            "Tape {} is missing '{}' header and fallback column G is blank; cannot infer loan numbers",
            sheet.source.display(),
            LOAN_NUMBER_HEADER
        )));
    }

    Ok((LOAN_NUMBER_FALLBACK_INDEX, LoanNumberResolution::ColumnGFallback))
}

/// Load the tape's first sheet
pub fn load_tape(path: &Path) -> Result<Tape> {
    let sheet = read_sheet(path, &SheetSelector::First)?;
    let (loan_col, resolution) = resolve_loan_number_column(&sheet)?;

    let mut rows = Vec::with_capacity(sheet.row_count());
    let mut dropped = 0usize;

    for row in 0..sheet.row_count() {
        match normalize_loan_id(sheet.cell(row, loan_col)) {
            Some(loan_id) => rows.push(LoanRow::new(loan_id, sheet.row_record(row))),
            None => dropped += 1,
        }
    }

    let duplicate_loan_ids = find_duplicate_ids(rows.iter().map(|r| r.loan_id.as_str()));
    if !duplicate_loan_ids.is_empty() {
        warn!(
            "Tape has duplicate loan IDs (kept as separate rows): {}",
            duplicate_summary(&duplicate_loan_ids)
        );
    }

    let loan_number_column = sheet
        .headers
        .get(loan_col)
        .filter(|h| !h.is_empty())
        .cloned()
        .unwrap_or_else(|| "G".to_string());

    let qa = TapeQa {
        tape_path: path.display().to_string(),
        input_row_count: sheet.row_count(),
        loan_row_count: rows.len(),
        dropped_blank_loan_number_rows: dropped,
        loan_number_column,
        resolution,
        duplicate_loan_ids,
    };

    info!(
        rows = qa.loan_row_count,
        dropped = qa.dropped_blank_loan_number_rows,
        resolution = qa.resolution.as_str(),
        "tape loaded"
    );

    Ok(Tape { rows, qa })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_csv(tmp: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = tmp.path().join(name);
        fs::write(&path, content).expect("write");
        path
    }

    #[test]
    fn test_loan_number_header() {
        let tmp = TempDir::new().expect("tmp");
        let path = write_csv(
            &tmp,
            "tape.csv",
            "Loan Number,Property City\nL-1,Austin\n ,Nowhere\nl1,Dallas\nL-2,Houston\n",
        );

        let tape = load_tape(&path).expect("tape");

        let ids: Vec<&str> = tape.rows.iter().map(|r| r.loan_id.as_str()).collect();
        assert_eq!(ids, vec!["L1", "L1", "L2"]);
        assert_eq!(tape.rows[0].fields["property_city"], CellValue::text("Austin"));
        assert_eq!(tape.rows[0].fields["loan_id"], CellValue::text("L1"));

        assert_eq!(tape.qa.input_row_count, 4);
        assert_eq!(tape.qa.dropped_blank_loan_number_rows, 1);
        assert_eq!(tape.qa.resolution, LoanNumberResolution::Header);
        assert_eq!(tape.qa.duplicate_loan_ids, vec![("L1".to_string(), 2)]);
        assert_eq!(tape.qa.unique_loan_ids(), 2);
        assert_eq!(tape.unique_loan_ids(), vec!["L1", "L2"]);
    }

    #[test]
    fn test_column_g_fallback() {
        let tmp = TempDir::new().expect("tmp");
        let path = write_csv(
            &tmp,
            "tape.csv",
            "A,B,C,D,E,F,Loan #\n1,2,3,4,5,6,X-9\n1,2,3,4,5,6,\n",
        );

        let tape = load_tape(&path).expect("tape");
        assert_eq!(tape.rows.len(), 1);
        assert_eq!(tape.rows[0].loan_id, "X9");
        assert_eq!(tape.qa.resolution, LoanNumberResolution::ColumnGFallback);
        assert_eq!(tape.qa.loan_number_column, "Loan #");
    }

    #[test]
    fn test_too_few_columns_for_fallback() {
        let tmp = TempDir::new().expect("tmp");
        let path = write_csv(&tmp, "tape.csv", "A,B,C\n1,2,3\n");

        let err = load_tape(&path).expect_err("too few columns");
        assert!(matches!(err, ReportError::Input(_)));
        assert!(err.to_string().contains("fewer than 7 columns"));
    }

    #[test]
    fn test_blank_fallback_column() {
        let tmp = TempDir::new().expect("tmp");
        let path = write_csv(&tmp, "tape.csv", "A,B,C,D,E,F,G\n1,2,3,4,5,6,\n");

        let err = load_tape(&path).expect_err("blank column G");
        assert!(err.to_string().contains("fallback column G is blank"));
    }
}
