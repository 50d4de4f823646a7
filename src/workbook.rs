// Cell / Sheet model - spreadsheet rows as normalized records
// Reads .xlsx/.xls/.ods through calamine and .csv through the csv crate.

use crate::error::{ReportError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// CELL VALUE
// ============================================================================

/// One spreadsheet cell after reading
///
/// Dates become ISO text so every downstream consumer compares strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// Text cell, or Empty when the raw string is empty
    pub fn from_raw(raw: &str) -> Self {
        if raw.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(raw.to_string())
        }
    }

    /// Empty, or text that is empty after trimming
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(n) => n.is_nan(),
            CellValue::Bool(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Number(n) => {
                // Whole numbers render without a fractional part ("12345", not "12345.0")
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            CellValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => CellValue::Empty,
            Data::String(s) => CellValue::from_raw(s),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => match dt.as_datetime() {
                Some(naive) => {
                    if naive.time() == chrono::NaiveTime::MIN {
                        CellValue::Text(naive.format("%Y-%m-%d").to_string())
                    } else {
                        CellValue::Text(naive.format("%Y-%m-%d %H:%M:%S").to_string())
                    }
                }
                None => CellValue::Number(dt.as_f64()),
            },
            Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from_raw(s),
        }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// Normalized field key → value
pub type Record = BTreeMap<String, CellValue>;

/// Normalize a header name into a field key
///
/// "Property City" → "property_city", "Current Loan AMount" → "current_loan_amount"
pub fn normalize_header(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    let mut pending_sep = false;

    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !key.is_empty() {
                key.push('_');
            }
            pending_sep = false;
            key.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    key
}

/// True when the record has no value (or a blank value) for `key`
pub fn is_blank_field(record: &Record, key: &str) -> bool {
    record.get(key).map_or(true, CellValue::is_blank)
}

/// Blank-only fill: set `key` only when the existing cell is blank
///
/// Returns true when the value was written.
pub fn fill_blank(record: &mut Record, key: &str, value: &CellValue) -> bool {
    if value.is_blank() || !is_blank_field(record, key) {
        return false;
    }
    record.insert(key.to_string(), value.clone());
    true
}

/// Parse a money cell: numbers pass through, "$1,250.50" and "(12.00)" are accepted
pub fn parse_money(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Number(n) if !n.is_nan() => Some(*n),
        CellValue::Text(raw) => {
            let mut text = raw.trim();
            if text.is_empty() {
                return None;
            }

            let negative = text.starts_with('(') && text.ends_with(')');
            if negative {
                text = text[1..text.len() - 1].trim();
            }

            let cleaned: String = text
                .chars()
                .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
                .collect();
            if !is_plain_decimal(&cleaned) {
                return None;
            }

            let parsed: f64 = cleaned.parse().ok()?;
            Some(if negative { -parsed.abs() } else { parsed })
        }
        _ => None,
    }
}

/// Matches ^[+-]?\d+(\.\d+)?$
fn is_plain_decimal(text: &str) -> bool {
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };

    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    digits(int_part) && frac_part.map_or(true, digits)
}

// ============================================================================
// SHEET
// ============================================================================

/// Which worksheet to read from a workbook
#[derive(Debug, Clone, PartialEq)]
pub enum SheetSelector {
    First,
    Named(String),
}

impl SheetSelector {
    pub fn named(name: &str) -> Self {
        SheetSelector::Named(name.to_string())
    }
}

/// A header row plus data rows, read from one worksheet or CSV file
#[derive(Debug, Clone)]
pub struct Sheet {
    pub source: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    pub fn new(source: impl Into<PathBuf>, headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Sheet {
            source: source.into(),
            headers,
            rows,
        }
    }

    /// Column index by exact (trimmed) header text
    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == header)
    }

    /// Column index of the first alias matching a normalized header
    pub fn column_index_by_alias(&self, aliases: &[&str]) -> Option<usize> {
        let normalized: Vec<String> = self.headers.iter().map(|h| normalize_header(h)).collect();
        aliases
            .iter()
            .find_map(|alias| normalized.iter().position(|h| h == alias))
    }

    /// Cell at (row, col); cells past the end of a short row are Empty
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Display name of the source file (for provenance columns)
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string()
    }

    /// One record per row, keyed by normalized header; first column wins on key clashes
    pub fn row_record(&self, row: usize) -> Record {
        let mut record = Record::new();
        for (col, header) in self.headers.iter().enumerate() {
            let key = normalize_header(header);
            if key.is_empty() || record.contains_key(&key) {
                continue;
            }
            record.insert(key, self.cell(row, col).clone());
        }
        record
    }

    /// Comma-separated header list for error messages
    pub fn header_summary(&self) -> String {
        self.headers.join(", ")
    }
}

/// Read one sheet from a spreadsheet or CSV file
///
/// The first row is the header row. CSV files have a single table, so the
/// selector is ignored for them.
pub fn read_sheet(path: &Path, selector: &SheetSelector) -> Result<Sheet> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("csv"));

    if is_csv {
        read_csv_sheet(path)
    } else {
        read_workbook_sheet(path, selector)
    }
}

/// Sheet names of a workbook (a CSV file reports its file stem)
pub fn sheet_names(path: &Path) -> Result<Vec<String>> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("csv"));
    if is_csv {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("Sheet1");
        return Ok(vec![stem.to_string()]);
    }

    let workbook = open_workbook_auto(path)
        .map_err(|e| ReportError::input(format!("Failed to open workbook {}: {}", path.display(), e)))?;
    Ok(workbook.sheet_names())
}

fn read_csv_sheet(path: &Path) -> Result<Sheet> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| ReportError::input(format!("Failed to open file {}: {}", path.display(), e)))?;

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for (line_num, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            ReportError::input(format!(
                "Failed to parse CSV line {} in {}: {}",
                line_num + 1,
                path.display(),
                e
            ))
        })?;

        match headers {
            None => headers = Some(record.iter().map(|h| h.trim().to_string()).collect()),
            Some(_) => rows.push(record.iter().map(CellValue::from_raw).collect()),
        }
    }

    Ok(Sheet::new(path, headers.unwrap_or_default(), rows))
}

fn read_workbook_sheet(path: &Path, selector: &SheetSelector) -> Result<Sheet> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| ReportError::input(format!("Failed to open workbook {}: {}", path.display(), e)))?;

    let names = workbook.sheet_names();
    let sheet_name = match selector {
        SheetSelector::First => names.first().cloned().ok_or_else(|| {
            ReportError::input(format!("Workbook has no worksheets: {}", path.display()))
        })?,
        SheetSelector::Named(name) => {
            if !names.iter().any(|n| n == name) {
                return Err(ReportError::input(format!(
                    "Worksheet '{}' not found in {}. Found: {}",
                    name,
                    path.display(),
                    names.join(", ")
                )));
            }
            name.clone()
        }
    };

    let range = workbook.worksheet_range(&sheet_name).map_err(|e| {
        ReportError::input(format!(
            "Failed to read worksheet '{}' in {}: {}",
            sheet_name,
            path.display(),
            e
        ))
    })?;

    // calamine ranges start at the first used cell; pad back to column A so
    // positional lookups (column G) stay correct
    let start_col = range.start().map_or(0, |(_, col)| col as usize);

    let mut rows_iter = range.rows().map(|row| {
        let mut cells = vec![CellValue::Empty; start_col];
        cells.extend(row.iter().map(CellValue::from));
        cells
    });

    let headers: Vec<String> = rows_iter
        .next()
        .map(|cells| cells.iter().map(|c| c.to_string().trim().to_string()).collect())
        .unwrap_or_default();
    let rows: Vec<Vec<CellValue>> = rows_iter.collect();

    Ok(Sheet::new(path, headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Property City"), "property_city");
        assert_eq!(normalize_header("Current Loan AMount"), "current_loan_amount");
        assert_eq!(normalize_header("  Loan-Number # "), "loan_number");
        assert_eq!(normalize_header("rwtLoanNo"), "rwtloanno");
        assert_eq!(normalize_header("***"), "");
    }

    #[test]
    fn test_blank_detection() {
        assert!(CellValue::Empty.is_blank());
        assert!(CellValue::text("   ").is_blank());
        assert!(!CellValue::text("x").is_blank());
        assert!(!CellValue::Number(0.0).is_blank());
        assert!(CellValue::Number(f64::NAN).is_blank());
    }

    #[test]
    fn test_number_display_drops_whole_fraction() {
        assert_eq!(CellValue::Number(12345.0).to_string(), "12345");
        assert_eq!(CellValue::Number(125.5).to_string(), "125.5");
    }

    #[test]
    fn test_parse_money_variants() {
        assert_eq!(parse_money(&CellValue::Number(125.0)), Some(125.0));
        assert_eq!(parse_money(&CellValue::text("$1,250.50")), Some(1250.50));
        assert_eq!(parse_money(&CellValue::text("(12.00)")), Some(-12.0));
        assert_eq!(parse_money(&CellValue::text("0")), Some(0.0));
        assert_eq!(parse_money(&CellValue::text("n/a")), None);
        assert_eq!(parse_money(&CellValue::text("1.2.3")), None);
        assert_eq!(parse_money(&CellValue::Empty), None);
    }

    #[test]
    fn test_fill_blank_never_overwrites() {
        let mut record = Record::new();
        record.insert("city".to_string(), CellValue::text("Austin"));
        record.insert("state".to_string(), CellValue::text(" "));

        assert!(!fill_blank(&mut record, "city", &CellValue::text("Dallas")));
        assert!(fill_blank(&mut record, "state", &CellValue::text("TX")));
        assert!(fill_blank(&mut record, "zip", &CellValue::text("78701")));
        assert!(!fill_blank(&mut record, "notes", &CellValue::Empty));

        assert_eq!(record["city"], CellValue::text("Austin"));
        assert_eq!(record["state"], CellValue::text("TX"));
        assert_eq!(record["zip"], CellValue::text("78701"));
        assert!(!record.contains_key("notes"));
    }

    #[test]
    fn test_read_csv_sheet() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("tape.csv");
        fs::write(&path, "Loan Number,City\nL-1,Austin\n,Dallas\nL-3\n").expect("write");

        let sheet = read_sheet(&path, &SheetSelector::First).expect("sheet");
        assert_eq!(sheet.headers, vec!["Loan Number", "City"]);
        assert_eq!(sheet.row_count(), 3);
        assert_eq!(sheet.cell(0, 0), &CellValue::text("L-1"));
        assert_eq!(sheet.cell(1, 0), &CellValue::Empty);
        assert_eq!(sheet.cell(2, 1), &CellValue::Empty);
        assert_eq!(sheet.column_index("City"), Some(1));
        assert_eq!(sheet.column_index_by_alias(&["loan_id", "loan_number"]), Some(0));

        let record = sheet.row_record(0);
        assert_eq!(record["loan_number"], CellValue::text("L-1"));
        assert_eq!(record["city"], CellValue::text("Austin"));
    }

    #[test]
    fn test_read_xlsx_sheet_by_name() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("vendor.xlsx");

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let other = workbook.add_worksheet();
        other.set_name("Other").expect("name");
        other.write_string(0, 0, "ignored").expect("write");
        let hoa = workbook.add_worksheet();
        hoa.set_name("HOA").expect("name");
        hoa.write_string(0, 0, "Loan Number").expect("write");
        hoa.write_string(0, 1, "Amount").expect("write");
        hoa.write_string(1, 0, "L-1").expect("write");
        hoa.write_number(1, 1, 125.0).expect("write");
        workbook.save(&path).expect("save");

        let sheet = read_sheet(&path, &SheetSelector::named("HOA")).expect("sheet");
        assert_eq!(sheet.headers, vec!["Loan Number", "Amount"]);
        assert_eq!(sheet.cell(0, 1), &CellValue::Number(125.0));

        let missing = read_sheet(&path, &SheetSelector::named("Nope"));
        assert!(matches!(missing, Err(ReportError::Input(_))));
        assert_eq!(sheet_names(&path).expect("names"), vec!["Other", "HOA"]);
    }
}
