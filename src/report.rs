// Report Writer - merged rows projected onto the template's column layout
// Output workbook: Sheet1 (report), QA Summary, Missing in Vendor, Extra in Vendor.

use crate::error::{ReportError, Result};
use crate::extractors::HOA_MONTHLY_DUES_AMOUNT;
use crate::merge::MergedRow;
use crate::qa::QaSummary;
use crate::workbook::{normalize_header, parse_money, read_sheet, sheet_names, CellValue, SheetSelector};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const REPORT_SHEET: &str = "Sheet1";
pub const QA_SHEET: &str = "QA Summary";
pub const MISSING_SHEET: &str = "Missing in Vendor";
pub const EXTRA_SHEET: &str = "Extra in Vendor";

pub const HOA_FLAG_HEADER: &str = "HOA";
pub const HOA_PAYMENT_HEADER: &str = "HOA Monthly Payment";
pub const REVIEW_STATUS_HEADER: &str = "Review Status";
pub const LIMITED_REVIEW_STATUS: &str = "limited review";
pub const LIMITED_REVIEW_HOA_FLAG: &str = "TBD";
pub const LIMITED_REVIEW_HOA_PAYMENT: &str = "Limited Review - please refer to URAR";

// ============================================================================
// TEMPLATE LAYOUT
// ============================================================================

/// Column order declared by the template's header row
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateLayout {
    pub source: PathBuf,
    pub sheet_name: String,
    pub headers: Vec<String>,
}

impl TemplateLayout {
    /// Header row of "Sheet1", or of the first sheet when there is no Sheet1
    pub fn load(path: &Path) -> Result<Self> {
        let names = sheet_names(path)?;
        let selector = if names.iter().any(|n| n == REPORT_SHEET) {
            SheetSelector::named(REPORT_SHEET)
        } else {
            SheetSelector::First
        };
        let sheet = read_sheet(path, &selector)?;

        let mut headers = sheet.headers.clone();
        while headers.last().map_or(false, |h| h.is_empty()) {
            headers.pop();
        }
        if headers.is_empty() {
            return Err(ReportError::input(format!(
                "Template {} has no header row",
                path.display()
            )));
        }

        let sheet_name = match selector {
            SheetSelector::Named(name) => name,
            SheetSelector::First => names.first().cloned().unwrap_or_else(|| REPORT_SHEET.to_string()),
        };

        let layout = TemplateLayout {
            source: path.to_path_buf(),
            sheet_name,
            headers,
        };
        debug!(
            template = %layout.source.display(),
            sheet = %layout.sheet_name,
            columns = layout.headers.len(),
            "template layout loaded"
        );
        Ok(layout)
    }

    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }
}

/// Merged-field keys a template column reads, in priority order
pub fn column_candidates(header: &str) -> Vec<String> {
    let normalized = normalize_header(header);
    let mut candidates: Vec<String> = Vec::new();
    let mut push = |key: &str| {
        if !key.is_empty() && !candidates.iter().any(|c| c == key) {
            candidates.push(key.to_string());
        }
    };

    // Securitized Balance prefers the tape's current loan amount over its own column
    if header == "Securitized Balance" {
        push("current_loan_amount");
    }
    push(&normalized);

    let aliases: &[&str] = match header {
        "rwtLoanNo" => &["rwtloanno"],
        "SEMT ID" => &["loan_id"],
        "Bulk ID" => &["bulk_id"],
        "MERS Number" => &["mers_number"],
        "Seller" => &["originator"],
        "Collateral ID" => &["collateral_id"],
        "Altrernate ID" => &["alternate_id"],
        "Primary Servicer" => &["primary_servicer"],
        "Servicer Loan Number" => &["servicer_loan_number"],
        "RWT Purchase Date" => &["rwt_purchase_date", "purchase_date"],
        "Property Address" => &["property_address", "address"],
        "Property City" => &["city"],
        "Property State" => &["state"],
        "Property Zip" => &["zip_code", "zip"],
        "HOA Monthly Payment" => &[HOA_MONTHLY_DUES_AMOUNT],
        "Securitized Balance" => &["securitized_balance"],
        "Securitized Next Due Date" => &["securitized_next_due_date"],
        "DD Firm" => &["dd_firm"],
        "Review Status" => &["dd_review_type"],
        _ => &[],
    };
    for alias in aliases {
        push(alias);
    }

    candidates
}

// ============================================================================
// REPORT ROWS
// ============================================================================

/// Template headers + one projected row per merged row
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ReportTable {
    /// Rows whose HOA monthly payment is still blank
    pub fn missing_hoa_values(&self) -> usize {
        match self.headers.iter().position(|h| h == HOA_PAYMENT_HEADER) {
            Some(col) => self
                .rows
                .iter()
                .filter(|row| row.get(col).map_or(true, CellValue::is_blank))
                .count(),
            None => 0,
        }
    }
}

fn is_limited_review(value: &CellValue) -> bool {
    value
        .as_text()
        .map_or(false, |s| s.trim().eq_ignore_ascii_case(LIMITED_REVIEW_STATUS))
}

/// "Y" for a positive amount, "N" for zero, blank otherwise
pub fn derive_hoa_flag(payment: &CellValue) -> CellValue {
    match parse_money(payment) {
        Some(amount) if amount > 0.0 => CellValue::text("Y"),
        Some(amount) if amount == 0.0 => CellValue::text("N"),
        _ => CellValue::Empty,
    }
}

/// Project merged rows onto the template columns, tape order preserved
pub fn build_report_rows(layout: &TemplateLayout, merged: &[MergedRow]) -> ReportTable {
    let candidates: Vec<Vec<String>> = layout.headers.iter().map(|h| column_candidates(h)).collect();
    let hoa_col = layout.column(HOA_FLAG_HEADER);
    let payment_col = layout.column(HOA_PAYMENT_HEADER);
    let review_col = layout.column(REVIEW_STATUS_HEADER);

    let rows = merged
        .iter()
        .map(|row| {
            let mut values: Vec<CellValue> = candidates
                .iter()
                .map(|keys| {
                    keys.iter()
                        .map(|key| row.get(key))
                        .find(|value| !value.is_blank())
                        .cloned()
                        .unwrap_or_default()
                })
                .collect();

            if let Some(hoa) = hoa_col {
                if values[hoa].is_blank() {
                    let flag = match payment_col {
                        Some(col) => derive_hoa_flag(&values[col]),
                        None => derive_hoa_flag(row.get(HOA_MONTHLY_DUES_AMOUNT)),
                    };
                    values[hoa] = flag;
                }
            }

            let limited_review = match review_col {
                Some(col) => is_limited_review(&values[col]),
                None => is_limited_review(row.get("dd_review_type")),
            };
            if limited_review {
                if let Some(hoa) = hoa_col {
                    values[hoa] = CellValue::text(LIMITED_REVIEW_HOA_FLAG);
                }
                if let Some(col) = payment_col {
                    values[col] = CellValue::text(LIMITED_REVIEW_HOA_PAYMENT);
                }
            }

            values
        })
        .collect();

    ReportTable {
        headers: layout.headers.clone(),
        rows,
    }
}

// ============================================================================
// WORKBOOK OUTPUT
// ============================================================================

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &CellValue) -> std::result::Result<(), XlsxError> {
    match value {
        CellValue::Empty => {}
        CellValue::Text(s) if s.is_empty() => {}
        CellValue::Text(s) => {
            sheet.write_string(row, col, s.as_str())?;
        }
        CellValue::Number(n) if n.is_nan() => {}
        CellValue::Number(n) => {
            sheet.write_number(row, col, *n)?;
        }
        CellValue::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
    }
    Ok(())
}

fn write_table(
    sheet: &mut Worksheet,
    headers: &[&str],
    rows: &[Vec<CellValue>],
    header_format: &Format,
) -> std::result::Result<(), XlsxError> {
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, header_format)?;
    }
    for (i, values) in rows.iter().enumerate() {
        let row = u32::try_from(i + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
        for (col, value) in values.iter().enumerate() {
            write_cell(sheet, row, col as u16, value)?;
        }
    }
    Ok(())
}

fn pair_rows(pairs: Vec<(String, String)>) -> Vec<Vec<CellValue>> {
    pairs
        .into_iter()
        .map(|(vendor, id)| vec![CellValue::text(vendor), CellValue::text(id)])
        .collect()
}

fn build_workbook(table: &ReportTable, qa: &QaSummary) -> std::result::Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let headers: Vec<&str> = table.headers.iter().map(String::as_str).collect();
    let report = workbook.add_worksheet();
    report.set_name(REPORT_SHEET)?;
    write_table(report, &headers, &table.rows, &header_format)?;

    let qa_rows: Vec<Vec<CellValue>> = qa
        .sheet_rows()
        .into_iter()
        .map(|(label, value)| vec![CellValue::from_raw(&label), value])
        .collect();
    let qa_sheet = workbook.add_worksheet();
    qa_sheet.set_name(QA_SHEET)?;
    write_table(qa_sheet, &["Metric", "Value"], &qa_rows, &header_format)?;

    let missing = workbook.add_worksheet();
    missing.set_name(MISSING_SHEET)?;
    write_table(missing, &["Vendor", "Loan ID"], &pair_rows(qa.missing_rows()), &header_format)?;

    let extra = workbook.add_worksheet();
    extra.set_name(EXTRA_SHEET)?;
    write_table(extra, &["Vendor", "Loan ID"], &pair_rows(qa.extra_rows()), &header_format)?;

    Ok(workbook)
}

/// Write the output workbook, creating parent directories
pub fn write_report(path: &Path, table: &ReportTable, qa: &QaSummary) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ReportError::io(path, e.to_string()))?;
    }

    let mut workbook = build_workbook(table, qa).map_err(|e| ReportError::io(path, e.to_string()))?;
    workbook.save(path).map_err(|e| ReportError::io(path, e.to_string()))?;

    info!(path = %path.display(), rows = table.rows.len(), "report written");
    Ok(path.to_path_buf())
}
