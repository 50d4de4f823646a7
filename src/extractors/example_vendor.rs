// Example vendor extractor - synthetic fixtures and plug-in testing
// Only "Loan Number" is required; the HOA columns are optional.

use super::{
    require_columns, VendorExtractor, VendorRecord, HOA_MONTHLY_DUES_AMOUNT,
    HOA_MONTHLY_DUES_FREQUENCY, HOA_NOTES, HOA_SPECIAL_ASSESSMENT_AMOUNT, HOA_TRANSFER_FEE_AMOUNT,
};
use crate::error::Result;
use crate::workbook::{parse_money, read_sheet, CellValue, SheetSelector};
use std::path::Path;

const LOAN_NUMBER_COLUMN: &str = "Loan Number";

/// (source header, canonical field, is money)
const OPTIONAL_COLUMNS: [(&str, &str, bool); 5] = [
    ("Monthly Dues", HOA_MONTHLY_DUES_AMOUNT, true),
    ("Monthly Dues Frequency", HOA_MONTHLY_DUES_FREQUENCY, false),
    ("Transfer Fee", HOA_TRANSFER_FEE_AMOUNT, true),
    ("Special Assessment", HOA_SPECIAL_ASSESSMENT_AMOUNT, true),
    ("Notes", HOA_NOTES, false),
];

pub struct ExampleVendorExtractor;

impl ExampleVendorExtractor {
    pub fn new() -> Self {
        ExampleVendorExtractor
    }
}

impl Default for ExampleVendorExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl VendorExtractor for ExampleVendorExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<VendorRecord>> {
        let sheet = read_sheet(path, &SheetSelector::First)?;
        let loan_col = require_columns(&sheet, &[LOAN_NUMBER_COLUMN], "Example vendor")?[0];

        let present: Vec<(usize, &str, bool)> = OPTIONAL_COLUMNS
            .iter()
            .filter_map(|(header, field, money)| {
                sheet.column_index(header).map(|col| (col, *field, *money))
            })
            .collect();

        let mut records = Vec::new();
        for row in 0..sheet.row_count() {
            let key = sheet.cell(row, loan_col);
            if key.is_blank() {
                continue;
            }

            let mut record = VendorRecord::new(key.clone());
            for (col, field, money) in &present {
                let raw = sheet.cell(row, *col);
                let value = if *money {
                    parse_money(raw).map_or(CellValue::Empty, CellValue::Number)
                } else {
                    raw.clone()
                };
                record = record.with_field(field, value);
            }
            records.push(record);
        }

        Ok(records)
    }

    fn vendor_type(&self) -> &str {
        "example_vendor"
    }
}
