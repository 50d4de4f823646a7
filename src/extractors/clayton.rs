// Clayton HOA extractor
// "HOA" sheet, keyed by Loan Number, monthly premium as dues.

use super::{
    require_columns, VendorExtractor, VendorRecord, HOA_MONTHLY_DUES_AMOUNT,
    HOA_MONTHLY_DUES_FREQUENCY, HOA_SOURCE, HOA_SOURCE_FILE, MONTHLY,
};
use crate::config::MatchKey;
use crate::error::Result;
use crate::workbook::{parse_money, read_sheet, CellValue, SheetSelector};
use std::path::Path;

const SHEET_NAME: &str = "HOA";
const LOAN_NUMBER_COLUMN: &str = "Loan Number";
const MONTHLY_PREMIUM_COLUMN: &str = "HOA Monthly Premium Amount";

pub struct ClaytonExtractor;

impl ClaytonExtractor {
    pub fn new() -> Self {
        ClaytonExtractor
    }
}

impl Default for ClaytonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl VendorExtractor for ClaytonExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<VendorRecord>> {
        let sheet = read_sheet(path, &SheetSelector::named(SHEET_NAME))?;
        let columns = require_columns(&sheet, &[LOAN_NUMBER_COLUMN, MONTHLY_PREMIUM_COLUMN], "Clayton HOA")?;
        let (loan_col, premium_col) = (columns[0], columns[1]);
        let file_name = sheet.file_name();

        let mut records = Vec::new();
        for row in 0..sheet.row_count() {
            let key = sheet.cell(row, loan_col);
            if key.is_blank() {
                continue;
            }

            let dues = parse_money(sheet.cell(row, premium_col))
                .map(CellValue::Number)
                .unwrap_or_default();

            records.push(
                VendorRecord::new(key.clone())
                    .with_field(HOA_MONTHLY_DUES_AMOUNT, dues)
                    .with_field(HOA_MONTHLY_DUES_FREQUENCY, MONTHLY)
                    .with_field(HOA_SOURCE, "CLAYTON")
                    .with_field(HOA_SOURCE_FILE, file_name.as_str()),
            );
        }

        Ok(records)
    }

    fn vendor_type(&self) -> &str {
        "clayton"
    }

    fn native_key(&self) -> Option<MatchKey> {
        Some(MatchKey::LoanId)
    }
}
