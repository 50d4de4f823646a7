// Consolidated Analytics HOA extractor
// Their "Loan ID" column carries the collateral identifier, not the SEMT loan ID.

use super::{
    require_columns, VendorExtractor, VendorRecord, HOA_MONTHLY_DUES_AMOUNT,
    HOA_MONTHLY_DUES_FREQUENCY, HOA_SOURCE, HOA_SOURCE_FILE, MONTHLY,
};
use crate::config::MatchKey;
use crate::error::Result;
use crate::workbook::{parse_money, read_sheet, CellValue, SheetSelector};
use std::path::Path;

const SHEET_NAME: &str = "Redwood Additional Data";
const LOAN_ID_COLUMN: &str = "Loan ID";
const MONTHLY_HOA_COLUMN: &str = "Monthly HOA Payment Amount";

pub struct ConsolidatedAnalyticsExtractor;

impl ConsolidatedAnalyticsExtractor {
    pub fn new() -> Self {
        ConsolidatedAnalyticsExtractor
    }
}

impl Default for ConsolidatedAnalyticsExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl VendorExtractor for ConsolidatedAnalyticsExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<VendorRecord>> {
        let sheet = read_sheet(path, &SheetSelector::named(SHEET_NAME))?;
        let columns = require_columns(
            &sheet,
            &[LOAN_ID_COLUMN, MONTHLY_HOA_COLUMN],
            "Consolidated Analytics",
        )?;
        let (id_col, amount_col) = (columns[0], columns[1]);
        let file_name = sheet.file_name();

        let records = (0..sheet.row_count())
            .filter(|&row| !sheet.cell(row, id_col).is_blank())
            .map(|row| {
                let dues = parse_money(sheet.cell(row, amount_col))
                    .map(CellValue::Number)
                    .unwrap_or_default();
                VendorRecord::new(sheet.cell(row, id_col).clone())
                    .with_field(HOA_MONTHLY_DUES_AMOUNT, dues)
                    .with_field(HOA_MONTHLY_DUES_FREQUENCY, MONTHLY)
                    .with_field(HOA_SOURCE, "CONSOLIDATED_ANALYTICS")
                    .with_field(HOA_SOURCE_FILE, file_name.as_str())
            })
            .collect();

        Ok(records)
    }

    fn vendor_type(&self) -> &str {
        "consolidated_analytics"
    }

    fn native_key(&self) -> Option<MatchKey> {
        Some(MatchKey::CollateralId)
    }

    fn defaults_blank_dues_to_zero(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;
    use tempfile::TempDir;

    #[test]
    fn test_extracts_redwood_sheet() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("ca.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME).expect("name");
        sheet.write_string(0, 0, LOAN_ID_COLUMN).expect("header");
        sheet.write_string(0, 1, MONTHLY_HOA_COLUMN).expect("header");
        sheet.write_string(1, 0, "C-77").expect("id");
        sheet.write_number(1, 1, 45.0).expect("amount");
        sheet.write_number(2, 0, 88.0).expect("id");
        workbook.save(&path).expect("save");

        let extractor = ConsolidatedAnalyticsExtractor::new();
        let records = extractor.extract(&path).expect("records");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, CellValue::text("C-77"));
        assert_eq!(records[0].fields[HOA_MONTHLY_DUES_AMOUNT], CellValue::Number(45.0));
        assert_eq!(records[0].fields[HOA_SOURCE], CellValue::text("CONSOLIDATED_ANALYTICS"));
        assert_eq!(records[1].key, CellValue::Number(88.0));
        // Blank amounts are zero-filled by the registry
        assert_eq!(records[1].fields[HOA_MONTHLY_DUES_AMOUNT], CellValue::Empty);
        assert!(extractor.defaults_blank_dues_to_zero());
        assert_eq!(extractor.native_key(), Some(MatchKey::CollateralId));
    }
}
