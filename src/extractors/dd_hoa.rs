// DD firm HOA extractor
// First sheet; loan and dues columns are located by normalized header alias.

use super::{
    require_alias, VendorExtractor, VendorRecord, HOA_MONTHLY_DUES_AMOUNT,
    HOA_MONTHLY_DUES_FREQUENCY, HOA_SOURCE, HOA_SOURCE_FILE, MONTHLY,
};
use crate::config::MatchKey;
use crate::error::Result;
use crate::loan_id::normalize_loan_id;
use crate::workbook::{parse_money, read_sheet, CellValue, SheetSelector};
use std::collections::HashMap;
use std::path::Path;

const LOAN_ID_ALIASES: [&str; 3] = ["loan_number", "loan_id", "loan_num"];
const MONTHLY_DUES_ALIASES: [&str; 4] = [
    "monthly_hoa_dues",
    "monthly_dues",
    "hoa_monthly_dues",
    "hoa_dues",
];

pub struct DdHoaExtractor;

impl DdHoaExtractor {
    pub fn new() -> Self {
        DdHoaExtractor
    }
}

impl Default for DdHoaExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl VendorExtractor for DdHoaExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<VendorRecord>> {
        let sheet = read_sheet(path, &SheetSelector::First)?;
        let loan_col = require_alias(&sheet, "loan_id", &LOAN_ID_ALIASES, "DD HOA")?;
        let dues_col = require_alias(&sheet, HOA_MONTHLY_DUES_AMOUNT, &MONTHLY_DUES_ALIASES, "DD HOA")?;
        let file_name = sheet.file_name();

        // DD files repeat rows per loan; keep one row per loan with the first non-blank amount
        let mut order: Vec<(String, CellValue)> = Vec::new();
        let mut amounts: HashMap<String, Option<f64>> = HashMap::new();

        for row in 0..sheet.row_count() {
            let key = sheet.cell(row, loan_col);
            let Some(loan_id) = normalize_loan_id(key) else {
                continue;
            };
            let amount = parse_money(sheet.cell(row, dues_col));

            match amounts.get_mut(&loan_id) {
                Some(existing) => {
                    if existing.is_none() {
                        *existing = amount;
                    }
                }
                None => {
                    amounts.insert(loan_id.clone(), amount);
                    order.push((loan_id, key.clone()));
                }
            }
        }

        let records = order
            .into_iter()
            .map(|(loan_id, key)| {
                let dues = amounts
                    .get(&loan_id)
                    .copied()
                    .flatten()
                    .map(CellValue::Number)
                    .unwrap_or_default();
                VendorRecord::new(key)
                    .with_field(HOA_MONTHLY_DUES_AMOUNT, dues)
                    .with_field(HOA_MONTHLY_DUES_FREQUENCY, MONTHLY)
                    .with_field(HOA_SOURCE, "DD Firm")
                    .with_field(HOA_SOURCE_FILE, file_name.as_str())
            })
            .collect();

        Ok(records)
    }

    fn vendor_type(&self) -> &str {
        "dd_hoa"
    }

    fn native_key(&self) -> Option<MatchKey> {
        Some(MatchKey::LoanId)
    }

    fn defaults_blank_dues_to_zero(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReportError;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_collapses_repeated_loans_to_first_amount() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("dd.csv");
        fs::write(
            &path,
            "Loan Num,HOA Dues,Reviewer\nA-1,,x\nB-2,55,x\na1,120,x\nA-1,300,x\n",
        )
        .expect("write");

        let records = DdHoaExtractor::new().extract(&path).expect("records");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, CellValue::text("A-1"));
        assert_eq!(records[0].fields[HOA_MONTHLY_DUES_AMOUNT], CellValue::Number(120.0));
        assert_eq!(records[1].key, CellValue::text("B-2"));
        assert_eq!(records[1].fields[HOA_MONTHLY_DUES_AMOUNT], CellValue::Number(55.0));
        assert_eq!(records[1].fields[HOA_SOURCE], CellValue::text("DD Firm"));
        assert_eq!(records[1].fields[HOA_SOURCE_FILE], CellValue::text("dd.csv"));
    }

    #[test]
    fn test_missing_dues_column() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("dd.csv");
        fs::write(&path, "Loan Number,Amount\nA-1,5\n").expect("write");

        let err = DdHoaExtractor::new().extract(&path).expect_err("missing dues");
        let message = err.to_string();
        assert!(matches!(err, ReportError::Input(_)));
        assert!(message.contains("hoa_dues, hoa_monthly_dues, monthly_dues, monthly_hoa_dues"));
    }
}
