// Merge Engine - tape + SQL enrichment + vendors → one row per tape row
// Every source after the tape uses blank-only fill; earlier vendors win.

use crate::config::MatchKey;
use crate::enrichment::EnrichmentSet;
use crate::error::{ReportError, Result};
use crate::extractors::{
    VendorBatch, HOA_MONTHLY_DUES_AMOUNT, HOA_SOURCE, HOA_SOURCE_FILE, HOA_VALUE_FIELDS,
};
use crate::loan_id::normalize_loan_id;
use crate::tape::LoanRow;
use crate::workbook::{fill_blank, parse_money, CellValue, Record};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

pub const HOA_SOURCE_USED: &str = "hoa_source_used";
pub const HOA_SOURCE_FILE_USED: &str = "hoa_source_file_used";
pub const HOA_DISCREPANCY_FLAG: &str = "hoa_discrepancy_flag";
pub const COLLATERAL_ID: &str = "collateral_id";

/// One output row: tape fields, blank-filled from enrichment and vendors
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub loan_id: String,
    pub fields: Record,
}

impl MergedRow {
    pub fn get(&self, field: &str) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.fields.get(field).unwrap_or(&EMPTY)
    }

    pub fn has_discrepancy(&self) -> bool {
        matches!(self.fields.get(HOA_DISCREPANCY_FLAG), Some(CellValue::Bool(true)))
    }
}

/// Per-vendor match statistics
#[derive(Debug, Clone, Serialize)]
pub struct VendorStats {
    pub name: String,
    pub vendor_type: String,
    pub match_key: MatchKey,
    pub rows: usize,
    pub unique_keys: usize,
    pub matched_loans: usize,
    pub match_rate: f64,
    /// Tape loan IDs the vendor did not cover, tape order
    pub missing_loan_ids: Vec<String>,
    /// Vendor keys that resolved to no tape loan, file order
    pub extra_keys: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub rows: Vec<MergedRow>,
    pub vendor_stats: Vec<VendorStats>,
}

// ============================================================================
// MERGE ENGINE
// ============================================================================

/// Collateral ID → loan ID over the merged rows
///
/// Fails when one collateral ID belongs to two different loans.
fn build_collateral_map(rows: &[MergedRow]) -> Result<HashMap<String, String>> {
    let mut map: HashMap<String, String> = HashMap::new();
    let mut ambiguous: BTreeSet<String> = BTreeSet::new();

    for row in rows {
        let Some(collateral) = normalize_loan_id(row.get(COLLATERAL_ID)) else {
            continue;
        };
        match map.get(&collateral) {
            Some(existing) if existing != &row.loan_id => {
                ambiguous.insert(collateral);
            }
            Some(_) => {}
            None => {
                map.insert(collateral, row.loan_id.clone());
            }
        }
    }

    if !ambiguous.is_empty() {
        let ids: Vec<&str> = ambiguous.iter().map(String::as_str).collect();
        return Err(ReportError::input(format!(
            "Collateral ID maps to more than one tape loan: {}",
            ids.join(", ")
        )));
    }

    Ok(map)
}

/// Distinct monthly dues amounts, compared to the cent
fn distinct_amounts(amounts: &[f64]) -> usize {
    amounts
        .iter()
        .map(|a| (a * 100.0).round() as i64)
        .collect::<HashSet<_>>()
        .len()
}

pub struct MergeEngine<'a> {
    enrichment: Option<&'a EnrichmentSet>,
}

impl<'a> MergeEngine<'a> {
    pub fn new() -> Self {
        MergeEngine { enrichment: None }
    }

    pub fn with_enrichment(mut self, enrichment: &'a EnrichmentSet) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    /// Merge vendors (already in priority order) onto the tape rows
    pub fn merge(&self, tape: &[LoanRow], vendors: &[VendorBatch]) -> Result<MergeOutput> {
        let mut rows: Vec<MergedRow> = tape
            .iter()
            .map(|loan| MergedRow {
                loan_id: loan.loan_id.clone(),
                fields: loan.fields.clone(),
            })
            .collect();

        if let Some(enrichment) = self.enrichment {
            let mut enriched = 0usize;
            for row in rows.iter_mut() {
                if let Some(extra) = enrichment.get(&row.loan_id) {
                    enriched += 1;
                    for (field, value) in extra {
                        fill_blank(&mut row.fields, field, value);
                    }
                }
            }
            debug!(rows = enriched, "applied SQL enrichment");
        }

        // Duplicate tape loan IDs each get the vendor data
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        let mut unique_ids: Vec<String> = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let slots = index.entry(row.loan_id.clone()).or_default();
            if slots.is_empty() {
                unique_ids.push(row.loan_id.clone());
            }
            slots.push(i);
        }

        let collateral_map = if vendors.iter().any(|v| v.match_key == MatchKey::CollateralId) {
            build_collateral_map(&rows)?
        } else {
            HashMap::new()
        };

        let mut dues_seen: Vec<Vec<f64>> = vec![Vec::new(); rows.len()];
        let mut vendor_stats = Vec::with_capacity(vendors.len());

        for vendor in vendors {
            let mut matched: HashSet<String> = HashSet::new();
            let mut extra_keys: Vec<String> = Vec::new();

            for vendor_row in &vendor.rows {
                let resolved = match vendor.match_key {
                    MatchKey::LoanId => index.contains_key(&vendor_row.key).then(|| vendor_row.key.clone()),
                    MatchKey::CollateralId => collateral_map.get(&vendor_row.key).cloned(),
                };
                let Some(loan_id) = resolved else {
                    extra_keys.push(vendor_row.key.clone());
                    continue;
                };

                let source = match vendor_row.fields.get(HOA_SOURCE) {
                    Some(value) if !value.is_blank() => value.clone(),
                    _ => CellValue::text(vendor.name.clone()),
                };
                let source_file = vendor_row
                    .fields
                    .get(HOA_SOURCE_FILE)
                    .cloned()
                    .unwrap_or_else(|| CellValue::text(vendor.path.display().to_string()));
                let amount = vendor_row.fields.get(HOA_MONTHLY_DUES_AMOUNT).and_then(parse_money);

                for &slot in index.get(&loan_id).into_iter().flatten() {
                    let row = &mut rows[slot];
                    let mut filled_hoa = false;
                    for (field, value) in &vendor_row.fields {
                        let field = field.as_str();
                        if field == HOA_SOURCE || field == HOA_SOURCE_FILE {
                            continue;
                        }
                        // Dues that are not an amount never claim the cell
                        let value = if field == HOA_MONTHLY_DUES_AMOUNT {
                            match amount {
                                Some(amount) => CellValue::Number(amount),
                                None => continue,
                            }
                        } else {
                            value.clone()
                        };
                        if fill_blank(&mut row.fields, field, &value) && HOA_VALUE_FIELDS.contains(&field) {
                            filled_hoa = true;
                        }
                    }
                    if filled_hoa {
                        fill_blank(&mut row.fields, HOA_SOURCE, &source);
                        fill_blank(&mut row.fields, HOA_SOURCE_FILE, &source_file);
                        fill_blank(&mut row.fields, HOA_SOURCE_USED, &source);
                        fill_blank(&mut row.fields, HOA_SOURCE_FILE_USED, &source_file);
                    }
                    if let Some(amount) = amount {
                        dues_seen[slot].push(amount);
                    }
                }

                matched.insert(loan_id);
            }

            if !extra_keys.is_empty() {
                let sample: Vec<&str> = extra_keys.iter().take(5).map(String::as_str).collect();
                warn!(
                    vendor = %vendor.name,
                    count = extra_keys.len(),
                    "vendor rows with {} not on the tape were skipped (e.g. {})",
                    vendor.match_key.as_str(),
                    sample.join(", ")
                );
            }

            let missing_loan_ids: Vec<String> = unique_ids
                .iter()
                .filter(|id| !matched.contains(*id))
                .cloned()
                .collect();
            let match_rate = if unique_ids.is_empty() {
                0.0
            } else {
                matched.len() as f64 / unique_ids.len() as f64
            };

            debug!(
                vendor = %vendor.name,
                matched = matched.len(),
                missing = missing_loan_ids.len(),
                extra = extra_keys.len(),
                "vendor merged"
            );

            vendor_stats.push(VendorStats {
                name: vendor.name.clone(),
                vendor_type: vendor.vendor_type.clone(),
                match_key: vendor.match_key,
                rows: vendor.extracted_rows,
                unique_keys: vendor.unique_keys(),
                matched_loans: matched.len(),
                match_rate,
                missing_loan_ids,
                extra_keys,
            });
        }

        let mut discrepancies = 0usize;
        for (row, amounts) in rows.iter_mut().zip(&dues_seen) {
            let flag = distinct_amounts(amounts) > 1;
            if flag {
                discrepancies += 1;
            }
            row.fields.insert(HOA_DISCREPANCY_FLAG.to_string(), CellValue::Bool(flag));
        }
        if discrepancies > 0 {
            warn!(rows = discrepancies, "vendors disagree on monthly HOA dues");
        }

        info!(rows = rows.len(), vendors = vendors.len(), "merge complete");
        Ok(MergeOutput { rows, vendor_stats })
    }
}

impl<'a> Default for MergeEngine<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::VendorRow;
    use std::path::PathBuf;

    fn loan(id: &str, extra: &[(&str, CellValue)]) -> LoanRow {
        let mut fields = Record::new();
        for (k, v) in extra {
            fields.insert(k.to_string(), v.clone());
        }
        LoanRow::new(id, fields)
    }

    fn vendor(name: &str, match_key: MatchKey, rows: Vec<(&str, Vec<(&str, CellValue)>)>) -> VendorBatch {
        let rows: Vec<VendorRow> = rows
            .into_iter()
            .map(|(key, fields)| VendorRow {
                key: key.to_string(),
                fields: fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            })
            .collect();
        VendorBatch {
            name: name.to_string(),
            vendor_type: "example_vendor".to_string(),
            match_key,
            path: PathBuf::from(format!("{}.xlsx", name)),
            extracted_rows: rows.len(),
            rows,
        }
    }

    fn dues(amount: f64) -> (&'static str, CellValue) {
        (HOA_MONTHLY_DUES_AMOUNT, CellValue::Number(amount))
    }

    #[test]
    fn test_one_row_per_tape_row_in_order() {
        let tape = vec![loan("L3", &[]), loan("L1", &[]), loan("L3", &[]), loan("L2", &[])];
        let v = vendor("a", MatchKey::LoanId, vec![("L3", vec![dues(50.0)]), ("L9", vec![dues(1.0)])]);

        let output = MergeEngine::new().merge(&tape, &[v]).expect("merge");

        let ids: Vec<&str> = output.rows.iter().map(|r| r.loan_id.as_str()).collect();
        assert_eq!(ids, vec!["L3", "L1", "L3", "L2"]);
        assert_eq!(output.rows[0].get(HOA_MONTHLY_DUES_AMOUNT), &CellValue::Number(50.0));
        assert_eq!(output.rows[2].get(HOA_MONTHLY_DUES_AMOUNT), &CellValue::Number(50.0));

        let stats = &output.vendor_stats[0];
        assert_eq!(stats.matched_loans, 1);
        assert_eq!(stats.missing_loan_ids, vec!["L1", "L2"]);
        assert_eq!(stats.extra_keys, vec!["L9"]);
        assert!((stats.match_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_vendor_never_overwrites_tape_or_enrichment() {
        let tape = vec![loan("L1", &[("city", CellValue::text("Austin"))])];
        let mut enrichment_row = Record::new();
        enrichment_row.insert("loan_id".to_string(), CellValue::text("L1"));
        enrichment_row.insert("city".to_string(), CellValue::text("Houston"));
        enrichment_row.insert("dd_firm".to_string(), CellValue::text("Clayton"));
        let enrichment = EnrichmentSet::from_rows(
            vec!["loan_id".to_string(), "city".to_string(), "dd_firm".to_string()],
            vec![enrichment_row],
        )
        .expect("enrichment");

        let v = vendor(
            "a",
            MatchKey::LoanId,
            vec![("L1", vec![("city", CellValue::text("Dallas")), ("dd_firm", CellValue::text("AMC"))])],
        );

        let output = MergeEngine::new()
            .with_enrichment(&enrichment)
            .merge(&tape, &[v])
            .expect("merge");

        let row = &output.rows[0];
        assert_eq!(row.get("city"), &CellValue::text("Austin"));
        assert_eq!(row.get("dd_firm"), &CellValue::text("Clayton"));
    }

    #[test]
    fn test_priority_order_first_vendor_wins() {
        let tape = vec![loan("L1", &[]), loan("L2", &[])];
        let first = vendor(
            "first",
            MatchKey::LoanId,
            vec![("L1", vec![dues(100.0), (HOA_SOURCE, CellValue::text("FIRST"))])],
        );
        let second = vendor(
            "second",
            MatchKey::LoanId,
            vec![
                ("L1", vec![dues(200.0), (HOA_SOURCE, CellValue::text("SECOND"))]),
                ("L2", vec![dues(75.0), (HOA_SOURCE, CellValue::text("SECOND"))]),
            ],
        );

        let output = MergeEngine::new().merge(&tape, &[first, second]).expect("merge");

        let l1 = &output.rows[0];
        assert_eq!(l1.get(HOA_MONTHLY_DUES_AMOUNT), &CellValue::Number(100.0));
        assert_eq!(l1.get(HOA_SOURCE_USED), &CellValue::text("FIRST"));
        assert_eq!(l1.get(HOA_SOURCE_FILE_USED), &CellValue::text("first.xlsx"));
        assert!(l1.has_discrepancy());

        let l2 = &output.rows[1];
        assert_eq!(l2.get(HOA_MONTHLY_DUES_AMOUNT), &CellValue::Number(75.0));
        assert_eq!(l2.get(HOA_SOURCE_USED), &CellValue::text("SECOND"));
        assert!(!l2.has_discrepancy());
    }

    #[test]
    fn test_provenance_skips_vendor_without_hoa_values() {
        let tape = vec![loan("L1", &[])];
        let first = vendor(
            "first",
            MatchKey::LoanId,
            vec![("L1", vec![
                (HOA_MONTHLY_DUES_AMOUNT, CellValue::Empty),
                (HOA_SOURCE, CellValue::text("FIRST")),
                (HOA_SOURCE_FILE, CellValue::text("a.csv")),
            ])],
        );
        let second = vendor(
            "second",
            MatchKey::LoanId,
            vec![("L1", vec![
                dues(100.0),
                (HOA_SOURCE, CellValue::text("SECOND")),
                (HOA_SOURCE_FILE, CellValue::text("b.csv")),
            ])],
        );

        let output = MergeEngine::new().merge(&tape, &[first, second]).expect("merge");

        let row = &output.rows[0];
        assert_eq!(row.get(HOA_MONTHLY_DUES_AMOUNT), &CellValue::Number(100.0));
        assert_eq!(row.get(HOA_SOURCE_USED), &CellValue::text("SECOND"));
        assert_eq!(row.get(HOA_SOURCE_FILE_USED), &CellValue::text("b.csv"));
        assert_eq!(row.get(HOA_SOURCE), &CellValue::text("SECOND"));
        // Matched, but contributed nothing
        assert_eq!(output.vendor_stats[0].matched_loans, 1);
    }

    #[test]
    fn test_non_numeric_dues_do_not_claim_the_cell() {
        let tape = vec![loan("L1", &[])];
        let first = vendor(
            "first",
            MatchKey::LoanId,
            vec![("L1", vec![(HOA_MONTHLY_DUES_AMOUNT, CellValue::text("call"))])],
        );
        let second = vendor("second", MatchKey::LoanId, vec![("L1", vec![dues(100.0)])]);

        let output = MergeEngine::new().merge(&tape, &[first, second]).expect("merge");

        let row = &output.rows[0];
        assert_eq!(row.get(HOA_MONTHLY_DUES_AMOUNT), &CellValue::Number(100.0));
        assert_eq!(row.get(HOA_SOURCE_USED), &CellValue::text("second"));
        assert!(!row.has_discrepancy());
    }

    #[test]
    fn test_collateral_match_and_unresolvable_rows() {
        let tape = vec![
            loan("L1", &[(COLLATERAL_ID, CellValue::text("C-100"))]),
            loan("L2", &[]),
        ];
        let ca = vendor(
            "ca",
            MatchKey::CollateralId,
            vec![("C100", vec![dues(45.0)]), ("C999", vec![dues(10.0)])],
        );

        let output = MergeEngine::new().merge(&tape, &[ca]).expect("merge");

        assert_eq!(output.rows[0].get(HOA_MONTHLY_DUES_AMOUNT), &CellValue::Number(45.0));
        assert_eq!(output.rows[0].get(HOA_SOURCE_USED), &CellValue::text("ca"));
        assert_eq!(output.rows[1].get(HOA_MONTHLY_DUES_AMOUNT), &CellValue::Empty);
        assert_eq!(output.vendor_stats[0].extra_keys, vec!["C999"]);
    }

    #[test]
    fn test_ambiguous_collateral_is_input_error() {
        let tape = vec![
            loan("L1", &[(COLLATERAL_ID, CellValue::text("C-1"))]),
            loan("L2", &[(COLLATERAL_ID, CellValue::text("c1"))]),
        ];
        let ca = vendor("ca", MatchKey::CollateralId, vec![("C1", vec![dues(1.0)])]);

        let err = MergeEngine::new().merge(&tape, &[ca]).expect_err("ambiguous");
        assert!(matches!(err, ReportError::Input(_)));
        assert!(err.to_string().contains("C1"));

        // Without a collateral-keyed vendor the map is never built
        let tape = vec![
            loan("L1", &[(COLLATERAL_ID, CellValue::text("C-1"))]),
            loan("L2", &[(COLLATERAL_ID, CellValue::text("c1"))]),
        ];
        assert!(MergeEngine::new().merge(&tape, &[]).is_ok());
    }
}
