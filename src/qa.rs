// QA Summary - run-level and per-vendor match metrics
// Feeds the "QA Summary" / exception sheets and the console summary.

use crate::config::MatchKey;
use crate::error::{ReportError, Result};
use crate::merge::VendorStats;
use crate::tape::Tape;
use crate::workbook::CellValue;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Identity of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
}

impl RunInfo {
    pub fn new() -> Self {
        RunInfo {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
        }
    }
}

impl Default for RunInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 of one input file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputFingerprint {
    pub label: String,
    pub path: String,
    pub sha256: String,
}

/// Hex SHA-256 of a file's bytes
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| {
        ReportError::input(format!("Failed to read {} for fingerprinting: {}", path.display(), e))
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

impl InputFingerprint {
    pub fn from_file(label: impl Into<String>, path: &Path) -> Result<Self> {
        Ok(InputFingerprint {
            label: label.into(),
            path: path.display().to_string(),
            sha256: fingerprint_file(path)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QaSummary {
    pub run: RunInfo,
    pub tape_rows: usize,
    pub tape_raw_rows: usize,
    pub tape_unique_loan_ids: usize,
    pub tape_duplicate_loan_ids: usize,
    pub vendor_rows: usize,
    pub vendor_unique_loan_ids: usize,
    pub matched_loan_ids: usize,
    pub match_rate: f64,
    pub missing_hoa_values_count: usize,
    pub vendors: Vec<VendorStats>,
    pub inputs: Vec<InputFingerprint>,
}

impl QaSummary {
    /// Build the summary
    ///
    /// `missing_hoa_values_count` is the number of report rows whose HOA
    /// monthly payment is still blank after projection.
    pub fn compute(
        run: RunInfo,
        tape: &Tape,
        vendors: &[VendorStats],
        missing_hoa_values_count: usize,
        inputs: Vec<InputFingerprint>,
    ) -> Self {
        let tape_ids = tape.unique_loan_ids();
        let tape_unique = tape_ids.len();

        // A tape loan counts as matched when any vendor covered it
        let mut matched: HashSet<&str> = HashSet::new();
        let mut vendor_ids: HashSet<String> = HashSet::new();
        for stats in vendors {
            let missing: HashSet<&str> = stats.missing_loan_ids.iter().map(String::as_str).collect();
            for id in &tape_ids {
                if !missing.contains(id.as_str()) {
                    matched.insert(id.as_str());
                    vendor_ids.insert(id.clone());
                }
            }
            // Unresolved collateral keys are not loan IDs
            if stats.match_key == MatchKey::LoanId {
                vendor_ids.extend(stats.extra_keys.iter().cloned());
            }
        }

        let match_rate = if tape_unique == 0 {
            0.0
        } else {
            matched.len() as f64 / tape_unique as f64
        };

        QaSummary {
            run,
            tape_rows: tape.rows.len(),
            tape_raw_rows: tape.qa.input_row_count,
            tape_unique_loan_ids: tape_unique,
            tape_duplicate_loan_ids: tape.rows.len() - tape_unique,
            vendor_rows: vendors.iter().map(|v| v.rows).sum(),
            vendor_unique_loan_ids: vendor_ids.len(),
            matched_loan_ids: matched.len(),
            match_rate,
            missing_hoa_values_count,
            vendors: vendors.to_vec(),
            inputs,
        }
    }

    fn base_metrics(&self) -> Vec<(&'static str, CellValue)> {
        vec![
            ("Tape Rows", CellValue::Number(self.tape_rows as f64)),
            ("Tape Raw Rows", CellValue::Number(self.tape_raw_rows as f64)),
            ("Tape Unique Loan IDs", CellValue::Number(self.tape_unique_loan_ids as f64)),
            ("Tape Duplicate Loan IDs", CellValue::Number(self.tape_duplicate_loan_ids as f64)),
            ("Vendor Rows", CellValue::Number(self.vendor_rows as f64)),
            ("Vendor Unique Loan IDs", CellValue::Number(self.vendor_unique_loan_ids as f64)),
            ("Matched Loan IDs", CellValue::Number(self.matched_loan_ids as f64)),
            ("Match Rate", CellValue::Number(self.match_rate)),
            ("Missing HOA Values Count", CellValue::Number(self.missing_hoa_values_count as f64)),
        ]
    }

    /// Metric/Value rows for the "QA Summary" sheet
    pub fn sheet_rows(&self) -> Vec<(String, CellValue)> {
        let mut rows: Vec<(String, CellValue)> = self
            .base_metrics()
            .into_iter()
            .map(|(label, value)| (label.to_string(), value))
            .collect();

        if !self.vendors.is_empty() {
            rows.push((String::new(), CellValue::Empty));
            for v in &self.vendors {
                let metrics = [
                    ("Vendor Rows", CellValue::Number(v.rows as f64)),
                    ("Vendor Unique IDs", CellValue::Number(v.unique_keys as f64)),
                    ("Matched Loans", CellValue::Number(v.matched_loans as f64)),
                    ("Match Rate", CellValue::Number(v.match_rate)),
                    ("Missing in Vendor", CellValue::Number(v.missing_loan_ids.len() as f64)),
                    ("Extra in Vendor", CellValue::Number(v.extra_keys.len() as f64)),
                ];
                for (label, value) in metrics {
                    rows.push((format!("{} - {}", v.name, label), value));
                }
            }
        }

        rows.push((String::new(), CellValue::Empty));
        rows.push(("Run ID".to_string(), CellValue::text(self.run.run_id.to_string())));
        rows.push((
            "Generated At (UTC)".to_string(),
            CellValue::text(self.run.generated_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ));
        for input in &self.inputs {
            rows.push((format!("SHA-256 {} ({})", input.label, input.path), CellValue::text(input.sha256.clone())));
        }

        rows
    }

    /// (vendor, loan ID) rows for the "Missing in Vendor" sheet
    pub fn missing_rows(&self) -> Vec<(String, String)> {
        self.vendors
            .iter()
            .flat_map(|v| v.missing_loan_ids.iter().map(move |id| (v.name.clone(), id.clone())))
            .collect()
    }

    /// (vendor, key) rows for the "Extra in Vendor" sheet
    pub fn extra_rows(&self) -> Vec<(String, String)> {
        self.vendors
            .iter()
            .flat_map(|v| v.extra_keys.iter().map(move |id| (v.name.clone(), id.clone())))
            .collect()
    }

    /// Console lines: "QA Summary" then "- Label: value"
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec!["QA Summary".to_string()];
        for (label, value) in self.base_metrics() {
            let rendered = if label == "Match Rate" {
                format!("{:.2}%", self.match_rate * 100.0)
            } else {
                value.to_string()
            };
            lines.push(format!("- {}: {}", label, rendered));
        }
        lines
    }
}
