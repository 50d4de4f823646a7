// Vendor Extractors - one extractor per vendor file layout
// Registry maps a vendor type tag to a boxed VendorExtractor.

pub mod clayton;
pub mod consolidated_analytics;
pub mod dd_hoa;
pub mod example_vendor;

pub use clayton::ClaytonExtractor;
pub use consolidated_analytics::ConsolidatedAnalyticsExtractor;
pub use dd_hoa::DdHoaExtractor;
pub use example_vendor::ExampleVendorExtractor;

use crate::config::{MatchKey, VendorConfig};
use crate::error::{ReportError, Result};
use crate::loan_id::normalize_loan_id;
use crate::workbook::{fill_blank, is_blank_field, CellValue, Record, Sheet};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// ============================================================================
// CANONICAL HOA FIELDS
// ============================================================================

pub const HOA_MONTHLY_DUES_AMOUNT: &str = "hoa_monthly_dues_amount";
pub const HOA_MONTHLY_DUES_FREQUENCY: &str = "hoa_monthly_dues_frequency";
pub const HOA_TRANSFER_FEE_AMOUNT: &str = "hoa_transfer_fee_amount";
pub const HOA_SPECIAL_ASSESSMENT_AMOUNT: &str = "hoa_special_assessment_amount";
pub const HOA_NOTES: &str = "hoa_notes";
pub const HOA_SOURCE: &str = "hoa_source";
pub const HOA_SOURCE_FILE: &str = "hoa_source_file";

/// HOA value fields; filling any of these credits the vendor with the row
pub const HOA_VALUE_FIELDS: [&str; 5] = [
    HOA_MONTHLY_DUES_AMOUNT,
    HOA_MONTHLY_DUES_FREQUENCY,
    HOA_TRANSFER_FEE_AMOUNT,
    HOA_SPECIAL_ASSESSMENT_AMOUNT,
    HOA_NOTES,
];

pub const MONTHLY: &str = "MONTHLY";

// ============================================================================
// CORE TYPES
// ============================================================================

/// VendorRecord - Output of extractor.extract()
///
/// `key` is the raw match-key cell; the registry normalizes it.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorRecord {
    pub key: CellValue,
    pub fields: Record,
}

impl VendorRecord {
    pub fn new(key: CellValue) -> Self {
        VendorRecord {
            key,
            fields: Record::new(),
        }
    }

    /// Builder: set a canonical field
    pub fn with_field(mut self, field: &str, value: impl Into<CellValue>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }
}

/// Vendor row after the output contract: normalized key, canonical fields
#[derive(Debug, Clone, PartialEq)]
pub struct VendorRow {
    pub key: String,
    pub fields: Record,
}

/// All rows of one configured vendor, ready for merge
#[derive(Debug, Clone)]
pub struct VendorBatch {
    pub name: String,
    pub vendor_type: String,
    pub match_key: MatchKey,
    pub path: PathBuf,
    /// Records returned by the extractor, before blank/duplicate keys were dropped
    pub extracted_rows: usize,
    pub rows: Vec<VendorRow>,
}

impl VendorBatch {
    pub fn unique_keys(&self) -> usize {
        self.rows.len()
    }
}

/// VendorExtractor - Core trait
///
/// Each implementation knows one vendor's sheet name and column headers.
pub trait VendorExtractor: Send + Sync {
    /// Read a vendor file into records keyed by the raw match-key cell
    fn extract(&self, path: &Path) -> Result<Vec<VendorRecord>>;

    /// Registry type tag
    fn vendor_type(&self) -> &str;

    /// Match key the extracted keys represent (None = either)
    fn native_key(&self) -> Option<MatchKey> {
        None
    }

    /// Blank monthly dues mean "no HOA" for this vendor
    fn defaults_blank_dues_to_zero(&self) -> bool {
        false
    }
}

/// Fail with an InputError unless every header is present (exact match)
pub fn require_columns(sheet: &Sheet, required: &[&str], label: &str) -> Result<Vec<usize>> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|col| sheet.column_index(col).is_none())
        .collect();

    if !missing.is_empty() {
        return Err(ReportError::input(format!(
            "{} file is missing required column(s): {}. Required: {}. Found: {}. File: {}",
            label,
            missing.join(", "),
            required.join(", "),
            sheet.header_summary(),
            sheet.source.display()
        )));
    }

    Ok(required
        .iter()
        .filter_map(|col| sheet.column_index(col))
        .collect())
}

/// Resolve a column by normalized-header alias or fail naming the expected aliases
pub fn require_alias(sheet: &Sheet, field: &str, aliases: &[&str], label: &str) -> Result<usize> {
    sheet.column_index_by_alias(aliases).ok_or_else(|| {
        let mut expected: Vec<&str> = aliases.to_vec();
        expected.sort_unstable();
        ReportError::input(format!(
            "{} file is missing required '{}' column ({}). Found: {}. File: {}",
            label,
            field,
            expected.join(", "),
            sheet.header_summary(),
            sheet.source.display()
        ))
    })
}

// ============================================================================
// REGISTRY
// ============================================================================

fn normalize_vendor_type(vendor_type: &str) -> Result<String> {
    let normalized = vendor_type.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(ReportError::config("Vendor extractor type must be a non-empty string"));
    }
    Ok(normalized)
}

/// ExtractorRegistry - vendor type → extractor
pub struct ExtractorRegistry {
    extractors: BTreeMap<String, Box<dyn VendorExtractor>>,
}

impl ExtractorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        ExtractorRegistry {
            extractors: BTreeMap::new(),
        }
    }

    /// Registry with the built-in vendor extractors
    pub fn with_defaults() -> Self {
        let mut registry = ExtractorRegistry::new();
        let builtins: Vec<Box<dyn VendorExtractor>> = vec![
            Box::new(ClaytonExtractor::new()),
            Box::new(ConsolidatedAnalyticsExtractor::new()),
            Box::new(DdHoaExtractor::new()),
            Box::new(ExampleVendorExtractor::new()),
        ];
        for extractor in builtins {
            let vendor_type = extractor.vendor_type().to_string();
            // Built-in tags are non-empty
            let _ = registry.register(&vendor_type, extractor);
        }
        registry
    }

    /// Add or replace an extractor
    pub fn register(&mut self, vendor_type: &str, extractor: Box<dyn VendorExtractor>) -> Result<()> {
        let normalized = normalize_vendor_type(vendor_type)?;
        self.extractors.insert(normalized, extractor);
        Ok(())
    }

    /// Resolve an extractor by type (case-insensitive, trimmed)
    pub fn get(&self, vendor_type: &str) -> Result<&dyn VendorExtractor> {
        let normalized = normalize_vendor_type(vendor_type)?;
        self.extractors
            .get(&normalized)
            .map(|e| e.as_ref())
            .ok_or_else(|| {
                let available = if self.extractors.is_empty() {
                    "<none>".to_string()
                } else {
                    self.types().join(", ")
                };
                ReportError::config(format!(
                    "Unknown vendor extractor '{}'. Available extractors: {}",
                    vendor_type, available
                ))
            })
    }

    /// Registered type names, sorted
    pub fn types(&self) -> Vec<String> {
        self.extractors.keys().cloned().collect()
    }

    /// Check a vendor's type resolves and its match key agrees with the extractor
    pub fn validate(&self, vendor: &VendorConfig) -> Result<()> {
        let extractor = self.get(&vendor.vendor_type)?;
        match extractor.native_key() {
            Some(native) if native != vendor.match_key => Err(ReportError::config(format!(
                "Vendor '{}' uses match_key '{}' but extractor '{}' produces '{}' keys",
                vendor.name,
                vendor.match_key.as_str(),
                extractor.vendor_type(),
                native.as_str()
            ))),
            _ => Ok(()),
        }
    }

    /// Run the vendor's extractor and enforce the canonical output contract
    pub fn extract(&self, vendor: &VendorConfig) -> Result<VendorBatch> {
        self.validate(vendor)?;
        let extractor = self.get(&vendor.vendor_type)?;
        let vendor_type = normalize_vendor_type(&vendor.vendor_type)?;

        let records = extractor.extract(&vendor.path)?;
        let extracted_rows = records.len();

        let mut rows = Vec::with_capacity(records.len());
        let mut seen: HashSet<String> = HashSet::new();
        let mut blank_keys = 0usize;
        let mut duplicate_keys = 0usize;

        let default_source = CellValue::text(vendor_type.clone());
        let default_source_file = CellValue::text(vendor.path.display().to_string());

        for record in records {
            let Some(key) = normalize_loan_id(&record.key) else {
                blank_keys += 1;
                continue;
            };
            if !seen.insert(key.clone()) {
                duplicate_keys += 1;
                debug!(vendor = %vendor.name, key = %key, "dropping duplicate vendor key");
                continue;
            }

            let mut fields = record.fields;
            fill_blank(&mut fields, HOA_SOURCE, &default_source);
            fill_blank(&mut fields, HOA_SOURCE_FILE, &default_source_file);
            if extractor.defaults_blank_dues_to_zero() && is_blank_field(&fields, HOA_MONTHLY_DUES_AMOUNT) {
                fields.insert(HOA_MONTHLY_DUES_AMOUNT.to_string(), CellValue::Number(0.0));
            }

            rows.push(VendorRow { key, fields });
        }

        if blank_keys > 0 {
            warn!(
                vendor = %vendor.name,
                count = blank_keys,
                "dropped vendor rows with blank {} after normalization",
                vendor.match_key.as_str()
            );
        }
        if duplicate_keys > 0 {
            warn!(
                vendor = %vendor.name,
                count = duplicate_keys,
                "dropped duplicate vendor rows (first occurrence kept)"
            );
        }

        debug!(
            vendor = %vendor.name,
            extracted = extracted_rows,
            unique = rows.len(),
            "vendor file extracted"
        );

        Ok(VendorBatch {
            name: vendor.name.clone(),
            vendor_type,
            match_key: vendor.match_key,
            path: vendor.path.clone(),
            extracted_rows,
            rows,
        })
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedExtractor {
        records: Vec<VendorRecord>,
        native: Option<MatchKey>,
        zero_dues: bool,
    }

    impl VendorExtractor for FixedExtractor {
        fn extract(&self, _path: &Path) -> Result<Vec<VendorRecord>> {
            Ok(self.records.clone())
        }

        fn vendor_type(&self) -> &str {
            "fixed"
        }

        fn native_key(&self) -> Option<MatchKey> {
            self.native
        }

        fn defaults_blank_dues_to_zero(&self) -> bool {
            self.zero_dues
        }
    }

    fn vendor(vendor_type: &str, match_key: MatchKey) -> VendorConfig {
        VendorConfig {
            name: "v1".to_string(),
            vendor_type: vendor_type.to_string(),
            path: PathBuf::from("vendor.xlsx"),
            match_key,
        }
    }

    #[test]
    fn test_default_types_sorted() {
        let registry = ExtractorRegistry::with_defaults();
        assert_eq!(
            registry.types(),
            vec!["clayton", "consolidated_analytics", "dd_hoa", "example_vendor"]
        );
    }

    #[test]
    fn test_get_is_case_insensitive_and_lists_types() {
        let registry = ExtractorRegistry::with_defaults();
        assert_eq!(registry.get("  Clayton ").expect("clayton").vendor_type(), "clayton");

        let err = registry.get("acme").err().expect("unknown type");
        let message = err.to_string();
        assert!(matches!(err, ReportError::Configuration(_)));
        assert!(message.contains("acme"));
        assert!(message.contains("dd_hoa, example_vendor"));

        assert!(matches!(registry.get("   "), Err(ReportError::Configuration(_))));
    }

    #[test]
    fn test_match_key_must_agree_with_native_key() {
        let registry = ExtractorRegistry::with_defaults();
        assert!(registry.validate(&vendor("clayton", MatchKey::LoanId)).is_ok());
        assert!(matches!(
            registry.validate(&vendor("clayton", MatchKey::CollateralId)),
            Err(ReportError::Configuration(_))
        ));
        assert!(registry
            .validate(&vendor("consolidated_analytics", MatchKey::CollateralId))
            .is_ok());
        assert!(registry.validate(&vendor("example_vendor", MatchKey::CollateralId)).is_ok());
    }

    #[test]
    fn test_output_contract() {
        let mut registry = ExtractorRegistry::new();
        registry
            .register(
                "Fixed",
                Box::new(FixedExtractor {
                    records: vec![
                        VendorRecord::new(CellValue::text("l-1")).with_field(HOA_MONTHLY_DUES_AMOUNT, 100.0),
                        VendorRecord::new(CellValue::text("  ")),
                        VendorRecord::new(CellValue::text("L1")).with_field(HOA_MONTHLY_DUES_AMOUNT, 999.0),
                        VendorRecord::new(CellValue::Number(2.0)).with_field(HOA_SOURCE, "ACME"),
                    ],
                    native: None,
                    zero_dues: true,
                }),
            )
            .expect("register");

        let batch = registry.extract(&vendor("fixed", MatchKey::LoanId)).expect("batch");

        assert_eq!(batch.extracted_rows, 4);
        assert_eq!(batch.unique_keys(), 2);
        assert_eq!(batch.rows[0].key, "L1");
        assert_eq!(batch.rows[0].fields[HOA_MONTHLY_DUES_AMOUNT], CellValue::Number(100.0));
        assert_eq!(batch.rows[0].fields[HOA_SOURCE], CellValue::text("fixed"));
        assert_eq!(batch.rows[0].fields[HOA_SOURCE_FILE], CellValue::text("vendor.xlsx"));

        assert_eq!(batch.rows[1].key, "2");
        assert_eq!(batch.rows[1].fields[HOA_SOURCE], CellValue::text("ACME"));
        assert_eq!(batch.rows[1].fields[HOA_MONTHLY_DUES_AMOUNT], CellValue::Number(0.0));
    }
}
