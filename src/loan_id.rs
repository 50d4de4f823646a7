// Loan ID normalization - one canonical form for every join
// " L-1001.0 " (tape), "L1001" (vendor), 1001.0 (numeric cell) must all compare equal.

use crate::workbook::CellValue;
use std::collections::BTreeMap;

/// Normalize a loan or collateral identifier
///
/// Trim, drop a trailing ".0", strip every non-alphanumeric character,
/// uppercase. Returns None when nothing is left.
pub fn normalize_loan_id(value: &CellValue) -> Option<String> {
    if value.is_blank() {
        return None;
    }
    normalize_loan_id_str(&value.to_string())
}

/// String form of [`normalize_loan_id`]
pub fn normalize_loan_id_str(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix(".0").unwrap_or(trimmed);

    let normalized: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Normalized IDs that occur more than once, with their counts (sorted by ID)
pub fn find_duplicate_ids<'a, I>(ids: I) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for id in ids {
        if let Some(normalized) = normalize_loan_id_str(id) {
            *counts.entry(normalized).or_insert(0) += 1;
        }
    }

    counts.into_iter().filter(|(_, count)| *count > 1).collect()
}

/// "AB22 (2 rows), L1 (3 rows)"
pub fn duplicate_summary(duplicates: &[(String, usize)]) -> String {
    duplicates
        .iter()
        .map(|(id, count)| format!("{} ({} rows)", id, count))
        .collect::<Vec<_>>()
        .join(", ")
}
