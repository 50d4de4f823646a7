// Configuration - JSON config file + CLI overrides → ReportConfig
// Raw serde structs are validated and defaulted into the resolved settings.

use crate::error::{ReportError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_PATH: &str = "data/output.xlsx";
pub const DEFAULT_QUERY_PATH: &str = "sql/hoa_enrich.sql";
pub const DEFAULT_VENDOR_TYPE: &str = "example_vendor";

// ============================================================================
// MATCH KEY
// ============================================================================

/// Field a vendor's rows are joined on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKey {
    LoanId,
    CollateralId,
}

impl MatchKey {
    pub const SUPPORTED: [&'static str; 2] = ["loan_id", "collateral_id"];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKey::LoanId => "loan_id",
            MatchKey::CollateralId => "collateral_id",
        }
    }

    /// Case-insensitive parse of "loan_id" / "collateral_id"
    pub fn parse(raw: &str) -> Option<MatchKey> {
        match raw.trim().to_lowercase().as_str() {
            "loan_id" => Some(MatchKey::LoanId),
            "collateral_id" => Some(MatchKey::CollateralId),
            _ => None,
        }
    }
}

// ============================================================================
// RESOLVED CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlConfig {
    pub connection_string: String,
    pub query_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorConfig {
    pub name: String,
    pub vendor_type: String,
    pub path: PathBuf,
    pub match_key: MatchKey,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportConfig {
    pub tape_path: PathBuf,
    pub template_path: PathBuf,
    pub output_path: PathBuf,
    pub run_sql: bool,
    pub sql: Option<SqlConfig>,
    pub vendors: Vec<VendorConfig>,
    /// Canonical vendor names, highest priority first, covering every vendor
    pub vendor_priority: Vec<String>,
}

/// CLI values that replace config file settings
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub tape_path: Option<PathBuf>,
    pub template_path: Option<PathBuf>,
    pub vendor_paths: Vec<PathBuf>,
    pub vendor_type: Option<String>,
    pub output_path: Option<PathBuf>,
}

// ============================================================================
// RAW (FILE) CONFIG
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawConfig {
    tape_path: Option<String>,
    template_path: Option<String>,
    output_path: Option<String>,
    #[serde(default)]
    run_sql: bool,
    sql: Option<RawSqlConfig>,
    vendors: Option<Vec<RawVendorConfig>>,
    vendor_paths: Option<Vec<String>>,
    vendor_type: Option<String>,
    vendor_priority: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawSqlConfig {
    connection_string: Option<String>,
    query_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVendorConfig {
    name: Option<String>,
    #[serde(rename = "type")]
    vendor_type: Option<String>,
    path: Option<String>,
    match_key: Option<String>,
}

fn require_str(value: Option<&str>, label: &str) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ReportError::config(format!("'{}' must be a non-empty string", label))),
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Load and validate a JSON config file
pub fn load_config(path: &Path) -> Result<ReportConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        ReportError::config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    parse_config(&content).map_err(|e| match e {
        ReportError::Configuration(msg) => {
            ReportError::config(format!("Failed to load config {}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Parse and validate config JSON text
pub fn parse_config(content: &str) -> Result<ReportConfig> {
    let raw: RawConfig = serde_json::from_str(content)
        .map_err(|e| ReportError::config(format!("Invalid config JSON: {}", e)))?;

    let tape_path = PathBuf::from(require_str(raw.tape_path.as_deref(), "tape_path")?);
    let template_path = PathBuf::from(require_str(raw.template_path.as_deref(), "template_path")?);
    let output_path = raw
        .output_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH));

    let vendors = parse_vendors(&raw)?;
    let vendor_priority = resolve_vendor_priority(&vendors, raw.vendor_priority.as_deref())?;

    let sql = if raw.run_sql {
        let sql_raw = raw.sql.as_ref().ok_or_else(|| {
            ReportError::config("'sql' settings are required when 'run_sql' is true")
        })?;
        let query_path = match sql_raw.query_path.as_deref() {
            None => DEFAULT_QUERY_PATH.to_string(),
            Some(_) => require_str(sql_raw.query_path.as_deref(), "sql.query_path")?,
        };
        Some(SqlConfig {
            connection_string: require_str(
                sql_raw.connection_string.as_deref(),
                "sql.connection_string",
            )?,
            query_path: PathBuf::from(query_path),
        })
    } else {
        None
    };

    Ok(ReportConfig {
        tape_path,
        template_path,
        output_path,
        run_sql: raw.run_sql,
        sql,
        vendors,
        vendor_priority,
    })
}

/// Vendor names for N paths of one type: "clayton" or "clayton_1", "clayton_2", ...
fn default_vendor_name(vendor_type: &str, index: usize, total: usize) -> String {
    if total == 1 {
        vendor_type.to_string()
    } else {
        format!("{}_{}", vendor_type, index + 1)
    }
}

fn vendors_from_paths(paths: &[PathBuf], vendor_type: &str) -> Vec<VendorConfig> {
    paths
        .iter()
        .enumerate()
        .map(|(index, path)| VendorConfig {
            name: default_vendor_name(vendor_type, index, paths.len()),
            vendor_type: vendor_type.to_string(),
            path: path.clone(),
            match_key: MatchKey::LoanId,
        })
        .collect()
}

fn parse_vendors(raw: &RawConfig) -> Result<Vec<VendorConfig>> {
    let Some(entries) = &raw.vendors else {
        // Legacy form: vendor_paths + a single vendor_type
        let vendor_type = match raw.vendor_type.as_deref() {
            None => DEFAULT_VENDOR_TYPE.to_string(),
            Some(_) => require_str(raw.vendor_type.as_deref(), "vendor_type")?,
        };
        let paths: Vec<PathBuf> = raw
            .vendor_paths
            .iter()
            .flatten()
            .map(PathBuf::from)
            .collect();
        return Ok(vendors_from_paths(&paths, &vendor_type));
    };

    let mut vendors = Vec::with_capacity(entries.len());
    let mut seen_names: HashSet<String> = HashSet::new();

    for (index, entry) in entries.iter().enumerate() {
        let name = require_str(entry.name.as_deref(), &format!("vendors[{}].name", index))?;
        if !seen_names.insert(name.to_lowercase()) {
            return Err(ReportError::config(format!(
                "Vendor names must be unique (duplicate: '{}')",
                name
            )));
        }

        let vendor_type =
            require_str(entry.vendor_type.as_deref(), &format!("vendors[{}].type", index))?;
        let path = require_str(entry.path.as_deref(), &format!("vendors[{}].path", index))?;

        let match_key = match entry.match_key.as_deref() {
            None => MatchKey::LoanId,
            Some(raw_key) => MatchKey::parse(raw_key).ok_or_else(|| {
                ReportError::config(format!(
                    "'vendors[{}].match_key' must be one of: {}. Got: {}",
                    index,
                    MatchKey::SUPPORTED.join(", "),
                    raw_key.trim()
                ))
            })?,
        };

        vendors.push(VendorConfig {
            name,
            vendor_type,
            path: PathBuf::from(path),
            match_key,
        });
    }

    Ok(vendors)
}

/// Resolve priority names to canonical vendor names; unlisted vendors follow in config order
fn resolve_vendor_priority(
    vendors: &[VendorConfig],
    raw_priority: Option<&[String]>,
) -> Result<Vec<String>> {
    let Some(raw_priority) = raw_priority else {
        return Ok(vendors.iter().map(|v| v.name.clone()).collect());
    };

    let known = || {
        if vendors.is_empty() {
            "<none>".to_string()
        } else {
            vendors.iter().map(|v| v.name.as_str()).collect::<Vec<_>>().join(", ")
        }
    };

    let mut resolved = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for raw_name in raw_priority {
        let normalized = raw_name.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ReportError::config("'vendor_priority' entries must be non-empty strings"));
        }

        let vendor = vendors
            .iter()
            .find(|v| v.name.to_lowercase() == normalized)
            .ok_or_else(|| {
                ReportError::config(format!(
                    "'vendor_priority' contains unknown vendor name '{}'. Known vendors: {}",
                    raw_name,
                    known()
                ))
            })?;

        if !seen.insert(normalized) {
            return Err(ReportError::config(format!(
                "'vendor_priority' contains duplicate vendor '{}'",
                raw_name
            )));
        }
        resolved.push(vendor.name.clone());
    }

    for vendor in vendors {
        if seen.insert(vendor.name.to_lowercase()) {
            resolved.push(vendor.name.clone());
        }
    }

    Ok(resolved)
}

// ============================================================================
// OVERRIDES + VALIDATION
// ============================================================================

impl ReportConfig {
    /// Apply CLI overrides, returning the effective config
    ///
    /// `--vendor-path` replaces the vendor list; `--vendor-type` alone retypes
    /// every configured vendor.
    pub fn with_overrides(&self, overrides: &CliOverrides) -> ReportConfig {
        let mut effective = self.clone();

        if let Some(tape) = &overrides.tape_path {
            effective.tape_path = tape.clone();
        }
        if let Some(template) = &overrides.template_path {
            effective.template_path = template.clone();
        }
        if let Some(out) = &overrides.output_path {
            effective.output_path = out.clone();
        }

        if !overrides.vendor_paths.is_empty() {
            let vendor_type = overrides
                .vendor_type
                .clone()
                .or_else(|| self.vendors.first().map(|v| v.vendor_type.clone()))
                .unwrap_or_else(|| DEFAULT_VENDOR_TYPE.to_string());
            effective.vendors = vendors_from_paths(&overrides.vendor_paths, &vendor_type);
            effective.vendor_priority = effective.vendors.iter().map(|v| v.name.clone()).collect();
        } else if let Some(vendor_type) = &overrides.vendor_type {
            for vendor in &mut effective.vendors {
                vendor.vendor_type = vendor_type.clone();
            }
        }

        effective
    }

    /// Every configured input file must exist
    pub fn validate_paths(&self) -> Result<()> {
        let mut required: Vec<&Path> = vec![&self.tape_path, &self.template_path];
        required.extend(self.vendors.iter().map(|v| v.path.as_path()));
        if self.run_sql {
            if let Some(sql) = &self.sql {
                required.push(&sql.query_path);
            }
        }

        let missing: Vec<String> = required
            .iter()
            .filter(|p| !p.exists())
            .map(|p| p.display().to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ReportError::config(format!(
                "The following configured input path(s) do not exist: {}",
                missing.join(", ")
            )))
        }
    }

    /// Vendors in priority order (highest first)
    pub fn ordered_vendors(&self) -> Vec<&VendorConfig> {
        let mut ordered: Vec<&VendorConfig> = Vec::with_capacity(self.vendors.len());
        let mut seen: HashSet<String> = HashSet::new();

        let priority_names = self.vendor_priority.iter().map(|n| n.trim().to_lowercase());
        let config_names = self.vendors.iter().map(|v| v.name.to_lowercase());

        for key in priority_names.chain(config_names) {
            if key.is_empty() || seen.contains(&key) {
                continue;
            }
            if let Some(vendor) = self.vendors.iter().find(|v| v.name.to_lowercase() == key) {
                seen.insert(key);
                ordered.push(vendor);
            }
        }

        ordered
    }
}
