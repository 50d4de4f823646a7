// Pipeline - config → tape → enrichment → vendors → merge → report
// Single pass; every stage logs under a span carrying the run ID.

use crate::config::ReportConfig;
use crate::enrichment::{EnrichmentSet, EnrichmentSource, SqliteEnrichment};
use crate::error::{ReportError, Result};
use crate::extractors::{ExtractorRegistry, VendorBatch};
use crate::merge::MergeEngine;
use crate::qa::{InputFingerprint, QaSummary, RunInfo};
use crate::report::{build_report_rows, write_report, TemplateLayout};
use crate::tape::load_tape;
use std::path::PathBuf;
use tracing::{info, info_span};

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub output_path: PathBuf,
    pub report_rows: usize,
    pub qa: QaSummary,
}

fn fingerprints(config: &ReportConfig) -> Result<Vec<InputFingerprint>> {
    let mut inputs = vec![
        InputFingerprint::from_file("tape", &config.tape_path)?,
        InputFingerprint::from_file("template", &config.template_path)?,
    ];
    for vendor in &config.vendors {
        inputs.push(InputFingerprint::from_file(format!("vendor {}", vendor.name), &vendor.path)?);
    }
    if config.run_sql {
        if let Some(sql) = &config.sql {
            inputs.push(InputFingerprint::from_file("query", &sql.query_path)?);
        }
    }
    Ok(inputs)
}

/// Run with the built-in extractors and the configured SQLite source
pub fn run(config: &ReportConfig) -> Result<RunOutcome> {
    run_with(config, &ExtractorRegistry::with_defaults(), None)
}

/// Run with an explicit registry and, optionally, a substitute enrichment source
///
/// Input paths are expected to be validated already (`ReportConfig::validate_paths`).
pub fn run_with(
    config: &ReportConfig,
    registry: &ExtractorRegistry,
    enrichment_source: Option<&dyn EnrichmentSource>,
) -> Result<RunOutcome> {
    let run = RunInfo::new();
    let span = info_span!("hoa_report", run_id = %run.run_id);
    let _guard = span.enter();

    let vendors = config.ordered_vendors();
    for vendor in &vendors {
        registry.validate(vendor)?;
    }

    let tape = load_tape(&config.tape_path)?;
    let layout = TemplateLayout::load(&config.template_path)?;

    let enrichment: Option<EnrichmentSet> = if config.run_sql {
        let loan_ids = tape.unique_loan_ids();
        let set = match enrichment_source {
            Some(source) => source.fetch(&loan_ids)?,
            None => {
                let sql = config.sql.as_ref().ok_or_else(|| {
                    ReportError::config("'sql' settings are required when 'run_sql' is true")
                })?;
                SqliteEnrichment::from_config(sql)?.fetch(&loan_ids)?
            }
        };
        Some(set)
    } else {
        info!("SQL enrichment disabled");
        None
    };

    let mut batches: Vec<VendorBatch> = Vec::with_capacity(vendors.len());
    for vendor in &vendors {
        info!(vendor = %vendor.name, vendor_type = %vendor.vendor_type, path = %vendor.path.display(), "extracting vendor file");
        batches.push(registry.extract(vendor)?);
    }

    let engine = match &enrichment {
        Some(set) => MergeEngine::new().with_enrichment(set),
        None => MergeEngine::new(),
    };
    let merged = engine.merge(&tape.rows, &batches)?;

    let table = build_report_rows(&layout, &merged.rows);
    let qa = QaSummary::compute(
        run,
        &tape,
        &merged.vendor_stats,
        table.missing_hoa_values(),
        fingerprints(config)?,
    );

    let output_path = write_report(&config.output_path, &table, &qa)?;

    Ok(RunOutcome {
        output_path,
        report_rows: table.rows.len(),
        qa,
    })
}
