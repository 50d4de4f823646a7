// HOA Report Generator - Core Library
// Exposes the pipeline stages for the CLI and tests

pub mod error;
pub mod workbook;      // Cell/sheet model, spreadsheet + CSV reading
pub mod loan_id;       // Loan ID normalization
pub mod config;        // JSON config + CLI overrides
pub mod extractors;    // Vendor extractor registry
pub mod tape;          // Loan tape loader
pub mod enrichment;    // SQL enrichment (SQLite)
pub mod merge;         // Blank-only merge engine
pub mod qa;            // QA metrics + input fingerprints
pub mod report;        // Template projection + output workbook
pub mod pipeline;      // End-to-end run

// Re-export commonly used types
pub use error::{ReportError, Result};
pub use workbook::{
    CellValue, Record, Sheet, SheetSelector,
    read_sheet, sheet_names, normalize_header, parse_money,
};
pub use loan_id::{normalize_loan_id, normalize_loan_id_str, find_duplicate_ids};
pub use config::{
    CliOverrides, MatchKey, ReportConfig, SqlConfig, VendorConfig,
    load_config, parse_config,
};
pub use extractors::{
    ExtractorRegistry, VendorBatch, VendorExtractor, VendorRecord, VendorRow,
    ClaytonExtractor, ConsolidatedAnalyticsExtractor, DdHoaExtractor, ExampleVendorExtractor,
};
pub use tape::{LoanRow, Tape, TapeQa, load_tape};
pub use enrichment::{EnrichmentSet, EnrichmentSource, SqliteEnrichment, parse_connection_string};
pub use merge::{MergeEngine, MergeOutput, MergedRow, VendorStats};
pub use qa::{InputFingerprint, QaSummary, RunInfo};
pub use report::{ReportTable, TemplateLayout, build_report_rows, write_report};
pub use pipeline::{RunOutcome, run, run_with};
