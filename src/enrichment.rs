// SQL Enrichment - one read-only query keyed by the tape's loan IDs
// The ID set is bound as a table-valued parameter: `IN rarray(:tape_loan_ids)`.

use crate::config::SqlConfig;
use crate::error::{ReportError, Result};
use crate::loan_id::{duplicate_summary, find_duplicate_ids, normalize_loan_id};
use crate::workbook::{normalize_header, CellValue, Record};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{named_params, Connection, OpenFlags};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info};

pub const LOAN_IDS_PARAM: &str = ":tape_loan_ids";
pub const LOAN_ID_COLUMN: &str = "loan_id";

// ============================================================================
// ENRICHMENT SET
// ============================================================================

/// Enrichment rows keyed by normalized loan ID
#[derive(Debug, Clone, Default)]
pub struct EnrichmentSet {
    /// Normalized result-set column names, in query order
    pub columns: Vec<String>,
    rows: HashMap<String, Record>,
}

impl EnrichmentSet {
    /// Validate a result set: `loan_id` column present, every ID non-blank and unique
    pub fn from_rows(columns: Vec<String>, raw_rows: Vec<Record>) -> Result<Self> {
        if !columns.iter().any(|c| c == LOAN_ID_COLUMN) {
            return Err(ReportError::enrichment(format!(
                "SQL enrichment result must contain a '{}' column. Found: {}",
                LOAN_ID_COLUMN,
                columns.join(", ")
            )));
        }

        let mut normalized_rows = Vec::with_capacity(raw_rows.len());
        let mut blank = 0usize;
        for mut record in raw_rows {
            let raw_id = record.get(LOAN_ID_COLUMN).cloned().unwrap_or_default();
            match normalize_loan_id(&raw_id) {
                Some(loan_id) => {
                    record.insert(LOAN_ID_COLUMN.to_string(), CellValue::text(loan_id.clone()));
                    normalized_rows.push((loan_id, record));
                }
                None => blank += 1,
            }
        }

        if blank > 0 {
            return Err(ReportError::enrichment(format!(
                "SQL enrichment result has {} blank/unparseable '{}' value(s)",
                blank, LOAN_ID_COLUMN
            )));
        }

        let duplicates = find_duplicate_ids(normalized_rows.iter().map(|(id, _)| id.as_str()));
        if !duplicates.is_empty() {
            return Err(ReportError::enrichment(format!(
                "SQL enrichment result must have one row per loan_id. Duplicates: {}",
                duplicate_summary(&duplicates)
            )));
        }

        Ok(EnrichmentSet {
            columns,
            rows: normalized_rows.into_iter().collect(),
        })
    }

    pub fn get(&self, loan_id: &str) -> Option<&Record> {
        self.rows.get(loan_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// SOURCE TRAIT
// ============================================================================

/// Anything that can return enrichment rows for a set of loan IDs
pub trait EnrichmentSource {
    fn fetch(&self, loan_ids: &[String]) -> Result<EnrichmentSet>;
}

/// Parse `sqlite://path`, `sqlite:path`, or a bare path into a database path
pub fn parse_connection_string(raw: &str) -> Result<PathBuf> {
    let trimmed = raw.trim();
    let path = if let Some(rest) = trimmed.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("sqlite:") {
        rest
    } else if let Some((scheme, _)) = trimmed.split_once("://") {
        return Err(ReportError::config(format!(
            "Unsupported SQL connection string scheme '{}'. Expected sqlite://<path> or a file path",
            scheme
        )));
    } else {
        trimmed
    };

    if path.is_empty() {
        return Err(ReportError::config("sql.connection_string must name a database file"));
    }
    Ok(PathBuf::from(path))
}

/// Read and check the query text before any connection is opened
pub fn load_query(query_path: &Path) -> Result<String> {
    let query = fs::read_to_string(query_path).map_err(|e| {
        ReportError::enrichment(format!(
            "Failed to read SQL enrichment query {}: {}",
            query_path.display(),
            e
        ))
    })?;

    if query.trim().is_empty() {
        return Err(ReportError::enrichment(format!(
            "SQL enrichment query file is empty: {}",
            query_path.display()
        )));
    }
    if !query.contains(LOAN_IDS_PARAM) {
        return Err(ReportError::enrichment(format!(
            "SQL enrichment query {} must reference the {} parameter",
            query_path.display(),
            LOAN_IDS_PARAM
        )));
    }

    Ok(query)
}

// ============================================================================
// SQLITE
// ============================================================================

/// Read-only SQLite enrichment client
#[derive(Debug, Clone)]
pub struct SqliteEnrichment {
    db_path: PathBuf,
    query: String,
}

impl SqliteEnrichment {
    pub fn new(db_path: impl Into<PathBuf>, query: impl Into<String>) -> Self {
        SqliteEnrichment {
            db_path: db_path.into(),
            query: query.into(),
        }
    }

    pub fn from_config(sql: &SqlConfig) -> Result<Self> {
        let db_path = parse_connection_string(&sql.connection_string)?;
        let query = load_query(&sql.query_path)?;
        Ok(SqliteEnrichment::new(db_path, query))
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            ReportError::enrichment(format!(
                "Failed to open database {}: {}",
                self.db_path.display(),
                e
            ))
        })?;
        rusqlite::vtab::array::load_module(&conn)?;
        Ok(conn)
    }
}

fn cell_from_sql(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => CellValue::Empty,
        ValueRef::Integer(i) => CellValue::Number(i as f64),
        ValueRef::Real(f) => CellValue::Number(f),
        ValueRef::Text(bytes) => CellValue::from_raw(&String::from_utf8_lossy(bytes)),
    }
}

impl EnrichmentSource for SqliteEnrichment {
    fn fetch(&self, loan_ids: &[String]) -> Result<EnrichmentSet> {
        if loan_ids.is_empty() {
            return Err(ReportError::enrichment(
                "SQL enrichment requires at least one tape loan ID",
            ));
        }
        if !self.query.contains(LOAN_IDS_PARAM) {
            return Err(ReportError::enrichment(format!(
                "SQL enrichment query must reference the {} parameter",
                LOAN_IDS_PARAM
            )));
        }

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&self.query)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(normalize_header)
            .collect();

        let ids: Rc<Vec<Value>> = Rc::new(loan_ids.iter().cloned().map(Value::from).collect());
        debug!(ids = loan_ids.len(), db = %self.db_path.display(), "running enrichment query");

        let mut rows = stmt.query(named_params! { ":tape_loan_ids": ids })?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (index, column) in columns.iter().enumerate() {
                if column.is_empty() || record.contains_key(column) {
                    continue;
                }
                record.insert(column.clone(), cell_from_sql(row.get_ref(index)?));
            }
            records.push(record);
        }

        let set = EnrichmentSet::from_rows(columns, records)?;
        info!(requested = loan_ids.len(), matched = set.len(), "SQL enrichment complete");
        Ok(set)
    }
}
