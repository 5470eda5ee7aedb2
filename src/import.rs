//! CSV import pipeline: parse, validate the whole batch, then persist row by row.
//!
//! Validation is all-or-nothing: one bad row rejects the batch and nothing is
//! written. Persisting is not transactional; a row that fails after
//! validation (for instance a clone whose gene does not exist) is counted and
//! the batch carries on. Dropping the future returned by [`bulk_persist`]
//! aborts the import and keeps whatever rows were already written.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::AuthProvider;
use crate::error::{AppError, AppResult};
use crate::model::{CloneFields, NewGene};
use crate::store::GeneStore;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Header row and example row offered as the genes template
pub const GENES_TEMPLATE: &str = "symbol,name,entrezgene,chromosome,map_location,type_of_gene,summary\n\
BRCA1,BRCA1 DNA repair associated,672,17q21.31,17q21.31,protein-coding,BRCA1 encodes a 190 kD nuclear phosphoprotein...\n";

/// Header row and example row offered as the clones template
pub const CLONES_TEMPLATE: &str = "gene_symbol,clone_id,vector,bacterial_strain,antibiotic_resistance,concentration,location,notes,priority,status\n\
BRCA1,BRCA1-001,pET28a,DH5α,Kanamycin,100,Freezer A1,Test clone,high,active\n";

/// What an uploaded file contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    Genes,
    Clones,
}

impl ImportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::Genes => "genes",
            ImportKind::Clones => "clones",
        }
    }

    pub fn template(&self) -> &'static str {
        match self {
            ImportKind::Genes => GENES_TEMPLATE,
            ImportKind::Clones => CLONES_TEMPLATE,
        }
    }

    pub fn template_filename(&self) -> String {
        format!("{}_template.csv", self.as_str())
    }
}

impl FromStr for ImportKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "genes" | "gene" => Ok(ImportKind::Genes),
            "clones" | "clone" => Ok(ImportKind::Clones),
            other => Err(AppError::InvalidInput(format!(
                "unknown import kind '{other}', expected genes or clones"
            ))),
        }
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One data row keyed by normalized header name
pub type CsvRow = BTreeMap<String, String>;

/// Result of parsing: the usable rows plus any records the reader rejected
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<CsvRow>,
    pub errors: Vec<String>,
}

/// Lowercase a header and collapse internal whitespace to one underscore.
pub fn normalize_header(header: &str) -> String {
    WHITESPACE
        .replace_all(header.trim(), "_")
        .to_lowercase()
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|cell| cell.trim().is_empty())
}

/// Parse delimited text with a mandatory header row.
///
/// Rows with fewer cells than the header are accepted and the missing cells
/// are simply absent. Rows where every cell is empty are dropped.
pub fn parse_csv<R: Read>(reader: R) -> AppResult<ParsedCsv> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
    if headers.iter().all(String::is_empty) {
        return Err(AppError::InvalidInput(
            "CSV file must start with a header row".to_string(),
        ));
    }

    let mut parsed = ParsedCsv {
        headers,
        ..Default::default()
    };

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or_default();
                warn!("Skipping unreadable CSV record at line {line}: {e}");
                parsed.errors.push(format!("Line {line}: {e}"));
                continue;
            }
        };

        if is_blank(&record) {
            continue;
        }

        let row: CsvRow = parsed
            .headers
            .iter()
            .zip(record.iter())
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect();
        parsed.rows.push(row);
    }

    debug!(
        "Parsed {} CSV rows ({} unreadable)",
        parsed.rows.len(),
        parsed.errors.len()
    );
    Ok(parsed)
}

/// A validated gene row with its 1-based row number
#[derive(Debug, Clone, PartialEq)]
pub struct GeneImport {
    pub row: usize,
    pub gene: NewGene,
}

/// A validated clone row with its 1-based row number
#[derive(Debug, Clone, PartialEq)]
pub struct CloneImport {
    pub row: usize,
    pub gene_symbol: String,
    pub fields: CloneFields,
}

/// Rows that passed validation, ready to persist
#[derive(Debug, Clone, PartialEq)]
pub enum ImportBatch {
    Genes(Vec<GeneImport>),
    Clones(Vec<CloneImport>),
}

impl ImportBatch {
    pub fn kind(&self) -> ImportKind {
        match self {
            ImportBatch::Genes(_) => ImportKind::Genes,
            ImportBatch::Clones(_) => ImportKind::Clones,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ImportBatch::Genes(rows) => rows.len(),
            ImportBatch::Clones(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Non-empty cell value, untouched
fn cell(row: &CsvRow, column: &str) -> Option<String> {
    row.get(column)
        .filter(|value| !value.trim().is_empty())
        .cloned()
}

fn gene_row(row: &CsvRow, symbol: &str) -> NewGene {
    NewGene {
        symbol: symbol.to_string(),
        name: cell(row, "name"),
        entrez_id: cell(row, "entrezgene").or_else(|| cell(row, "entrez_id")),
        map_location: cell(row, "map_location").or_else(|| cell(row, "chromosome")),
        type_of_gene: cell(row, "type_of_gene"),
        summary: cell(row, "summary"),
        ..Default::default()
    }
}

/// `high` becomes `high-priority`; values already carrying the suffix are kept.
fn priority_tag(value: &str) -> String {
    let value = value.trim().to_lowercase();
    if value.ends_with("-priority") {
        value
    } else {
        format!("{value}-priority")
    }
}

fn clone_row(row: &CsvRow, clone_id: &str, concentration: Option<f64>) -> CloneFields {
    let mut fields = CloneFields {
        clone: Some(clone_id.to_string()),
        vector: cell(row, "vector"),
        bacterial_strain: cell(row, "bacterial_strain"),
        antibiotic_resistance: cell(row, "antibiotic_resistance"),
        concentration,
        location: cell(row, "location"),
        notes: cell(row, "notes"),
        ..Default::default()
    };

    if let Some(priority) = cell(row, "priority") {
        fields.add_tag(priority_tag(&priority));
    }
    if let Some(status) = cell(row, "status") {
        fields.add_tag(status.trim().to_lowercase());
    }
    fields
}

/// `Ok(None)` for an absent or empty cell, `Err` when it is not a finite number.
fn parse_concentration(row: &CsvRow) -> Result<Option<f64>, ()> {
    match cell(row, "concentration") {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Some(value)),
            _ => Err(()),
        },
    }
}

/// Check every row and either accept the whole batch or reject it.
///
/// # Returns
/// * `Ok(ImportBatch)` - Every row is valid
/// * `Err(AppError::Validation)` - One message per bad row, in row order
pub fn validate(rows: &[CsvRow], kind: ImportKind) -> AppResult<ImportBatch> {
    let mut errors = Vec::new();

    let batch = match kind {
        ImportKind::Genes => {
            let mut genes = Vec::with_capacity(rows.len());
            for (index, row) in rows.iter().enumerate() {
                let number = index + 1;
                match cell(row, "symbol") {
                    Some(symbol) => genes.push(GeneImport {
                        row: number,
                        gene: gene_row(row, symbol.trim()),
                    }),
                    None => errors.push(format!("Row {number}: Gene symbol is required")),
                }
            }
            ImportBatch::Genes(genes)
        }
        ImportKind::Clones => {
            let mut clones = Vec::with_capacity(rows.len());
            for (index, row) in rows.iter().enumerate() {
                let number = index + 1;
                let (Some(gene_symbol), Some(clone_id)) =
                    (cell(row, "gene_symbol"), cell(row, "clone_id"))
                else {
                    errors.push(format!("Row {number}: Gene symbol and clone ID are required"));
                    continue;
                };

                let Ok(concentration) = parse_concentration(row) else {
                    errors.push(format!("Row {number}: Invalid concentration value"));
                    continue;
                };

                clones.push(CloneImport {
                    row: number,
                    gene_symbol: gene_symbol.trim().to_string(),
                    fields: clone_row(row, clone_id.trim(), concentration),
                });
            }
            ImportBatch::Clones(clones)
        }
    };

    if errors.is_empty() {
        Ok(batch)
    } else {
        warn!("Rejected {kind} import: {} invalid rows", errors.len());
        Err(AppError::Validation(errors))
    }
}

/// Outcome of a bulk persist
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub kind: Option<ImportKind>,
    pub success_count: usize,
    pub fail_count: usize,
    /// Row-indexed messages for the rows that failed
    pub failures: Vec<String>,
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        100
    } else {
        (done * 100 / total) as u8
    }
}

/// Write a validated batch one row at a time.
///
/// `on_progress` receives the percentage of rows processed after each row;
/// the values never decrease and the last one is 100. Clone imports need a
/// signed-in user and fail before writing anything otherwise.
pub async fn bulk_persist<F>(
    batch: &ImportBatch,
    auth: &dyn AuthProvider,
    store: &dyn GeneStore,
    mut on_progress: F,
) -> AppResult<ImportSummary>
where
    F: FnMut(u8) + Send,
{
    let owner = match batch {
        ImportBatch::Clones(_) => Some(
            auth.current_user_id()
                .ok_or(AppError::AuthenticationRequired)?,
        ),
        ImportBatch::Genes(_) => None,
    };

    let total = batch.len();
    let mut summary = ImportSummary {
        kind: Some(batch.kind()),
        ..Default::default()
    };
    if total == 0 {
        on_progress(100);
        return Ok(summary);
    }

    info!("Importing {total} {}", batch.kind());
    let mut record = |row: usize, outcome: AppResult<()>, done: usize| {
        match outcome {
            Ok(()) => summary.success_count += 1,
            Err(e) => {
                let failure = AppError::Persist {
                    row,
                    message: e.to_string(),
                };
                warn!("{failure}");
                summary.fail_count += 1;
                summary.failures.push(failure.to_string());
            }
        }
        let progress = percent(done, total);
        debug!("Import progress {progress}%");
        progress
    };

    match batch {
        ImportBatch::Genes(rows) => {
            for (index, item) in rows.iter().enumerate() {
                let outcome = store.upsert_gene(item.gene.clone()).await.map(|_| ());
                on_progress(record(item.row, outcome, index + 1));
            }
        }
        ImportBatch::Clones(rows) => {
            // `owner` is always set for clone batches
            let Some(owner) = owner else {
                return Err(AppError::AuthenticationRequired);
            };
            for (index, item) in rows.iter().enumerate() {
                let outcome = persist_clone(store, owner, item).await;
                on_progress(record(item.row, outcome, index + 1));
            }
        }
    }

    info!(
        "Import finished: {} succeeded, {} failed",
        summary.success_count, summary.fail_count
    );
    Ok(summary)
}

async fn persist_clone(
    store: &dyn GeneStore,
    owner: uuid::Uuid,
    item: &CloneImport,
) -> AppResult<()> {
    let gene = store
        .find_gene_by_symbol(&item.gene_symbol)
        .await?
        .ok_or_else(|| AppError::RecordNotFound(format!("Gene {}", item.gene_symbol)))?;
    store.insert_clone(owner, gene.id, item.fields.clone()).await?;
    Ok(())
}

/// Parse, validate and persist an uploaded file in one call.
///
/// Unreadable records reject the batch just like invalid rows.
pub async fn import_csv<R, F>(
    reader: R,
    kind: ImportKind,
    auth: &dyn AuthProvider,
    store: &dyn GeneStore,
    on_progress: F,
) -> AppResult<ImportSummary>
where
    R: Read,
    F: FnMut(u8) + Send,
{
    let parsed = parse_csv(reader)?;
    if !parsed.errors.is_empty() {
        return Err(AppError::Validation(parsed.errors));
    }
    let batch = validate(&parsed.rows, kind)?;
    bulk_persist(&batch, auth, store, on_progress).await
}
