//! One-row-per-clone flattening of genes for the table view.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{CloneFields, CloneRecord, Gene, GeneRecord};

/// Every lookup is restricted to human genes
pub const ORGANISM: &str = "Homo sapiens";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Complete,
    Partial,
    Pending,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Complete => "Complete",
            Status::Partial => "Partial",
            Status::Pending => "Pending",
        })
    }
}

impl FromStr for Priority {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(AppError::InvalidInput(format!("unknown priority '{other}'"))),
        }
    }
}

impl FromStr for Status {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "complete" => Ok(Status::Complete),
            "partial" => Ok(Status::Partial),
            "pending" => Ok(Status::Pending),
            other => Err(AppError::InvalidInput(format!("unknown status '{other}'"))),
        }
    }
}

/// How clone rows get their priority and status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Classification {
    /// Read `high-priority`/`medium-priority` and `complete`/`partial` tags,
    /// falling back to Low and Pending
    #[default]
    TagDerived,
    /// Medium and Complete for every row
    Fixed,
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tags" => Ok(Classification::TagDerived),
            "fixed" => Ok(Classification::Fixed),
            other => Err(format!("unknown table classification '{other}'")),
        }
    }
}

impl Classification {
    fn classify(&self, fields: &CloneFields) -> (Priority, Status) {
        match self {
            Classification::Fixed => (Priority::Medium, Status::Complete),
            Classification::TagDerived => {
                let priority = if fields.has_tag("high-priority") {
                    Priority::High
                } else if fields.has_tag("medium-priority") {
                    Priority::Medium
                } else {
                    Priority::Low
                };
                let status = if fields.has_tag("complete") {
                    Status::Complete
                } else if fields.has_tag("partial") {
                    Status::Partial
                } else {
                    Status::Pending
                };
                (priority, status)
            }
        }
    }
}

/// A table row: gene display fields plus one clone's attributes.
///
/// Placeholder rows for genes without clones carry empty clone attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRow {
    /// `<gene id>-<clone id>`, or the gene id for a placeholder row
    pub id: String,
    pub gene_id: Uuid,
    pub clone_id: Option<Uuid>,
    pub symbol: String,
    pub name: String,
    pub chromosome: String,
    pub organism: String,
    pub protein_name: String,
    pub priority: Priority,
    pub assigned_to: String,
    pub last_modified: String,
    pub status: Status,
    #[serde(flatten)]
    pub fields: CloneFields,
}

impl DisplayRow {
    fn for_gene(gene: &Gene) -> Self {
        DisplayRow {
            id: gene.id.to_string(),
            gene_id: gene.id,
            clone_id: None,
            symbol: gene.symbol.clone(),
            name: non_empty(gene.name.as_deref()).unwrap_or("Unknown").to_string(),
            chromosome: non_empty(gene.map_location.as_deref()).unwrap_or("N/A").to_string(),
            organism: ORGANISM.to_string(),
            protein_name: non_empty(gene.description.as_deref()).unwrap_or("N/A").to_string(),
            priority: Priority::Medium,
            assigned_to: "Unassigned".to_string(),
            last_modified: gene.updated_at.format("%Y-%m-%d").to_string(),
            status: Status::Complete,
            fields: CloneFields::default(),
        }
    }

    fn for_clone(gene: &Gene, clone: &CloneRecord, classification: Classification) -> Self {
        let (priority, status) = classification.classify(&clone.fields);
        // Carried once, by the row's own `assigned_to`
        let mut fields = clone.fields.clone();
        fields.assigned_to = None;

        DisplayRow {
            id: format!("{}-{}", gene.id, clone.id),
            clone_id: Some(clone.id),
            priority,
            status,
            assigned_to: non_empty(clone.fields.assigned_to.as_deref())
                .unwrap_or("Unassigned")
                .to_string(),
            last_modified: clone.updated_at.format("%Y-%m-%d").to_string(),
            fields,
            ..DisplayRow::for_gene(gene)
        }
    }

    /// Tags sorted and joined with `"; "`
    pub fn tags_joined(&self) -> String {
        self.fields
            .tags
            .as_ref()
            .map(|tags| tags.iter().cloned().collect::<Vec<_>>().join("; "))
            .unwrap_or_default()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Denormalize genes into rows: one per clone, or one placeholder.
pub fn flatten(records: &[GeneRecord], classification: Classification) -> Vec<DisplayRow> {
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        if record.clones.is_empty() {
            rows.push(DisplayRow::for_gene(&record.gene));
        } else {
            rows.extend(
                record
                    .clones
                    .iter()
                    .map(|clone| DisplayRow::for_clone(&record.gene, clone, classification)),
            );
        }
    }
    rows
}

/// Search text plus optional exact priority and status, AND-combined
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableFilter {
    pub search: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
}

impl TableFilter {
    /// Build a filter from request parameters; empty values and `all` mean "any".
    pub fn from_params(
        search: Option<&str>,
        priority: Option<&str>,
        status: Option<&str>,
    ) -> AppResult<Self> {
        fn given(value: Option<&str>) -> Option<&str> {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
        }

        Ok(TableFilter {
            search: search
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            priority: given(priority).map(str::parse).transpose()?,
            status: given(status).map(str::parse).transpose()?,
        })
    }

    pub fn matches(&self, row: &DisplayRow) -> bool {
        let matches_search = match &self.search {
            None => true,
            Some(term) => {
                let term = term.to_lowercase();
                [&row.symbol, &row.name, &row.id, &row.assigned_to]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&term))
            }
        };

        matches_search
            && self.priority.is_none_or(|p| row.priority == p)
            && self.status.is_none_or(|s| row.status == s)
    }

    pub fn apply(&self, rows: Vec<DisplayRow>) -> Vec<DisplayRow> {
        rows.into_iter().filter(|row| self.matches(row)).collect()
    }
}
