//! Key-matched merging of source sheets into a target sheet.
//!
//! Two strategies exist and are never substituted for one another:
//! [`MergeStrategy::Patch`] updates matched rows and appends unmatched source
//! rows, [`MergeStrategy::LeftJoin`] keeps the target rows and pairs each with
//! its matching source rows under prefixed column names.

mod join;
mod patch;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::datahub::sheets::error::MergeError;
use crate::datahub::sheets::io::excel_write;
use crate::datahub::sheets::model::{Row, Sheet, Workbook};

/// Merge request as sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub target_table_name: String,
    #[serde(default)]
    pub source_table_names: Vec<String>,
    /// Composite key, compared as text.
    #[serde(default)]
    pub match_columns: Vec<String>,
    #[serde(default)]
    pub merge_columns: Vec<MergeSpec>,
    #[serde(default)]
    pub create_new_table: bool,
    #[serde(default)]
    pub new_table_name: Option<String>,
    #[serde(default)]
    pub strategy: MergeStrategy,
}

/// Columns to pull from one source table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSpec {
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
}

impl MergeSpec {
    pub fn new<I, S>(table_name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table_name: Some(table_name.into()),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Table name, if present and not blank.
    pub fn table(&self) -> Option<&str> {
        self.table_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeStrategy {
    #[default]
    Patch,
    LeftJoin,
}

/// Per-source statistics of a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub table_name: String,
    pub matched: usize,
    pub appended: usize,
}

/// Result of a successful merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub success: bool,
    pub message: String,
    /// The updated or newly created sheet.
    pub sheet_name: String,
    pub created_new_table: bool,
    /// Row count of the resulting sheet minus row count of the target.
    pub row_delta: i64,
    /// Column names of a newly created sheet, after de-duplication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    /// Columns appended to the target by an in-place merge.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub added_columns: Vec<String>,
    pub sources: Vec<SourceSummary>,
}

/// Merges the request's sources into `workbook`.
///
/// The workbook is only modified once the merged sheet has been fully built;
/// on error it is left exactly as it was.
#[instrument(
    level = "info",
    skip_all,
    fields(target = %request.target_table_name, strategy = ?request.strategy)
)]
pub fn merge(workbook: &mut Workbook, request: &MergeRequest) -> Result<MergeOutcome, MergeError> {
    let new_table_name = if request.create_new_table {
        Some(check_new_table_name(workbook, request.new_table_name.as_deref())?)
    } else {
        None
    };

    let target = lookup(workbook, &request.target_table_name)?;
    let original_rows = target.rows().len();

    let built = match (request.strategy, &new_table_name) {
        (MergeStrategy::Patch, None) => patch::merge_in_place(workbook, target, request)?,
        (MergeStrategy::Patch, Some(name)) => patch::merge_new_table(workbook, target, request, name)?,
        (MergeStrategy::LeftJoin, name) => join::left_join(workbook, target, request, name.as_deref())?,
    };

    let row_delta = built.sheet.rows().len() as i64 - original_rows as i64;
    let outcome = MergeOutcome {
        success: true,
        message: describe(request, &built, row_delta),
        sheet_name: built.sheet.name.clone(),
        created_new_table: new_table_name.is_some(),
        row_delta,
        columns: new_table_name
            .as_ref()
            .map(|_| built.sheet.column_names().map(str::to_string).collect()),
        added_columns: built.added_columns,
        sources: built.sources,
    };

    match new_table_name {
        Some(_) => workbook.push(built.sheet),
        None => {
            let slot = workbook
                .sheet_mut(&request.target_table_name)
                .ok_or_else(|| schema_mismatch(&request.target_table_name, None))?;
            *slot = built.sheet;
        }
    }

    info!(
        sheet = %outcome.sheet_name,
        row_delta = outcome.row_delta,
        "merge applied"
    );
    Ok(outcome)
}

/// A merged sheet ready to be placed into the workbook.
struct BuiltSheet {
    sheet: Sheet,
    added_columns: Vec<String>,
    sources: Vec<SourceSummary>,
}

fn check_new_table_name(workbook: &Workbook, name: Option<&str>) -> Result<String, MergeError> {
    let name = name.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(MergeError::EmptyNewTableName);
    }
    // A name the file format would treat as taken counts as a duplicate.
    let key = excel_write::storage_key(name).ok();
    let taken = workbook.sheet_names().any(|existing| match &key {
        Some(key) => excel_write::storage_key(existing).ok().as_ref() == Some(key),
        None => existing == name,
    });
    if taken {
        return Err(MergeError::DuplicateTableName(name.to_string()));
    }
    Ok(name.to_string())
}

fn describe(request: &MergeRequest, built: &BuiltSheet, row_delta: i64) -> String {
    let matched: usize = built.sources.iter().map(|source| source.matched).sum();
    let appended: usize = built.sources.iter().map(|source| source.appended).sum();
    if request.create_new_table {
        format!(
            "created table '{}' from '{}' and {} source table(s): {} column(s), {} row(s)",
            built.sheet.name,
            request.target_table_name,
            built.sources.len(),
            built.sheet.width(),
            built.sheet.rows().len()
        )
    } else {
        format!(
            "merged {} source table(s) into '{}': {matched} row(s) matched, {appended} appended, row count {row_delta:+}",
            built.sources.len(),
            request.target_table_name
        )
    }
}

/// All merge specs naming `table`, in request order.
fn spec_columns<'a>(request: &'a MergeRequest, table: &str) -> Vec<&'a str> {
    request
        .merge_columns
        .iter()
        .filter(|spec| spec.table() == Some(table))
        .flat_map(|spec| spec.columns.iter().map(String::as_str))
        .collect()
}

fn lookup<'a>(workbook: &'a Workbook, name: &str) -> Result<&'a Sheet, MergeError> {
    workbook.sheet(name).ok_or_else(|| schema_mismatch(name, None))
}

fn position(sheet: &Sheet, column: &str) -> Result<usize, MergeError> {
    sheet
        .position_of(column)
        .ok_or_else(|| schema_mismatch(&sheet.name, Some(column)))
}

fn schema_mismatch(table: &str, column: Option<&str>) -> MergeError {
    MergeError::SchemaMismatch {
        table: table.to_string(),
        column: column.map(str::to_string),
    }
}

/// Reads the cells at `positions`, failing with the row's location if the
/// row is narrower than expected.
fn key_of(
    row: &Row,
    positions: &[usize],
    table: &str,
    row_idx: usize,
) -> Result<Vec<String>, MergeError> {
    positions
        .iter()
        .map(|&position| cell_of(row, position, table, row_idx).map(str::to_string))
        .collect()
}

fn cell_of<'r>(
    row: &'r Row,
    position: usize,
    table: &str,
    row_idx: usize,
) -> Result<&'r str, MergeError> {
    row.cell(position).ok_or_else(|| MergeError::InternalFailure {
        table: table.to_string(),
        row: row_idx,
        reason: format!("no cell at column position {position}"),
    })
}

fn positions(sheet: &Sheet, columns: &[String]) -> Result<Vec<usize>, MergeError> {
    columns.iter().map(|column| position(sheet, column)).collect()
}

fn put(
    row: &mut Row,
    position: usize,
    value: &str,
    table: &str,
    row_idx: usize,
) -> Result<(), MergeError> {
    if row.set(position, value) {
        Ok(())
    } else {
        Err(MergeError::InternalFailure {
            table: table.to_string(),
            row: row_idx,
            reason: format!("column position {position} outside the merged row"),
        })
    }
}
