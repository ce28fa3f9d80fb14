//! Read-only checks run against a workbook before a merge mutates anything.
//!
//! Each check walks every referenced table and column and reports all
//! problems at once.

use crate::datahub::sheets::error::{MissingColumns, ValidationError};
use crate::datahub::sheets::merge::{MergeRequest, MergeSpec};
use crate::datahub::sheets::model::Workbook;

type Outcome = std::result::Result<(), ValidationError>;

/// Checks that the target and every source exist and carry every match column.
pub fn validate_match_columns(
    workbook: &Workbook,
    target_name: &str,
    source_names: &[String],
    match_columns: &[String],
) -> Outcome {
    if match_columns.is_empty() {
        return Err(ValidationError::EmptyMatchColumns);
    }
    if source_names.is_empty() {
        return Err(ValidationError::EmptySourceList);
    }

    let mut tables: Vec<&str> = Vec::with_capacity(source_names.len() + 1);
    for name in std::iter::once(target_name).chain(source_names.iter().map(String::as_str)) {
        if !tables.contains(&name) {
            tables.push(name);
        }
    }

    let mut missing_tables = Vec::new();
    let mut missing_columns = Vec::new();
    for table_name in &tables {
        let Some(sheet) = workbook.sheet(table_name) else {
            missing_tables.push(table_name.to_string());
            continue;
        };
        let absent: Vec<String> = match_columns
            .iter()
            .filter(|column| !sheet.has_column(column))
            .cloned()
            .collect();
        if !absent.is_empty() {
            missing_columns.push(MissingColumns {
                table_name: table_name.to_string(),
                columns: absent,
            });
        }
    }

    finish(workbook, &tables, missing_tables, missing_columns)
}

/// Checks that every merge spec names an existing table and existing columns.
pub fn validate_merge_columns(workbook: &Workbook, merge_specs: &[MergeSpec]) -> Outcome {
    if merge_specs.is_empty() {
        return Err(ValidationError::EmptyMergeSpec);
    }
    if let Some(index) = merge_specs.iter().position(|spec| spec.table().is_none()) {
        return Err(ValidationError::MissingTableName(index + 1));
    }

    let mut tables: Vec<&str> = Vec::new();
    let mut missing_tables: Vec<String> = Vec::new();
    let mut missing_columns: Vec<MissingColumns> = Vec::new();

    for spec in merge_specs {
        let Some(table_name) = spec.table() else {
            continue;
        };
        if !tables.contains(&table_name) {
            tables.push(table_name);
        }
        let Some(sheet) = workbook.sheet(table_name) else {
            if !missing_tables.iter().any(|name| name == table_name) {
                missing_tables.push(table_name.to_string());
            }
            continue;
        };

        let absent: Vec<&String> = spec
            .columns
            .iter()
            .filter(|column| !sheet.has_column(column))
            .collect();
        if absent.is_empty() {
            continue;
        }

        // Specs naming the same table report into one entry.
        match missing_columns
            .iter_mut()
            .find(|entry| entry.table_name == table_name)
        {
            Some(entry) => {
                for column in absent {
                    if !entry.columns.contains(column) {
                        entry.columns.push(column.clone());
                    }
                }
            }
            None => missing_columns.push(MissingColumns {
                table_name: table_name.to_string(),
                columns: absent.into_iter().cloned().collect(),
            }),
        }
    }

    finish(workbook, &tables, missing_tables, missing_columns)
}

/// Runs the match-column check and then the merge-column check.
pub fn validate_request(workbook: &Workbook, request: &MergeRequest) -> Outcome {
    validate_match_columns(
        workbook,
        &request.target_table_name,
        &request.source_table_names,
        &request.match_columns,
    )?;
    validate_merge_columns(workbook, &request.merge_columns)
}

fn finish(
    workbook: &Workbook,
    tables: &[&str],
    missing_tables: Vec<String>,
    missing_columns: Vec<MissingColumns>,
) -> Outcome {
    let duplicates: Vec<String> = tables
        .iter()
        .filter(|name| workbook.count_named(name) > 1)
        .map(|name| name.to_string())
        .collect();

    let mut issues = Vec::new();
    if !missing_tables.is_empty() {
        issues.push(ValidationError::MissingTable(missing_tables));
    }
    if !duplicates.is_empty() {
        issues.push(ValidationError::DuplicateTable(duplicates));
    }
    if !missing_columns.is_empty() {
        issues.push(ValidationError::MissingColumns(missing_columns));
    }

    match ValidationError::collect(issues) {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
