use std::collections::HashMap;

use tracing::{debug, warn};

use super::{
    BuiltSheet, MergeRequest, SourceSummary, cell_of, key_of, lookup, position, positions, put,
    spec_columns,
};
use crate::datahub::sheets::error::MergeError;
use crate::datahub::sheets::model::{Row, Sheet, Workbook, unique_name};

/// Where a merged row came from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Provenance {
    Target,
    Source(String),
}

struct MergedRow {
    row: Row,
    provenance: Provenance,
}

/// A source sheet with its key positions and `(source, merged)` column pairs.
struct SourcePlan<'a> {
    sheet: &'a Sheet,
    key_positions: Vec<usize>,
    assignments: Vec<(usize, usize)>,
}

/// The cumulative merge result.
///
/// `index` maps a match key to the first row carrying it, which is the row a
/// front-to-back scan of `rows` would find. Keys never change once a row is
/// indexed: a merge column that is also a match column is only ever written
/// with the value it was matched on.
struct MergedRows {
    rows: Vec<MergedRow>,
    index: HashMap<Vec<String>, usize>,
    key_positions: Vec<usize>,
    width: usize,
}

impl MergedRows {
    fn new(key_positions: Vec<usize>, width: usize) -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
            key_positions,
            width,
        }
    }

    fn push(&mut self, row: Row, key: Vec<String>, provenance: Provenance) {
        let row_idx = self.rows.len();
        self.index.entry(key).or_insert(row_idx);
        self.rows.push(MergedRow { row, provenance });
    }

    fn absorb(&mut self, plan: &SourcePlan<'_>) -> Result<SourceSummary, MergeError> {
        let table = plan.sheet.name.as_str();
        let mut summary = SourceSummary {
            table_name: table.to_string(),
            matched: 0,
            appended: 0,
        };

        for (row_idx, source_row) in plan.sheet.rows().iter().enumerate() {
            let key = key_of(source_row, &plan.key_positions, table, row_idx)?;
            let found = self.index.get(&key).copied();
            match found {
                Some(merged_idx) => {
                    let merged = &mut self.rows[merged_idx].row;
                    for &(from, to) in &plan.assignments {
                        let value = cell_of(source_row, from, table, row_idx)?;
                        put(merged, to, value, table, row_idx)?;
                    }
                    summary.matched += 1;
                }
                None => {
                    let mut row = Row::empty(self.width);
                    for (&to, value) in self.key_positions.iter().zip(&key) {
                        put(&mut row, to, value, table, row_idx)?;
                    }
                    for &(from, to) in &plan.assignments {
                        let value = cell_of(source_row, from, table, row_idx)?;
                        put(&mut row, to, value, table, row_idx)?;
                    }
                    self.push(row, key, Provenance::Source(table.to_string()));
                    summary.appended += 1;
                }
            }
        }

        Ok(summary)
    }

    fn into_rows(self) -> Vec<Row> {
        let from_target = self
            .rows
            .iter()
            .filter(|merged| merged.provenance == Provenance::Target)
            .count();
        debug!(
            from_target,
            from_sources = self.rows.len() - from_target,
            "merged rows assembled"
        );
        self.rows.into_iter().map(|merged| merged.row).collect()
    }
}

/// Updates the target in place: every target row and column is kept, merge
/// columns the target lacks are appended, matched rows are patched and
/// unmatched source rows are appended.
pub(super) fn merge_in_place(
    workbook: &Workbook,
    target: &Sheet,
    request: &MergeRequest,
) -> Result<BuiltSheet, MergeError> {
    let mut updated = target.clone();
    let key_positions = positions(target, &request.match_columns)?;

    let mut added_columns = Vec::new();
    let mut plans = Vec::new();
    for source_name in &request.source_table_names {
        let source = lookup(workbook, source_name)?;
        let columns = spec_columns(request, source_name);
        if columns.is_empty() {
            warn!(source = %source_name, "no merge columns configured, source skipped");
            continue;
        }

        let mut assignments = Vec::with_capacity(columns.len());
        for column in columns {
            let from = position(source, column)?;
            let to = match updated.position_of(column) {
                Some(existing) => existing,
                None => {
                    added_columns.push(column.to_string());
                    updated.push_column(column)
                }
            };
            assignments.push((from, to));
        }

        plans.push(SourcePlan {
            sheet: source,
            key_positions: positions(source, &request.match_columns)?,
            assignments,
        });
    }

    let mut merged = MergedRows::new(key_positions.clone(), updated.width());
    for (row_idx, row) in updated.rows().iter().enumerate() {
        let key = key_of(row, &key_positions, &target.name, row_idx)?;
        merged.push(row.clone(), key, Provenance::Target);
    }

    let sources = plans
        .iter()
        .map(|plan| merged.absorb(plan))
        .collect::<Result<Vec<_>, _>>()?;

    updated.replace_rows(merged.into_rows());
    Ok(BuiltSheet {
        sheet: updated,
        added_columns,
        sources,
    })
}

/// Builds a new sheet holding the match columns followed by every merge
/// spec's columns, renamed with `_1`, `_2`, … where names collide.
pub(super) fn merge_new_table(
    workbook: &Workbook,
    target: &Sheet,
    request: &MergeRequest,
    new_table_name: &str,
) -> Result<BuiltSheet, MergeError> {
    let target_keys = positions(target, &request.match_columns)?;
    let mut column_names: Vec<String> = target_keys
        .iter()
        .map(|&position| target.columns()[position].name.clone())
        .collect();

    // (table, source position, new position)
    let mut placements: Vec<(&str, usize, usize)> = Vec::new();
    for spec in &request.merge_columns {
        let Some(table) = spec.table() else {
            continue;
        };
        let contributes = table == target.name
            || request.source_table_names.iter().any(|name| name == table);
        if !contributes {
            warn!(table, "merge columns for a table outside the merge, ignored");
            continue;
        }
        let sheet = lookup(workbook, table)?;
        for column in &spec.columns {
            let from = position(sheet, column)?;
            let placed = unique_name(column, |candidate| {
                column_names.iter().any(|name| name == candidate)
            });
            placements.push((table, from, column_names.len()));
            column_names.push(placed);
        }
    }

    let new_keys: Vec<usize> = (0..target_keys.len()).collect();
    let mut merged = MergedRows::new(new_keys.clone(), column_names.len());
    for (row_idx, target_row) in target.rows().iter().enumerate() {
        let key = key_of(target_row, &target_keys, &target.name, row_idx)?;
        let mut row = Row::empty(column_names.len());
        for (&to, value) in new_keys.iter().zip(&key) {
            put(&mut row, to, value, &target.name, row_idx)?;
        }
        for &(table, from, to) in &placements {
            if table == target.name {
                let value = cell_of(target_row, from, &target.name, row_idx)?;
                put(&mut row, to, value, &target.name, row_idx)?;
            }
        }
        merged.push(row, key, Provenance::Target);
    }

    let mut sources = Vec::new();
    for source_name in &request.source_table_names {
        let source = lookup(workbook, source_name)?;
        let assignments: Vec<(usize, usize)> = placements
            .iter()
            .filter(|&&(table, _, _)| table == source_name.as_str())
            .map(|&(_, from, to)| (from, to))
            .collect();
        if assignments.is_empty() {
            warn!(source = %source_name, "no merge columns configured, source skipped");
            continue;
        }
        let plan = SourcePlan {
            sheet: source,
            key_positions: positions(source, &request.match_columns)?,
            assignments,
        };
        sources.push(merged.absorb(&plan)?);
    }

    let mut sheet = Sheet::new(new_table_name, column_names);
    sheet.replace_rows(merged.into_rows());
    Ok(BuiltSheet {
        sheet,
        added_columns: Vec::new(),
        sources,
    })
}
