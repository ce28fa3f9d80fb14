use std::collections::HashMap;

use tracing::{debug, warn};

use super::{
    BuiltSheet, MergeRequest, SourceSummary, cell_of, key_of, lookup, position, positions, put,
    spec_columns,
};
use crate::datahub::sheets::error::MergeError;
use crate::datahub::sheets::model::{Sheet, Workbook, unique_name};

/// Left-joins each source onto the target.
///
/// Every target row is kept, once per matching source row (or once with
/// empty source cells when nothing matches). Source columns are appended as
/// `<source>_<column>`. Unmatched source rows are dropped.
pub(super) fn left_join(
    workbook: &Workbook,
    target: &Sheet,
    request: &MergeRequest,
    new_table_name: Option<&str>,
) -> Result<BuiltSheet, MergeError> {
    let mut joined = target.clone();
    if let Some(name) = new_table_name {
        joined.name = name.to_string();
    }
    let key_positions = positions(target, &request.match_columns)?;

    let mut added_columns = Vec::new();
    let mut sources = Vec::new();
    for source_name in &request.source_table_names {
        let source = lookup(workbook, source_name)?;
        let columns = spec_columns(request, source_name);
        if columns.is_empty() {
            warn!(source = %source_name, "no merge columns configured, source skipped");
            continue;
        }
        let source_keys = positions(source, &request.match_columns)?;

        let mut assignments = Vec::with_capacity(columns.len());
        for column in columns {
            let from = position(source, column)?;
            let prefixed = format!("{source_name}_{column}");
            let placed = unique_name(&prefixed, |candidate| joined.has_column(candidate));
            assignments.push((from, joined.push_column(placed.clone())));
            added_columns.push(placed);
        }

        let mut by_key: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
        for (row_idx, row) in source.rows().iter().enumerate() {
            let key = key_of(row, &source_keys, source_name, row_idx)?;
            by_key.entry(key).or_default().push(row_idx);
        }

        let mut rows = Vec::with_capacity(joined.rows().len());
        let mut matched = 0;
        for (row_idx, row) in joined.rows().iter().enumerate() {
            let key = key_of(row, &key_positions, &joined.name, row_idx)?;
            let Some(hits) = by_key.get(&key) else {
                rows.push(row.clone());
                continue;
            };
            matched += 1;
            for &source_idx in hits {
                let source_row = &source.rows()[source_idx];
                let mut paired = row.clone();
                for &(from, to) in &assignments {
                    let value = cell_of(source_row, from, source_name, source_idx)?;
                    put(&mut paired, to, value, &joined.name, row_idx)?;
                }
                rows.push(paired);
            }
        }

        debug!(source = %source_name, matched, rows = rows.len(), "source joined");
        joined.replace_rows(rows);
        sources.push(SourceSummary {
            table_name: source_name.clone(),
            matched,
            appended: 0,
        });
    }

    Ok(BuiltSheet {
        sheet: joined,
        added_columns,
        sources,
    })
}
