use std::collections::{HashMap, HashSet};
use std::path::Path;

use rust_xlsxwriter::Workbook as XlsxWorkbook;
use tracing::{debug, instrument, warn};

use crate::datahub::sheets::error::{CodecError, Result};
use crate::datahub::sheets::model::{Sheet, Workbook};

/// Maximum sheet name length accepted by the spreadsheet format.
pub const SHEET_NAME_LIMIT: usize = 31;

const INVALID_SHEET_CHARS: [char; 7] = [':', '\\', '/', '?', '*', '[', ']'];

/// Prefix of the workbook-level names recording a sheet's data row count,
/// followed by the sheet's index. The format does not store rows without
/// values, so the count is what keeps trailing blank rows.
pub(crate) const ROW_COUNT_NAME_PREFIX: &str = "DatahubRows_";

/// Writes the provided workbook to the given path, one sheet per model sheet.
///
/// Row values are re-expanded by column position; empty cells are left
/// blank. A sheet ending in a blank row gets its row count recorded under
/// [`ROW_COUNT_NAME_PREFIX`]. A sheet without columns and rows is still
/// written so it remains listed when the file is read back.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn encode(workbook: &Workbook, path: &Path) -> Result<()> {
    let stored_names = stored_sheet_names(workbook)?;
    let mut workbook_writer = XlsxWorkbook::new();

    for (index, (sheet, stored_name)) in workbook.sheets.iter().zip(&stored_names).enumerate() {
        let worksheet = workbook_writer.add_worksheet();
        worksheet.set_name(stored_name)?;

        for column in sheet.columns() {
            worksheet.write_string(0, column.position as u16, &column.name)?;
        }

        for (row_idx, row) in sheet.rows().iter().enumerate() {
            for (col_idx, cell) in row.cells().iter().enumerate() {
                if cell.is_empty() {
                    continue;
                }
                worksheet.write_string((row_idx + 1) as u32, col_idx as u16, cell)?;
            }
        }

        if sheet.width() > 0 {
            let col_end = (sheet.width() - 1) as u16;
            worksheet.autofilter(0, 0, sheet.rows().len() as u32, col_end)?;
        }

        if ends_with_blank_row(sheet) {
            workbook_writer.define_name(
                &format!("{ROW_COUNT_NAME_PREFIX}{index}"),
                &format!("={}", sheet.rows().len()),
            )?;
        }
    }

    workbook_writer.save(path)?;
    debug!(sheet_count = workbook.sheets.len(), "workbook encoded");
    Ok(())
}

/// Computes the name each sheet is stored under, rejecting workbooks in which
/// two sheets would end up sharing a name.
pub fn stored_sheet_names(workbook: &Workbook) -> Result<Vec<String>> {
    let mut claimed: HashMap<String, &str> = HashMap::new();
    let mut stored_names = Vec::with_capacity(workbook.sheets.len());

    for sheet in &workbook.sheets {
        let stored = sanitize_sheet_name(&sheet.name)?;
        if stored != sheet.name {
            warn!(sheet = %sheet.name, stored = %stored, "sheet name adjusted for storage");
        }
        if let Some(first) = claimed.insert(stored.to_lowercase(), &sheet.name) {
            return Err(CodecError::NameCollision {
                first: first.to_string(),
                second: sheet.name.clone(),
                stored,
            }
            .into());
        }
        stored_names.push(stored);
    }

    Ok(stored_names)
}

fn ends_with_blank_row(sheet: &Sheet) -> bool {
    sheet
        .rows()
        .last()
        .is_some_and(|row| row.cells().iter().all(String::is_empty))
}

/// Key under which the format compares sheet names: the sanitised name,
/// case-folded.
pub fn storage_key(name: &str) -> std::result::Result<String, CodecError> {
    Ok(sanitize_sheet_name(name)?.to_lowercase())
}

/// Storable name for `name` whose [`storage_key`] is not in `claimed`,
/// suffixed `_1`, `_2`, … when needed. The base is shortened so the suffix
/// survives truncation.
pub fn unique_sheet_name(
    name: &str,
    claimed: &HashSet<String>,
) -> std::result::Result<String, CodecError> {
    let stored = sanitize_sheet_name(name)?;
    if !claimed.contains(&stored.to_lowercase()) {
        return Ok(stored);
    }

    let mut counter = 1;
    loop {
        let suffix = format!("_{counter}");
        let keep = SHEET_NAME_LIMIT - suffix.chars().count();
        let base: String = stored.chars().take(keep).collect();
        let candidate = format!("{base}{suffix}");
        if !claimed.contains(&candidate.to_lowercase()) {
            return Ok(candidate);
        }
        counter += 1;
    }
}

/// Replaces characters the format forbids and truncates to
/// [`SHEET_NAME_LIMIT`] characters.
pub fn sanitize_sheet_name(raw: &str) -> std::result::Result<String, CodecError> {
    let mut sanitized: String = raw
        .chars()
        .map(|ch| {
            if INVALID_SHEET_CHARS.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .take(SHEET_NAME_LIMIT)
        .collect();

    if sanitized.starts_with('\'') {
        sanitized.replace_range(..1, "_");
    }
    if sanitized.ends_with('\'') {
        sanitized.pop();
        sanitized.push('_');
    }

    if sanitized.trim().is_empty() {
        return Err(CodecError::InvalidSheetName(raw.to_string()));
    }

    Ok(sanitized)
}
