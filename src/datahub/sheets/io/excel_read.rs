use std::collections::HashMap;
use std::path::Path;

use calamine::{DataType, Range, Reader, Sheets, open_workbook_auto};
use chrono::{Duration, NaiveDate};
use tracing::{debug, instrument};

use crate::datahub::sheets::error::{CodecError, Result};
use crate::datahub::sheets::io::excel_write::ROW_COUNT_NAME_PREFIX;
use crate::datahub::sheets::model::{Sheet, Workbook};

/// Reads every sheet of a spreadsheet file, in file order.
///
/// The first row of each sheet supplies the column names, blank headers
/// taking their positional default; every following row becomes a
/// [`Row`](crate::model::Row) whose cells hold the text form of the stored
/// values.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn decode(path: &Path) -> Result<Workbook> {
    let mut reader: Sheets<_> =
        open_workbook_auto(path).map_err(|err| unreadable(path, err))?;

    let names = reader.sheet_names().to_vec();
    let row_counts = recorded_row_counts(reader.defined_names());
    let mut workbook = Workbook::default();
    for (index, name) in names.into_iter().enumerate() {
        let range = read_required_sheet(&mut reader, path, &name)?;
        let recorded_rows = row_counts.get(&index).copied().unwrap_or_default();
        let sheet = sheet_from_range(name, &range, recorded_rows);
        debug!(
            sheet = %sheet.name,
            columns = sheet.width(),
            rows = sheet.rows().len(),
            "sheet decoded"
        );
        workbook.push(sheet);
    }

    Ok(workbook)
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    reader: &mut Sheets<R>,
    path: &Path,
    name: &str,
) -> Result<Range<DataType>> {
    let range_result = reader
        .worksheet_range(name)
        .ok_or_else(|| unreadable(path, format!("missing sheet '{name}'")))?;
    let range = range_result.map_err(|err| unreadable(path, err))?;
    Ok(range)
}

// Positions are absolute: the reader trims leading blank rows and columns
// from a range, but the header always lives on row 0 starting at column A.
// `recorded_rows` extends the sheet past its last stored row.
fn sheet_from_range(name: String, range: &Range<DataType>, recorded_rows: usize) -> Sheet {
    let (last_row, width) = match range.end() {
        Some((last_row, last_col)) => (last_row as usize, last_col as usize + 1),
        None => (0, 0),
    };

    let headers: Vec<String> = (0..width)
        .map(|col_idx| cell_to_string(range.get_value((0, col_idx as u32))))
        .collect();

    let mut sheet = Sheet::new(name, headers);
    for row_idx in 1..=last_row.max(recorded_rows) {
        let cells = (0..width)
            .map(|col_idx| cell_to_string(range.get_value((row_idx as u32, col_idx as u32))))
            .collect();
        sheet.push_row(cells);
    }

    sheet
}

/// Row counts recorded by the writer, keyed by sheet index.
fn recorded_row_counts(defined_names: &[(String, String)]) -> HashMap<usize, usize> {
    defined_names
        .iter()
        .filter_map(|(name, formula)| {
            let index = name.strip_prefix(ROW_COUNT_NAME_PREFIX)?.parse().ok()?;
            let rows = formula.trim().trim_start_matches('=').parse().ok()?;
            Some((index, rows))
        })
        .collect()
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) if value.is_nan() => String::new(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::DateTime(serial)) => {
            serial_to_datetime(*serial).unwrap_or_else(|| serial.to_string())
        }
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Renders a 1900-system date serial as `YYYY-MM-DD HH:MM:SS`.
fn serial_to_datetime(serial: f64) -> Option<String> {
    if !serial.is_finite() {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    let datetime = epoch.checked_add_signed(Duration::milliseconds(millis))?;
    Some(datetime.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn unreadable(path: &Path, reason: impl std::fmt::Display) -> CodecError {
    CodecError::Unreadable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
