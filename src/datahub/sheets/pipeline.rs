use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::datahub::sheets::error::{Result, SheetError};
use crate::datahub::sheets::io::authored::AuthoredWorkbook;
use crate::datahub::sheets::io::{decode, excel_write};
use crate::datahub::sheets::merge::{self, MergeOutcome, MergeRequest};
use crate::datahub::sheets::model::{SheetSummary, Workbook, sheet_summaries};
use crate::datahub::sheets::persist::{self, WorkbookLocation};
use crate::datahub::sheets::validate;

/// Result of saving an authored workbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub path: PathBuf,
    pub table_count: usize,
    pub saved_at: String,
}

/// Result of importing the sheets of another workbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub path: PathBuf,
    /// Names the imported sheets were stored under.
    pub imported: Vec<String>,
}

/// Stores an authored workbook as `<workbook_name>.xlsx` in the project
/// directory, which becomes the location's backing file.
#[instrument(
    level = "info",
    skip_all,
    fields(project_dir = %location.project_dir().display(), workbook = %authored.workbook_name)
)]
pub fn save_authored(
    location: &mut WorkbookLocation,
    authored: &AuthoredWorkbook,
) -> Result<SaveOutcome> {
    let file_name = workbook_file_name(&authored.workbook_name)?;
    let workbook = authored.to_workbook()?;
    info!(sheet_count = workbook.sheets.len(), "authored workbook parsed");

    location.set_file(location.project_dir().join(file_name));
    let path = persist::persist(&workbook, location)?;
    Ok(SaveOutcome {
        path,
        table_count: workbook.sheets.len(),
        saved_at: persist::modified_at(location.require_file()?)?,
    })
}

/// Reads the location's workbook back into the authored shape, or `None`
/// when the project has no workbook yet.
#[instrument(level = "info", skip_all, fields(project_dir = %location.project_dir().display()))]
pub fn load_workbook(location: &WorkbookLocation) -> Result<Option<AuthoredWorkbook>> {
    let Some(path) = location.file() else {
        debug!("no workbook file in project");
        return Ok(None);
    };

    let workbook = decode(path)?;
    info!(sheet_count = workbook.sheets.len(), "workbook loaded");
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut authored = AuthoredWorkbook::from_workbook(name, &workbook);
    authored.saved_at = Some(persist::modified_at(path)?);
    Ok(Some(authored))
}

/// Decodes the location's workbook, validates and applies the merge, then
/// writes the result back. Nothing is written unless every step succeeds.
#[instrument(
    level = "info",
    skip_all,
    fields(project_dir = %location.project_dir().display(), target = %request.target_table_name)
)]
pub fn merge_tables(
    location: &mut WorkbookLocation,
    request: &MergeRequest,
) -> Result<MergeOutcome> {
    let path = location.require_file()?;
    let mut workbook = decode(path)?;
    debug!(sheet_count = workbook.sheets.len(), "workbook decoded");

    validate::validate_request(&workbook, request)?;
    let outcome = merge::merge(&mut workbook, request)?;
    // Name problems surface here, before the backing file is replaced.
    excel_write::stored_sheet_names(&workbook)?;

    let written = persist::persist(&workbook, location)?;
    info!(
        path = %written.display(),
        sheet = %outcome.sheet_name,
        row_delta = outcome.row_delta,
        "merge persisted"
    );
    Ok(outcome)
}

/// Appends every sheet of `upload` to the project's workbook, renaming
/// sheets whose names are already taken.
#[instrument(
    level = "info",
    skip_all,
    fields(project_dir = %location.project_dir().display(), upload = %upload.display())
)]
pub fn import_sheets(location: &mut WorkbookLocation, upload: &Path) -> Result<ImportOutcome> {
    if !upload.exists() {
        return Err(SheetError::MissingInput(upload.to_path_buf()));
    }

    let incoming = decode(upload)?;
    let mut workbook = match location.file() {
        Some(path) => decode(path)?,
        None => Workbook::default(),
    };

    // Names clash the way the file format compares them.
    let mut claimed = workbook
        .sheet_names()
        .map(excel_write::storage_key)
        .collect::<std::result::Result<HashSet<_>, _>>()?;

    let mut imported = Vec::with_capacity(incoming.sheets.len());
    for mut sheet in incoming.sheets {
        let name = excel_write::unique_sheet_name(&sheet.name, &claimed)?;
        claimed.insert(name.to_lowercase());
        if name != sheet.name {
            info!(original = %sheet.name, renamed = %name, "imported sheet renamed");
            sheet.name = name;
        }
        imported.push(sheet.name.clone());
        workbook.push(sheet);
    }

    let path = persist::persist(&workbook, location)?;
    Ok(ImportOutcome { path, imported })
}

/// Lists the sheets of the location's workbook.
pub fn list_sheets(location: &WorkbookLocation) -> Result<Vec<SheetSummary>> {
    let path = location.require_file()?;
    Ok(sheet_summaries(&decode(path)?))
}

fn workbook_file_name(workbook_name: &str) -> Result<String> {
    let name = workbook_name.trim();
    let forbidden = |ch: char| matches!(ch, '/' | '\\' | ':') || ch.is_control();
    if name.is_empty() || name.starts_with('.') || name.chars().any(forbidden) {
        return Err(SheetError::InvalidWorkbook(format!(
            "workbook name '{workbook_name}' cannot be used as a file name"
        )));
    }
    Ok(format!("{name}.xlsx"))
}
