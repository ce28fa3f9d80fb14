//! The only place that writes workbook files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::datahub::sheets::error::{Result, SheetError};
use crate::datahub::sheets::io::excel_write;
use crate::datahub::sheets::model::{Workbook, unique_name};

const WORKBOOK_EXTENSION: &str = "xlsx";

/// Where a project's workbook lives: its directory and, once one exists,
/// the backing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkbookLocation {
    project_dir: PathBuf,
    file: Option<PathBuf>,
}

impl WorkbookLocation {
    pub fn new(project_dir: impl Into<PathBuf>, file: Option<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            file,
        }
    }

    /// Locates the most recently modified workbook in `project_dir`.
    pub fn resolve(project_dir: impl Into<PathBuf>) -> Result<Self> {
        let project_dir = project_dir.into();
        let file = latest_workbook(&project_dir)?;
        Ok(Self { project_dir, file })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// The backing file, or [`SheetError::WorkbookNotFound`].
    pub fn require_file(&self) -> Result<&Path> {
        self.file()
            .ok_or_else(|| SheetError::WorkbookNotFound(self.project_dir.clone()))
    }

    pub fn set_file(&mut self, file: PathBuf) {
        self.file = Some(file);
    }
}

/// Most recently modified `.xlsx` file directly inside `dir`, ties broken by
/// file name. Hidden files are ignored.
pub fn latest_workbook(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !is_workbook_file(&path) || !entry.file_type()?.is_file() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        let newer = match &latest {
            Some((best_time, best_path)) => (modified, &path) > (*best_time, best_path),
            None => true,
        };
        if newer {
            latest = Some((modified, path));
        }
    }

    Ok(latest.map(|(_, path)| path))
}

fn is_workbook_file(path: &Path) -> bool {
    let visible = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| !name.starts_with('.'));
    let extension_matches = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case(WORKBOOK_EXTENSION));
    visible && extension_matches
}

/// Path for a new workbook in `dir`, named after `now`, e.g.
/// `workbook_20240105_093000.xlsx`.
pub fn generated_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    let stem = format!("workbook_{}", now.format("%Y%m%d_%H%M%S"));
    let stem = unique_name(&stem, |candidate| {
        dir.join(format!("{candidate}.{WORKBOOK_EXTENSION}")).exists()
    });
    dir.join(format!("{stem}.{WORKBOOK_EXTENSION}"))
}

/// Writes `workbook` to the location's backing file, creating one at a
/// generated path when the location has none yet. Returns the file written.
#[instrument(level = "info", skip_all, fields(project_dir = %location.project_dir.display()))]
pub fn persist(workbook: &Workbook, location: &mut WorkbookLocation) -> Result<PathBuf> {
    fs::create_dir_all(&location.project_dir)?;
    let path = match &location.file {
        Some(path) => path.clone(),
        None => {
            let path = generated_path(&location.project_dir, Local::now());
            info!(path = %path.display(), "creating new workbook file");
            path
        }
    };

    write_replacing(workbook, &path)?;
    location.file = Some(path.clone());
    Ok(path)
}

/// Encodes into a sibling temporary file and renames it over `path`, so a
/// failed encode leaves any existing file untouched.
pub fn write_replacing(workbook: &Workbook, path: &Path) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let partial = dir.join(format!(".{}.partial.{WORKBOOK_EXTENSION}", Uuid::new_v4()));

    if let Err(error) = excel_write::encode(workbook, &partial) {
        if partial.exists() {
            if let Err(cleanup) = fs::remove_file(&partial) {
                warn!(path = %partial.display(), %cleanup, "failed to remove partial workbook");
            }
        }
        return Err(error);
    }

    fs::rename(&partial, path)?;
    debug!(path = %path.display(), "workbook written");
    Ok(())
}

/// Modification time of `path`, as an RFC 3339 timestamp.
pub fn modified_at(path: &Path) -> Result<String> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(DateTime::<Local>::from(modified).to_rfc3339())
}
