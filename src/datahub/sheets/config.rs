use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::datahub::sheets::error::{Result, SheetError};
use crate::datahub::sheets::persist::WorkbookLocation;

/// Root directory used when neither a flag nor the environment names one.
pub const DEFAULT_DATA_DIR: &str = "src_Data/SheetData";
/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "DATAHUB_DATA_DIR";

/// Runtime settings. Each project keeps its workbooks in
/// `<data_dir>/<project id>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

impl Settings {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Directory of `project_id`, created if missing.
    pub fn project_dir(&self, project_id: &str) -> Result<PathBuf> {
        let mut components = Path::new(project_id).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_normal {
            return Err(SheetError::InvalidProject(project_id.to_string()));
        }

        let dir = self.data_dir.join(project_id);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Resolves the workbook location of `project_id`.
    pub fn location(&self, project_id: &str) -> Result<WorkbookLocation> {
        WorkbookLocation::resolve(self.project_dir(project_id)?)
    }
}
