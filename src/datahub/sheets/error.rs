use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, SheetError>;

/// Error type covering the different failure cases that can occur when a
/// workbook is ingested, validated, merged, or persisted.
#[derive(Debug, Error)]
pub enum SheetError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Spreadsheet decoding and encoding failures.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Merge request rejected before any mutation took place.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Merge aborted; the backing file was not touched.
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Raised when an authored workbook payload does not follow the expected shape.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when a project identifier cannot name a directory.
    #[error("invalid project identifier '{0}'")]
    InvalidProject(String),

    /// Raised when a project directory holds no workbook yet.
    #[error("no workbook found in {0}")]
    WorkbookNotFound(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

/// Failures at the spreadsheet file boundary.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The file could not be opened or parsed as a workbook.
    #[error("unreadable workbook {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    /// Two distinct sheet names map to the same name once sanitised for the
    /// host format.
    #[error("sheets '{first}' and '{second}' both map to sheet name '{stored}'")]
    NameCollision {
        first: String,
        second: String,
        stored: String,
    },

    /// The sheet name cannot be stored even after sanitising.
    #[error("sheet name '{0}' cannot be stored in a workbook")]
    InvalidSheetName(String),
}

/// Columns a single table is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingColumns {
    pub table_name: String,
    pub columns: Vec<String>,
}

impl fmt::Display for MissingColumns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table '{}' is missing columns: {}",
            self.table_name,
            self.columns.join(", ")
        )
    }
}

/// Problems found while checking a merge request against a workbook.
///
/// Checks collect every offending table and column before returning, so a
/// single error describes everything the caller has to fix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("match columns must not be empty")]
    EmptyMatchColumns,

    #[error("source table list must not be empty")]
    EmptySourceList,

    #[error("tables not found: {}", .0.join(", "))]
    MissingTable(Vec<String>),

    #[error("{}", join_display(.0))]
    MissingColumns(Vec<MissingColumns>),

    #[error("merge column configuration must not be empty")]
    EmptyMergeSpec,

    /// Carries the 1-based position of the offending merge spec.
    #[error("merge column configuration #{0} has no table name")]
    MissingTableName(usize),

    /// Table names that resolve to more than one sheet.
    #[error("table names are not unique: {}", .0.join(", "))]
    DuplicateTable(Vec<String>),

    /// More than one kind of problem was found in a single check.
    #[error("{}", join_display(.0))]
    Batch(Vec<ValidationError>),
}

impl ValidationError {
    /// Builds the error for a set of collected problems, or `None` when the
    /// set is empty.
    pub(crate) fn collect(mut issues: Vec<ValidationError>) -> Option<Self> {
        match issues.len() {
            0 => None,
            1 => issues.pop(),
            _ => Some(ValidationError::Batch(issues)),
        }
    }

    /// Flattens a batch into its individual problems.
    pub fn issues(&self) -> Vec<&ValidationError> {
        match self {
            ValidationError::Batch(items) => items.iter().flat_map(|item| item.issues()).collect(),
            other => vec![other],
        }
    }
}

/// Failures raised by the merge engine itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("new table name must not be blank")]
    EmptyNewTableName,

    #[error("table '{0}' already exists")]
    DuplicateTableName(String),

    /// A referenced table or column disappeared between validation and merge.
    #[error("schema mismatch in table '{table}'{}", column_suffix(.column))]
    SchemaMismatch {
        table: String,
        column: Option<String>,
    },

    /// `row` is the 0-based data row index within `table`.
    #[error("merge failed in table '{table}' at row {row}: {reason}")]
    InternalFailure {
        table: String,
        row: usize,
        reason: String,
    },
}

fn join_display<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn column_suffix(column: &Option<String>) -> String {
    match column {
        Some(name) => format!(", column '{name}'"),
        None => String::new(),
    }
}
