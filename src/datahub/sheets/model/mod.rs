use std::collections::HashMap;

use serde::Serialize;

/// Name synthesised for a column whose header is blank or unreadable.
pub fn default_column_name(position: usize) -> String {
    format!("列{}", position + 1)
}

/// A column definition. `position` always equals the column's slot in
/// [`Sheet::columns`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub position: usize,
    pub name: String,
}

/// A single data row. Cells are stored by column position and every row
/// holds exactly one cell per column of the sheet it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Row {
    cells: Vec<String>,
}

impl Row {
    /// Creates a row of `width` empty cells.
    pub fn empty(width: usize) -> Self {
        Self {
            cells: vec![String::new(); width],
        }
    }

    /// Creates a row from cell values, padding or truncating to `width`.
    pub fn from_cells(mut cells: Vec<String>, width: usize) -> Self {
        cells.resize(width, String::new());
        Self { cells }
    }

    pub fn cell(&self, position: usize) -> Option<&str> {
        self.cells.get(position).map(String::as_str)
    }

    /// Replaces the value at `position`. Returns `false` if the position is
    /// outside the row.
    pub fn set(&mut self, position: usize, value: impl Into<String>) -> bool {
        match self.cells.get_mut(position) {
            Some(cell) => {
                *cell = value.into();
                true
            }
            None => false,
        }
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    fn widen(&mut self, width: usize) {
        if self.cells.len() < width {
            self.cells.resize(width, String::new());
        }
    }
}

/// One named table of a workbook.
///
/// Column lookups by name resolve to the **first** column carrying that
/// name. Later columns with a duplicate name are still stored, written and
/// read back, but can never be addressed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sheet {
    pub name: String,
    columns: Vec<Column>,
    rows: Vec<Row>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Sheet {
    /// Creates an empty sheet with the given column names.
    pub fn new<I, S>(name: impl Into<String>, column_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut sheet = Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            index: HashMap::new(),
        };
        for column_name in column_names {
            sheet.push_column(column_name);
        }
        sheet
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Position of the first column named `name`.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Appends a column and widens every existing row with an empty cell.
    /// A blank name is replaced by [`default_column_name`]. Returns the new
    /// column's position.
    pub fn push_column(&mut self, name: impl Into<String>) -> usize {
        let position = self.columns.len();
        let name = name.into();
        let name = if name.trim().is_empty() {
            default_column_name(position)
        } else {
            name
        };
        self.index.entry(name.clone()).or_insert(position);
        self.columns.push(Column { position, name });
        for row in &mut self.rows {
            row.widen(position + 1);
        }
        position
    }

    /// Appends a row built from cell values in column order. Missing trailing
    /// cells are filled with empty strings; surplus cells are dropped.
    pub fn push_row(&mut self, cells: Vec<String>) {
        let row = Row::from_cells(cells, self.width());
        self.rows.push(row);
    }

    /// Replaces every row of the sheet, normalising each to the sheet width.
    pub fn replace_rows(&mut self, rows: Vec<Row>) {
        let width = self.width();
        self.rows = rows
            .into_iter()
            .map(|row| Row::from_cells(row.cells, width))
            .collect();
    }

    /// Value of the first column named `name` in row `row`.
    pub fn value(&self, row: usize, name: &str) -> Option<&str> {
        let position = self.position_of(name)?;
        self.rows.get(row)?.cell(position)
    }
}

/// Ordered collection of sheets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    /// First sheet named `name`.
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|sheet| sheet.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sheet(name).is_some()
    }

    /// Number of sheets carrying `name`.
    pub fn count_named(&self, name: &str) -> usize {
        self.sheets.iter().filter(|sheet| sheet.name == name).count()
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|sheet| sheet.name.as_str())
    }

    pub fn push(&mut self, sheet: Sheet) {
        self.sheets.push(sheet);
    }
}

/// Shape and size of one sheet, as listed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetSummary {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: usize,
}

pub fn sheet_summaries(workbook: &Workbook) -> Vec<SheetSummary> {
    workbook
        .sheets
        .iter()
        .map(|sheet| SheetSummary {
            name: sheet.name.clone(),
            columns: sheet.column_names().map(str::to_string).collect(),
            rows: sheet.rows().len(),
        })
        .collect()
}

/// Returns `base`, or `base_1`, `base_2`, … whichever is first not taken.
pub fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut counter = 1;
    loop {
        let candidate = format!("{base}_{counter}");
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}
