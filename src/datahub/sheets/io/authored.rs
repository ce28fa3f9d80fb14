//! The JSON workbook shape exchanged with editors and import tools.
//!
//! ```json
//! { "workbook_name": "sales",
//!   "sheets": [{ "name": "Orders",
//!                "columns": [{ "name": "OrderId" }, { "name": "Customer" }],
//!                "rows": [{ "0": "1", "1": "Ana" }] }] }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datahub::sheets::error::{Result, SheetError};
use crate::datahub::sheets::model::{Sheet, Workbook};

/// Workbook as authored by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthoredWorkbook {
    pub workbook_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
    pub sheets: Vec<AuthoredSheet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthoredSheet {
    pub name: String,
    pub columns: Vec<AuthoredColumn>,
    /// Rows keyed by stringified column position. Absent keys read as empty.
    pub rows: Vec<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuthoredColumn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<usize>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Parses an authored workbook, reporting which required field is missing
/// before attempting typed deserialisation.
pub fn parse_authored(document: &Value) -> Result<AuthoredWorkbook> {
    let object = document
        .as_object()
        .ok_or_else(|| SheetError::InvalidWorkbook("expected a JSON object".into()))?;

    for field in ["workbook_name", "sheets"] {
        if !object.contains_key(field) {
            return Err(SheetError::InvalidWorkbook(format!(
                "missing required field: {field}"
            )));
        }
    }

    if let Some(Value::Array(sheets)) = object.get("sheets") {
        for (index, sheet) in sheets.iter().enumerate() {
            for field in ["name", "columns", "rows"] {
                if sheet.get(field).is_none() {
                    return Err(SheetError::InvalidWorkbook(format!(
                        "sheet #{} is missing field: {field}",
                        index + 1
                    )));
                }
            }
        }
    }

    Ok(AuthoredWorkbook::deserialize(document)?)
}

impl AuthoredWorkbook {
    /// Converts the authored payload into the canonical model.
    pub fn to_workbook(&self) -> Result<Workbook> {
        let mut workbook = Workbook::default();
        for authored in &self.sheets {
            workbook.push(authored.to_sheet()?);
        }
        Ok(workbook)
    }

    /// Builds the authored shape for a decoded workbook.
    pub fn from_workbook(workbook_name: impl Into<String>, workbook: &Workbook) -> Self {
        let sheets = workbook
            .sheets
            .iter()
            .map(|sheet| AuthoredSheet {
                name: sheet.name.clone(),
                columns: sheet
                    .columns()
                    .iter()
                    .map(|column| AuthoredColumn {
                        id: Some(column.position),
                        name: Some(column.name.clone()),
                    })
                    .collect(),
                rows: sheet
                    .rows()
                    .iter()
                    .map(|row| {
                        row.cells()
                            .iter()
                            .enumerate()
                            .map(|(position, cell)| {
                                (position.to_string(), Value::String(cell.clone()))
                            })
                            .collect()
                    })
                    .collect(),
            })
            .collect();

        Self {
            workbook_name: workbook_name.into(),
            saved_at: None,
            sheets,
        }
    }
}

impl AuthoredSheet {
    fn to_sheet(&self) -> Result<Sheet> {
        // Blank or absent names fall back to the model's positional names.
        let column_names = self
            .columns
            .iter()
            .map(|column| column.name.clone().unwrap_or_default());
        let mut sheet = Sheet::new(self.name.clone(), column_names);
        let width = sheet.width();

        for (row_idx, authored_row) in self.rows.iter().enumerate() {
            let mut cells = vec![String::new(); width];
            for (key, value) in authored_row {
                let position = key
                    .parse::<usize>()
                    .ok()
                    .filter(|position| *position < width)
                    .ok_or_else(|| {
                        SheetError::InvalidWorkbook(format!(
                            "sheet '{}' row {}: key '{key}' is not a column position",
                            self.name,
                            row_idx + 1
                        ))
                    })?;
                cells[position] = value_to_text(value)?;
            }
            sheet.push_row(cells);
        }

        Ok(sheet)
    }
}

fn value_to_text(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => serde_json::to_string(other)?,
    })
}
