use serde::Deserialize;
use serde_json::Value;

/// One spreadsheet cell value as delivered by the query endpoint.
///
/// The source is untyped per cell, so every consumer goes through the coercions below
/// instead of inspecting raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Cell object present with `v: null`.
    Null,
    /// No cell at this offset, or the cell itself was `null`.
    Missing,
}

impl CellValue {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Null),
            Value::String(s) => Self::Text(s),
            Value::Bool(b) => Self::Boolean(b),
            Value::Null | Value::Array(_) | Value::Object(_) => Self::Null,
        }
    }

    /// Strict: only JSON numbers count, strings are never parsed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn number_or_zero(&self) -> f64 {
        self.as_number().unwrap_or(0.0)
    }

    /// Integer part of a non-negative number; everything else is 0.
    pub fn as_count(&self) -> u64 {
        match self.as_number() {
            Some(n) if n.is_finite() && n > 0.0 => n.trunc() as u64,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    /// Display string the sheet rendered for the value (`f`), when present.
    pub formatted: Option<String>,
}

static MISSING_CELL: Cell = Cell {
    value: CellValue::Missing,
    formatted: None,
};

impl Cell {
    pub fn missing() -> Self {
        MISSING_CELL.clone()
    }

    /// Non-empty trimmed text. Non-text values fall back to their formatted string.
    pub fn label(&self) -> Option<String> {
        let text = match &self.value {
            CellValue::Text(s) => Some(s.as_str()),
            CellValue::Number(_) | CellValue::Boolean(_) => self.formatted.as_deref(),
            CellValue::Null | CellValue::Missing => None,
        };
        text.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn cell(&self, offset: usize) -> &Cell {
        self.cells.get(offset).unwrap_or(&MISSING_CELL)
    }
}

/// The table embedded in the query response, in source row order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTable {
    pub rows: Vec<Row>,
}

impl ParsedTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// Wire shapes of the query response document.

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub errors: Vec<QueryIssue>,
    #[serde(default)]
    pub table: Option<WireTable>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct QueryIssue {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub detailed_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireTable {
    #[serde(default)]
    pub rows: Option<Vec<WireRow>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireRow {
    #[serde(default)]
    pub c: Option<Vec<Option<WireCell>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireCell {
    #[serde(default)]
    pub v: Value,
    #[serde(default)]
    pub f: Option<String>,
}

impl From<WireRow> for Row {
    fn from(row: WireRow) -> Self {
        let cells = row
            .c
            .unwrap_or_default()
            .into_iter()
            .map(|cell| match cell {
                Some(cell) => Cell {
                    value: CellValue::from_json(cell.v),
                    formatted: cell.f,
                },
                None => Cell::missing(),
            })
            .collect();
        Self { cells }
    }
}
