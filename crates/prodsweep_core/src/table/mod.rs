//! Named-column tables used for persistence and canonical views
//!
//! A [`Table`] keeps one [`Cell`] per row and column. On disk a column has a
//! single type, described by its [`ColumnSpec`]; [`Table::schema`] derives
//! that description from the cells.

pub mod csv;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::ParamValue;

/// One table cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Column type this cell fits, `None` for `Empty`
    #[must_use]
    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            Cell::Empty => None,
            Cell::Bool(_) => Some(ColumnKind::Bool),
            Cell::Int(_) => Some(ColumnKind::Int),
            Cell::Float(_) => Some(ColumnKind::Float),
            Cell::Text(_) => Some(ColumnKind::Text),
        }
    }
}

/// Storage type of a persisted column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Bool,
    Int,
    Float,
    Text,
}

impl ColumnKind {
    /// Narrowest kind holding both `self` and `other`
    #[must_use]
    pub fn widen(self, other: ColumnKind) -> ColumnKind {
        match (self, other) {
            (a, b) if a == b => a,
            (ColumnKind::Int, ColumnKind::Float) | (ColumnKind::Float, ColumnKind::Int) => {
                ColumnKind::Float
            }
            _ => ColumnKind::Text,
        }
    }
}

/// Name and storage type of one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Int(v) => write!(f, "{v}"),
            // Debug keeps the fractional part, so `30.0` never prints like `30`
            Cell::Float(v) => write!(f, "{v:?}"),
            Cell::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&ParamValue> for Cell {
    fn from(value: &ParamValue) -> Self {
        match value {
            ParamValue::Bool(b) => Cell::Bool(*b),
            ParamValue::Int(v) => Cell::Int(*v),
            ParamValue::Float(v) => Cell::Float(*v),
            ParamValue::Text(s) => Cell::Text(s.clone()),
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

/// Rows of cells under an ordered header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding short rows with `Empty`.
    ///
    /// Rows wider than the header are a programming error and are truncated
    /// in release builds.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        debug_assert!(row.len() <= self.columns.len(), "row wider than header");
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let col = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[col])
    }

    /// All values of a column, top to bottom
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let col = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[col]).collect())
    }

    /// Storage type of every column.
    ///
    /// Ints mixed with floats widen to `Float`, any other mix to `Text`. A
    /// column with no values at all is `Text`.
    #[must_use]
    pub fn schema(&self) -> Vec<ColumnSpec> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, name)| ColumnSpec {
                name: name.clone(),
                kind: self
                    .rows
                    .iter()
                    .filter_map(|row| row[i].kind())
                    .reduce(ColumnKind::widen)
                    .unwrap_or(ColumnKind::Text),
            })
            .collect()
    }
}
