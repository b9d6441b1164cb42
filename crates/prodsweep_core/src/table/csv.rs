//! CSV persistence of [`Table`] through polars data frames.
//!
//! Each column is stored with the type given by [`Table::schema`]. Reading
//! with that schema ([`read_table_with`]) restores every cell exactly, so a
//! text column holding `"5"` stays text. [`read_table`] lets polars infer the
//! types instead and is meant for inspecting files of unknown origin.

use std::path::Path;
use std::sync::Arc;

use polars::prelude::*;

use crate::error::TableError;
use crate::output::atomic_write;

use super::{Cell, ColumnKind, ColumnSpec, Table};

fn frame_error(e: PolarsError) -> TableError {
    TableError::Format(e.to_string())
}

impl ColumnKind {
    fn dtype(self) -> DataType {
        match self {
            ColumnKind::Bool => DataType::Boolean,
            ColumnKind::Int => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Text => DataType::String,
        }
    }
}

fn to_frame(table: &Table) -> PolarsResult<DataFrame> {
    let columns = table
        .schema()
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let name: PlSmallStr = spec.name.as_str().into();
            let cells = table.rows().iter().map(|row| &row[i]);
            match spec.kind {
                ColumnKind::Bool => {
                    let values: Vec<Option<bool>> = cells
                        .map(|c| match c {
                            Cell::Bool(b) => Some(*b),
                            _ => None,
                        })
                        .collect();
                    Column::new(name, values)
                }
                ColumnKind::Int => {
                    let values: Vec<Option<i64>> = cells
                        .map(|c| match c {
                            Cell::Int(v) => Some(*v),
                            _ => None,
                        })
                        .collect();
                    Column::new(name, values)
                }
                ColumnKind::Float => {
                    let values: Vec<Option<f64>> = cells.map(Cell::as_f64).collect();
                    Column::new(name, values)
                }
                ColumnKind::Text => {
                    let values: Vec<Option<String>> = cells
                        .map(|c| match c {
                            Cell::Empty => None,
                            Cell::Text(s) => Some(s.clone()),
                            other => Some(other.to_string()),
                        })
                        .collect();
                    Column::new(name, values)
                }
            }
        })
        .collect();
    DataFrame::new(columns)
}

fn column_cells(column: &Column) -> PolarsResult<Vec<Cell>> {
    let cells = match column.dtype() {
        DataType::Boolean => column
            .bool()?
            .into_iter()
            .map(|v| v.map_or(Cell::Empty, Cell::Bool))
            .collect(),
        DataType::Int64 => column
            .i64()?
            .into_iter()
            .map(|v| v.map_or(Cell::Empty, Cell::Int))
            .collect(),
        DataType::Float64 => column
            .f64()?
            .into_iter()
            .map(|v| v.map_or(Cell::Empty, Cell::Float))
            .collect(),
        dtype if dtype.is_integer() => {
            let widened = column.cast(&DataType::Int64)?;
            let values = widened.i64()?;
            values
                .into_iter()
                .map(|v| v.map_or(Cell::Empty, Cell::Int))
                .collect()
        }
        _ => {
            let text = column.cast(&DataType::String)?;
            let values = text.str()?;
            values
                .into_iter()
                .map(|v| v.map_or(Cell::Empty, |s| Cell::Text(s.to_string())))
                .collect()
        }
    };
    Ok(cells)
}

fn from_frame(frame: &DataFrame) -> PolarsResult<Table> {
    let names = frame
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    let columns = frame
        .get_columns()
        .iter()
        .map(column_cells)
        .collect::<PolarsResult<Vec<_>>>()?;

    let mut table = Table::new(names);
    for row in 0..frame.height() {
        table.push_row(columns.iter().map(|cells| cells[row].clone()).collect());
    }
    Ok(table)
}

/// Render a table as CSV bytes, header first
pub fn encode_table(table: &Table) -> Result<Vec<u8>, TableError> {
    let mut frame = to_frame(table).map_err(frame_error)?;
    let mut buffer = Vec::new();
    CsvWriter::new(&mut buffer)
        .include_header(true)
        .finish(&mut frame)
        .map_err(frame_error)?;
    Ok(buffer)
}

/// Write `table` to `path`, replacing any existing file atomically
pub fn write_table(path: &Path, table: &Table) -> Result<(), TableError> {
    atomic_write(path, encode_table(table)?)?;
    Ok(())
}

fn load(path: &Path, overwrite: Option<Schema>) -> Result<Table, TableError> {
    std::fs::metadata(path).map_err(|e| TableError::Io(format!("{}: {e}", path.display())))?;
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_schema_overwrite(overwrite.map(Arc::new))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(frame_error)?;
    from_frame(&frame).map_err(frame_error)
}

/// Read a table, letting polars infer the column types
pub fn read_table(path: &Path) -> Result<Table, TableError> {
    load(path, None)
}

/// Read a table written by [`write_table`], restoring the column types in
/// `schema`. The file's header must match `schema` name for name.
pub fn read_table_with(path: &Path, schema: &[ColumnSpec]) -> Result<Table, TableError> {
    let overwrite: Schema = schema
        .iter()
        .map(|spec| Field::new(spec.name.as_str().into(), spec.kind.dtype()))
        .collect();
    let table = load(path, Some(overwrite))?;

    let expected: Vec<&str> = schema.iter().map(|spec| spec.name.as_str()).collect();
    if table.columns() != expected.as_slice() {
        return Err(TableError::SchemaMismatch {
            expected: expected.iter().map(|s| s.to_string()).collect(),
            found: table.columns().to_vec(),
        });
    }
    Ok(table)
}
