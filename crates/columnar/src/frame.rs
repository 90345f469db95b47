//! Named, row-synchronized column sequence.

use crate::column::Column;
use crate::error::{ColumnarError, Result};

/// An ordered set of named columns that all have the same row count.
#[derive(Debug, Default)]
pub struct ColumnSet {
    names: Vec<String>,
    columns: Vec<Column>,
    nrows: usize,
}

impl ColumnSet {
    /// Creates a column set, checking that names and columns line up and that
    /// every column has the same row count.
    pub fn new(names: Vec<String>, columns: Vec<Column>) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(ColumnarError::precondition(format!(
                "{} names given for {} columns",
                names.len(),
                columns.len()
            )));
        }
        let nrows = columns.first().map_or(0, Column::nrows);
        if let Some((i, col)) = columns.iter().enumerate().find(|(_, c)| c.nrows() != nrows) {
            return Err(ColumnarError::precondition(format!(
                "column {i} (\"{}\") has {} rows, expected {nrows}",
                names[i],
                col.nrows()
            )));
        }
        Ok(Self {
            names,
            columns,
            nrows,
        })
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    /// Column names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Columns in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column at position `i`.
    pub fn column(&self, i: usize) -> Option<&Column> {
        self.columns.get(i)
    }

    /// First column named `name`.
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        let i = self.names.iter().position(|n| n == name)?;
        self.columns.get(i)
    }

    /// Splits into names and columns.
    pub fn into_parts(self) -> (Vec<String>, Vec<Column>) {
        (self.names, self.columns)
    }
}
