//! In-memory event tables.
//!
//! An [`EventTable`] is a tree name plus an ordered list of equally long,
//! typed columns. Every batch tool reads one, reshapes it and writes it back.

use crate::error::{NtupleError, Result};

/// Typed column values. Shares its variants with the ROOT branch decoder.
pub use rt_root::BranchData as ColumnData;

/// One named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column (branch) name.
    pub name: String,
    /// Values, one per row.
    pub data: ColumnData,
}

impl Column {
    /// Build a column.
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self { name: name.into(), data }
    }
}

/// A flat tree held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTable {
    /// Tree name written with the table.
    pub tree_name: String,
    columns: Vec<Column>,
    n_rows: usize,
}

impl EventTable {
    /// An empty table with no columns and no rows.
    pub fn new(tree_name: impl Into<String>) -> Self {
        Self { tree_name: tree_name.into(), columns: Vec::new(), n_rows: 0 }
    }

    /// Build a table from columns, checking they all have the same length.
    pub fn from_columns(tree_name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let mut table = Self::new(tree_name);
        for c in columns {
            table.push_column(c)?;
        }
        Ok(table)
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// All columns in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// A column widened to `f64`.
    pub fn column_f64(&self, name: &str) -> Result<Vec<f64>> {
        self.column(name)
            .map(|c| c.data.to_f64())
            .ok_or_else(|| NtupleError::Table(format!("no column '{name}' in '{}'", self.tree_name)))
    }

    /// Append a column. The first column fixes the row count.
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.has_column(&column.name) {
            return Err(NtupleError::Table(format!("duplicate column '{}'", column.name)));
        }
        if self.columns.is_empty() {
            self.n_rows = column.data.len();
        } else if column.data.len() != self.n_rows {
            return Err(NtupleError::Table(format!(
                "column '{}' has {} rows, table has {}",
                column.name,
                column.data.len(),
                self.n_rows
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Replace a column in place, or append it when absent.
    pub fn replace_column(&mut self, column: Column) -> Result<()> {
        match self.columns.iter().position(|c| c.name == column.name) {
            Some(pos) => {
                if self.columns.len() > 1 && column.data.len() != self.n_rows {
                    return Err(NtupleError::Table(format!(
                        "column '{}' has {} rows, table has {}",
                        column.name,
                        column.data.len(),
                        self.n_rows
                    )));
                }
                self.n_rows = column.data.len();
                self.columns[pos] = column;
                Ok(())
            }
            None => self.push_column(column),
        }
    }

    /// A table with only the named columns, in the order given.
    pub fn select_columns(&self, names: &[&str]) -> Result<Self> {
        let mut out = Self::new(self.tree_name.clone());
        for name in names {
            let col = self
                .column(name)
                .ok_or_else(|| NtupleError::Table(format!("no column '{name}' to select")))?;
            out.push_column(col.clone())?;
        }
        if names.is_empty() {
            out.n_rows = self.n_rows;
        }
        Ok(out)
    }

    /// A table with the rows at `indices`, in the order given.
    pub fn take_rows(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_rows) {
            return Err(NtupleError::Table(format!(
                "row {bad} out of range for {} rows",
                self.n_rows
            )));
        }
        Ok(Self {
            tree_name: self.tree_name.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.take(indices)))
                .collect(),
            n_rows: indices.len(),
        })
    }

    /// A table with the rows whose mask value is `true`.
    pub fn filter_mask(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.n_rows {
            return Err(NtupleError::Table(format!(
                "mask has {} entries, table has {} rows",
                mask.len(),
                self.n_rows
            )));
        }
        let indices: Vec<usize> =
            mask.iter().enumerate().filter_map(|(i, &keep)| keep.then_some(i)).collect();
        self.take_rows(&indices)
    }
}
