use std::collections::BTreeMap;
use std::io::Write;

use chainrun_core::errors::{ChainError, ErrorInfo};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Name of the column prepended by [`DrawTable::merge_chains`].
pub const CHAIN_COLUMN: &str = "chain__";

/// Draws produced by one chain: ordered columns and ordered rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrawTable {
    columns: IndexSet<String>,
    rows: Vec<Vec<f64>>,
    /// `key = value` pairs scraped from comment lines (first occurrence wins).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

// `IndexSet` equality ignores order; column order is part of a table's identity.
impl PartialEq for DrawTable {
    fn eq(&self, other: &Self) -> bool {
        self.columns.iter().eq(other.columns.iter())
            && self.rows == other.rows
            && self.metadata == other.metadata
    }
}

/// Borrowed view of a single draw.
#[derive(Debug, Clone, Copy)]
pub struct Draw<'a> {
    columns: &'a IndexSet<String>,
    values: &'a [f64],
}

impl<'a> Draw<'a> {
    /// Value of the named column in this draw.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.columns
            .get_index_of(name)
            .map(|position| self.values[position])
    }

    /// Raw values in column order.
    pub fn values(&self) -> &'a [f64] {
        self.values
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        let columns = self.columns;
        let values = self.values;
        columns
            .iter()
            .zip(values.iter().copied())
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Owned name → value mapping.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }
}

/// Columns belonging to one model variable, e.g. `y.1` … `y.10` for `y`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableColumns {
    /// Variable base name.
    pub name: String,
    /// Dimensions inferred from the largest index along each axis.
    pub shape: Vec<usize>,
    positions: BTreeMap<Vec<usize>, usize>,
}

impl VariableColumns {
    /// Column position of the element at the zero-based `index`.
    pub fn position(&self, index: &[usize]) -> Option<usize> {
        self.positions.get(index).copied()
    }

    /// Number of scalar elements (columns) in the variable.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True when the variable has no columns.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn malformed(code: &str, message: impl Into<String>) -> ChainError {
    ChainError::MalformedOutput(ErrorInfo::new(code, message))
}

impl DrawTable {
    /// Builds a table, checking that names are unique and every row is full width.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, ChainError> {
        let mut set = IndexSet::with_capacity(columns.len());
        for name in columns {
            if !set.insert(name.clone()) {
                return Err(ChainError::MalformedOutput(
                    ErrorInfo::new("draws_duplicate_column", "duplicate column name")
                        .with_context("column", name),
                ));
            }
        }
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != set.len() {
                return Err(ChainError::MalformedOutput(
                    ErrorInfo::new("draws_width", "row width does not match header")
                        .with_context("row", idx.to_string())
                        .with_context("expected", set.len().to_string())
                        .with_context("found", row.len().to_string()),
                ));
            }
        }
        Ok(Self {
            columns: set,
            rows,
            metadata: BTreeMap::new(),
        })
    }

    /// Column names in file order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of draws (rows).
    pub fn num_draws(&self) -> usize {
        self.rows.len()
    }

    /// Column names that are model quantities rather than sampler diagnostics.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.columns()
            .filter(|name| !name.ends_with("__"))
            .collect()
    }

    /// The `index`-th draw.
    pub fn draw(&self, index: usize) -> Option<Draw<'_>> {
        self.rows.get(index).map(|values| Draw {
            columns: &self.columns,
            values,
        })
    }

    /// All draws in order.
    pub fn draws(&self) -> impl Iterator<Item = Draw<'_>> {
        self.rows.iter().map(move |values| Draw {
            columns: &self.columns,
            values,
        })
    }

    /// Values of one column across all draws.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let position = self.columns.get_index_of(name)?;
        Some(self.rows.iter().map(|row| row[position]).collect())
    }

    /// Value at `(draw, column position)`.
    pub fn value(&self, draw: usize, position: usize) -> Option<f64> {
        self.rows.get(draw).and_then(|row| row.get(position)).copied()
    }

    /// Groups flattened `name.i.j` columns (one-based) into a shaped variable.
    pub fn variable(&self, name: &str) -> Option<VariableColumns> {
        let mut positions = BTreeMap::new();
        let mut shape: Vec<usize> = Vec::new();
        let prefix = format!("{name}.");
        for (position, column) in self.columns.iter().enumerate() {
            if column == name {
                positions.insert(Vec::new(), position);
                continue;
            }
            let Some(rest) = column.strip_prefix(&prefix) else {
                continue;
            };
            let parsed: Option<Vec<usize>> = rest
                .split('.')
                .map(|part| part.parse::<usize>().ok().filter(|&i| i >= 1).map(|i| i - 1))
                .collect();
            let Some(index) = parsed else {
                continue;
            };
            if shape.len() < index.len() {
                shape.resize(index.len(), 0);
            }
            for (axis, &i) in index.iter().enumerate() {
                shape[axis] = shape[axis].max(i + 1);
            }
            positions.insert(index, position);
        }
        if positions.is_empty() {
            return None;
        }
        Some(VariableColumns {
            name: name.to_string(),
            shape,
            positions,
        })
    }

    /// Concatenates chains in the given order under a leading [`CHAIN_COLUMN`].
    ///
    /// `chains` pairs a one-based chain id with its table; all tables must
    /// share the same columns in the same order.
    pub fn merge_chains(chains: &[(usize, &DrawTable)]) -> Result<DrawTable, ChainError> {
        let Some((_, first)) = chains.first() else {
            return Ok(DrawTable::default());
        };
        let mut columns = vec![CHAIN_COLUMN.to_string()];
        columns.extend(first.columns.iter().cloned());
        let mut rows = Vec::with_capacity(chains.iter().map(|(_, t)| t.num_draws()).sum());
        for (id, table) in chains {
            if !table.columns.iter().eq(first.columns.iter()) {
                return Err(ChainError::MalformedOutput(
                    ErrorInfo::new("draws_merge_columns", "chains disagree on column layout")
                        .with_context("chain", id.to_string()),
                ));
            }
            for row in &table.rows {
                let mut merged = Vec::with_capacity(row.len() + 1);
                merged.push(*id as f64);
                merged.extend_from_slice(row);
                rows.push(merged);
            }
        }
        DrawTable::new(columns, rows)
    }

    /// Writes the table as plain CSV (header plus rows, no comments).
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), ChainError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer
            .write_record(self.columns.iter())
            .map_err(|err| malformed("draws_csv_write", err.to_string()))?;
        for row in &self.rows {
            csv_writer
                .write_record(row.iter().map(|value| value.to_string()))
                .map_err(|err| malformed("draws_csv_write", err.to_string()))?;
        }
        csv_writer
            .flush()
            .map_err(|err| malformed("draws_csv_write", err.to_string()))
    }
}
