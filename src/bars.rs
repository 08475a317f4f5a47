//! Column-oriented view of bar rows as returned by the provider.
//!
//! Cells are kept as text so that whatever schema the provider sends for a
//! given frequency is written back out unchanged.

use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl BarTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Stack tables on top of each other, aligning columns by name.
    /// The result has the union of all columns in first-seen order; cells
    /// for columns a table lacks are left empty.
    pub fn concat(tables: Vec<BarTable>) -> BarTable {
        let mut columns: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for table in &tables {
            for column in &table.columns {
                if !positions.contains_key(column) {
                    positions.insert(column.clone(), columns.len());
                    columns.push(column.clone());
                }
            }
        }

        let total_rows = tables.iter().map(BarTable::len).sum();
        let mut rows = Vec::with_capacity(total_rows);
        for table in tables {
            if table.columns == columns {
                rows.extend(table.rows);
                continue;
            }
            let mapping: Vec<usize> = table.columns.iter().map(|c| positions[c]).collect();
            for row in table.rows {
                let mut aligned = vec![String::new(); columns.len()];
                for (cell, &target) in row.into_iter().zip(&mapping) {
                    aligned[target] = cell;
                }
                rows.push(aligned);
            }
        }

        BarTable { columns, rows }
    }

    /// Stable ascending sort on the first candidate column present.
    /// A column of numbers (epoch timestamps) sorts numerically, anything
    /// else as text (`2025-10-31 09:31:00`, `20251031`); empty cells first.
    /// Returns the column used; fails if none of the candidates exist.
    pub fn sort_by_first_present(&mut self, candidates: &[String]) -> Result<String> {
        let (index, column) = candidates
            .iter()
            .find_map(|name| self.column_index(name).map(|i| (i, name.clone())))
            .ok_or_else(|| {
                anyhow!(
                    "none of the timestamp columns [{}] present in columns [{}]",
                    candidates.join(", "),
                    self.columns.join(", ")
                )
            })?;

        // Numeric only if every non-empty cell is a number, so the
        // comparison stays a total order over the whole column
        let numeric = self
            .rows
            .iter()
            .map(|row| cell(row, index))
            .filter(|c| !c.is_empty())
            .all(|c| c.parse::<f64>().is_ok_and(|v| !v.is_nan()));

        if numeric {
            self.rows.sort_by(|a, b| {
                let x = cell(a, index).parse::<f64>().ok();
                let y = cell(b, index).parse::<f64>().ok();
                match (x, y) {
                    (Some(x), Some(y)) => x.total_cmp(&y),
                    (x, y) => x.is_some().cmp(&y.is_some()),
                }
            });
        } else {
            self.rows.sort_by(|a, b| cell(a, index).cmp(cell(b, index)));
        }
        Ok(column)
    }

    /// Drop exact-duplicate rows, keeping the first occurrence.
    /// Returns the number of rows removed.
    pub fn dedup_rows(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen: HashSet<Vec<String>> = HashSet::with_capacity(before);
        self.rows.retain(|row| seen.insert(row.clone()));
        before - self.rows.len()
    }
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}
