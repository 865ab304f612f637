//! Row-oriented tables built from decoded response bodies
//!
//! A [`Table`] is the union of every record it was fed: its column set is the
//! union of keys seen across records (in first-seen order), and a row that lacks
//! a column simply has no value for it. Absence is never coerced to zero or an
//! empty string; [`Table::cell`] returns `None`.

use crate::types::{Body, Record};
use serde_json::Value;
use std::collections::HashSet;

/// One row of a [`Table`]
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    /// Position of the body this row came from in the flattened sequence
    pub source: usize,
    /// Values present in this row
    pub values: Record,
}

/// Row-oriented collection of records with a unioned column set
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    known: HashSet<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Create an empty table with no columns
    pub fn new() -> Self {
        Self::default()
    }

    /// Column names in first-seen order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in insertion order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True if any row contributed this column
    pub fn has_column(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    /// Value at (`row`, `column`), `None` when the row has no such key
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.values.get(column))
    }

    /// Every row's value for `column`, or `None` if the column is unknown
    pub fn column(&self, name: &str) -> Option<Vec<Option<&Value>>> {
        if !self.has_column(name) {
            return None;
        }
        Some(self.rows.iter().map(|r| r.values.get(name)).collect())
    }

    /// Append one record, extending the column set with any new keys
    pub fn push(&mut self, source: usize, values: Record) {
        for key in values.keys() {
            if !self.known.contains(key) {
                self.known.insert(key.clone());
                self.columns.push(key.clone());
            }
        }
        self.rows.push(Row { source, values });
    }
}

/// Flatten decoded bodies into one table
///
/// A [`Body::RecordList`] contributes one row per element, a bare
/// [`Body::Record`] contributes a single row. Every row remembers the position
/// of its body in `bodies`, so mixed sequences of lists and bare records line up
/// the same way regardless of shape. Columns with the same name are aligned.
///
/// An empty input produces a table with no rows and no columns; callers that
/// write output must check for that themselves.
pub fn flatten<I>(bodies: I) -> Table
where
    I: IntoIterator<Item = Body>,
{
    let mut table = Table::new();
    for (source, body) in bodies.into_iter().enumerate() {
        match body {
            Body::Record(record) => table.push(source, record),
            Body::RecordList(records) => {
                for record in records {
                    table.push(source, record);
                }
            }
        }
    }
    table
}
