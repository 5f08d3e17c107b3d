//! Typed columnar table.
//!
//! A [`Table`] is an ordered set of named, equal-length columns. Invariants
//! (unique column names, equal lengths, one non-null kind per column) are
//! validated at construction and re-checked after deserialization, so a
//! `Table` in hand is always well-formed.

use crate::error::{Error, Result};
use crate::value::{Value, ValueKind};
use serde::{Deserialize, Serialize};

/// A named, typed sequence of cell values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within its table.
    pub name: String,
    /// Cell values, one per row.
    pub values: Vec<Value>,
}

impl Column {
    /// Creates a column from a name and values.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// The single non-null kind of this column, or `None` if all cells are null.
    pub fn kind(&self) -> Option<ValueKind> {
        self.values.iter().find_map(Value::kind)
    }

    /// Returns `true` if the column holds only numeric (or null) cells.
    pub fn is_numeric(&self) -> bool {
        matches!(self.kind(), Some(ValueKind::Int) | Some(ValueKind::Float))
    }
}

/// An ordered collection of named, equal-length columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Creates a table, validating its invariants.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let table = Self { columns };
        table.validate()?;
        Ok(table)
    }

    /// Convenience constructor from `(name, values)` pairs.
    pub fn from_columns(columns: Vec<(&str, Vec<Value>)>) -> Result<Self> {
        Self::new(
            columns
                .into_iter()
                .map(|(name, values)| Column::new(name, values))
                .collect(),
        )
    }

    /// Validate structural invariants.
    ///
    /// Checks column-name uniqueness, equal column lengths, and that every
    /// column holds at most one non-null value kind. Called by constructors
    /// and again after deserializing a snapshot.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for col in &self.columns {
            if col.name.is_empty() {
                return Err(Error::validation("column name must not be empty"));
            }
            if !seen.insert(col.name.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate column name '{}'",
                    col.name
                )));
            }
        }
        if let Some(first) = self.columns.first() {
            let len = first.values.len();
            for col in &self.columns {
                if col.values.len() != len {
                    return Err(Error::validation(format!(
                        "column '{}' has {} rows, expected {}",
                        col.name,
                        col.values.len(),
                        len
                    )));
                }
            }
        }
        for col in &self.columns {
            let mut kind: Option<ValueKind> = None;
            for v in &col.values {
                if let Some(k) = v.kind() {
                    match kind {
                        None => kind = Some(k),
                        Some(existing) if existing != k => {
                            return Err(Error::validation(format!(
                                "column '{}' mixes {:?} and {:?} values",
                                col.name, existing, k
                            )));
                        }
                        Some(_) => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// Number of rows (0 for a table with no columns).
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the table has no columns or no rows.
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Column names, in table order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// The columns, in table order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns `true` if a column with this name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// One row as a vector of cells, in column order.
    ///
    /// Panics in debug builds if `row` is out of bounds; callers index rows
    /// they obtained from this table.
    pub fn row(&self, row: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.values[row].clone()).collect()
    }

    /// A new table containing the given rows, in the given order.
    ///
    /// Out-of-range positions are skipped.
    pub fn take_rows(&self, rows: &[usize]) -> Table {
        let n = self.row_count();
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let values = rows
                    .iter()
                    .filter(|&&r| r < n)
                    .map(|&r| c.values[r].clone())
                    .collect();
                Column::new(c.name.clone(), values)
            })
            .collect();
        Table { columns }
    }

    /// An empty table with the same column names (zero rows).
    pub fn empty_like(&self) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), Vec::new()))
                .collect(),
        }
    }

    /// Appends one row. The row must have one cell per column.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::validation(format!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        for (col, cell) in self.columns.iter_mut().zip(row) {
            col.values.push(cell);
        }
        Ok(())
    }

    /// The first `n` rows.
    pub fn head(&self, n: usize) -> Table {
        let rows: Vec<usize> = (0..self.row_count().min(n)).collect();
        self.take_rows(&rows)
    }

    /// A copy sorted by the named column. The sort is stable; nulls first.
    pub fn sort_by_column(&self, name: &str, ascending: bool) -> Result<Table> {
        let col = self
            .column(name)
            .ok_or_else(|| Error::column_not_found(name, None))?;
        let mut order: Vec<usize> = (0..self.row_count()).collect();
        order.sort_by(|&a, &b| {
            let ord = col.values[a].sort_cmp(&col.values[b]);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        Ok(self.take_rows(&order))
    }

    /// Concatenates tables row-wise. Every table must share the first
    /// table's column set (by name, any order).
    pub fn concat(tables: &[&Table]) -> Result<Table> {
        let first = tables
            .first()
            .ok_or_else(|| Error::validation("no tables to concatenate"))?;
        let mut result = (*first).clone();
        for t in &tables[1..] {
            if t.column_count() != first.column_count() {
                return Err(Error::validation(
                    "cannot concatenate tables with different column sets",
                ));
            }
            for r in 0..t.row_count() {
                let row: Result<Vec<Value>> = first
                    .columns
                    .iter()
                    .map(|c| {
                        t.column(&c.name)
                            .map(|tc| tc.values[r].clone())
                            .ok_or_else(|| Error::column_not_found(c.name.clone(), None))
                    })
                    .collect();
                result.push_row(row?)?;
            }
        }
        result.validate()?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_columns(vec![
            ("id", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            (
                "name",
                vec![
                    Value::Str("a".into()),
                    Value::Str("b".into()),
                    Value::Str("c".into()),
                ],
            ),
        ])
        .unwrap()
    }

    // ── Construction and validation ────────────────────────────────────

    #[test]
    fn test_valid_table() {
        let t = sample();
        assert_eq!(t.row_count(), 3);
        assert_eq!(t.column_count(), 2);
        assert_eq!(t.column_names(), vec!["id", "name"]);
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let r = Table::from_columns(vec![
            ("x", vec![Value::Int(1)]),
            ("x", vec![Value::Int(2)]),
        ]);
        assert!(matches!(r, Err(Error::Validation { .. })));
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let r = Table::from_columns(vec![
            ("a", vec![Value::Int(1), Value::Int(2)]),
            ("b", vec![Value::Int(1)]),
        ]);
        assert!(matches!(r, Err(Error::Validation { .. })));
    }

    #[test]
    fn test_mixed_kind_column_rejected() {
        let r = Table::from_columns(vec![(
            "a",
            vec![Value::Int(1), Value::Str("two".into())],
        )]);
        assert!(matches!(r, Err(Error::Validation { .. })));
    }

    #[test]
    fn test_nulls_do_not_fix_kind() {
        let t = Table::from_columns(vec![(
            "a",
            vec![Value::Null, Value::Int(1), Value::Null],
        )])
        .unwrap();
        assert_eq!(t.column("a").unwrap().kind(), Some(crate::ValueKind::Int));
    }

    // ── Row operations ─────────────────────────────────────────────────

    #[test]
    fn test_take_rows_preserves_order() {
        let t = sample();
        let sub = t.take_rows(&[2, 0]);
        assert_eq!(sub.row_count(), 2);
        assert_eq!(sub.column("id").unwrap().values[0], Value::Int(3));
        assert_eq!(sub.column("id").unwrap().values[1], Value::Int(1));
    }

    #[test]
    fn test_empty_like() {
        let t = sample();
        let e = t.empty_like();
        assert_eq!(e.row_count(), 0);
        assert_eq!(e.column_names(), t.column_names());
    }

    #[test]
    fn test_push_row_wrong_arity() {
        let mut t = sample();
        assert!(t.push_row(vec![Value::Int(4)]).is_err());
        assert!(t
            .push_row(vec![Value::Int(4), Value::Str("d".into())])
            .is_ok());
        assert_eq!(t.row_count(), 4);
    }

    #[test]
    fn test_head() {
        let t = sample();
        assert_eq!(t.head(2).row_count(), 2);
        assert_eq!(t.head(0).row_count(), 0);
        assert_eq!(t.head(10).row_count(), 3);
    }

    // ── Sorting ────────────────────────────────────────────────────────

    #[test]
    fn test_sort_descending() {
        let t = sample();
        let sorted = t.sort_by_column("id", false).unwrap();
        assert_eq!(sorted.column("id").unwrap().values[0], Value::Int(3));
    }

    #[test]
    fn test_sort_unknown_column() {
        let t = sample();
        assert!(matches!(
            t.sort_by_column("nope", true),
            Err(Error::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_sort_nulls_first() {
        let t = Table::from_columns(vec![(
            "a",
            vec![Value::Int(2), Value::Null, Value::Int(1)],
        )])
        .unwrap();
        let sorted = t.sort_by_column("a", true).unwrap();
        assert_eq!(sorted.column("a").unwrap().values[0], Value::Null);
        assert_eq!(sorted.column("a").unwrap().values[1], Value::Int(1));
    }

    // ── Concatenation ──────────────────────────────────────────────────

    #[test]
    fn test_concat_matching_schemas() {
        let a = sample();
        let b = sample();
        let merged = Table::concat(&[&a, &b]).unwrap();
        assert_eq!(merged.row_count(), 6);
    }

    #[test]
    fn test_concat_mismatched_schemas() {
        let a = sample();
        let b = Table::from_columns(vec![("other", vec![Value::Int(1)])]).unwrap();
        assert!(Table::concat(&[&a, &b]).is_err());
    }
}
