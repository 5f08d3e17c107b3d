//! Hash joins between two tables with SQL semantics.
//!
//! Join keys match exactly on their [`IndexKey`] projection; a null in any
//! join column makes that row unmatchable on that side. Non-key columns
//! sharing a name between the two tables are disambiguated with suffixes.

use crate::error::{Error, Result};
use crate::table::{Column, Table};
use crate::value::{IndexKey, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// Which rows survive the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    /// Only rows matched on both sides.
    Inner,
    /// All left rows; unmatched right side filled with nulls.
    Left,
    /// All right rows; unmatched left side filled with nulls.
    Right,
    /// All rows from both sides.
    Outer,
}

impl FromStr for JoinType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inner" => Ok(Self::Inner),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "outer" => Ok(Self::Outer),
            other => Err(Error::query(format!("unknown join type '{other}'"))),
        }
    }
}

/// A validated join between two tables.
pub struct JoinOperation {
    left: Table,
    right: Table,
    join_type: JoinType,
    join_columns: Vec<String>,
    suffixes: (String, String),
}

impl JoinOperation {
    /// Validates that every join column exists on both sides.
    ///
    /// `suffixes` disambiguates non-key column collisions; defaults to
    /// `("_x", "_y")`.
    pub fn new(
        left: Table,
        right: Table,
        join_type: JoinType,
        join_columns: &[&str],
        suffixes: Option<(&str, &str)>,
    ) -> Result<Self> {
        if join_columns.is_empty() {
            return Err(Error::query("join requires at least one join column"));
        }
        for col in join_columns {
            if !left.has_column(col) || !right.has_column(col) {
                return Err(Error::query(format!(
                    "join column '{col}' must exist in both tables"
                )));
            }
        }
        let (sx, sy) = suffixes.unwrap_or(("_x", "_y"));
        Ok(Self {
            left,
            right,
            join_type,
            join_columns: join_columns.iter().map(|s| s.to_string()).collect(),
            suffixes: (sx.to_owned(), sy.to_owned()),
        })
    }

    /// Runs the join.
    ///
    /// Output columns: join columns first, then left non-key columns, then
    /// right non-key columns. Matched left rows keep their original order;
    /// for `Right` and `Outer`, unmatched right rows follow in their
    /// original order.
    pub fn execute(&self) -> Result<Table> {
        let key_of = |table: &Table, row: usize| -> Option<Vec<IndexKey>> {
            self.join_columns
                .iter()
                .map(|col| {
                    table
                        .column(col)
                        .and_then(|c| IndexKey::from_value(&c.values[row]))
                })
                .collect()
        };

        let mut right_map: HashMap<Vec<IndexKey>, Vec<usize>> = HashMap::new();
        for row in 0..self.right.row_count() {
            if let Some(key) = key_of(&self.right, row) {
                right_map.entry(key).or_default().push(row);
            }
        }

        let mut pairs: Vec<(Option<usize>, Option<usize>)> = Vec::new();
        let mut matched_right: HashSet<usize> = HashSet::new();
        for l in 0..self.left.row_count() {
            let matches = key_of(&self.left, l).and_then(|key| right_map.get(&key));
            match matches {
                Some(rows) => {
                    for &r in rows {
                        pairs.push((Some(l), Some(r)));
                        matched_right.insert(r);
                    }
                }
                None => {
                    if matches!(self.join_type, JoinType::Left | JoinType::Outer) {
                        pairs.push((Some(l), None));
                    }
                }
            }
        }
        if matches!(self.join_type, JoinType::Right | JoinType::Outer) {
            for r in 0..self.right.row_count() {
                if !matched_right.contains(&r) {
                    pairs.push((None, Some(r)));
                }
            }
        }

        let is_key = |name: &str| self.join_columns.iter().any(|c| c == name);
        let left_nonkey: Vec<&Column> = self
            .left
            .columns()
            .iter()
            .filter(|c| !is_key(&c.name))
            .collect();
        let right_nonkey: Vec<&Column> = self
            .right
            .columns()
            .iter()
            .filter(|c| !is_key(&c.name))
            .collect();
        let collides = |name: &str, other: &[&Column]| other.iter().any(|c| c.name == name);

        let mut out: Vec<Column> = Vec::new();
        for key_col in &self.join_columns {
            let lc = self
                .left
                .column(key_col)
                .ok_or_else(|| Error::column_not_found(key_col.clone(), None))?;
            let rc = self
                .right
                .column(key_col)
                .ok_or_else(|| Error::column_not_found(key_col.clone(), None))?;
            let values = pairs
                .iter()
                .map(|&(l, r)| match (l, r) {
                    (Some(l), _) => lc.values[l].clone(),
                    (None, Some(r)) => rc.values[r].clone(),
                    (None, None) => Value::Null,
                })
                .collect();
            out.push(Column::new(key_col.clone(), values));
        }
        for col in &left_nonkey {
            let name = if collides(&col.name, &right_nonkey) {
                format!("{}{}", col.name, self.suffixes.0)
            } else {
                col.name.clone()
            };
            let values = pairs
                .iter()
                .map(|&(l, _)| l.map_or(Value::Null, |l| col.values[l].clone()))
                .collect();
            out.push(Column::new(name, values));
        }
        for col in &right_nonkey {
            let name = if collides(&col.name, &left_nonkey) {
                format!("{}{}", col.name, self.suffixes.1)
            } else {
                col.name.clone()
            };
            let values = pairs
                .iter()
                .map(|&(_, r)| r.map_or(Value::Null, |r| col.values[r].clone()))
                .collect();
            out.push(Column::new(name, values));
        }
        Table::new(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calls() -> Table {
        Table::from_columns(vec![
            (
                "number",
                vec![
                    Value::Str("555-0100".into()),
                    Value::Str("555-0101".into()),
                    Value::Str("555-0102".into()),
                ],
            ),
            (
                "duration",
                vec![Value::Int(60), Value::Int(120), Value::Int(30)],
            ),
        ])
        .unwrap()
    }

    fn contacts() -> Table {
        Table::from_columns(vec![
            (
                "number",
                vec![Value::Str("555-0100".into()), Value::Str("555-0199".into())],
            ),
            (
                "name",
                vec![Value::Str("alice".into()), Value::Str("bob".into())],
            ),
        ])
        .unwrap()
    }

    fn join(join_type: JoinType) -> Table {
        JoinOperation::new(calls(), contacts(), join_type, &["number"], None)
            .unwrap()
            .execute()
            .unwrap()
    }

    // ── Join types ─────────────────────────────────────────────────────

    #[test]
    fn test_inner_keeps_matches_only() {
        let t = join(JoinType::Inner);
        assert_eq!(t.row_count(), 1);
        assert_eq!(t.column("name").unwrap().values[0], Value::Str("alice".into()));
    }

    #[test]
    fn test_left_fills_nulls() {
        let t = join(JoinType::Left);
        assert_eq!(t.row_count(), 3);
        assert_eq!(t.column("name").unwrap().values[1], Value::Null);
        assert_eq!(t.column("name").unwrap().values[2], Value::Null);
    }

    #[test]
    fn test_right_keeps_all_right_rows() {
        let t = join(JoinType::Right);
        assert_eq!(t.row_count(), 2);
        assert_eq!(t.column("duration").unwrap().values[1], Value::Null);
        assert_eq!(
            t.column("number").unwrap().values[1],
            Value::Str("555-0199".into())
        );
    }

    #[test]
    fn test_outer_is_union() {
        let t = join(JoinType::Outer);
        assert_eq!(t.row_count(), 4);
    }

    // ── Keys and columns ───────────────────────────────────────────────

    #[test]
    fn test_null_keys_never_match() {
        let left = Table::from_columns(vec![
            ("k", vec![Value::Null, Value::Int(1)]),
            ("a", vec![Value::Int(10), Value::Int(11)]),
        ])
        .unwrap();
        let right = Table::from_columns(vec![
            ("k", vec![Value::Null, Value::Int(1)]),
            ("b", vec![Value::Int(20), Value::Int(21)]),
        ])
        .unwrap();
        let t = JoinOperation::new(left, right, JoinType::Inner, &["k"], None)
            .unwrap()
            .execute()
            .unwrap();
        // Only the 1 = 1 pair; the two nulls do not pair up.
        assert_eq!(t.row_count(), 1);
        assert_eq!(t.column("k").unwrap().values[0], Value::Int(1));
    }

    #[test]
    fn test_overlapping_columns_suffixed() {
        let left = Table::from_columns(vec![
            ("k", vec![Value::Int(1)]),
            ("note", vec![Value::Str("from left".into())]),
        ])
        .unwrap();
        let right = Table::from_columns(vec![
            ("k", vec![Value::Int(1)]),
            ("note", vec![Value::Str("from right".into())]),
        ])
        .unwrap();
        let t = JoinOperation::new(left, right, JoinType::Inner, &["k"], None)
            .unwrap()
            .execute()
            .unwrap();
        assert_eq!(t.column_names(), vec!["k", "note_x", "note_y"]);

        let left = Table::from_columns(vec![
            ("k", vec![Value::Int(1)]),
            ("note", vec![Value::Str("l".into())]),
        ])
        .unwrap();
        let right = Table::from_columns(vec![
            ("k", vec![Value::Int(1)]),
            ("note", vec![Value::Str("r".into())]),
        ])
        .unwrap();
        let t = JoinOperation::new(left, right, JoinType::Inner, &["k"], Some(("_a", "_b")))
            .unwrap()
            .execute()
            .unwrap();
        assert_eq!(t.column_names(), vec!["k", "note_a", "note_b"]);
    }

    #[test]
    fn test_one_to_many_expands() {
        let left = Table::from_columns(vec![("k", vec![Value::Int(1)])]).unwrap();
        let right = Table::from_columns(vec![
            ("k", vec![Value::Int(1), Value::Int(1)]),
            ("b", vec![Value::Int(20), Value::Int(21)]),
        ])
        .unwrap();
        let t = JoinOperation::new(left, right, JoinType::Inner, &["k"], None)
            .unwrap()
            .execute()
            .unwrap();
        assert_eq!(t.row_count(), 2);
    }

    // ── Validation ─────────────────────────────────────────────────────

    #[test]
    fn test_missing_join_column_rejected() {
        assert!(matches!(
            JoinOperation::new(calls(), contacts(), JoinType::Inner, &["name"], None),
            Err(Error::Query { .. })
        ));
        assert!(JoinOperation::new(calls(), contacts(), JoinType::Inner, &[], None).is_err());
    }

    #[test]
    fn test_join_type_parsing() {
        assert_eq!("outer".parse::<JoinType>().unwrap(), JoinType::Outer);
        assert!("cross".parse::<JoinType>().is_err());
    }
}
