//! Structured row filters.
//!
//! A filter is plain data: a column, an operator, and a comparison value
//! (or value list for membership operators). Null cells never match any
//! condition, including negated ones.

use crate::error::{Error, Result};
use crate::table::Table;
use crate::value::Value;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Comparison operator of a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Equal (numeric coercion applies).
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Member of the value list.
    In,
    /// Not a member of the value list.
    NotIn,
    /// String contains the given substring.
    Contains,
    /// String starts with the given prefix.
    StartsWith,
    /// String ends with the given suffix.
    EndsWith,
}

impl FromStr for FilterOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eq" | "==" => Ok(Self::Eq),
            "ne" | "!=" => Ok(Self::Ne),
            "gt" | ">" => Ok(Self::Gt),
            "gte" | ">=" => Ok(Self::Gte),
            "lt" | "<" => Ok(Self::Lt),
            "lte" | "<=" => Ok(Self::Lte),
            "in" => Ok(Self::In),
            "not_in" => Ok(Self::NotIn),
            "contains" => Ok(Self::Contains),
            "starts_with" => Ok(Self::StartsWith),
            "ends_with" => Ok(Self::EndsWith),
            other => Err(Error::query(format!("unknown filter operator '{other}'"))),
        }
    }
}

/// How multiple conditions combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    /// Every condition must match.
    #[default]
    And,
    /// Any condition may match.
    Or,
}

/// One filter condition against a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// The column to test.
    pub column: String,
    /// The comparison operator.
    pub op: FilterOp,
    /// Comparison value for scalar operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Value list for `In` / `NotIn`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
}

impl FilterCondition {
    /// A scalar condition (`Eq`, ordering, string operators).
    pub fn new(column: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            column: column.into(),
            op,
            value: Some(value),
            values: None,
        }
    }

    /// A membership condition (`In` / `NotIn`).
    pub fn with_values(column: impl Into<String>, op: FilterOp, values: Vec<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: None,
            values: Some(values),
        }
    }

    fn scalar(&self) -> Result<&Value> {
        self.value.as_ref().ok_or_else(|| {
            Error::query(format!(
                "operator {:?} on column '{}' requires a value",
                self.op, self.column
            ))
        })
    }

    fn list(&self) -> Result<&[Value]> {
        self.values.as_deref().ok_or_else(|| {
            Error::query(format!(
                "operator {:?} on column '{}' requires a value list",
                self.op, self.column
            ))
        })
    }

    /// Whether a single cell matches this condition. Null cells never match.
    pub fn matches(&self, cell: &Value) -> Result<bool> {
        if cell.is_null() {
            return Ok(false);
        }
        match self.op {
            FilterOp::Eq => Ok(cell.loose_eq(self.scalar()?)),
            FilterOp::Ne => Ok(!cell.loose_eq(self.scalar()?)),
            FilterOp::Gt => Ok(matches!(
                cell.partial_cmp_value(self.scalar()?),
                Some(std::cmp::Ordering::Greater)
            )),
            FilterOp::Gte => Ok(matches!(
                cell.partial_cmp_value(self.scalar()?),
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            )),
            FilterOp::Lt => Ok(matches!(
                cell.partial_cmp_value(self.scalar()?),
                Some(std::cmp::Ordering::Less)
            )),
            FilterOp::Lte => Ok(matches!(
                cell.partial_cmp_value(self.scalar()?),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            )),
            FilterOp::In => Ok(self.list()?.iter().any(|v| cell.loose_eq(v))),
            FilterOp::NotIn => Ok(!self.list()?.iter().any(|v| cell.loose_eq(v))),
            FilterOp::Contains | FilterOp::StartsWith | FilterOp::EndsWith => {
                let needle = self.scalar()?.as_str().ok_or_else(|| {
                    Error::query(format!(
                        "operator {:?} on column '{}' requires a string value",
                        self.op, self.column
                    ))
                })?;
                Ok(cell.as_str().is_some_and(|s| match self.op {
                    FilterOp::Contains => s.contains(needle),
                    FilterOp::StartsWith => s.starts_with(needle),
                    FilterOp::EndsWith => s.ends_with(needle),
                    _ => unreachable!(),
                }))
            }
        }
    }
}

/// Applies condition lists to tables.
pub struct ComplexFilter;

impl ComplexFilter {
    /// Rows matching the conditions, combined with `combine`.
    ///
    /// An empty condition list returns a content-equal copy of the table.
    /// An unknown column fails with [`Error::ColumnNotFound`] before any
    /// row is evaluated.
    pub fn apply(table: &Table, conditions: &[FilterCondition], combine: Combine) -> Result<Table> {
        if conditions.is_empty() {
            return Ok(table.clone());
        }
        for cond in conditions {
            if !table.has_column(&cond.column) {
                return Err(Error::column_not_found(cond.column.clone(), None));
            }
        }
        let mut rows = Vec::new();
        for row in 0..table.row_count() {
            let mut keep: Option<bool> = None;
            for cond in conditions {
                let cell = table
                    .column(&cond.column)
                    .map(|c| &c.values[row])
                    .ok_or_else(|| Error::column_not_found(cond.column.clone(), None))?;
                let hit = cond.matches(cell)?;
                keep = Some(match (keep, combine) {
                    (None, _) => hit,
                    (Some(prev), Combine::And) => prev && hit,
                    (Some(prev), Combine::Or) => prev || hit,
                });
                if combine == Combine::And && keep == Some(false) {
                    break;
                }
            }
            if keep == Some(true) {
                rows.push(row);
            }
        }
        Ok(table.take_rows(&rows))
    }

    /// Rows whose timestamp column falls within `[start, end]`, inclusive.
    ///
    /// The end date covers its whole day. Cells are coerced through
    /// [`Value::as_datetime`]; uncoercible cells never match.
    pub fn apply_date_range(
        table: &Table,
        column: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Table> {
        let col = table
            .column(column)
            .ok_or_else(|| Error::column_not_found(column, None))?;
        let start = start
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| Error::query("invalid start date"))?
            .and_utc();
        let end = end
            .and_hms_milli_opt(23, 59, 59, 999)
            .ok_or_else(|| Error::query("invalid end date"))?
            .and_utc();
        if end < start {
            return Err(Error::query("date range end precedes start"));
        }
        let rows: Vec<usize> = col
            .values
            .iter()
            .enumerate()
            .filter(|(_, v)| {
                v.as_datetime()
                    .is_some_and(|ts| ts >= start && ts <= end)
            })
            .map(|(i, _)| i)
            .collect();
        Ok(table.take_rows(&rows))
    }

    /// Rows where every listed column holds one of its allowed values.
    pub fn apply_value_sets(
        table: &Table,
        criteria: &BTreeMap<String, Vec<Value>>,
    ) -> Result<Table> {
        let conditions: Vec<FilterCondition> = criteria
            .iter()
            .map(|(column, values)| {
                FilterCondition::with_values(column.clone(), FilterOp::In, values.clone())
            })
            .collect();
        Self::apply(table, &conditions, Combine::And)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::from_columns(vec![
            (
                "number",
                vec![
                    Value::Str("555-0100".into()),
                    Value::Str("555-0101".into()),
                    Value::Str("777-0100".into()),
                    Value::Null,
                ],
            ),
            (
                "duration",
                vec![
                    Value::Int(60),
                    Value::Int(120),
                    Value::Int(30),
                    Value::Int(90),
                ],
            ),
            (
                "ts",
                vec![
                    Value::Str("2023-01-01 10:00:00".into()),
                    Value::Str("2023-01-15 11:00:00".into()),
                    Value::Str("2023-02-01 09:00:00".into()),
                    Value::Str("2023-02-15 23:59:00".into()),
                ],
            ),
        ])
        .unwrap()
    }

    // ── Single conditions ──────────────────────────────────────────────

    #[test]
    fn test_eq_and_ordering() {
        let t = table();
        let eq = ComplexFilter::apply(
            &t,
            &[FilterCondition::new(
                "number",
                FilterOp::Eq,
                Value::Str("555-0100".into()),
            )],
            Combine::And,
        )
        .unwrap();
        assert_eq!(eq.row_count(), 1);

        let gt = ComplexFilter::apply(
            &t,
            &[FilterCondition::new("duration", FilterOp::Gt, Value::Int(60))],
            Combine::And,
        )
        .unwrap();
        assert_eq!(gt.row_count(), 2);

        let gte = ComplexFilter::apply(
            &t,
            &[FilterCondition::new(
                "duration",
                FilterOp::Gte,
                Value::Float(60.0),
            )],
            Combine::And,
        )
        .unwrap();
        assert_eq!(gte.row_count(), 3);
    }

    #[test]
    fn test_null_never_matches() {
        let t = table();
        let ne = ComplexFilter::apply(
            &t,
            &[FilterCondition::new(
                "number",
                FilterOp::Ne,
                Value::Str("zzz".into()),
            )],
            Combine::And,
        )
        .unwrap();
        // The null row is excluded even from the negated condition.
        assert_eq!(ne.row_count(), 3);
    }

    #[test]
    fn test_string_operators() {
        let t = table();
        let starts = ComplexFilter::apply(
            &t,
            &[FilterCondition::new(
                "number",
                FilterOp::StartsWith,
                Value::Str("555".into()),
            )],
            Combine::And,
        )
        .unwrap();
        assert_eq!(starts.row_count(), 2);

        let ends = ComplexFilter::apply(
            &t,
            &[FilterCondition::new(
                "number",
                FilterOp::EndsWith,
                Value::Str("0100".into()),
            )],
            Combine::And,
        )
        .unwrap();
        assert_eq!(ends.row_count(), 2);

        let contains = ComplexFilter::apply(
            &t,
            &[FilterCondition::new(
                "number",
                FilterOp::Contains,
                Value::Str("0101".into()),
            )],
            Combine::And,
        )
        .unwrap();
        assert_eq!(contains.row_count(), 1);
    }

    #[test]
    fn test_membership() {
        let t = table();
        let within = ComplexFilter::apply(
            &t,
            &[FilterCondition::with_values(
                "duration",
                FilterOp::In,
                vec![Value::Int(60), Value::Int(30)],
            )],
            Combine::And,
        )
        .unwrap();
        assert_eq!(within.row_count(), 2);

        let outside = ComplexFilter::apply(
            &t,
            &[FilterCondition::with_values(
                "duration",
                FilterOp::NotIn,
                vec![Value::Int(60), Value::Int(30)],
            )],
            Combine::And,
        )
        .unwrap();
        assert_eq!(outside.row_count(), 2);
    }

    // ── Combination ────────────────────────────────────────────────────

    #[test]
    fn test_and_or_combination() {
        let t = table();
        let conds = [
            FilterCondition::new("number", FilterOp::StartsWith, Value::Str("555".into())),
            FilterCondition::new("duration", FilterOp::Gt, Value::Int(100)),
        ];
        let both = ComplexFilter::apply(&t, &conds, Combine::And).unwrap();
        assert_eq!(both.row_count(), 1);
        let either = ComplexFilter::apply(&t, &conds, Combine::Or).unwrap();
        assert_eq!(either.row_count(), 2);
    }

    #[test]
    fn test_empty_conditions_identity() {
        let t = table();
        let out = ComplexFilter::apply(&t, &[], Combine::And).unwrap();
        assert_eq!(out, t);
    }

    #[test]
    fn test_unknown_column_fails() {
        let t = table();
        assert!(matches!(
            ComplexFilter::apply(
                &t,
                &[FilterCondition::new("nope", FilterOp::Eq, Value::Int(1))],
                Combine::And
            ),
            Err(Error::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_value_is_query_error() {
        let t = table();
        let cond = FilterCondition {
            column: "duration".into(),
            op: FilterOp::Gt,
            value: None,
            values: None,
        };
        assert!(matches!(
            ComplexFilter::apply(&t, &[cond], Combine::And),
            Err(Error::Query { .. })
        ));
    }

    // ── Date range ─────────────────────────────────────────────────────

    #[test]
    fn test_date_range_inclusive_end_of_day() {
        let t = table();
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2023, 2, 15).unwrap();
        let out = ComplexFilter::apply_date_range(&t, "ts", start, end).unwrap();
        // The 23:59 row on the end date is included.
        assert_eq!(out.row_count(), 4);

        let narrower = ComplexFilter::apply_date_range(
            &t,
            "ts",
            start,
            NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
        )
        .unwrap();
        assert_eq!(narrower.row_count(), 2);
    }

    #[test]
    fn test_date_range_inverted_fails() {
        let t = table();
        let start = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert!(ComplexFilter::apply_date_range(&t, "ts", start, end).is_err());
    }

    // ── Value sets ─────────────────────────────────────────────────────

    #[test]
    fn test_value_sets_intersect() {
        let t = table();
        let mut criteria = BTreeMap::new();
        criteria.insert(
            "number".to_owned(),
            vec![Value::Str("555-0100".into()), Value::Str("777-0100".into())],
        );
        criteria.insert("duration".to_owned(), vec![Value::Int(60)]);
        let out = ComplexFilter::apply_value_sets(&t, &criteria).unwrap();
        assert_eq!(out.row_count(), 1);
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!("gte".parse::<FilterOp>().unwrap(), FilterOp::Gte);
        assert_eq!(">=".parse::<FilterOp>().unwrap(), FilterOp::Gte);
        assert!("between".parse::<FilterOp>().is_err());
    }
}
