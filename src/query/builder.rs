//! Fluent query builder and its serializable plan.
//!
//! A [`QuerySpec`] is the plain-data form of a query: filter steps,
//! projection, grouping, aggregates, ordering, and a limit. The builder
//! accumulates one and [`QueryBuilder::execute`] runs it in a fixed order:
//! filters, then grouping/aggregation, then projection (skipped when
//! grouping), then sort, then limit.

use crate::error::{Error, Result};
use crate::query::filter::{Combine, FilterCondition};
use crate::table::{Column, Table};
use crate::value::{IndexKey, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregation function over one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// Count of non-null cells.
    Count,
    /// Sum of numeric cells.
    Sum,
    /// Mean of numeric cells.
    Mean,
    /// Smallest non-null cell.
    Min,
    /// Largest non-null cell.
    Max,
    /// Sample standard deviation of numeric cells.
    Std,
}

impl Aggregate {
    /// Suffix used in result column names (`column_aggregate`).
    pub fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Std => "std",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// One filter step: how it combines with the steps before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStep {
    /// Combination with the running result. Ignored on the first step.
    pub combine: Combine,
    /// The condition itself.
    pub condition: FilterCondition,
}

/// One aggregation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    /// The column to aggregate.
    pub column: String,
    /// The function to apply.
    pub agg: Aggregate,
}

/// Result ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Column of the result table to sort by.
    pub column: String,
    /// Sort direction.
    pub order: SortOrder,
}

/// A complete, serializable query plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Filter steps, applied row-wise in order.
    #[serde(default)]
    pub filters: Vec<FilterStep>,
    /// Columns to keep. Ignored when grouping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    /// Grouping columns. Rows with a null group key are dropped.
    #[serde(default)]
    pub group_by: Vec<String>,
    /// Aggregates to compute, per group or over the whole table.
    #[serde(default)]
    pub aggregates: Vec<AggregateSpec>,
    /// Result ordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderBy>,
    /// Maximum result rows. `Some(0)` is valid and yields no rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Builds and runs a [`QuerySpec`] against one table.
pub struct QueryBuilder {
    table: Table,
    spec: QuerySpec,
}

impl QueryBuilder {
    /// Starts an empty query over a table.
    pub fn new(table: Table) -> Self {
        Self {
            table,
            spec: QuerySpec::default(),
        }
    }

    /// Runs an existing plan against a table.
    pub fn from_spec(table: Table, spec: QuerySpec) -> Self {
        Self { table, spec }
    }

    /// The accumulated plan.
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Adds the first filter condition.
    pub fn filter(self, condition: FilterCondition) -> Self {
        self.push_filter(Combine::And, condition)
    }

    /// Adds a condition combined with AND.
    pub fn and_where(self, condition: FilterCondition) -> Self {
        self.push_filter(Combine::And, condition)
    }

    /// Adds a condition combined with OR.
    pub fn or_where(self, condition: FilterCondition) -> Self {
        self.push_filter(Combine::Or, condition)
    }

    fn push_filter(mut self, combine: Combine, condition: FilterCondition) -> Self {
        self.spec.filters.push(FilterStep { combine, condition });
        self
    }

    /// Keeps only the named columns (ignored when grouping).
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.spec.select = Some(columns.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Groups by the named columns.
    pub fn group_by(mut self, columns: &[&str]) -> Self {
        self.spec.group_by = columns.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Adds an aggregate; the result column is named `column_aggregate`.
    pub fn aggregate(mut self, column: impl Into<String>, agg: Aggregate) -> Self {
        self.spec.aggregates.push(AggregateSpec {
            column: column.into(),
            agg,
        });
        self
    }

    /// Sorts the result by a column.
    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.spec.order_by = Some(OrderBy {
            column: column.into(),
            order,
        });
        self
    }

    /// Caps the number of result rows.
    pub fn limit(mut self, n: usize) -> Self {
        self.spec.limit = Some(n);
        self
    }

    /// Runs the plan and returns the result table.
    pub fn execute(&self) -> Result<Table> {
        let mut result = apply_filters(&self.table, &self.spec.filters)?;

        if !self.spec.group_by.is_empty() || !self.spec.aggregates.is_empty() {
            result = group_and_aggregate(&result, &self.spec.group_by, &self.spec.aggregates)?;
        } else if let Some(select) = &self.spec.select {
            result = project(&result, select)?;
        }

        if let Some(order) = &self.spec.order_by {
            result =
                result.sort_by_column(&order.column, order.order == SortOrder::Ascending)?;
        }
        if let Some(n) = self.spec.limit {
            result = result.head(n);
        }
        Ok(result)
    }
}

fn apply_filters(table: &Table, steps: &[FilterStep]) -> Result<Table> {
    if steps.is_empty() {
        return Ok(table.clone());
    }
    for step in steps {
        if !table.has_column(&step.condition.column) {
            return Err(Error::column_not_found(step.condition.column.clone(), None));
        }
    }
    let mut rows = Vec::new();
    for row in 0..table.row_count() {
        let mut keep: Option<bool> = None;
        for step in steps {
            let cell = table
                .column(&step.condition.column)
                .map(|c| &c.values[row])
                .ok_or_else(|| Error::column_not_found(step.condition.column.clone(), None))?;
            let hit = step.condition.matches(cell)?;
            keep = Some(match keep {
                None => hit,
                Some(prev) => match step.combine {
                    Combine::And => prev && hit,
                    Combine::Or => prev || hit,
                },
            });
        }
        if keep == Some(true) {
            rows.push(row);
        }
    }
    Ok(table.take_rows(&rows))
}

fn project(table: &Table, columns: &[String]) -> Result<Table> {
    let selected: Result<Vec<Column>> = columns
        .iter()
        .map(|name| {
            table
                .column(name)
                .cloned()
                .ok_or_else(|| Error::column_not_found(name.clone(), None))
        })
        .collect();
    Table::new(selected?)
}

fn group_and_aggregate(
    table: &Table,
    group_by: &[String],
    aggregates: &[AggregateSpec],
) -> Result<Table> {
    for name in group_by {
        if !table.has_column(name) {
            return Err(Error::column_not_found(name.clone(), None));
        }
    }
    for spec in aggregates {
        if !table.has_column(&spec.column) {
            return Err(Error::column_not_found(spec.column.clone(), None));
        }
    }

    // Group keys sort ascending, so grouped output is deterministic.
    let mut groups: BTreeMap<Vec<IndexKey>, Vec<usize>> = BTreeMap::new();
    if group_by.is_empty() {
        groups.insert(Vec::new(), (0..table.row_count()).collect());
    } else {
        for row in 0..table.row_count() {
            let key: Option<Vec<IndexKey>> = group_by
                .iter()
                .map(|name| {
                    table
                        .column(name)
                        .and_then(|c| IndexKey::from_value(&c.values[row]))
                })
                .collect();
            // Rows with a null group key belong to no group.
            if let Some(key) = key {
                groups.entry(key).or_default().push(row);
            }
        }
    }

    let mut out: Vec<Column> = group_by
        .iter()
        .map(|name| Column::new(name.clone(), Vec::new()))
        .collect();
    for spec in aggregates {
        out.push(Column::new(
            format!("{}_{}", spec.column, spec.agg.name()),
            Vec::new(),
        ));
    }

    for rows in groups.values() {
        for (i, name) in group_by.iter().enumerate() {
            let cell = table
                .column(name)
                .map(|c| c.values[rows[0]].clone())
                .ok_or_else(|| Error::column_not_found(name.clone(), None))?;
            out[i].values.push(cell);
        }
        for (i, spec) in aggregates.iter().enumerate() {
            let column = table
                .column(&spec.column)
                .ok_or_else(|| Error::column_not_found(spec.column.clone(), None))?;
            out[group_by.len() + i]
                .values
                .push(aggregate_cells(column, rows, spec.agg)?);
        }
    }
    Table::new(out)
}

fn aggregate_cells(column: &Column, rows: &[usize], agg: Aggregate) -> Result<Value> {
    let cells = || rows.iter().map(|&r| &column.values[r]);
    let require_numeric = || -> Result<Vec<f64>> {
        if let Some(kind) = column.kind() {
            if !matches!(kind, ValueKind::Int | ValueKind::Float) {
                return Err(Error::query(format!(
                    "cannot compute {} over non-numeric column '{}'",
                    agg.name(),
                    column.name
                )));
            }
        }
        Ok(cells().filter_map(Value::as_f64).collect())
    };

    match agg {
        Aggregate::Count => Ok(Value::Int(cells().filter(|v| !v.is_null()).count() as i64)),
        Aggregate::Sum => {
            let nums = require_numeric()?;
            let sum: f64 = nums.iter().sum();
            if column.kind() == Some(ValueKind::Int) {
                Ok(Value::Int(sum as i64))
            } else {
                Ok(Value::Float(sum))
            }
        }
        Aggregate::Mean => {
            let nums = require_numeric()?;
            if nums.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::Float(nums.iter().sum::<f64>() / nums.len() as f64))
            }
        }
        Aggregate::Std => {
            let nums = require_numeric()?;
            if nums.len() < 2 {
                return Ok(Value::Null);
            }
            let n = nums.len() as f64;
            let mean = nums.iter().sum::<f64>() / n;
            let var = nums.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
            Ok(Value::Float(var.sqrt()))
        }
        Aggregate::Min => Ok(cells()
            .filter(|v| !v.is_null())
            .min_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Value::Null)),
        Aggregate::Max => Ok(cells()
            .filter(|v| !v.is_null())
            .max_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Value::Null)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::FilterOp;

    fn table() -> Table {
        Table::from_columns(vec![
            (
                "kind",
                vec![
                    Value::Str("call".into()),
                    Value::Str("sms".into()),
                    Value::Str("call".into()),
                    Value::Str("sms".into()),
                    Value::Str("call".into()),
                ],
            ),
            (
                "duration",
                vec![
                    Value::Int(60),
                    Value::Int(5),
                    Value::Int(120),
                    Value::Int(3),
                    Value::Int(30),
                ],
            ),
        ])
        .unwrap()
    }

    // ── Filtering and projection ───────────────────────────────────────

    #[test]
    fn test_filter_chain() {
        let result = QueryBuilder::new(table())
            .filter(FilterCondition::new(
                "kind",
                FilterOp::Eq,
                Value::Str("call".into()),
            ))
            .and_where(FilterCondition::new("duration", FilterOp::Gt, Value::Int(40)))
            .execute()
            .unwrap();
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn test_or_where() {
        let result = QueryBuilder::new(table())
            .filter(FilterCondition::new("duration", FilterOp::Gt, Value::Int(100)))
            .or_where(FilterCondition::new("duration", FilterOp::Lt, Value::Int(5)))
            .execute()
            .unwrap();
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn test_select_projects() {
        let result = QueryBuilder::new(table())
            .select(&["duration"])
            .execute()
            .unwrap();
        assert_eq!(result.column_names(), vec!["duration"]);
        assert_eq!(result.row_count(), 5);
    }

    #[test]
    fn test_select_unknown_column() {
        assert!(matches!(
            QueryBuilder::new(table()).select(&["nope"]).execute(),
            Err(Error::ColumnNotFound { .. })
        ));
    }

    // ── Grouping and aggregation ───────────────────────────────────────

    #[test]
    fn test_group_by_with_aggregates() {
        let result = QueryBuilder::new(table())
            .group_by(&["kind"])
            .aggregate("duration", Aggregate::Count)
            .aggregate("duration", Aggregate::Sum)
            .execute()
            .unwrap();
        assert_eq!(
            result.column_names(),
            vec!["kind", "duration_count", "duration_sum"]
        );
        // Groups come out in key order: "call" before "sms".
        assert_eq!(result.column("kind").unwrap().values[0], Value::Str("call".into()));
        assert_eq!(result.column("duration_count").unwrap().values[0], Value::Int(3));
        assert_eq!(result.column("duration_sum").unwrap().values[0], Value::Int(210));
        assert_eq!(result.column("duration_sum").unwrap().values[1], Value::Int(8));
    }

    #[test]
    fn test_aggregate_without_grouping() {
        let result = QueryBuilder::new(table())
            .aggregate("duration", Aggregate::Mean)
            .aggregate("duration", Aggregate::Max)
            .execute()
            .unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(
            result.column("duration_mean").unwrap().values[0],
            Value::Float(43.6)
        );
        assert_eq!(result.column("duration_max").unwrap().values[0], Value::Int(120));
    }

    #[test]
    fn test_aggregate_non_numeric_sum_fails() {
        assert!(matches!(
            QueryBuilder::new(table())
                .aggregate("kind", Aggregate::Sum)
                .execute(),
            Err(Error::Query { .. })
        ));
    }

    #[test]
    fn test_min_max_on_strings() {
        let result = QueryBuilder::new(table())
            .aggregate("kind", Aggregate::Min)
            .aggregate("kind", Aggregate::Max)
            .execute()
            .unwrap();
        assert_eq!(result.column("kind_min").unwrap().values[0], Value::Str("call".into()));
        assert_eq!(result.column("kind_max").unwrap().values[0], Value::Str("sms".into()));
    }

    #[test]
    fn test_null_group_keys_dropped() {
        let t = Table::from_columns(vec![
            ("g", vec![Value::Str("a".into()), Value::Null, Value::Str("a".into())]),
            ("x", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        ])
        .unwrap();
        let result = QueryBuilder::new(t)
            .group_by(&["g"])
            .aggregate("x", Aggregate::Count)
            .execute()
            .unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.column("x_count").unwrap().values[0], Value::Int(2));
    }

    // ── Ordering and limits ────────────────────────────────────────────

    #[test]
    fn test_order_and_limit() {
        let result = QueryBuilder::new(table())
            .order_by("duration", SortOrder::Descending)
            .limit(2)
            .execute()
            .unwrap();
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.column("duration").unwrap().values[0], Value::Int(120));
        assert_eq!(result.column("duration").unwrap().values[1], Value::Int(60));
    }

    #[test]
    fn test_limit_zero_is_valid() {
        let result = QueryBuilder::new(table()).limit(0).execute().unwrap();
        assert_eq!(result.row_count(), 0);
        assert_eq!(result.column_count(), 2);
    }

    #[test]
    fn test_from_spec_equals_fluent() {
        let fluent = QueryBuilder::new(table())
            .filter(FilterCondition::new(
                "kind",
                FilterOp::Eq,
                Value::Str("call".into()),
            ))
            .order_by("duration", SortOrder::Ascending)
            .limit(10);
        let spec = fluent.spec().clone();
        let replayed = QueryBuilder::from_spec(table(), spec).execute().unwrap();
        assert_eq!(replayed, fluent.execute().unwrap());
    }
}
