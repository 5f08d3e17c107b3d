//! Cell values for tabular data.
//!
//! A [`Value`] is a single typed cell. [`ValueKind`] names the non-null kind
//! of a column, and [`IndexKey`] is the hashable projection used by the
//! secondary indexer, joins, and grouping. Numeric comparisons coerce
//! integers and floats to a common `f64` with an epsilon tolerance.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single typed cell value.
///
/// Uses the default externally-tagged serde representation for bincode
/// compatibility; the JSON sidecars only ever carry metadata, never cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Missing value. Excluded from indices and never matched by comparisons.
    Null,
    /// Boolean value (`true` / `false`).
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating-point number.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Timezone-aware timestamp (UTC).
    Timestamp(DateTime<Utc>),
}

/// The kind of a non-null [`Value`]. Columns hold exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    /// Boolean column.
    Bool,
    /// Integer column.
    Int,
    /// Float column.
    Float,
    /// String column.
    Str,
    /// Timestamp column.
    Timestamp,
}

impl Value {
    /// Returns the kind of this value, or `None` for [`Value::Null`].
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Int(_) => Some(ValueKind::Int),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Str(_) => Some(ValueKind::Str),
            Value::Timestamp(_) => Some(ValueKind::Timestamp),
        }
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as an `f64` if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the value as a string slice if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Equality with numeric coercion: `Int(1)` equals `Float(1.0)`.
    ///
    /// Nulls never equal anything, including other nulls — a null cell is
    /// "unknown", not a comparable value.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
                _ => false,
            },
        }
    }

    /// Ordering comparison for filters.
    ///
    /// Returns `None` when the values are not comparable (null on either
    /// side, or mismatched non-numeric kinds); `Int` and `Float` compare
    /// through `f64`.
    pub fn partial_cmp_value(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Total ordering used when sorting a column.
    ///
    /// Nulls sort first; mismatched kinds fall back to kind order so the
    /// sort is total even on malformed data.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        self.partial_cmp_value(other)
            .unwrap_or_else(|| self.kind_rank().cmp(&other.kind_rank()))
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Timestamp(_) => 3,
            Value::Str(_) => 4,
        }
    }

    /// Coerces the value to a UTC timestamp.
    ///
    /// `Timestamp` cells pass through; `Str` cells are parsed as
    /// `YYYY-MM-DD HH:MM:SS`, RFC 3339, or a bare `YYYY-MM-DD` date
    /// (midnight). Anything else yields `None`.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Str(s) => parse_datetime(s),
            _ => None,
        }
    }
}

/// Parse a timestamp string in the formats the engine accepts.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

/// Hashable, orderable projection of a non-null [`Value`].
///
/// Floats are keyed by bit pattern, so index lookups are exact-match (the
/// epsilon tolerance of [`Value::loose_eq`] does not apply to indices, joins,
/// or grouping).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKey {
    /// Boolean key.
    Bool(bool),
    /// Integer key.
    Int(i64),
    /// Float key, by IEEE-754 bit pattern.
    Float(u64),
    /// String key.
    Str(String),
    /// Timestamp key, as microseconds since the epoch.
    Timestamp(i64),
}

impl IndexKey {
    /// Projects a value into a key. `None` for nulls, which are never indexed.
    pub fn from_value(value: &Value) -> Option<IndexKey> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::Int(i) => Some(IndexKey::Int(*i)),
            Value::Float(f) => Some(IndexKey::Float(f.to_bits())),
            Value::Str(s) => Some(IndexKey::Str(s.clone())),
            Value::Timestamp(ts) => Some(IndexKey::Timestamp(ts.timestamp_micros())),
        }
    }
}
