//! Version comparison: schema, row, statistical, and metadata diffs.

use crate::config::DIFF_CAP;
use crate::table::Table;
use crate::value::Value;
use crate::versioning::metadata::DatasetVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One changed cell between two versions of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellChange {
    /// Row position (tables are compared positionally).
    pub row: usize,
    /// Column name.
    pub column: String,
    /// Cell value in the older version.
    pub old_value: Value,
    /// Cell value in the newer version.
    pub new_value: Value,
}

/// Per-column statistical deltas for numeric columns common to both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatsDiff {
    /// Difference of means (second minus first).
    pub mean_diff: f64,
    /// Difference of standard deviations.
    pub std_diff: f64,
    /// Difference of minima.
    pub min_diff: f64,
    /// Difference of maxima.
    pub max_diff: f64,
}

/// Structural and cell-level differences between two tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDiff {
    /// Columns present only in the second table.
    pub added_columns: Vec<String>,
    /// Columns present only in the first table.
    pub removed_columns: Vec<String>,
    /// Changed cells in common columns, compared row-by-row. Only populated
    /// when both tables have the same row count.
    pub modified_cells: Vec<CellChange>,
    /// `true` when `modified_cells` was cut off at the reporting cap.
    pub truncated: bool,
    /// Statistical deltas for common numeric columns.
    pub statistical_differences: BTreeMap<String, ColumnStatsDiff>,
}

/// One entry in the changes-annotation diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEntry {
    /// Key present only in the second version.
    Added {
        /// The new value.
        value: String,
    },
    /// Key present only in the first version.
    Removed {
        /// The removed value.
        value: String,
    },
    /// Key present in both with different values.
    Modified {
        /// Value in the first version.
        old_value: String,
        /// Value in the second version.
        new_value: String,
    },
}

/// Differences between two version metadata records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDiff {
    /// Whether the author differs.
    pub author_changed: bool,
    /// Second timestamp minus first, in seconds.
    pub time_difference_seconds: i64,
    /// Whether the description differs.
    pub description_changed: bool,
    /// Per-key diff of the changes annotations.
    pub changes_diff: BTreeMap<String, ChangeEntry>,
}

/// Parent-pointer context for the two compared versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageInfo {
    /// Parent of the first version.
    pub version1_parent: Option<u32>,
    /// Parent of the second version.
    pub version2_parent: Option<u32>,
    /// `true` when one version is the direct parent of the other.
    pub direct_relationship: bool,
}

/// Full comparison report between two versions of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionComparison {
    /// The dataset compared.
    pub dataset_name: String,
    /// First (older side) version number.
    pub version1: u32,
    /// Second (newer side) version number.
    pub version2: u32,
    /// Timestamp of the first version.
    pub timestamp1: DateTime<Utc>,
    /// Timestamp of the second version.
    pub timestamp2: DateTime<Utc>,
    /// Row count of the first version.
    pub record_count1: usize,
    /// Row count of the second version.
    pub record_count2: usize,
    /// Second row count minus first.
    pub record_count_diff: i64,
    /// Column count of the first version.
    pub column_count1: usize,
    /// Column count of the second version.
    pub column_count2: usize,
    /// Table-level differences.
    pub data_diff: TableDiff,
    /// Metadata-level differences.
    pub metadata_diff: MetadataDiff,
    /// Lineage context.
    pub lineage: LineageInfo,
}

/// Builds a comparison report from both tables and both metadata records.
pub fn compare(
    dataset_name: &str,
    table1: &Table,
    table2: &Table,
    meta1: &DatasetVersion,
    meta2: &DatasetVersion,
) -> VersionComparison {
    VersionComparison {
        dataset_name: dataset_name.to_owned(),
        version1: meta1.version_number,
        version2: meta2.version_number,
        timestamp1: meta1.timestamp,
        timestamp2: meta2.timestamp,
        record_count1: table1.row_count(),
        record_count2: table2.row_count(),
        record_count_diff: table2.row_count() as i64 - table1.row_count() as i64,
        column_count1: table1.column_count(),
        column_count2: table2.column_count(),
        data_diff: diff_tables(table1, table2),
        metadata_diff: diff_metadata(meta1, meta2),
        lineage: LineageInfo {
            version1_parent: meta1.parent_version,
            version2_parent: meta2.parent_version,
            direct_relationship: meta1.parent_version == Some(meta2.version_number)
                || meta2.parent_version == Some(meta1.version_number),
        },
    }
}

fn diff_tables(table1: &Table, table2: &Table) -> TableDiff {
    let names1: BTreeSet<&str> = table1.column_names().into_iter().collect();
    let names2: BTreeSet<&str> = table2.column_names().into_iter().collect();

    let added_columns = names2
        .difference(&names1)
        .map(|s| s.to_string())
        .collect();
    let removed_columns = names1
        .difference(&names2)
        .map(|s| s.to_string())
        .collect();
    let common: Vec<&str> = names1.intersection(&names2).copied().collect();

    // Tables carry no row keys, so cell diffs are positional and only
    // meaningful when both sides have the same number of rows.
    let mut modified_cells = Vec::new();
    let mut truncated = false;
    if table1.row_count() == table2.row_count() {
        'rows: for row in 0..table1.row_count() {
            for &name in &common {
                let old = &table1.column(name).map(|c| c.values[row].clone());
                let new = &table2.column(name).map(|c| c.values[row].clone());
                if let (Some(old), Some(new)) = (old, new) {
                    if old != new {
                        if modified_cells.len() >= DIFF_CAP {
                            truncated = true;
                            break 'rows;
                        }
                        modified_cells.push(CellChange {
                            row,
                            column: name.to_owned(),
                            old_value: old.clone(),
                            new_value: new.clone(),
                        });
                    }
                }
            }
        }
    }

    let mut statistical_differences = BTreeMap::new();
    for &name in &common {
        let (Some(c1), Some(c2)) = (table1.column(name), table2.column(name)) else {
            continue;
        };
        if !c1.is_numeric() || !c2.is_numeric() {
            continue;
        }
        let (Some(s1), Some(s2)) = (ColumnStats::of(&c1.values), ColumnStats::of(&c2.values))
        else {
            continue;
        };
        statistical_differences.insert(
            name.to_owned(),
            ColumnStatsDiff {
                mean_diff: s2.mean - s1.mean,
                std_diff: s2.std - s1.std,
                min_diff: s2.min - s1.min,
                max_diff: s2.max - s1.max,
            },
        );
    }

    TableDiff {
        added_columns,
        removed_columns,
        modified_cells,
        truncated,
        statistical_differences,
    }
}

fn diff_metadata(meta1: &DatasetVersion, meta2: &DatasetVersion) -> MetadataDiff {
    let mut changes_diff = BTreeMap::new();
    for (k, v) in &meta2.changes {
        match meta1.changes.get(k) {
            None => {
                changes_diff.insert(k.clone(), ChangeEntry::Added { value: v.clone() });
            }
            Some(old) if old != v => {
                changes_diff.insert(
                    k.clone(),
                    ChangeEntry::Modified {
                        old_value: old.clone(),
                        new_value: v.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }
    for (k, v) in &meta1.changes {
        if !meta2.changes.contains_key(k) {
            changes_diff.insert(k.clone(), ChangeEntry::Removed { value: v.clone() });
        }
    }
    MetadataDiff {
        author_changed: meta1.author != meta2.author,
        time_difference_seconds: (meta2.timestamp - meta1.timestamp).num_seconds(),
        description_changed: meta1.description != meta2.description,
        changes_diff,
    }
}

struct ColumnStats {
    mean: f64,
    std: f64,
    min: f64,
    max: f64,
}

impl ColumnStats {
    /// Sample statistics over the non-null cells, `None` when there are none.
    fn of(values: &[Value]) -> Option<Self> {
        let nums: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
        if nums.is_empty() {
            return None;
        }
        let n = nums.len() as f64;
        let mean = nums.iter().sum::<f64>() / n;
        let std = if nums.len() > 1 {
            (nums.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        let min = nums.iter().copied().fold(f64::INFINITY, f64::min);
        let max = nums.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self { mean, std, min, max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(n: u32, parent: Option<u32>, desc: &str) -> DatasetVersion {
        DatasetVersion::new(n, desc, None, BTreeMap::new(), parent)
    }

    fn table(values: Vec<i64>) -> Table {
        Table::from_columns(vec![(
            "amount",
            values.into_iter().map(Value::Int).collect(),
        )])
        .unwrap()
    }

    #[test]
    fn test_cell_diff_positional() {
        let t1 = table(vec![1, 2, 3]);
        let t2 = table(vec![1, 5, 3]);
        let report = compare("d", &t1, &t2, &meta(1, None, "a"), &meta(2, Some(1), "b"));
        assert_eq!(report.data_diff.modified_cells.len(), 1);
        let change = &report.data_diff.modified_cells[0];
        assert_eq!(change.row, 1);
        assert_eq!(change.old_value, Value::Int(2));
        assert_eq!(change.new_value, Value::Int(5));
        assert!(!report.data_diff.truncated);
    }

    #[test]
    fn test_cell_diff_skipped_on_row_count_change() {
        let t1 = table(vec![1, 2]);
        let t2 = table(vec![1, 2, 3]);
        let report = compare("d", &t1, &t2, &meta(1, None, ""), &meta(2, Some(1), ""));
        assert!(report.data_diff.modified_cells.is_empty());
        assert_eq!(report.record_count_diff, 1);
    }

    #[test]
    fn test_cell_diff_truncates_at_cap() {
        let t1 = table((0..150).collect());
        let t2 = table((0..150).map(|x| x + 1).collect());
        let report = compare("d", &t1, &t2, &meta(1, None, ""), &meta(2, Some(1), ""));
        assert_eq!(report.data_diff.modified_cells.len(), DIFF_CAP);
        assert!(report.data_diff.truncated);
    }

    #[test]
    fn test_column_diff() {
        let t1 = Table::from_columns(vec![("a", vec![Value::Int(1)])]).unwrap();
        let t2 = Table::from_columns(vec![("b", vec![Value::Int(1)])]).unwrap();
        let report = compare("d", &t1, &t2, &meta(1, None, ""), &meta(2, Some(1), ""));
        assert_eq!(report.data_diff.added_columns, vec!["b"]);
        assert_eq!(report.data_diff.removed_columns, vec!["a"]);
    }

    #[test]
    fn test_statistical_diff() {
        let t1 = table(vec![1, 2, 3]);
        let t2 = table(vec![2, 3, 4]);
        let report = compare("d", &t1, &t2, &meta(1, None, ""), &meta(2, Some(1), ""));
        let stats = &report.data_diff.statistical_differences["amount"];
        assert!((stats.mean_diff - 1.0).abs() < 1e-9);
        assert!((stats.min_diff - 1.0).abs() < 1e-9);
        assert!((stats.max_diff - 1.0).abs() < 1e-9);
        assert!(stats.std_diff.abs() < 1e-9);
    }

    #[test]
    fn test_metadata_changes_diff() {
        let mut m1 = meta(1, None, "first");
        m1.changes.insert("kept".into(), "same".into());
        m1.changes.insert("gone".into(), "x".into());
        m1.changes.insert("edited".into(), "old".into());
        let mut m2 = meta(2, Some(1), "second");
        m2.changes.insert("kept".into(), "same".into());
        m2.changes.insert("edited".into(), "new".into());
        m2.changes.insert("fresh".into(), "y".into());

        let t = table(vec![1]);
        let report = compare("d", &t, &t, &m1, &m2);
        let diff = &report.metadata_diff.changes_diff;
        assert!(matches!(diff["fresh"], ChangeEntry::Added { .. }));
        assert!(matches!(diff["gone"], ChangeEntry::Removed { .. }));
        assert!(matches!(diff["edited"], ChangeEntry::Modified { .. }));
        assert!(!diff.contains_key("kept"));
        assert!(report.metadata_diff.description_changed);
    }

    #[test]
    fn test_direct_relationship() {
        let t = table(vec![1]);
        let report = compare("d", &t, &t, &meta(1, None, ""), &meta(2, Some(1), ""));
        assert!(report.lineage.direct_relationship);
        let report = compare("d", &t, &t, &meta(2, Some(1), ""), &meta(3, Some(1), ""));
        assert!(!report.lineage.direct_relationship);
    }
}
