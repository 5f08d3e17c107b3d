//! Snapshot codec: CRC32-framed bincode for tables, JSON for sidecars.
//!
//! Dataset snapshots are framed `[bincode payload][magic "TBL1"][u32 CRC32 BE]`.
//! Decode verifies the checksum and re-validates table invariants before
//! handing the dataset back, so a corrupted or truncated blob surfaces as
//! [`Error::DatasetLoad`] rather than a malformed in-memory table.

use crate::config::{HISTORY_SUFFIX, SNAPSHOT_CRC_MAGIC, SNAPSHOT_SUFFIX};
use crate::dataset::Dataset;
use crate::error::{Error, Result};

/// Storage key of a dataset's live snapshot.
pub fn snapshot_key(name: &str) -> String {
    format!("{name}{SNAPSHOT_SUFFIX}")
}

/// Storage key of a dataset's version history sidecar.
pub fn history_key(name: &str) -> String {
    format!("{name}{HISTORY_SUFFIX}")
}

/// Storage key of one archived version snapshot.
pub fn version_snapshot_key(name: &str, version: u32) -> String {
    format!("{name}.v{version}{SNAPSHOT_SUFFIX}")
}

/// Encodes a dataset as a checksummed snapshot blob.
pub fn encode_dataset(dataset: &Dataset) -> Result<Vec<u8>> {
    let payload = bincode::serialize(dataset).map_err(|e| Error::DatasetSave {
        name: dataset.name.clone(),
        message: e.to_string(),
    })?;
    let crc = crc32fast::hash(&payload);
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(&payload);
    out.extend_from_slice(SNAPSHOT_CRC_MAGIC);
    out.extend_from_slice(&crc.to_be_bytes());
    tracing::debug!(
        "encoded snapshot for '{}' ({} bytes, CRC32={:#010x})",
        dataset.name,
        payload.len(),
        crc
    );
    Ok(out)
}

/// Decodes and re-validates a snapshot blob.
///
/// `name` is the dataset the caller expected; a blob carrying a different
/// name is rejected as corruption.
pub fn decode_dataset(name: &str, raw: &[u8]) -> Result<Dataset> {
    let load_err = |message: String| Error::DatasetLoad {
        name: name.to_owned(),
        message,
    };

    if raw.len() < 8 || &raw[raw.len() - 8..raw.len() - 4] != SNAPSHOT_CRC_MAGIC {
        return Err(load_err("snapshot missing CRC32 footer".into()));
    }
    let payload = &raw[..raw.len() - 8];
    let stored = u32::from_be_bytes([
        raw[raw.len() - 4],
        raw[raw.len() - 3],
        raw[raw.len() - 2],
        raw[raw.len() - 1],
    ]);
    let computed = crc32fast::hash(payload);
    if computed != stored {
        return Err(load_err(format!(
            "CRC32 mismatch: stored {stored:#010x}, computed {computed:#010x}"
        )));
    }

    let dataset: Dataset =
        bincode::deserialize(payload).map_err(|e| load_err(e.to_string()))?;
    if dataset.name != name {
        return Err(load_err(format!(
            "snapshot holds dataset '{}', expected '{name}'",
            dataset.name
        )));
    }
    dataset.table.validate().map_err(|e| load_err(e.to_string()))?;
    dataset
        .column_mapping
        .validate(&dataset.table)
        .map_err(|e| load_err(e.to_string()))?;
    tracing::debug!(
        "decoded snapshot for '{}' ({} rows)",
        name,
        dataset.table.row_count()
    );
    Ok(dataset)
}

/// Serializes a sidecar value as pretty-printed JSON.
pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| Error::storage(e.to_string()))
}

/// Deserializes a JSON sidecar.
pub fn decode_json<T: serde::de::DeserializeOwned>(raw: &[u8]) -> Result<T> {
    serde_json::from_slice(raw).map_err(|e| Error::storage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ColumnMapping;
    use crate::table::Table;
    use crate::value::Value;

    fn dataset() -> Dataset {
        let table = Table::from_columns(vec![
            ("ts", vec![Value::Str("2023-01-01 10:00:00".into())]),
            ("number", vec![Value::Str("555-0100".into())]),
            ("kind", vec![Value::Str("call".into())]),
        ])
        .unwrap();
        let mapping = ColumnMapping::from_pairs(&[
            ("timestamp", "ts"),
            ("phone_number", "number"),
            ("message_type", "kind"),
        ]);
        Dataset::new("calls", table, mapping).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let d = dataset();
        let blob = encode_dataset(&d).unwrap();
        let back = decode_dataset("calls", &blob).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_corrupted_payload_rejected() {
        let mut blob = encode_dataset(&dataset()).unwrap();
        blob[4] ^= 0xff;
        assert!(matches!(
            decode_dataset("calls", &blob),
            Err(Error::DatasetLoad { .. })
        ));
    }

    #[test]
    fn test_missing_footer_rejected() {
        let blob = encode_dataset(&dataset()).unwrap();
        let truncated = &blob[..blob.len() - 8];
        assert!(matches!(
            decode_dataset("calls", truncated),
            Err(Error::DatasetLoad { .. })
        ));
    }

    #[test]
    fn test_name_mismatch_rejected() {
        let blob = encode_dataset(&dataset()).unwrap();
        assert!(matches!(
            decode_dataset("texts", &blob),
            Err(Error::DatasetLoad { .. })
        ));
    }

    #[test]
    fn test_keys() {
        assert_eq!(snapshot_key("calls"), "calls.tbl");
        assert_eq!(history_key("calls"), "calls.history.json");
        assert_eq!(version_snapshot_key("calls", 3), "calls.v3.tbl");
    }
}
