//! Decoding of Prometheus instant-vector snapshots
//!
//! The external collector dumps the `data.result` array of an instant query
//! verbatim, so each entry looks like
//! `{"metric": {"node": "worker-1"}, "value": [1700000000.123, "42.5"]}`.

use crate::error::{ControllerError, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// One entry of an instant-vector result
#[derive(Debug, Clone, Deserialize)]
pub struct VectorSample {
    #[serde(default)]
    pub metric: HashMap<String, String>,
    #[serde(default)]
    pub value: Option<(serde_json::Value, serde_json::Value)>,
}

impl VectorSample {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.metric
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Numeric sample value; Prometheus encodes it as a string
    pub fn number(&self) -> Result<f64> {
        let (_, raw) = self
            .value
            .as_ref()
            .ok_or_else(|| ControllerError::parse("vector sample", "missing value"))?;

        let parsed = match raw {
            serde_json::Value::String(s) => s.trim().parse::<f64>().map_err(|e| {
                ControllerError::parse("vector sample", format!("invalid number {s:?}: {e}"))
            })?,
            serde_json::Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| ControllerError::parse("vector sample", "number out of range"))?,
            other => {
                return Err(ControllerError::parse(
                    "vector sample",
                    format!("unexpected value {other}"),
                ))
            }
        };

        if parsed.is_finite() {
            Ok(parsed)
        } else {
            Err(ControllerError::parse("vector sample", "non-finite value"))
        }
    }
}

/// Decoded vector plus the number of entries that could not be decoded
#[derive(Debug, Default)]
pub struct DecodedVector {
    pub samples: Vec<VectorSample>,
    pub malformed: usize,
}

/// Decode a snapshot document, skipping entries that do not match the schema
pub fn decode_vector(context: &str, bytes: &[u8]) -> Result<DecodedVector> {
    let entries: Vec<serde_json::Value> = serde_json::from_slice(bytes)
        .map_err(|e| ControllerError::parse(context, e.to_string()))?;

    let mut decoded = DecodedVector::default();
    for entry in entries {
        match serde_json::from_value::<VectorSample>(entry) {
            Ok(sample) => decoded.samples.push(sample),
            Err(_) => decoded.malformed += 1,
        }
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_string_and_numeric_values() {
        let doc = br#"[
            {"metric": {"node": "a"}, "value": [1700000000.1, "12.5"]},
            {"metric": {"node": "b"}, "value": [1700000000.1, 7]}
        ]"#;

        let decoded = decode_vector("node_cpu", doc).unwrap();

        assert_eq!(decoded.malformed, 0);
        assert_eq!(decoded.samples[0].label("node"), Some("a"));
        assert!((decoded.samples[0].number().unwrap() - 12.5).abs() < 1e-9);
        assert!((decoded.samples[1].number().unwrap() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_entries_are_counted_not_fatal() {
        let doc = br#"[
            {"metric": {"node": "a"}, "value": [1, "1.0"]},
            {"metric": "not-a-map"},
            42
        ]"#;

        let decoded = decode_vector("node_cpu", doc).unwrap();

        assert_eq!(decoded.samples.len(), 1);
        assert_eq!(decoded.malformed, 2);
    }

    #[test]
    fn test_unparsable_value_is_an_error() {
        let doc = br#"[{"metric": {"node": "a"}, "value": [1, "NaN"]},
                       {"metric": {"node": "b"}, "value": [1, "abc"]},
                       {"metric": {"node": "c"}}]"#;

        let decoded = decode_vector("node_cpu", doc).unwrap();

        assert!(decoded.samples.iter().all(|s| s.number().is_err()));
    }

    #[test]
    fn test_document_must_be_an_array() {
        assert!(decode_vector("node_cpu", br#"{"status": "error"}"#).is_err());
    }

    #[test]
    fn test_empty_label_is_missing() {
        let doc = br#"[{"metric": {"node": ""}, "value": [1, "1"]}]"#;
        let decoded = decode_vector("node_cpu", doc).unwrap();
        assert_eq!(decoded.samples[0].label("node"), None);
    }
}
