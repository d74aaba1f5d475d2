//! Transaction payloads for VoteChain
//!
//! The ledger treats payloads as opaque JSON records. Two things are owned
//! here: the canonical byte encoding that feeds block hashing, and the shape
//! check a payload must pass before it may enter the pending pool.

use crate::config::ValidationConfig;
use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Maximum canonical transaction size in bytes (100KB) to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

/// Field used by the service layer to tag a payload with its schema.
pub const KIND_TAG: &str = "type";

const VOTE_FIELDS: &[&str] = &["vote_id", "election_id", "voter_id", "candidate", "timestamp"];
const ELECTION_FIELDS: &[&str] = &["election_id", "title", "start_date", "end_date", "candidates"];

/// An opaque, order-significant payload record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transaction(Value);

/// Known payload schemas submitted by the voting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Vote,
    Election,
    Unclassified,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PayloadKind::Vote => write!(f, "vote"),
            PayloadKind::Election => write!(f, "election"),
            PayloadKind::Unclassified => write!(f, "unclassified"),
        }
    }
}

impl Transaction {
    pub fn new(payload: Value) -> Self {
        Transaction(payload)
    }

    pub fn payload(&self) -> &Value {
        &self.0
    }

    pub fn into_payload(self) -> Value {
        self.0
    }

    /// Deterministic encoding: sorted object keys, no whitespace.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_canonical(&self.0, &mut out);
        out
    }

    /// Canonical encoding of an ordered transaction list as a JSON array.
    pub fn canonical_list(transactions: &[Transaction]) -> Vec<u8> {
        let mut out = Vec::with_capacity(transactions.len() * 64 + 2);
        out.push(b'[');
        for (i, tx) in transactions.iter().enumerate() {
            if i > 0 {
                out.push(b',');
            }
            write_canonical(&tx.0, &mut out);
        }
        out.push(b']');
        out
    }

    pub fn kind(&self) -> PayloadKind {
        let Some(obj) = self.0.as_object() else {
            return PayloadKind::Unclassified;
        };
        match obj.get(KIND_TAG).and_then(Value::as_str) {
            Some("vote") => return PayloadKind::Vote,
            Some("election") => return PayloadKind::Election,
            _ => {}
        }
        if obj.contains_key("vote_id") {
            PayloadKind::Vote
        } else if obj.contains_key("election_id") && obj.contains_key("candidates") {
            PayloadKind::Election
        } else {
            PayloadKind::Unclassified
        }
    }

    /// Shape check performed before a payload is admitted to the pending pool.
    pub fn validate_shape(&self, rules: &ValidationConfig) -> Result<PayloadKind> {
        let obj = self
            .0
            .as_object()
            .ok_or_else(|| ChainError::InvalidTransaction("payload must be a JSON object".to_string()))?;
        if obj.is_empty() {
            return Err(ChainError::InvalidTransaction("payload must not be empty".to_string()));
        }

        let size = self.canonical_bytes().len();
        if size > rules.max_transaction_bytes {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction too large: {} bytes (max: {})",
                size, rules.max_transaction_bytes
            )));
        }

        let kind = self.kind();
        match kind {
            PayloadKind::Vote => check_vote(obj, rules.strict_mode)?,
            PayloadKind::Election => check_election(obj, rules.strict_mode)?,
            PayloadKind::Unclassified if rules.require_known_kind => {
                return Err(ChainError::InvalidTransaction(
                    "payload is neither a vote nor an election".to_string(),
                ));
            }
            PayloadKind::Unclassified => {}
        }
        Ok(kind)
    }
}

impl From<Value> for Transaction {
    fn from(value: Value) -> Self {
        Transaction(value)
    }
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_leaf(&Value::String(key.clone()), out);
                out.push(b':');
                write_canonical(&map[key], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        leaf => write_leaf(leaf, out),
    }
}

/// Scalars render exactly as compact `serde_json` output, escapes included.
fn write_leaf(value: &Value, out: &mut Vec<u8>) {
    out.extend_from_slice(value.to_string().as_bytes());
}

fn require_string<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a str> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        Some(Value::String(_)) => Err(ChainError::InvalidTransaction(format!("'{}' must not be blank", field))),
        Some(_) => Err(ChainError::InvalidTransaction(format!("'{}' must be a string", field))),
        None => Err(ChainError::InvalidTransaction(format!("missing required field '{}'", field))),
    }
}

fn require_datetime(obj: &Map<String, Value>, field: &str) -> Result<chrono::DateTime<chrono::FixedOffset>> {
    let raw = require_string(obj, field)?;
    chrono::DateTime::parse_from_rfc3339(raw).map_err(|e| {
        ChainError::InvalidTransaction(format!("'{}' is not an RFC 3339 date-time: {}", field, e))
    })
}

fn reject_unknown(obj: &Map<String, Value>, allowed: &[&str], kind: PayloadKind) -> Result<()> {
    if let Some(extra) = obj
        .keys()
        .find(|k| k.as_str() != KIND_TAG && !allowed.contains(&k.as_str()))
    {
        return Err(ChainError::InvalidTransaction(format!(
            "unexpected field '{}' in {} payload",
            extra, kind
        )));
    }
    Ok(())
}

fn check_vote(obj: &Map<String, Value>, strict: bool) -> Result<()> {
    for field in &VOTE_FIELDS[..4] {
        require_string(obj, field)?;
    }
    require_datetime(obj, "timestamp")?;
    if strict {
        reject_unknown(obj, VOTE_FIELDS, PayloadKind::Vote)?;
    }
    Ok(())
}

fn check_election(obj: &Map<String, Value>, strict: bool) -> Result<()> {
    require_string(obj, "election_id")?;
    require_string(obj, "title")?;
    let start = require_datetime(obj, "start_date")?;
    let end = require_datetime(obj, "end_date")?;
    if start >= end {
        return Err(ChainError::InvalidTransaction(
            "'start_date' must be before 'end_date'".to_string(),
        ));
    }

    let candidates = obj
        .get("candidates")
        .and_then(Value::as_array)
        .ok_or_else(|| ChainError::InvalidTransaction("'candidates' must be an array".to_string()))?;
    if candidates.is_empty() {
        return Err(ChainError::InvalidTransaction("'candidates' must not be empty".to_string()));
    }
    if !candidates.iter().all(Value::is_string) {
        return Err(ChainError::InvalidTransaction("'candidates' must contain only strings".to_string()));
    }

    if strict {
        reject_unknown(obj, ELECTION_FIELDS, PayloadKind::Election)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vote() -> Transaction {
        Transaction::new(json!({
            "vote_id": "67890",
            "election_id": "12345",
            "voter_id": "voter_001",
            "candidate": "Alice",
            "timestamp": "2024-11-01T12:00:00Z"
        }))
    }

    #[test]
    fn test_canonical_bytes_sort_keys() {
        let a = Transaction::new(json!({"b": 1, "a": {"z": true, "y": null}}));
        assert_eq!(a.canonical_bytes(), br#"{"a":{"y":null,"z":true},"b":1}"#.to_vec());
    }

    #[test]
    fn test_canonical_bytes_independent_of_insertion_order() {
        let a: Transaction = serde_json::from_str(r#"{"voter":"x","candidate":"y"}"#).unwrap();
        let b: Transaction = serde_json::from_str(r#"{"candidate":"y","voter":"x"}"#).unwrap();
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn test_canonical_list_keeps_order() {
        let first = Transaction::new(json!({"n": 1}));
        let second = Transaction::new(json!({"n": 2}));
        let forward = Transaction::canonical_list(&[first.clone(), second.clone()]);
        let reverse = Transaction::canonical_list(&[second, first]);
        assert_eq!(forward, br#"[{"n":1},{"n":2}]"#.to_vec());
        assert_ne!(forward, reverse);
    }

    #[test]
    fn test_canonical_string_escaping() {
        let tx = Transaction::new(json!({"quote": "a\"b\n"}));
        assert_eq!(tx.canonical_bytes(), br#"{"quote":"a\"b\n"}"#.to_vec());
    }

    #[test]
    fn test_canonical_scalars_match_compact_json() {
        let payload = json!({
            "ctrl\u{1}key": "tab\there \u{e9}",
            "n": -12.5,
            "big": 18446744073709551615u64,
            "flags": [true, false, null],
        });
        let expected = r#"{"big":18446744073709551615,"ctrl\u0001key":"tab\there é","flags":[true,false,null],"n":-12.5}"#;
        assert_eq!(Transaction::new(payload).canonical_bytes(), expected.as_bytes().to_vec());
    }

    #[test]
    fn test_vote_shape_accepted() {
        let rules = ValidationConfig::default();
        assert_eq!(vote().validate_shape(&rules).unwrap(), PayloadKind::Vote);
    }

    #[test]
    fn test_vote_missing_field_rejected() {
        let rules = ValidationConfig::default();
        let mut payload = vote().into_payload();
        payload.as_object_mut().unwrap().remove("voter_id");
        let err = Transaction::new(payload).validate_shape(&rules).unwrap_err();
        assert!(err.to_string().contains("voter_id"));
    }

    #[test]
    fn test_vote_bad_timestamp_rejected() {
        let rules = ValidationConfig::default();
        let mut payload = vote().into_payload();
        payload["timestamp"] = json!("yesterday");
        assert!(Transaction::new(payload).validate_shape(&rules).is_err());
    }

    #[test]
    fn test_strict_mode_rejects_unknown_fields() {
        let mut payload = vote().into_payload();
        payload["note"] = json!("extra");
        let tx = Transaction::new(payload);

        let strict = ValidationConfig::default();
        assert!(tx.validate_shape(&strict).is_err());

        let relaxed = ValidationConfig { strict_mode: false, ..ValidationConfig::default() };
        assert!(tx.validate_shape(&relaxed).is_ok());
    }

    #[test]
    fn test_election_shape() {
        let rules = ValidationConfig::default();
        let election = Transaction::new(json!({
            "type": "election",
            "election_id": "12345",
            "title": "Presidential Election 2024",
            "start_date": "2024-11-01T00:00:00Z",
            "end_date": "2024-11-02T23:59:59Z",
            "candidates": ["Alice", "Bob"]
        }));
        assert_eq!(election.validate_shape(&rules).unwrap(), PayloadKind::Election);

        let mut backwards = election.into_payload();
        backwards["end_date"] = json!("2024-10-01T00:00:00Z");
        assert!(Transaction::new(backwards).validate_shape(&rules).is_err());
    }

    #[test]
    fn test_election_requires_candidates() {
        let rules = ValidationConfig::default();
        let election = Transaction::new(json!({
            "type": "election",
            "election_id": "1",
            "title": "Empty",
            "start_date": "2024-11-01T00:00:00Z",
            "end_date": "2024-11-02T00:00:00Z",
            "candidates": []
        }));
        assert!(election.validate_shape(&rules).is_err());
    }

    #[test]
    fn test_non_object_and_empty_rejected() {
        let rules = ValidationConfig::default();
        assert!(Transaction::new(json!("just a string")).validate_shape(&rules).is_err());
        assert!(Transaction::new(json!([1, 2])).validate_shape(&rules).is_err());
        assert!(Transaction::new(json!({})).validate_shape(&rules).is_err());
    }

    #[test]
    fn test_unclassified_payload_policy() {
        let tx = Transaction::new(json!({"memo": "hello"}));
        assert_eq!(tx.validate_shape(&ValidationConfig::default()).unwrap(), PayloadKind::Unclassified);

        let strict_kinds = ValidationConfig { require_known_kind: true, ..ValidationConfig::default() };
        assert!(tx.validate_shape(&strict_kinds).is_err());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let rules = ValidationConfig { max_transaction_bytes: 32, ..ValidationConfig::default() };
        let tx = Transaction::new(json!({"memo": "x".repeat(64)}));
        assert!(tx.validate_shape(&rules).is_err());
    }
}
