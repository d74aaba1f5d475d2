use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type Sha256Hash = [u8; 32];

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: Sha256Hash = [0u8; 32];

/// 2023-01-01T00:00:00Z, shared by every node so snapshots have a common root.
pub const GENESIS_TIMESTAMP: u64 = 1_672_531_200_000;

/// A hash-linked unit of the ledger.
///
/// `hash` always covers the other five fields in the canonical order
/// `index, timestamp, transactions, previous_hash, nonce`. The digest field is
/// never part of its own input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    /// Milliseconds since the Unix epoch.
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    #[serde(with = "hex::serde")]
    pub previous_hash: Sha256Hash,
    pub nonce: u64,
    #[serde(with = "hex::serde")]
    pub hash: Sha256Hash,
}

impl Block {
    pub fn new(
        index: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
        previous_hash: Sha256Hash,
        nonce: u64,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce,
            hash: [0u8; 32],
        };
        block.hash = block.compute_hash();
        block
    }

    pub fn genesis() -> Self {
        Block::new(0, GENESIS_TIMESTAMP, Vec::new(), GENESIS_PREVIOUS_HASH, 0)
    }

    /// Recompute the digest from the current field values.
    pub fn compute_hash(&self) -> Sha256Hash {
        Self::finish_with_nonce(self.hashing_prefix(), self.nonce)
    }

    /// Hasher state covering every field that precedes the nonce.
    ///
    /// Cloning this state lets a nonce search skip re-encoding the
    /// transactions on every attempt.
    pub fn hashing_prefix(&self) -> Sha256 {
        let encoded = Transaction::canonical_list(&self.transactions);
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update((encoded.len() as u64).to_le_bytes());
        hasher.update(&encoded);
        hasher.update(self.previous_hash);
        hasher
    }

    pub fn finish_with_nonce(mut prefix: Sha256, nonce: u64) -> Sha256Hash {
        prefix.update(nonce.to_le_bytes());
        prefix.finalize().into()
    }

    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Snapshot timestamps arrive as integer epoch milliseconds, fractional epoch
/// seconds, or ISO-8601 text. Text without an offset is read as UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Seconds(f64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(ms),
            Raw::Seconds(secs) => {
                let ms = (secs * 1000.0).round();
                if !ms.is_finite() || ms < 0.0 || ms > u64::MAX as f64 {
                    return Err(D::Error::custom(format!("epoch seconds {} out of range", secs)));
                }
                Ok(ms as u64)
            }
            Raw::Text(text) => {
                let millis = parse_text(&text)
                    .ok_or_else(|| D::Error::custom(format!("invalid timestamp '{}'", text)))?;
                u64::try_from(millis).map_err(|_| D::Error::custom(format!("timestamp '{}' predates the epoch", text)))
            }
        }
    }

    fn parse_text(text: &str) -> Option<i64> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
            return Some(parsed.timestamp_millis());
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
            .map(|naive| naive.and_utc().timestamp_millis())
    }
}
