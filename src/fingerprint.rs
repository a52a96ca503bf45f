//! Record fingerprints for transformation memoization

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::delta::Record;

/// SHA256 fingerprint of a canonicalized record.
///
/// Records serialize with sorted keys, so equal records always fingerprint
/// identically regardless of construction order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a record.
    pub fn of_record(record: &Record) -> Self {
        let canonical = serde_json::to_string(record).unwrap_or_default();
        Self::from_bytes(canonical.as_bytes())
    }

    /// Compute a fingerprint from raw bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Get the hex string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
