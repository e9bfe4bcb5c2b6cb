//! Cache entries and the stored envelope format
//!
//! Every payload written into a tier is wrapped in a small JSON envelope that
//! records where the data came from and when it was stored.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tier that satisfied a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Volatile,
    Durable,
    Origin,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Volatile => "volatile",
            Provenance::Durable => "durable",
            Provenance::Origin => "origin",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful lookup
///
/// Immutable once built: the provenance and payload are only readable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    provenance: Provenance,
    payload: Value,
}

impl CacheEntry {
    pub fn new(provenance: Provenance, payload: Value) -> Self {
        Self {
            provenance,
            payload,
        }
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }
}

/// On-tier representation of a cached payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEntry {
    /// Tier the payload was obtained from before being written back
    pub source: Provenance,
    /// Seconds since epoch at write time
    pub stored_at: u64,
    pub payload: Value,
}

impl StoredEntry {
    pub fn new(source: Provenance, payload: Value) -> Self {
        let stored_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            source,
            stored_at,
            payload,
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Extract the payload from bytes read out of a tier.
///
/// An envelope yields its payload, any other JSON document is taken as-is,
/// and malformed bytes yield `None`.
pub fn decode_payload(bytes: &[u8]) -> Option<Value> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    if is_envelope(&value) {
        if let Ok(stored) = serde_json::from_value::<StoredEntry>(value.clone()) {
            return Some(stored.payload);
        }
    }
    Some(value)
}

fn is_envelope(value: &Value) -> bool {
    value
        .as_object()
        .map(|obj| obj.contains_key("source") && obj.contains_key("payload"))
        .unwrap_or(false)
}
