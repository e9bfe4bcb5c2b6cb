//! Lookup error types
//!
//! Only two failures ever reach a caller: a rejected key and an unreachable
//! origin. Tier failures are classified here too, but they are logged and
//! treated as misses (reads) or dropped after logging (population writes).

use std::time::Duration;

use crate::entry::Provenance;
use crate::origin::OriginError;

/// Caller-visible lookup failure
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Invalid lookup key: {0}")]
    InvalidKey(String),

    #[error("Origin unavailable: {0}")]
    OriginUnavailable(#[source] OriginError),
}

impl LookupError {
    /// Stable kind name used by the IPC protocol
    pub fn kind(&self) -> &'static str {
        match self {
            LookupError::InvalidKey(_) => "invalidKey",
            LookupError::OriginUnavailable(_) => "originUnavailable",
        }
    }
}

/// Failure of a single tier operation
#[derive(Debug, thiserror::Error)]
pub enum TierError {
    #[error("{tier} read failed for '{key}': {source}")]
    ReadFailed {
        tier: Provenance,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{tier} write failed for '{key}': {source}")]
    TierWriteFailed {
        tier: Provenance,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{tier} timed out after {}ms", .elapsed.as_millis())]
    Timeout { tier: Provenance, elapsed: Duration },
}
