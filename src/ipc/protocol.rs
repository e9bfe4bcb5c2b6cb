//! IPC protocol definitions
//!
//! Newline-delimited JSON over a Unix domain socket: one command per line in,
//! one response per line out.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::CacheStats;
use crate::entry::{CacheEntry, Provenance};
use crate::error::LookupError;

/// Protocol version for future compatibility
pub const PROTOCOL_VERSION: u32 = 1;

/// Commands sent by clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Cache-aside lookup through every tier
    Lookup { key: String },
    /// Durable-only lookup (ingestion path)
    Store { key: String },
    /// Get daemon status and cache statistics
    GetStatus,
}

/// Responses sent back to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    /// A served entry
    Entry { provenance: Provenance, payload: Value },
    /// Error response
    Error {
        /// Machine-readable kind (`invalidKey`, `originUnavailable`, `badCommand`)
        kind: String,
        /// Error message
        error: String,
    },
    /// Status response with daemon state
    Status {
        version: u32,
        healthy: bool,
        /// Open client connections, this one included
        connections: u32,
        volatile: CacheStats,
    },
}

impl From<Result<CacheEntry, LookupError>> for Response {
    fn from(result: Result<CacheEntry, LookupError>) -> Self {
        match result {
            Ok(entry) => Response::Entry {
                provenance: entry.provenance(),
                payload: entry.into_payload(),
            },
            Err(e) => Response::Error {
                kind: e.kind().to_string(),
                error: e.to_string(),
            },
        }
    }
}

/// Parse a JSON command from bytes
pub fn parse_command(data: &[u8]) -> Result<Command, serde_json::Error> {
    serde_json::from_slice(data)
}

/// Serialize a response to JSON bytes
pub fn serialize_response(response: &Response) -> Result<Vec<u8>, serde_json::Error> {
    let mut json = serde_json::to_vec(response)?;
    json.push(b'\n'); // Add newline delimiter
    Ok(json)
}
