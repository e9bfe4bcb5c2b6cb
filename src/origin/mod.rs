//! Origin sources: the authoritative data behind the cache tiers

pub mod errors;
pub mod wikipedia;

use async_trait::async_trait;
use serde_json::Value;

pub use errors::OriginError;
pub use wikipedia::WikipediaOrigin;

/// Authoritative but slow or rate-limited data source
#[async_trait]
pub trait OriginClient: Send + Sync {
    /// Fetch the payload for a logical (trimmed, non-empty) lookup key
    async fn fetch(&self, key: &str) -> Result<Value, OriginError>;
}
