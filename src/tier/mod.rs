//! Tier capabilities
//!
//! Backing stores implement [`VolatileStore`] or [`DurableStore`]. The
//! orchestrator never talks to them directly: each store is wrapped in an
//! adapter implementing [`CacheTier`], the uniform probe/populate capability
//! that the lookup chain iterates over.

pub mod durable;
pub mod volatile;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::entry::{Provenance, StoredEntry};
use crate::error::TierError;
use crate::keys::DerivedKeys;

pub use durable::DurableTier;
pub use volatile::VolatileTier;

/// Fast, expiring key-value store
#[async_trait]
pub trait VolatileStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> anyhow::Result<()>;
}

/// Slower, non-expiring object store
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()>;
}

/// One layer of the lookup chain
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Provenance reported for entries served by this tier
    fn provenance(&self) -> Provenance;

    /// Read the payload stored for `keys`.
    ///
    /// `Ok(None)` is a miss, including malformed stored bytes.
    async fn probe(&self, keys: &DerivedKeys) -> Result<Option<Value>, TierError>;

    /// Write `entry` into this tier under the key derived from `keys`
    async fn populate(&self, keys: &DerivedKeys, entry: &StoredEntry) -> Result<(), TierError>;
}

/// Run a tier operation under its timeout, mapping store errors
pub(crate) async fn bounded<T, F>(
    tier: Provenance,
    limit: Duration,
    op: F,
    on_error: impl FnOnce(anyhow::Error) -> TierError,
) -> Result<T, TierError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(on_error(e)),
        Err(_) => Err(TierError::Timeout {
            tier,
            elapsed: limit,
        }),
    }
}
