//! Volatile tier adapter

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{trace, warn};

use super::{bounded, CacheTier, VolatileStore};
use crate::entry::{decode_payload, Provenance, StoredEntry};
use crate::error::TierError;
use crate::keys::DerivedKeys;

/// Wraps a [`VolatileStore`] with the uniform TTL and timeout
pub struct VolatileTier {
    store: Arc<dyn VolatileStore>,
    ttl: Duration,
    timeout: Duration,
}

impl VolatileTier {
    pub fn new(store: Arc<dyn VolatileStore>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            store,
            ttl,
            timeout,
        }
    }
}

#[async_trait]
impl CacheTier for VolatileTier {
    fn provenance(&self) -> Provenance {
        Provenance::Volatile
    }

    async fn probe(&self, keys: &DerivedKeys) -> Result<Option<Value>, TierError> {
        let key = keys.volatile_key.as_str();
        let bytes = bounded(
            Provenance::Volatile,
            self.timeout,
            self.store.get(key),
            |source| TierError::ReadFailed {
                tier: Provenance::Volatile,
                key: key.to_string(),
                source,
            },
        )
        .await?;

        let Some(bytes) = bytes else {
            trace!(key = key, "Volatile MISS");
            return Ok(None);
        };

        match decode_payload(&bytes) {
            Some(payload) => {
                trace!(key = key, size = bytes.len(), "Volatile HIT");
                Ok(Some(payload))
            }
            None => {
                warn!(key = key, "Volatile entry is not valid JSON, treating as miss");
                Ok(None)
            }
        }
    }

    async fn populate(&self, keys: &DerivedKeys, entry: &StoredEntry) -> Result<(), TierError> {
        let key = keys.volatile_key.as_str();
        let write_failed = |source| TierError::TierWriteFailed {
            tier: Provenance::Volatile,
            key: key.to_string(),
            source,
        };
        let bytes = entry
            .to_bytes()
            .map_err(|e| write_failed(anyhow::Error::new(e)))?;

        bounded(
            Provenance::Volatile,
            self.timeout,
            self.store.set_with_ttl(key, bytes, self.ttl),
            write_failed,
        )
        .await
    }
}
