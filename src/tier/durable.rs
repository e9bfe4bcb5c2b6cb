//! Durable tier adapter

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::{bounded, CacheTier, DurableStore};
use crate::entry::{decode_payload, Provenance, StoredEntry};
use crate::error::TierError;
use crate::keys::DerivedKeys;

/// Wraps a [`DurableStore`]; entries written here never expire
pub struct DurableTier {
    store: Arc<dyn DurableStore>,
    timeout: Duration,
}

impl DurableTier {
    pub fn new(store: Arc<dyn DurableStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }
}

#[async_trait]
impl CacheTier for DurableTier {
    fn provenance(&self) -> Provenance {
        Provenance::Durable
    }

    async fn probe(&self, keys: &DerivedKeys) -> Result<Option<Value>, TierError> {
        let key = keys.durable_key.as_str();
        let bytes = bounded(
            Provenance::Durable,
            self.timeout,
            self.store.get(key),
            |source| TierError::ReadFailed {
                tier: Provenance::Durable,
                key: key.to_string(),
                source,
            },
        )
        .await?;

        match bytes.as_deref().map(decode_payload) {
            Some(Some(payload)) => {
                debug!(key = key, "Durable HIT");
                Ok(Some(payload))
            }
            Some(None) => {
                warn!(key = key, "Durable object is not valid JSON, treating as miss");
                Ok(None)
            }
            None => {
                debug!(key = key, "Durable MISS");
                Ok(None)
            }
        }
    }

    async fn populate(&self, keys: &DerivedKeys, entry: &StoredEntry) -> Result<(), TierError> {
        let key = keys.durable_key.as_str();
        let write_failed = |source| TierError::TierWriteFailed {
            tier: Provenance::Durable,
            key: key.to_string(),
            source,
        };
        let bytes = entry
            .to_bytes()
            .map_err(|e| write_failed(anyhow::Error::new(e)))?;

        bounded(
            Provenance::Durable,
            self.timeout,
            self.store.put(key, bytes),
            write_failed,
        )
        .await
    }
}
