//! Assembly of the tier chain from configuration

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use crate::b2::B2Store;
use crate::cache::{DiskStore, MemoryStore};
use crate::config::{Config, DurableBackend};
use crate::keys::KeyBuilder;
use crate::orchestrator::{PopulationEvent, TieredCache};
use crate::origin::WikipediaOrigin;
use crate::tier::{CacheTier, DurableStore, DurableTier, VolatileTier};

/// A ready-to-serve tiered cache plus handles the daemon reports on
pub struct Stash {
    pub cache: Arc<TieredCache>,
    pub volatile: Arc<MemoryStore>,
}

impl Stash {
    /// Build the volatile, durable and origin clients described by `config`
    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::build(config, None).await
    }

    /// Like [`Stash::from_config`], also reporting population writes on `tx`.
    ///
    /// The channel closes once the stash and every in-flight write are gone.
    pub async fn from_config_with_events(
        config: &Config,
        tx: mpsc::UnboundedSender<PopulationEvent>,
    ) -> Result<Self> {
        Self::build(config, Some(tx)).await
    }

    async fn build(
        config: &Config,
        events: Option<mpsc::UnboundedSender<PopulationEvent>>,
    ) -> Result<Self> {
        let volatile = Arc::new(MemoryStore::new(config.volatile_capacity));

        let durable: Arc<dyn DurableStore> = match &config.durable {
            DurableBackend::Disk { dir } => Arc::new(DiskStore::open(dir.clone())?),
            DurableBackend::B2 {
                key_id,
                key,
                bucket,
            } => Arc::new(B2Store::authorize(key_id, key, bucket).await?),
        };

        let origin = Arc::new(WikipediaOrigin::new(
            config.origin_url.clone(),
            config.origin_timeout,
        )?);

        let tiers: Vec<Arc<dyn CacheTier>> = vec![
            Arc::new(VolatileTier::new(
                volatile.clone(),
                config.volatile_ttl,
                config.volatile_timeout,
            )),
            Arc::new(DurableTier::new(durable, config.durable_timeout)),
        ];

        let mut cache = TieredCache::new(
            KeyBuilder::new(config.volatile_prefix.clone(), config.durable_prefix.clone()),
            tiers,
            origin,
            config.origin_timeout,
        );
        if let Some(tx) = events {
            cache = cache.with_population_events(tx);
        }

        info!(
            ttl_secs = config.volatile_ttl.as_secs(),
            durable = %config.durable_label(),
            origin = %config.origin_url,
            "Tiered cache ready"
        );

        Ok(Self {
            cache: Arc::new(cache),
            volatile,
        })
    }
}
