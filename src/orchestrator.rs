//! Tiered cache orchestrator
//!
//! Walks an ordered chain of tiers (fastest first), stops at the first hit,
//! and falls back to the origin when every tier misses. Faster tiers are
//! repopulated by detached background tasks, so the caller never waits on a
//! write-back and never sees one fail.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::entry::{CacheEntry, Provenance, StoredEntry};
use crate::error::{LookupError, TierError};
use crate::keys::{DerivedKeys, KeyBuilder};
use crate::origin::{OriginClient, OriginError};
use crate::tier::CacheTier;

/// Default origin timeout
pub const DEFAULT_ORIGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one background population write
#[derive(Debug)]
pub struct PopulationEvent {
    /// Tier that was written
    pub tier: Provenance,
    /// Lookup key the write belongs to
    pub key: String,
    pub result: Result<(), TierError>,
}

/// Cache-aside lookup over a fixed chain of tiers plus an origin
///
/// Holds no per-lookup state; share it behind an `Arc` and call it from as
/// many tasks as needed. Concurrent misses on the same key each reach the
/// origin and write the same entries.
pub struct TieredCache {
    keys: KeyBuilder,
    /// Probe order, fastest first
    tiers: Vec<Arc<dyn CacheTier>>,
    origin: Arc<dyn OriginClient>,
    origin_timeout: Duration,
    events: Option<mpsc::UnboundedSender<PopulationEvent>>,
}

impl TieredCache {
    /// Create an orchestrator over `tiers`, which must be ordered fastest first
    pub fn new(
        keys: KeyBuilder,
        tiers: Vec<Arc<dyn CacheTier>>,
        origin: Arc<dyn OriginClient>,
        origin_timeout: Duration,
    ) -> Self {
        Self {
            keys,
            tiers,
            origin,
            origin_timeout,
            events: None,
        }
    }

    /// Report every population write outcome on `tx` in addition to logging it
    pub fn with_population_events(mut self, tx: mpsc::UnboundedSender<PopulationEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Look `key` up through every tier, then the origin.
    ///
    /// A hit in a lower tier populates all faster tiers; an origin hit
    /// populates every tier.
    pub async fn lookup(&self, key: &str) -> Result<CacheEntry, LookupError> {
        let keys = self.keys.derive_keys(key)?;
        self.resolve(keys, &self.tiers).await
    }

    /// Look `key` up through the durable tiers only, then the origin.
    ///
    /// The volatile tier is neither probed nor populated.
    pub async fn lookup_and_store(&self, key: &str) -> Result<CacheEntry, LookupError> {
        let keys = self.keys.derive_keys(key)?;
        let chain: Vec<Arc<dyn CacheTier>> = self
            .tiers
            .iter()
            .filter(|tier| tier.provenance() != Provenance::Volatile)
            .cloned()
            .collect();
        self.resolve(keys, &chain).await
    }

    async fn resolve(
        &self,
        keys: DerivedKeys,
        chain: &[Arc<dyn CacheTier>],
    ) -> Result<CacheEntry, LookupError> {
        for (depth, tier) in chain.iter().enumerate() {
            match tier.probe(&keys).await {
                Ok(Some(payload)) => {
                    let provenance = tier.provenance();
                    debug!(key = %keys.lookup.as_str(), tier = %provenance, "Served from tier");
                    self.populate(&keys, &chain[..depth], provenance, &payload);
                    return Ok(CacheEntry::new(provenance, payload));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(key = %keys.lookup.as_str(), error = %e, "Tier probe failed, falling through");
                }
            }
        }

        let payload = self.fetch_origin(&keys).await?;
        self.populate(&keys, chain, Provenance::Origin, &payload);
        Ok(CacheEntry::new(Provenance::Origin, payload))
    }

    async fn fetch_origin(&self, keys: &DerivedKeys) -> Result<Value, LookupError> {
        let key = keys.lookup.as_str();
        info!(key = key, "All tiers missed, fetching from origin");

        match tokio::time::timeout(self.origin_timeout, self.origin.fetch(key)).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(e)) => {
                warn!(key = key, error = %e, "Origin fetch failed");
                Err(LookupError::OriginUnavailable(e))
            }
            Err(_) => {
                warn!(
                    key = key,
                    timeout_ms = self.origin_timeout.as_millis() as u64,
                    "Origin fetch timed out"
                );
                Err(LookupError::OriginUnavailable(OriginError::Timeout))
            }
        }
    }

    /// Spawn one independent write per target tier
    fn populate(
        &self,
        keys: &DerivedKeys,
        targets: &[Arc<dyn CacheTier>],
        source: Provenance,
        payload: &Value,
    ) {
        if targets.is_empty() {
            return;
        }

        let keys = Arc::new(keys.clone());
        let entry = Arc::new(StoredEntry::new(source, payload.clone()));

        for tier in targets {
            let tier = Arc::clone(tier);
            let keys = Arc::clone(&keys);
            let entry = Arc::clone(&entry);
            let events = self.events.clone();

            tokio::spawn(async move {
                let result = tier.populate(&keys, &entry).await;
                match &result {
                    Ok(()) => {
                        debug!(key = %keys.lookup.as_str(), tier = %tier.provenance(), source = %source, "Populated tier");
                    }
                    Err(e) => {
                        warn!(key = %keys.lookup.as_str(), error = %e, "Tier population failed");
                    }
                }

                if let Some(tx) = events {
                    let _ = tx.send(PopulationEvent {
                        tier: tier.provenance(),
                        key: keys.lookup.as_str().to_string(),
                        result,
                    });
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::{DurableStore, DurableTier, VolatileStore, VolatileTier};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    const TTL: Duration = Duration::from_secs(3600);

    #[derive(Default)]
    struct MockVolatile {
        data: Mutex<HashMap<String, Vec<u8>>>,
        ttls: Mutex<Vec<Duration>>,
        gets: AtomicUsize,
        sets: AtomicUsize,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl VolatileStore for MockVolatile {
        async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_reads.load(Ordering::SeqCst) {
                anyhow::bail!("volatile store connection refused");
            }
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> anyhow::Result<()> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                anyhow::bail!("volatile store is read-only");
            }
            self.ttls.lock().unwrap().push(ttl);
            self.data.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockDurable {
        data: Mutex<HashMap<String, Vec<u8>>>,
        gets: AtomicUsize,
        puts: AtomicUsize,
        fail_reads: AtomicBool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl DurableStore for MockDurable {
        async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_reads.load(Ordering::SeqCst) {
                anyhow::bail!("bucket unreachable");
            }
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.data.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
    }

    struct MockOrigin {
        calls: AtomicUsize,
        payload: Option<Value>,
        delay: Option<Duration>,
    }

    impl MockOrigin {
        fn returning(payload: Value) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                payload: Some(payload),
                delay: None,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                payload: None,
                delay: None,
            }
        }
    }

    #[async_trait]
    impl OriginClient for MockOrigin {
        async fn fetch(&self, key: &str) -> Result<Value, OriginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.payload
                .clone()
                .ok_or_else(|| OriginError::Server(503, format!("{} unavailable", key)))
        }
    }

    struct Harness {
        cache: TieredCache,
        volatile: Arc<MockVolatile>,
        durable: Arc<MockDurable>,
        origin: Arc<MockOrigin>,
        events: mpsc::UnboundedReceiver<PopulationEvent>,
    }

    impl Harness {
        fn new(volatile: MockVolatile, durable: MockDurable, origin: MockOrigin) -> Self {
            Self::with_timeouts(volatile, durable, origin, Duration::from_secs(1), DEFAULT_ORIGIN_TIMEOUT)
        }

        fn with_timeouts(
            volatile: MockVolatile,
            durable: MockDurable,
            origin: MockOrigin,
            tier_timeout: Duration,
            origin_timeout: Duration,
        ) -> Self {
            let volatile = Arc::new(volatile);
            let durable = Arc::new(durable);
            let origin = Arc::new(origin);
            let (tx, events) = mpsc::unbounded_channel();

            let tiers: Vec<Arc<dyn CacheTier>> = vec![
                Arc::new(VolatileTier::new(volatile.clone(), TTL, tier_timeout)),
                Arc::new(DurableTier::new(durable.clone(), tier_timeout)),
            ];
            let cache = TieredCache::new(KeyBuilder::default(), tiers, origin.clone(), origin_timeout)
                .with_population_events(tx);

            Self {
                cache,
                volatile,
                durable,
                origin,
                events,
            }
        }

        async fn next_events(&mut self, count: usize) -> Vec<PopulationEvent> {
            let mut received = Vec::with_capacity(count);
            for _ in 0..count {
                let event = tokio::time::timeout(Duration::from_secs(5), self.events.recv())
                    .await
                    .expect("population event")
                    .expect("channel open");
                received.push(event);
            }
            received
        }
    }

    fn go_page() -> Value {
        json!({
            "title": "Go (programming language)",
            "extract": "Go is a statically typed, compiled high-level programming language."
        })
    }

    fn stored(key: &str, payload: Value) -> Mutex<HashMap<String, Vec<u8>>> {
        let bytes = StoredEntry::new(Provenance::Origin, payload).to_bytes().unwrap();
        Mutex::new(HashMap::from([(key.to_string(), bytes)]))
    }

    #[tokio::test]
    async fn test_empty_key_makes_no_calls() {
        let h = Harness::new(
            MockVolatile::default(),
            MockDurable::default(),
            MockOrigin::returning(go_page()),
        );

        for key in ["", "   "] {
            assert!(matches!(h.cache.lookup(key).await, Err(LookupError::InvalidKey(_))));
            assert!(matches!(
                h.cache.lookup_and_store(key).await,
                Err(LookupError::InvalidKey(_))
            ));
        }

        assert_eq!(h.volatile.gets.load(Ordering::SeqCst), 0);
        assert_eq!(h.durable.gets.load(Ordering::SeqCst), 0);
        assert_eq!(h.origin.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_volatile_hit_touches_nothing_else() {
        let volatile = MockVolatile {
            data: stored("wikipedia:Rust", json!({"title": "Rust"})),
            ..Default::default()
        };
        let h = Harness::new(volatile, MockDurable::default(), MockOrigin::returning(go_page()));

        let entry = h.cache.lookup(" Rust ").await.unwrap();
        assert_eq!(entry.provenance(), Provenance::Volatile);
        assert_eq!(entry.payload(), &json!({"title": "Rust"}));

        assert_eq!(h.durable.gets.load(Ordering::SeqCst), 0);
        assert_eq!(h.origin.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.volatile.sets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_durable_hit_populates_volatile_once() {
        let durable = MockDurable {
            data: stored("wikipedia-Rust", json!({"title": "Rust"})),
            ..Default::default()
        };
        let mut h = Harness::new(MockVolatile::default(), durable, MockOrigin::returning(go_page()));

        let entry = h.cache.lookup("Rust").await.unwrap();
        assert_eq!(entry.provenance(), Provenance::Durable);
        assert_eq!(entry.payload(), &json!({"title": "Rust"}));

        let events = h.next_events(1).await;
        assert_eq!(events[0].tier, Provenance::Volatile);
        assert!(events[0].result.is_ok());

        assert_eq!(h.volatile.sets.load(Ordering::SeqCst), 1);
        assert_eq!(*h.volatile.ttls.lock().unwrap(), vec![TTL]);
        assert_eq!(h.durable.puts.load(Ordering::SeqCst), 0);
        assert_eq!(h.origin.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_origin_hit_populates_both_tiers() {
        let mut h = Harness::new(
            MockVolatile::default(),
            MockDurable::default(),
            MockOrigin::returning(go_page()),
        );

        let entry = h.cache.lookup("Go (programming language)").await.unwrap();
        assert_eq!(entry.provenance(), Provenance::Origin);
        assert_eq!(entry.payload(), &go_page());

        let mut tiers: Vec<Provenance> = h.next_events(2).await.into_iter().map(|e| e.tier).collect();
        tiers.sort_by_key(|t| t.as_str());
        assert_eq!(tiers, vec![Provenance::Durable, Provenance::Volatile]);

        assert_eq!(h.volatile.sets.load(Ordering::SeqCst), 1);
        assert_eq!(h.durable.puts.load(Ordering::SeqCst), 1);
        assert_eq!(h.origin.calls.load(Ordering::SeqCst), 1);

        // The durable object carries its provenance
        let raw = h.durable.data.lock().unwrap()["wikipedia-Go (programming language)"].clone();
        let stored: StoredEntry = serde_json::from_slice(&raw).unwrap();
        assert_eq!(stored.source, Provenance::Origin);
        assert_eq!(stored.payload, go_page());
    }

    #[tokio::test]
    async fn test_origin_failure_writes_nothing() {
        let mut h = Harness::new(
            MockVolatile::default(),
            MockDurable::default(),
            MockOrigin::failing(),
        );

        let err = h.cache.lookup("Rust").await.unwrap_err();
        assert!(matches!(err, LookupError::OriginUnavailable(OriginError::Server(503, _))));
        assert_eq!(h.origin.calls.load(Ordering::SeqCst), 1);

        tokio::task::yield_now().await;
        assert!(h.events.try_recv().is_err());
        assert_eq!(h.volatile.sets.load(Ordering::SeqCst), 0);
        assert_eq!(h.durable.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_lookup_served_from_volatile() {
        let mut h = Harness::new(
            MockVolatile::default(),
            MockDurable::default(),
            MockOrigin::returning(go_page()),
        );

        let first = h.cache.lookup("Go (programming language)").await.unwrap();
        assert_eq!(first.provenance(), Provenance::Origin);
        h.next_events(2).await;

        let second = h.cache.lookup("Go (programming language)").await.unwrap();
        assert_eq!(second.provenance(), Provenance::Volatile);
        assert_eq!(second.payload(), first.payload());

        assert_eq!(h.origin.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.durable.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_volatile_write_failure_does_not_affect_durable() {
        let volatile = MockVolatile::default();
        volatile.fail_writes.store(true, Ordering::SeqCst);
        let mut h = Harness::new(volatile, MockDurable::default(), MockOrigin::returning(go_page()));

        let entry = h.cache.lookup("Rust").await.unwrap();
        assert_eq!(entry.provenance(), Provenance::Origin);

        let events = h.next_events(2).await;
        for event in &events {
            match event.tier {
                Provenance::Volatile => {
                    assert!(matches!(event.result, Err(TierError::TierWriteFailed { .. })))
                }
                Provenance::Durable => assert!(event.result.is_ok()),
                Provenance::Origin => panic!("origin is never populated"),
            }
        }
        assert_eq!(h.durable.puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_durable_read_error_falls_through() {
        let durable = MockDurable::default();
        durable.fail_reads.store(true, Ordering::SeqCst);
        let h = Harness::new(MockVolatile::default(), durable, MockOrigin::returning(go_page()));

        let entry = h.cache.lookup("Rust").await.unwrap();
        assert_eq!(entry.provenance(), Provenance::Origin);
        assert_eq!(h.origin.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_durable_timeout_falls_through() {
        let durable = MockDurable {
            data: stored("wikipedia-Rust", json!({"title": "Rust"})),
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        };
        let h = Harness::with_timeouts(
            MockVolatile::default(),
            durable,
            MockOrigin::returning(go_page()),
            Duration::from_millis(20),
            DEFAULT_ORIGIN_TIMEOUT,
        );

        let entry = h.cache.lookup("Rust").await.unwrap();
        assert_eq!(entry.provenance(), Provenance::Origin);
    }

    #[tokio::test]
    async fn test_volatile_read_error_falls_through() {
        let volatile = MockVolatile::default();
        volatile.fail_reads.store(true, Ordering::SeqCst);
        let durable = MockDurable {
            data: stored("wikipedia-Rust", json!({"title": "Rust"})),
            ..Default::default()
        };
        let mut h = Harness::new(volatile, durable, MockOrigin::returning(go_page()));

        let entry = h.cache.lookup("Rust").await.unwrap();
        assert_eq!(entry.provenance(), Provenance::Durable);
        assert_eq!(entry.payload(), &json!({"title": "Rust"}));

        // The failed tier is still repopulated
        let events = h.next_events(1).await;
        assert_eq!(events[0].tier, Provenance::Volatile);
        assert_eq!(h.origin.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_volatile_timeout_falls_through() {
        let volatile = MockVolatile {
            data: stored("wikipedia:Rust", json!({"title": "Rust"})),
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        };
        let h = Harness::with_timeouts(
            volatile,
            MockDurable::default(),
            MockOrigin::returning(go_page()),
            Duration::from_millis(20),
            DEFAULT_ORIGIN_TIMEOUT,
        );

        let entry = h.cache.lookup("Rust").await.unwrap();
        assert_eq!(entry.provenance(), Provenance::Origin);
        assert_eq!(entry.payload(), &go_page());
        assert_eq!(h.durable.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lookup_and_store_origin_failure_stores_nothing() {
        let mut h = Harness::new(
            MockVolatile::default(),
            MockDurable::default(),
            MockOrigin::failing(),
        );

        let err = h.cache.lookup_and_store("Rust").await.unwrap_err();
        assert!(matches!(err, LookupError::OriginUnavailable(_)));
        assert_eq!(h.durable.gets.load(Ordering::SeqCst), 1);
        assert_eq!(h.origin.calls.load(Ordering::SeqCst), 1);

        tokio::task::yield_now().await;
        assert!(h.events.try_recv().is_err());
        assert_eq!(h.durable.puts.load(Ordering::SeqCst), 0);
        assert_eq!(h.volatile.sets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_origin_timeout_is_unavailable() {
        let origin = MockOrigin {
            delay: Some(Duration::from_millis(500)),
            ..MockOrigin::returning(go_page())
        };
        let h = Harness::with_timeouts(
            MockVolatile::default(),
            MockDurable::default(),
            origin,
            Duration::from_secs(1),
            Duration::from_millis(20),
        );

        let err = h.cache.lookup("Rust").await.unwrap_err();
        assert!(matches!(err, LookupError::OriginUnavailable(OriginError::Timeout)));
        assert_eq!(h.volatile.sets.load(Ordering::SeqCst), 0);
        assert_eq!(h.durable.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_volatile_entry_is_a_miss() {
        let volatile = MockVolatile {
            data: Mutex::new(HashMap::from([(
                "wikipedia:Rust".to_string(),
                b"{truncated".to_vec(),
            )])),
            ..Default::default()
        };
        let durable = MockDurable {
            data: stored("wikipedia-Rust", json!({"title": "Rust"})),
            ..Default::default()
        };
        let mut h = Harness::new(volatile, durable, MockOrigin::returning(go_page()));

        let entry = h.cache.lookup("Rust").await.unwrap();
        assert_eq!(entry.provenance(), Provenance::Durable);
        h.next_events(1).await;

        // Repaired by the write-back
        let entry = h.cache.lookup("Rust").await.unwrap();
        assert_eq!(entry.provenance(), Provenance::Volatile);
    }

    #[tokio::test]
    async fn test_lookup_and_store_skips_volatile() {
        let volatile = MockVolatile {
            data: stored("wikipedia:Rust", json!({"title": "stale"})),
            ..Default::default()
        };
        let mut h = Harness::new(volatile, MockDurable::default(), MockOrigin::returning(go_page()));

        let entry = h.cache.lookup_and_store("Rust").await.unwrap();
        assert_eq!(entry.provenance(), Provenance::Origin);
        assert_eq!(entry.payload(), &go_page());

        let events = h.next_events(1).await;
        assert_eq!(events[0].tier, Provenance::Durable);

        assert_eq!(h.volatile.gets.load(Ordering::SeqCst), 0);
        assert_eq!(h.volatile.sets.load(Ordering::SeqCst), 0);
        assert_eq!(h.durable.puts.load(Ordering::SeqCst), 1);

        // Now served from the durable tier, still without volatile writes
        let entry = h.cache.lookup_and_store("Rust").await.unwrap();
        assert_eq!(entry.provenance(), Provenance::Durable);
        tokio::task::yield_now().await;
        assert!(h.events.try_recv().is_err());
        assert_eq!(h.volatile.sets.load(Ordering::SeqCst), 0);
        assert_eq!(h.origin.calls.load(Ordering::SeqCst), 1);
    }
}
