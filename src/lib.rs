//! wikistash - tiered lookup cache
//!
//! Serves Wikipedia lookups through an in-memory cache, then a durable
//! object store, then the Wikipedia API, populating the faster tiers in the
//! background after every slower hit.

pub mod b2;
pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod ipc;
pub mod keys;
pub mod orchestrator;
pub mod origin;
pub mod stash;
pub mod tier;

pub use entry::{CacheEntry, Provenance};
pub use error::{LookupError, TierError};
pub use keys::{DerivedKeys, KeyBuilder, LookupKey};
pub use orchestrator::{PopulationEvent, TieredCache};
pub use stash::Stash;
