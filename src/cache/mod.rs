//! Concrete tier stores
//!
//! `MemoryStore` is the volatile tier; `DiskStore` is the local durable tier.
//! The B2 bucket store lives in [`crate::b2`].

pub mod disk;
pub mod memory;

pub use disk::DiskStore;
pub use memory::{CacheStats, MemoryStore};
