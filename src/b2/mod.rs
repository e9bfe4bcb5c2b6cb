//! Backblaze B2 durable store

pub mod client;
pub mod errors;
pub mod types;

pub use client::B2Store;
pub use errors::B2Error;
