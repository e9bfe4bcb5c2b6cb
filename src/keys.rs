//! Lookup key normalization and per-tier key derivation

use crate::error::LookupError;

pub const DEFAULT_VOLATILE_PREFIX: &str = "wikipedia:";
pub const DEFAULT_DURABLE_PREFIX: &str = "wikipedia-";

/// A trimmed, non-empty lookup identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey(String);

impl LookupKey {
    pub fn parse(raw: &str) -> Result<Self, LookupError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LookupError::InvalidKey(
                "lookup key is empty after trimming".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Keys for every tier, all derived from one lookup key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKeys {
    pub lookup: LookupKey,
    pub volatile_key: String,
    pub durable_key: String,
}

/// Namespaces lookup keys per tier so unrelated data sharing a backing store
/// never collides with cached entries.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    volatile_prefix: String,
    durable_prefix: String,
}

impl KeyBuilder {
    pub fn new(volatile_prefix: impl Into<String>, durable_prefix: impl Into<String>) -> Self {
        Self {
            volatile_prefix: volatile_prefix.into(),
            durable_prefix: durable_prefix.into(),
        }
    }

    pub fn derive_keys(&self, raw: &str) -> Result<DerivedKeys, LookupError> {
        let lookup = LookupKey::parse(raw)?;
        Ok(DerivedKeys {
            volatile_key: format!("{}{}", self.volatile_prefix, lookup.as_str()),
            durable_key: format!("{}{}", self.durable_prefix, lookup.as_str()),
            lookup,
        })
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_VOLATILE_PREFIX, DEFAULT_DURABLE_PREFIX)
    }
}
