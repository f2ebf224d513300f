//! Read-through metadata cache
//!
//! The underlying store returns serialized text; this component owns
//! parsing it into structured metadata. Parsing is strict - stored
//! entries are data, never code, and anything that does not decode is a
//! corrupt entry, not a panic.

use crate::store::{CacheError, CacheResult, MetadataStore};
use riskstream_core::events::CachedMetadata;
use std::sync::Arc;
use tracing::debug;

/// Read-through lookup of cached actor metadata
pub struct MetadataCache {
    store: Arc<dyn MetadataStore>,
}

impl MetadataCache {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Look up metadata for a guid.
    ///
    /// A missing key is `Ok(None)` - a first-class result, not an error.
    /// A present entry that fails to parse is `CacheError::CorruptEntry`.
    pub async fn lookup(&self, guid: &str) -> CacheResult<Option<CachedMetadata>> {
        let raw = match self.store.fetch(guid).await? {
            Some(raw) => raw,
            None => {
                debug!("No metadata cached for guid {}", guid);
                return Ok(None);
            }
        };

        let metadata =
            serde_json::from_str(&raw).map_err(|source| CacheError::CorruptEntry {
                guid: guid.to_string(),
                source,
            })?;
        Ok(Some(metadata))
    }
}
