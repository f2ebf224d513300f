//! Cache-backed event enrichment

use crate::cache::MetadataCache;
use async_trait::async_trait;
use riskstream_core::events::{CachedMetadata, EventRecord};
use riskstream_core::sink::Enrich;
use tracing::warn;

/// Joins event records with cached metadata for their actor.
///
/// A lookup is attempted only when the record carries a non-empty actor
/// guid. Every cache failure (miss, corrupt entry, store unreachable)
/// degrades to absent metadata; delivery to the sinks is never blocked.
pub struct MetadataEnricher {
    cache: MetadataCache,
}

impl MetadataEnricher {
    pub fn new(cache: MetadataCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Enrich for MetadataEnricher {
    fn name(&self) -> &str {
        "metadata-cache"
    }

    async fn enrich(&self, record: &EventRecord) -> Option<CachedMetadata> {
        let guid = record.actor_guid()?;
        match self.cache.lookup(guid).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Metadata lookup degraded for guid {}: {}", guid, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CacheResult, MetadataStore};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    struct CountingStore {
        entries: HashMap<String, String>,
        fetches: AtomicU64,
    }

    impl CountingStore {
        fn new(entries: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                entries: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                fetches: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl MetadataStore for CountingStore {
        async fn fetch(&self, guid: &str) -> CacheResult<Option<String>> {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            Ok(self.entries.get(guid).cloned())
        }
    }

    fn record(json: &str) -> EventRecord {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_enrich_joins_cached_metadata() {
        let store = CountingStore::new(&[("g1", r#"{"email":"a@b.com"}"#)]);
        let enricher = MetadataEnricher::new(MetadataCache::new(store));

        let record =
            record(r#"{"type":"THREAT","actor":{"guid":"g1","type":"DEVICE"}}"#);
        let metadata = enricher.enrich(&record).await.expect("metadata joined");
        assert_eq!(metadata.email.as_deref(), Some("a@b.com"));
    }

    #[tokio::test]
    async fn test_enrich_skips_lookup_without_actor_guid() {
        let store = CountingStore::new(&[]);
        let enricher = MetadataEnricher::new(MetadataCache::new(store.clone()));

        let no_actor = record(r#"{"type":"AUDIT"}"#);
        assert!(enricher.enrich(&no_actor).await.is_none());

        let empty_guid = record(r#"{"type":"AUDIT","actor":{"guid":"","type":"USER"}}"#);
        assert!(enricher.enrich(&empty_guid).await.is_none());

        assert_eq!(store.fetches.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_miss_and_corrupt_entry_degrade_to_absent() {
        let store = CountingStore::new(&[("bad", "{'python': 'dict'}")]);
        let enricher = MetadataEnricher::new(MetadataCache::new(store));

        let miss = record(r#"{"type":"THREAT","actor":{"guid":"g9","type":"DEVICE"}}"#);
        assert!(enricher.enrich(&miss).await.is_none());

        let corrupt = record(r#"{"type":"THREAT","actor":{"guid":"bad","type":"DEVICE"}}"#);
        assert!(enricher.enrich(&corrupt).await.is_none());
    }

    #[tokio::test]
    async fn test_enrichment_is_deterministic() {
        let store = CountingStore::new(&[("g1", r#"{"email":"a@b.com"}"#)]);
        let enricher = MetadataEnricher::new(MetadataCache::new(store));
        let record =
            record(r#"{"type":"THREAT","actor":{"guid":"g1","type":"DEVICE"}}"#);

        let first = enricher.enrich(&record).await;
        let second = enricher.enrich(&record).await;
        assert_eq!(first, second);
    }
}
