//! Metadata store backends
//!
//! The store is read-only for this pipeline; population is performed by a
//! separate loader.

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;

/// Errors from the metadata cache layer
#[derive(Debug, Error)]
pub enum CacheError {
    /// Store unreachable or protocol failure
    #[error("cache connection error: {0}")]
    Connection(#[from] redis::RedisError),

    /// Stored entry did not parse as metadata
    #[error("corrupt cache entry for {guid}: {source}")]
    CorruptEntry {
        guid: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Key-value backend holding serialized metadata keyed by actor guid
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch the serialized entry for a guid; `None` on miss
    async fn fetch(&self, guid: &str) -> CacheResult<Option<String>>;
}

/// Redis-protocol store (KeyDB compatible)
pub struct RedisStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisStore {
    /// Connect to the store at `url` (e.g. `redis://localhost:6379/`).
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl MetadataStore for RedisStore {
    async fn fetch(&self, guid: &str) -> CacheResult<Option<String>> {
        // ConnectionManager clones share one multiplexed connection
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(guid).await?;
        Ok(value)
    }
}
