//! Metadata enrichment for riskstream
//!
//! Events carry an actor guid; a separate loader keeps per-actor metadata
//! (email, device hardware) in an external key-value store. This crate
//! reads that store and joins the metadata onto event records:
//!
//! - **MetadataStore** - the key-value seam, with a Redis-protocol backend
//! - **MetadataCache** - read-through lookup with strict entry parsing
//! - **MetadataEnricher** - the pipeline `Enrich` implementation

pub mod cache;
pub mod enricher;
pub mod store;

pub use cache::MetadataCache;
pub use enricher::MetadataEnricher;
pub use store::{CacheError, CacheResult, MetadataStore, RedisStore};
