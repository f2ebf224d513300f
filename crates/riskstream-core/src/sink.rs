//! Sink and enrichment traits - the pipeline's pluggable seams
//!
//! Every output target implements [`Sink`]; metadata joiners implement
//! [`Enrich`]. Both are driven by the pipeline, which isolates failures to
//! the event they occurred on.

use crate::events::{CachedMetadata, EnrichedEvent, EventRecord};
use async_trait::async_trait;
use thiserror::Error;

/// Sink error type
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("upload failed: {status} - {message}")]
    Upload { status: u16, message: String },

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

impl SinkError {
    /// Create an upload error from status and message
    pub fn upload(status: u16, message: impl Into<String>) -> Self {
        SinkError::Upload {
            status,
            message: message.into(),
        }
    }
}

pub type SinkResult<T> = Result<T, SinkError>;

/// An output target for enriched events.
///
/// A failing write is reported to the caller and logged; it must never
/// tear down the stream loop.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Sink name used in logs and stats
    fn name(&self) -> &str;

    /// Write one enriched event
    async fn write(&self, event: &EnrichedEvent) -> SinkResult<()>;

    /// Flush any buffered output; called on shutdown
    async fn flush(&self) -> SinkResult<()> {
        Ok(())
    }
}

/// A metadata joiner for event records.
///
/// Implementations return `None` when enrichment is skipped (no actor
/// guid) or degraded (cache miss, corrupt entry, store unavailable); they
/// never fail the event itself.
#[async_trait]
pub trait Enrich: Send + Sync {
    /// Enricher name used in logs
    fn name(&self) -> &str;

    /// Look up metadata for the record's actor
    async fn enrich(&self, record: &EventRecord) -> Option<CachedMetadata>;
}
