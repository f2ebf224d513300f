//! Riskstream Core - event model, configuration, and pipeline orchestration
//!
//! This crate provides the foundational types and abstractions for the
//! riskstream relay:
//!
//! - **Events**: schema-validated record types for the vendor event stream
//! - **Sink/Enrich**: trait definitions for the pipeline's pluggable seams
//! - **Pipeline**: ordered event processing with failure isolation
//! - **Config**: layered TOML + environment configuration

pub mod config;
pub mod events;
pub mod pipeline;
pub mod sink;

// Re-export commonly used types
pub use config::{ConfigError, RelayConfig};
pub use events::{
    ActorKind, ActorRef, CachedMetadata, EnrichedEvent, EventEnvelope, EventKind, EventRecord,
    HardwareInfo, ThreatInfo,
};
pub use pipeline::{Pipeline, PipelineConfig, PipelineStats};
pub use sink::{Enrich, Sink, SinkError, SinkResult};

/// Relay version
pub const RELAY_VERSION: &str = env!("CARGO_PKG_VERSION");
