//! Riskstream client - vendor API connectivity
//!
//! This crate owns the long-lived side of the pipeline:
//!
//! - **TokenProvider** - exchanges the application key for short-lived
//!   access tokens, with expiry-aware single-flight renewal
//! - **StreamConsumer** - the resilient SSE consumption loop feeding
//!   decoded records into the pipeline

pub mod consumer;
pub mod error;
pub mod token;

// Re-exports for convenience
pub use consumer::{ConnectionState, StreamConsumer};
pub use error::{ClientError, ClientResult};
pub use token::{Credential, TokenProvider};
