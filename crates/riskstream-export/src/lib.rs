//! Output sinks for riskstream
//!
//! Every sink implements the core `Sink` trait; the pipeline isolates
//! failures per event, so a broken sink degrades output without touching
//! the stream loop.

pub mod console;
pub mod jsonl;
pub mod object_store;

pub use console::ConsoleSink;
pub use jsonl::{JsonlSink, JsonlSinkConfig};
pub use object_store::{ObjectStoreSink, ObjectStoreSinkConfig};
