//! Frame decoding for riskstream
//!
//! This crate turns the raw byte stream of the vendor's server-sent-event
//! endpoint into typed event records:
//!
//! - **FrameParser**: incremental SSE framing into named [`RawFrame`]s
//! - **decode_envelope**: strict JSON decoding of an `events` frame payload

pub mod classify;
pub mod sse;

pub use classify::{decode_envelope, DecodeError};
pub use sse::{FrameKind, FrameParser, RawFrame};
