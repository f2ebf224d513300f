//! Envelope decoding for `events` frames
//!
//! One frame carries `{"events": [EventRecord, ...]}`. Decoding is strict:
//! a malformed payload fails the frame, and only the frame - the caller
//! logs the error and keeps the stream alive.

use riskstream_core::events::EventEnvelope;
use thiserror::Error;

/// Frame decoding error
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed events payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode the payload of one `events` frame into an envelope.
pub fn decode_envelope(payload: &str) -> Result<EventEnvelope, DecodeError> {
    let envelope = serde_json::from_str(payload)?;
    Ok(envelope)
}
