//! Event types for the vendor mobile-risk stream
//!
//! Records arrive as JSON inside an `events` SSE frame and are decoded with
//! strict schema validation. Kind sets are closed enums with an explicit
//! `Unknown` fallback so unrecognized values are routed, never dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of a telemetry event record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Threat,
    Device,
    Audit,
    #[serde(other)]
    #[default]
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Threat => "THREAT",
            EventKind::Device => "DEVICE",
            EventKind::Audit => "AUDIT",
            EventKind::Unknown => "UNKNOWN",
        }
    }

    /// The kinds the server knows how to filter on
    pub fn known() -> [EventKind; 3] {
        [EventKind::Threat, EventKind::Device, EventKind::Audit]
    }
}

/// Kind of the entity an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorKind {
    Device,
    User,
    #[serde(other)]
    #[default]
    Unknown,
}

/// Reference to the entity an event was emitted by or aimed at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
    /// Globally unique identifier; may be absent in partial records
    #[serde(default)]
    pub guid: String,

    #[serde(rename = "type", default)]
    pub kind: ActorKind,
}

/// Threat-specific detail block carried by THREAT records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreatInfo {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub threat_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classifications: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, serde_json::Value>,
}

/// A single decoded event record, immutable once decoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "type", default)]
    pub kind: EventKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ActorRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat: Option<ThreatInfo>,

    /// Kind-specific remainder (device, audit, ...) kept as-is
    #[serde(flatten)]
    pub details: HashMap<String, serde_json::Value>,
}

impl EventRecord {
    /// The actor guid, when present and non-empty
    pub fn actor_guid(&self) -> Option<&str> {
        self.actor
            .as_ref()
            .map(|a| a.guid.as_str())
            .filter(|g| !g.is_empty())
    }

    /// The target guid, when present and non-empty
    pub fn target_guid(&self) -> Option<&str> {
        self.target
            .as_ref()
            .map(|a| a.guid.as_str())
            .filter(|g| !g.is_empty())
    }
}

/// The payload of one `events` frame: zero or more records in server order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

/// Device hardware description stored alongside cached metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(flatten)]
    pub raw: HashMap<String, serde_json::Value>,
}

/// Actor/device metadata previously stored in the external cache.
///
/// This pipeline only reads these entries; population is performed by a
/// separate loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware: Option<HardwareInfo>,

    #[serde(flatten)]
    pub raw: HashMap<String, serde_json::Value>,
}

impl CachedMetadata {
    /// Hardware model shorthand used by the human-readable sinks
    pub fn device_model(&self) -> Option<&str> {
        self.hardware.as_ref().and_then(|h| h.model.as_deref())
    }
}

/// An event record joined with whatever metadata the cache held for its
/// actor. Consumed exactly once per sink, then discarded.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedEvent {
    pub record: EventRecord,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CachedMetadata>,
}

impl EnrichedEvent {
    pub fn new(record: EventRecord, metadata: Option<CachedMetadata>) -> Self {
        Self { record, metadata }
    }
}
