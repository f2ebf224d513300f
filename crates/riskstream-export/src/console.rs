//! Console sink
//!
//! Human-readable rendering of enriched events for interactive use.

use async_trait::async_trait;
use riskstream_core::events::{EnrichedEvent, EventKind};
use riskstream_core::sink::{Sink, SinkResult};
use std::fmt::Write as _;
use std::io::Write as _;

/// Writes a human-readable block per event to stdout
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }

    /// Render one event; separated out so formatting stays testable.
    pub fn format_event(event: &EnrichedEvent) -> String {
        let record = &event.record;
        let mut out = String::new();

        let created = record
            .created_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "N/A".to_string());
        let _ = writeln!(
            out,
            "Event Type: {}, Change Type: {}, Created Time: {}",
            record.kind.as_str(),
            record.change_type.as_deref().unwrap_or("N/A"),
            created
        );

        if record.kind == EventKind::Threat {
            if let Some(threat) = &record.threat {
                let _ = writeln!(
                    out,
                    "  Threat Type: {}",
                    threat.threat_type.as_deref().unwrap_or("N/A")
                );
                let _ = writeln!(
                    out,
                    "  Severity: {}",
                    threat.severity.as_deref().unwrap_or("N/A")
                );
                let _ = writeln!(
                    out,
                    "  Status: {}",
                    threat.status.as_deref().unwrap_or("N/A")
                );
                if !threat.classifications.is_empty() {
                    let _ = writeln!(
                        out,
                        "  Classifications: {}",
                        serde_json::Value::from(threat.classifications.clone())
                    );
                }
            }
        }

        match &event.metadata {
            Some(metadata) => {
                let _ = writeln!(
                    out,
                    "  User Email: {}",
                    metadata.email.as_deref().unwrap_or("N/A")
                );
                let _ = writeln!(
                    out,
                    "  Device Model: {}",
                    metadata.device_model().unwrap_or("N/A")
                );
            }
            None => {
                let _ = writeln!(out, "  No cached metadata for this actor");
            }
        }

        let _ = writeln!(
            out,
            "  Actor GUID: {}",
            record.actor_guid().unwrap_or("N/A")
        );
        let _ = writeln!(
            out,
            "  Target GUID: {}",
            record.target_guid().unwrap_or("N/A")
        );
        let _ = writeln!(out, "{}", "-".repeat(60));

        out
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn write(&self, event: &EnrichedEvent) -> SinkResult<()> {
        let rendered = Self::format_event(event);
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(rendered.as_bytes())?;
        Ok(())
    }

    async fn flush(&self) -> SinkResult<()> {
        std::io::stdout().lock().flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskstream_core::events::{CachedMetadata, EventRecord, HardwareInfo};

    fn enriched(record_json: &str, metadata: Option<CachedMetadata>) -> EnrichedEvent {
        let record: EventRecord = serde_json::from_str(record_json).unwrap();
        EnrichedEvent::new(record, metadata)
    }

    #[test]
    fn test_format_threat_with_metadata() {
        let event = enriched(
            r#"{"type":"THREAT","change_type":"CREATED","actor":{"guid":"g1","type":"DEVICE"},"threat":{"type":"MALWARE","severity":"HIGH","status":"DETECTED"}}"#,
            Some(CachedMetadata {
                email: Some("a@b.com".to_string()),
                hardware: Some(HardwareInfo {
                    model: Some("Pixel 8".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        );

        let rendered = ConsoleSink::format_event(&event);
        assert!(rendered.contains("Event Type: THREAT"));
        assert!(rendered.contains("Severity: HIGH"));
        assert!(rendered.contains("User Email: a@b.com"));
        assert!(rendered.contains("Device Model: Pixel 8"));
        assert!(rendered.contains("Actor GUID: g1"));
    }

    #[test]
    fn test_format_without_metadata() {
        let event = enriched(
            r#"{"type":"DEVICE","actor":{"guid":"g2","type":"DEVICE"}}"#,
            None,
        );

        let rendered = ConsoleSink::format_event(&event);
        assert!(rendered.contains("Event Type: DEVICE"));
        assert!(rendered.contains("No cached metadata"));
        assert!(!rendered.contains("User Email"));
    }
}
