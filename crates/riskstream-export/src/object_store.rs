//! Object-store sink
//!
//! Uploads the raw event record to an S3-compatible HTTP endpoint, keyed
//! deterministically by kind, creation time and actor guid so re-uploads
//! overwrite instead of duplicating.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use riskstream_core::events::{EnrichedEvent, EventRecord};
use riskstream_core::sink::{Sink, SinkError, SinkResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Object-store sink configuration
#[derive(Debug, Clone)]
pub struct ObjectStoreSinkConfig {
    /// Endpoint base URL, e.g. `https://s3.us-east-1.amazonaws.com`
    pub endpoint: String,

    /// Bucket name
    pub bucket: String,

    /// Optional bearer token for the storage gateway
    pub bearer_token: Option<String>,

    /// Request timeout
    pub timeout: Duration,

    /// Maximum upload retries
    pub max_retries: u32,

    /// Initial retry delay (doubles with each retry)
    pub initial_retry_delay: Duration,

    /// Maximum retry delay
    pub max_retry_delay: Duration,
}

impl Default for ObjectStoreSinkConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://s3.us-east-1.amazonaws.com".to_string(),
            bucket: "riskstream-events".to_string(),
            bearer_token: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

/// Upload statistics
#[derive(Debug, Clone, Default)]
pub struct ObjectStoreStats {
    pub events_uploaded: u64,
    pub events_failed: u64,
    pub retries: u64,
}

/// Durable object-store upload sink
pub struct ObjectStoreSink {
    config: ObjectStoreSinkConfig,
    client: Client,
    events_uploaded: AtomicU64,
    events_failed: AtomicU64,
    retries: AtomicU64,
}

impl ObjectStoreSink {
    /// Create a new object-store sink
    pub fn new(config: ObjectStoreSinkConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("riskstream/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            client,
            events_uploaded: AtomicU64::new(0),
            events_failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    /// Deterministic object key for a record. Re-uploading the same record
    /// targets the same key, so the store overwrites rather than
    /// duplicates.
    pub fn object_key(record: &EventRecord) -> String {
        let created = record
            .created_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "events/{}/{}_{}.json",
            record.kind.as_str(),
            created,
            record.actor_guid().unwrap_or("unknown")
        )
    }

    /// Get upload statistics
    pub fn stats(&self) -> ObjectStoreStats {
        ObjectStoreStats {
            events_uploaded: self.events_uploaded.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    async fn put_object(&self, key: &str, body: String) -> SinkResult<()> {
        let url = format!(
            "{}/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.bucket,
            key
        );

        let mut request = self
            .client
            .put(&url)
            .header("Content-Type", "application/json")
            .body(body);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        let status = response.status();

        if status.is_success() {
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(SinkError::upload(status.as_u16(), message))
        }
    }

    async fn put_with_retry(&self, key: &str, body: &str) -> SinkResult<()> {
        let mut delay = self.config.initial_retry_delay;
        let mut attempts = 0;

        loop {
            match self.put_object(key, body.to_string()).await {
                Ok(()) => return Ok(()),
                // Client errors will not improve on retry
                Err(SinkError::Upload { status, message })
                    if StatusCode::from_u16(status)
                        .map(|s| s.is_client_error())
                        .unwrap_or(false) =>
                {
                    return Err(SinkError::Upload { status, message });
                }
                Err(e) => {
                    attempts += 1;
                    if attempts > self.config.max_retries {
                        return Err(e);
                    }
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Upload of {} failed (attempt {}), retrying in {:?}: {}",
                        key, attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.config.max_retry_delay);
                }
            }
        }
    }
}

#[async_trait]
impl Sink for ObjectStoreSink {
    fn name(&self) -> &str {
        "object-store"
    }

    async fn write(&self, event: &EnrichedEvent) -> SinkResult<()> {
        let key = Self::object_key(&event.record);
        let body = serde_json::to_string(&event.record)?;

        match self.put_with_retry(&key, &body).await {
            Ok(()) => {
                self.events_uploaded.fetch_add(1, Ordering::Relaxed);
                debug!("Uploaded {}", key);
                Ok(())
            }
            Err(e) => {
                self.events_failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(json: &str) -> EventRecord {
        serde_json::from_str(json).unwrap()
    }

    fn sink_for(server: &MockServer) -> ObjectStoreSink {
        ObjectStoreSink::new(ObjectStoreSinkConfig {
            endpoint: server.uri(),
            bucket: "telemetry".to_string(),
            max_retries: 2,
            initial_retry_delay: Duration::from_millis(10),
            max_retry_delay: Duration::from_millis(40),
            ..Default::default()
        })
    }

    #[test]
    fn test_object_key_is_deterministic() {
        let record = record(
            r#"{"type":"THREAT","created_time":"2024-05-01T10:00:00Z","actor":{"guid":"g1","type":"DEVICE"}}"#,
        );

        let key = ObjectStoreSink::object_key(&record);
        assert_eq!(key, "events/THREAT/2024-05-01T10:00:00+00:00_g1.json");
        // Same record, same key
        assert_eq!(key, ObjectStoreSink::object_key(&record));
    }

    #[test]
    fn test_object_key_without_optionals() {
        let record = record(r#"{"type":"AUDIT"}"#);
        assert_eq!(
            ObjectStoreSink::object_key(&record),
            "events/AUDIT/unknown_unknown.json"
        );
    }

    #[tokio::test]
    async fn test_reupload_targets_the_same_key() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(
                "/telemetry/events/THREAT/2024-05-01T10:00:00+00:00_g1.json",
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let sink = sink_for(&server);
        let event = EnrichedEvent::new(
            record(
                r#"{"type":"THREAT","created_time":"2024-05-01T10:00:00Z","actor":{"guid":"g1","type":"DEVICE"}}"#,
            ),
            None,
        );

        sink.write(&event).await.unwrap();
        sink.write(&event).await.unwrap();
        assert_eq!(sink.stats().events_uploaded, 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let sink = sink_for(&server);
        let event = EnrichedEvent::new(record(r#"{"type":"AUDIT"}"#), None);

        let err = sink.write(&event).await.unwrap_err();
        assert!(matches!(err, SinkError::Upload { status: 403, .. }));
        assert_eq!(sink.stats().retries, 0);
        assert_eq!(sink.stats().events_failed, 1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried_up_to_bound() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3) // initial attempt + 2 retries
            .mount(&server)
            .await;

        let sink = sink_for(&server);
        let event = EnrichedEvent::new(record(r#"{"type":"AUDIT"}"#), None);

        let err = sink.write(&event).await.unwrap_err();
        assert!(matches!(err, SinkError::Upload { status: 500, .. }));
        assert_eq!(sink.stats().retries, 2);
    }
}
