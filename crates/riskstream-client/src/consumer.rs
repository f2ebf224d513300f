//! Long-lived SSE stream consumption
//!
//! Owns the connection to the vendor event stream: opens it with a valid
//! bearer token, feeds the body through the frame parser, forwards decoded
//! records into the pipeline channel in server-delivery order, and
//! reconnects with bounded exponential backoff on failure.
//!
//! Known gap: across a reconnect, at-most-once delivery is not guaranteed
//! by this component. The server's own replay/offset semantics (if any)
//! are outside this pipeline's control; every reconnect logs the gap
//! instant so operators can correlate.

use crate::error::{ClientError, ClientResult};
use crate::token::{Credential, TokenProvider};
use chrono::Utc;
use futures_util::StreamExt;
use rand::Rng;
use reqwest::{Client, StatusCode};
use riskstream_core::config::RelayConfig;
use riskstream_core::events::EventRecord;
use riskstream_decode::{decode_envelope, FrameKind, FrameParser, RawFrame};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, trace, warn};

/// Connection lifecycle of the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Streaming,
    Reconnecting,
    Stopped,
}

/// Why one connection's streaming loop ended
enum StreamEnd {
    /// Shutdown signal observed
    Shutdown,
    /// Pipeline receiver dropped; nothing left to feed
    ReceiverClosed,
    /// Peer closed the response body
    PeerClosed { frames_seen: u64 },
}

/// Consumes the vendor SSE event stream and feeds the pipeline
pub struct StreamConsumer {
    http: Client,
    tokens: Arc<TokenProvider>,
    stream_url: String,
    types: Option<String>,
    max_retries: u32,
    backoff_base: Duration,
    backoff_max: Duration,
    state: RwLock<ConnectionState>,
}

impl StreamConsumer {
    /// Create a new consumer from the relay configuration
    pub fn new(config: &RelayConfig, tokens: Arc<TokenProvider>) -> Self {
        // No overall request timeout: the response body is open-ended.
        let http = Client::builder()
            .connect_timeout(config.stream.connect_timeout())
            .user_agent(format!("riskstream/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            tokens,
            stream_url: config.stream.stream_url(&config.auth.api_base),
            types: config.stream.types_param(),
            max_retries: config.stream.max_retries,
            backoff_base: config.stream.backoff_base(),
            backoff_max: config.stream.backoff_max(),
            state: RwLock::new(ConnectionState::Idle),
        }
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    /// Drive the stream until shutdown or an unrecoverable failure.
    ///
    /// Records are sent into `tx` in server-delivery order. Returns `Ok`
    /// on clean shutdown; `Err` on startup auth failure or once
    /// `max_retries` consecutive connection attempts have failed.
    pub async fn run(
        &self,
        tx: mpsc::Sender<EventRecord>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> ClientResult<()> {
        let mut attempt: u32 = 0;
        let mut ever_connected = false;

        loop {
            self.set_state(ConnectionState::Connecting).await;

            let outcome = match self.tokens.ensure_valid().await {
                Ok(credential) => self.stream_once(&credential, &tx, &mut shutdown).await,
                Err(e) => Err(e),
            };

            let mut rate_limit_floor = None;
            match outcome {
                Ok(StreamEnd::Shutdown) | Ok(StreamEnd::ReceiverClosed) => {
                    self.set_state(ConnectionState::Stopped).await;
                    info!("Stream consumer stopped");
                    return Ok(());
                }
                Ok(StreamEnd::PeerClosed { frames_seen }) => {
                    if frames_seen > 0 {
                        attempt = 0;
                    }
                    ever_connected = true;
                    warn!("Stream closed by peer at {}", Utc::now().to_rfc3339());
                }
                Err(e) if e.is_auth() => {
                    if !ever_connected {
                        self.set_state(ConnectionState::Stopped).await;
                        return Err(e);
                    }
                    warn!("Stream rejected credential, re-acquiring: {}", e);
                    self.tokens.invalidate().await;
                }
                Err(e) if e.is_retryable() => {
                    if let ClientError::RateLimited(secs) = &e {
                        rate_limit_floor = Some(Duration::from_secs(*secs));
                    }
                    warn!("Stream connection failed at {}: {}", Utc::now().to_rfc3339(), e);
                }
                Err(e) => {
                    self.set_state(ConnectionState::Stopped).await;
                    return Err(e);
                }
            }

            attempt += 1;
            if attempt > self.max_retries {
                self.set_state(ConnectionState::Stopped).await;
                return Err(ClientError::RetriesExhausted(attempt));
            }

            self.set_state(ConnectionState::Reconnecting).await;
            let mut delay = backoff_delay(self.backoff_base, self.backoff_max, attempt);
            if let Some(floor) = rate_limit_floor {
                delay = delay.max(floor);
            }
            info!("Reconnecting in {:?} (attempt {})", delay, attempt);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    self.set_state(ConnectionState::Stopped).await;
                    info!("Stream consumer stopped");
                    return Ok(());
                }
            }
        }
    }

    /// Open the stream once and pump frames until it ends.
    async fn stream_once(
        &self,
        credential: &Credential,
        tx: &mpsc::Sender<EventRecord>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> ClientResult<StreamEnd> {
        let mut request = self
            .http
            .get(&self.stream_url)
            .bearer_auth(&credential.access_token)
            .header("Accept", "text/event-stream");
        if let Some(types) = &self.types {
            request = request.query(&[("types", types.as_str())]);
        }

        // Shutdown must also interrupt a connect in progress
        let response = tokio::select! {
            res = request.send() => res?,
            _ = shutdown.recv() => return Ok(StreamEnd::Shutdown),
        };
        let status = response.status();
        match status {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ClientError::Auth(format!(
                    "stream rejected token with {}",
                    status
                )));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                return Err(ClientError::RateLimited(retry_after));
            }
            _ => {
                let message = response.text().await.unwrap_or_default();
                return Err(ClientError::server(status.as_u16(), message));
            }
        }

        self.set_state(ConnectionState::Streaming).await;
        info!("Connected to event stream");

        let mut body = response.bytes_stream();
        let mut parser = FrameParser::new();
        let mut frames_seen: u64 = 0;

        loop {
            tokio::select! {
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        parser.feed(&bytes);
                        for frame in parser.take_frames() {
                            frames_seen += 1;
                            if !self.dispatch_frame(frame, tx).await {
                                return Ok(StreamEnd::ReceiverClosed);
                            }
                        }
                    }
                    Some(Err(e)) => return Err(ClientError::Network(e)),
                    None => return Ok(StreamEnd::PeerClosed { frames_seen }),
                },
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, closing stream");
                    return Ok(StreamEnd::Shutdown);
                }
            }
        }
    }

    /// Handle one frame. Returns false when the pipeline receiver is gone.
    async fn dispatch_frame(&self, frame: RawFrame, tx: &mpsc::Sender<EventRecord>) -> bool {
        match frame.kind {
            FrameKind::Heartbeat => {
                trace!("Heartbeat");
                true
            }
            FrameKind::Events => match decode_envelope(&frame.data) {
                Ok(envelope) => {
                    debug!("Frame carried {} record(s)", envelope.events.len());
                    for record in envelope.events {
                        if tx.send(record).await.is_err() {
                            warn!("Pipeline channel closed, stopping dispatch");
                            return false;
                        }
                    }
                    true
                }
                Err(e) => {
                    // Per-frame isolation: the stream keeps going
                    warn!("Skipping malformed events frame: {}", e);
                    true
                }
            },
            FrameKind::Unknown => {
                warn!(
                    "Unknown frame received: {}",
                    frame.name.as_deref().unwrap_or("<unnamed>")
                );
                true
            }
        }
    }
}

/// Exponential backoff with jitter: `min(base * 2^attempt, max)` plus up
/// to half that again, so synchronized reconnect storms spread out.
fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1u32 << attempt.min(6));
    let capped = exp.min(max);
    let jitter_ms = rand::thread_rng().gen_range(0..=(capped.as_millis() as u64) / 2);
    capped + Duration::from_millis(jitter_ms)
}
