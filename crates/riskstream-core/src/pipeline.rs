//! Event pipeline - drives decoded records through enrichment to the sinks
//!
//! The stream consumer feeds records into a bounded channel; a single
//! processing task classifies, enriches, and writes them in arrival order.
//! Slow sink I/O therefore backpressures the reader instead of dropping
//! events. Failures are isolated to the event they occurred on.

use crate::events::{EnrichedEvent, EventKind, EventRecord};
use crate::sink::{Enrich, Sink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Channel capacity for decoded records
    pub buffer_size: usize,

    /// How long `stop` waits for queued events to drain
    pub drain_grace: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            drain_grace: Duration::from_secs(5),
        }
    }
}

/// Pipeline counters
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub events_processed: AtomicU64,
    pub events_enriched: AtomicU64,
    pub sink_failures: AtomicU64,
}

/// The processing half of the stream: enrichment and sink fan-out
pub struct Pipeline {
    config: PipelineConfig,
    enrichers: Vec<Arc<dyn Enrich>>,
    sinks: Vec<Arc<dyn Sink>>,
    stats: Arc<PipelineStats>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Create a new pipeline with configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            enrichers: Vec::new(),
            sinks: Vec::new(),
            stats: Arc::new(PipelineStats::default()),
            shutdown_tx: None,
            task: None,
        }
    }

    /// Add an enricher
    pub fn add_enricher(&mut self, enricher: Arc<dyn Enrich>) {
        self.enrichers.push(enricher);
    }

    /// Add a sink
    pub fn add_sink(&mut self, sink: Arc<dyn Sink>) {
        self.sinks.push(sink);
    }

    /// Get the shared counters
    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Start the processing task and return the record sender.
    pub fn start(&mut self) -> mpsc::Sender<EventRecord> {
        let (tx, mut rx) = mpsc::channel::<EventRecord>(self.config.buffer_size);

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        let enrichers = self.enrichers.clone();
        let sinks = self.sinks.clone();
        let stats = self.stats.clone();
        let drain_grace = self.config.drain_grace;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe = rx.recv() => match maybe {
                        Some(record) => {
                            Self::process_record(record, &enrichers, &sinks, &stats).await;
                        }
                        // All senders dropped, channel closed
                        None => break,
                    },
                    _ = shutdown_rx.recv() => {
                        info!("Pipeline shutdown signal received, draining");
                        Self::drain(&mut rx, &enrichers, &sinks, &stats, drain_grace).await;
                        break;
                    }
                }
            }

            for sink in &sinks {
                if let Err(e) = sink.flush().await {
                    warn!("Error flushing sink {}: {}", sink.name(), e);
                }
            }
            info!("Pipeline stopped");
        });
        self.task = Some(task);

        tx
    }

    /// Signal shutdown and wait for the processing task to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = &self.shutdown_tx {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Pipeline task ended abnormally: {}", e);
            }
        }
    }

    /// Process queued records for at most the grace period, then report
    /// whatever had to be left behind.
    async fn drain(
        rx: &mut mpsc::Receiver<EventRecord>,
        enrichers: &[Arc<dyn Enrich>],
        sinks: &[Arc<dyn Sink>],
        stats: &PipelineStats,
        grace: Duration,
    ) {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(record)) => {
                    Self::process_record(record, enrichers, sinks, stats).await;
                }
                Ok(None) => break,
                Err(_) => {
                    rx.close();
                    let mut abandoned = 0usize;
                    while rx.try_recv().is_ok() {
                        abandoned += 1;
                    }
                    if abandoned > 0 {
                        warn!(
                            "Drain grace period elapsed, {} events left unwritten",
                            abandoned
                        );
                    }
                    break;
                }
            }
        }
    }

    /// Process a single record: classify, enrich, write to every sink.
    async fn process_record(
        record: EventRecord,
        enrichers: &[Arc<dyn Enrich>],
        sinks: &[Arc<dyn Sink>],
        stats: &PipelineStats,
    ) {
        // Per-kind dispatch; unknown kinds pass through, never dropped
        match record.kind {
            EventKind::Threat => {
                let severity = record
                    .threat
                    .as_ref()
                    .and_then(|t| t.severity.as_deref())
                    .unwrap_or("N/A");
                let status = record
                    .threat
                    .as_ref()
                    .and_then(|t| t.status.as_deref())
                    .unwrap_or("N/A");
                info!(
                    severity,
                    status,
                    actor = record.actor_guid().unwrap_or("-"),
                    "Threat event"
                );
            }
            EventKind::Device | EventKind::Audit => {
                debug!(
                    kind = record.kind.as_str(),
                    change_type = record.change_type.as_deref().unwrap_or("-"),
                    actor = record.actor_guid().unwrap_or("-"),
                    "Event received"
                );
            }
            EventKind::Unknown => {
                debug!("Passing through event of unknown kind");
            }
        }

        let mut metadata = None;
        for enricher in enrichers {
            metadata = enricher.enrich(&record).await;
            if metadata.is_some() {
                break;
            }
        }
        if metadata.is_some() {
            stats.events_enriched.fetch_add(1, Ordering::Relaxed);
        }

        let enriched = EnrichedEvent::new(record, metadata);
        for sink in sinks {
            if let Err(e) = sink.write(&enriched).await {
                stats.sink_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Sink {} failed: {}", sink.name(), e);
            }
        }
        stats.events_processed.fetch_add(1, Ordering::Relaxed);
    }
}
