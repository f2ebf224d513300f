//! JSONL file sink
//!
//! Durable structured log: one JSON document per line, carrying the full
//! enriched event (record plus whatever metadata was joined).

use async_trait::async_trait;
use riskstream_core::events::EnrichedEvent;
use riskstream_core::sink::{Sink, SinkResult};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::info;

/// JSONL sink configuration
#[derive(Debug, Clone)]
pub struct JsonlSinkConfig {
    /// Output file path
    pub path: PathBuf,

    /// Whether to append to an existing file
    pub append: bool,

    /// Flush after each write
    pub flush_each: bool,
}

impl Default for JsonlSinkConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("riskstream-events.jsonl"),
            append: true,
            flush_each: true,
        }
    }
}

/// JSONL file sink
pub struct JsonlSink {
    config: JsonlSinkConfig,
    writer: Mutex<BufWriter<File>>,
    events_written: AtomicU64,
}

impl JsonlSink {
    /// Open the output file and create the sink
    pub fn new(config: JsonlSinkConfig) -> std::io::Result<Self> {
        let file = if config.append {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.path)?
        } else {
            File::create(&config.path)?
        };
        info!("JSONL sink writing to {:?}", config.path);

        Ok(Self {
            config,
            writer: Mutex::new(BufWriter::new(file)),
            events_written: AtomicU64::new(0),
        })
    }

    /// Number of events written so far
    pub fn events_written(&self) -> u64 {
        self.events_written.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Sink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn write(&self, event: &EnrichedEvent) -> SinkResult<()> {
        let json = serde_json::to_string(event)?;

        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(writer, "{}", json)?;
        if self.config.flush_each {
            writer.flush()?;
        }

        self.events_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn flush(&self) -> SinkResult<()> {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.flush()?;
        Ok(())
    }
}
