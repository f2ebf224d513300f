//! Riskstream relay - vendor security telemetry stream forwarder
//!
//! Consumes the vendor's SSE event stream, enriches events with cached
//! actor metadata, and forwards them to the configured sinks.

use clap::{Parser, Subcommand};
use riskstream_client::{StreamConsumer, TokenProvider};
use riskstream_core::config::RelayConfig;
use riskstream_core::pipeline::{Pipeline, PipelineConfig};
use riskstream_enrich::{MetadataCache, MetadataEnricher, RedisStore};
use riskstream_export::{
    ConsoleSink, JsonlSink, JsonlSinkConfig, ObjectStoreSink, ObjectStoreSinkConfig,
};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "riskstream")]
#[command(version)]
#[command(about = "Security telemetry stream relay", long_about = None)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format (json, text)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "RISKSTREAM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume the event stream, enrich, and forward to the configured sinks
    Run {
        /// Server-side event kind filter, comma-separated (e.g. THREAT,DEVICE)
        #[arg(short, long)]
        types: Option<String>,

        /// Disable the console sink
        #[arg(long)]
        no_console: bool,

        /// Write enriched events to a JSONL file
        #[arg(short, long)]
        jsonl: Option<PathBuf>,

        /// Disable cache-backed enrichment
        #[arg(long)]
        no_cache: bool,
    },

    /// Print raw event records to stdout, no enrichment or sinks
    Tail {
        /// Server-side event kind filter, comma-separated
        #[arg(short, long)]
        types: Option<String>,
    },

    /// Validate configuration and connectivity, then exit
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = RelayConfig::load(cli.config.as_deref())?;

    // CLI verbose flag takes precedence, then config, then default
    let log_level = if cli.verbose > 0 {
        match cli.verbose {
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    } else {
        match config.relay.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false);
    if cli.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Run {
            types,
            no_console,
            jsonl,
            no_cache,
        } => {
            if let Some(types) = types {
                config.stream.event_types = parse_types(&types);
            }
            if no_console {
                config.export.console.enabled = false;
            }
            if let Some(path) = jsonl {
                config.export.jsonl.enabled = true;
                config.export.jsonl.path = path;
            }
            if no_cache {
                config.cache.enabled = false;
            }
            run_command(config).await
        }
        Commands::Tail { types } => {
            if let Some(types) = types {
                config.stream.event_types = parse_types(&types);
            }
            tail_command(config).await
        }
        Commands::Check => check_command(config).await,
    }
}

fn parse_types(types: &str) -> Vec<String> {
    types
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Main relay loop: stream -> pipeline -> sinks, until interrupted or the
/// reconnect budget is spent.
async fn run_command(config: RelayConfig) -> anyhow::Result<()> {
    config.validate()?;

    let tokens = Arc::new(TokenProvider::new(
        &config.auth,
        config.stream.connect_timeout(),
    ));

    let mut pipeline = Pipeline::new(PipelineConfig {
        buffer_size: config.stream.buffer_size,
        drain_grace: config.stream.drain_grace(),
    });

    if config.cache.enabled {
        match RedisStore::connect(&config.cache.url()).await {
            Ok(store) => {
                let cache = MetadataCache::new(Arc::new(store));
                pipeline.add_enricher(Arc::new(MetadataEnricher::new(cache)));
                info!("Metadata cache connected at {}", config.cache.url());
            }
            Err(e) => {
                warn!(
                    "Metadata cache unavailable, events will not be enriched: {}",
                    e
                );
            }
        }
    }

    if config.export.console.enabled {
        pipeline.add_sink(Arc::new(ConsoleSink::new()));
    }
    if config.export.jsonl.enabled {
        let sink = JsonlSink::new(JsonlSinkConfig {
            path: config.export.jsonl.path.clone(),
            ..Default::default()
        })?;
        pipeline.add_sink(Arc::new(sink));
    }
    if config.export.object_store.enabled {
        let settings = &config.export.object_store;
        let bucket = settings
            .bucket
            .clone()
            .ok_or_else(|| anyhow::anyhow!("object-store bucket missing"))?;
        pipeline.add_sink(Arc::new(ObjectStoreSink::new(ObjectStoreSinkConfig {
            endpoint: settings.endpoint_url(),
            bucket,
            bearer_token: settings.bearer_token.clone(),
            timeout: settings.timeout(),
            max_retries: settings.max_retries,
            ..Default::default()
        })));
        info!("Object-store sink enabled");
    }

    let tx = pipeline.start();
    let stats = pipeline.stats();

    let consumer = StreamConsumer::new(&config, tokens);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut consumer_task =
        tokio::spawn(async move { consumer.run(tx, shutdown_rx).await });

    info!("Relay started, streaming {}", config.stream.event_types.join(","));

    let consumer_result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(());
            consumer_task.await?
        }
        res = &mut consumer_task => res?,
    };

    pipeline.stop().await;
    info!(
        "Processed {} events ({} enriched, {} sink failures)",
        stats.events_processed.load(Ordering::Relaxed),
        stats.events_enriched.load(Ordering::Relaxed),
        stats.sink_failures.load(Ordering::Relaxed),
    );

    consumer_result?;
    Ok(())
}

/// Raw view of the stream: records straight to stdout as JSON lines.
async fn tail_command(config: RelayConfig) -> anyhow::Result<()> {
    config.validate()?;

    let tokens = Arc::new(TokenProvider::new(
        &config.auth,
        config.stream.connect_timeout(),
    ));
    let consumer = StreamConsumer::new(&config, tokens);

    let (tx, mut rx) = mpsc::channel(config.stream.buffer_size);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut consumer_task =
        tokio::spawn(async move { consumer.run(tx, shutdown_rx).await });

    let printer = tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            match serde_json::to_string(&record) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("Failed to serialize record: {}", e),
            }
        }
    });

    let consumer_result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(());
            consumer_task.await?
        }
        res = &mut consumer_task => res?,
    };

    printer.await?;
    consumer_result?;
    Ok(())
}

/// Startup diagnostics: configuration, token endpoint, cache reachability.
async fn check_command(config: RelayConfig) -> anyhow::Result<()> {
    config.validate()?;
    println!("Configuration OK");

    let tokens = TokenProvider::new(&config.auth, config.stream.connect_timeout());
    let credential = tokens.acquire().await?;
    println!(
        "Token endpoint OK, token expires at {}",
        credential.expires_at.to_rfc3339()
    );

    if config.cache.enabled {
        match RedisStore::connect(&config.cache.url()).await {
            Ok(_) => println!("Metadata cache OK at {}", config.cache.url()),
            Err(e) => println!("Metadata cache UNAVAILABLE: {}", e),
        }
    } else {
        println!("Metadata cache disabled");
    }

    Ok(())
}
