//! Application entry point for the `windfarm-telemetry` service.
//!
//! This binary orchestrates the full startup sequence for the telemetry
//! pipeline, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool
//! - Creating the database schema if it does not exist
//! - Wiring the metadata store, enrichment engine and both sinks
//! - Running the selected mode: `batch`, `simulate`, `serve` or `export-cache`
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL connection string
//! - `TELEMETRY_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `TELEMETRY_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See [`windfarm_telemetry::config`] for the full list.
use std::path::{Path, PathBuf};
use std::{env, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use windfarm_telemetry::{
    config, routes, run_simulation, schema, BatchOrchestrator, CachedMetadataStore, Config,
    DualSinkWriter, EnrichmentEngine, FsBackupSink, MetadataStore, PgMetadataStore,
    PgPrimarySink, Pipeline, ReadingSource, ReplaySource, SimulatedSource,
};

// ---

#[derive(Debug, Parser)]
#[command(version, about = "Wind turbine telemetry simulation and enrichment pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process `RECORDS_PER_DEVICE` readings for every device, then exit.
    Batch,
    /// Generate and process readings continuously until Ctrl-C.
    Simulate,
    /// Accept wire readings over HTTP.
    Serve,
    /// Write the Postgres metadata tables to a JSON cache file, then exit.
    ExportCache {
        /// Defaults to `METADATA_CACHE_PATH`, then `metadata_cache.json`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();
    let cli = Cli::parse();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .with_context(|| {
            format!("Failed to connect to database '{}'", config::mask_db_url(&cfg.db_url))
        })?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool, &cfg.primary_table).await?;

    match cli.command.unwrap_or(Command::Batch) {
        Command::Batch => {
            let source: Arc<dyn ReadingSource> = match &cfg.replay_dir {
                Some(dir) => Arc::new(ReplaySource::new(dir)),
                None => Arc::new(SimulatedSource::new(cfg.simulation.seed)),
            };
            let pipeline = build_pipeline(&cfg, &pool).await?;
            let orchestrator = BatchOrchestrator::new(pipeline, source, cfg.batch.clone());
            orchestrator.run(&cfg.devices).await?;
        }
        Command::Simulate => {
            let pipeline = build_pipeline(&cfg, &pool).await?;
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Stop signal received, finishing in-flight writes");
                }
                on_signal.cancel();
            });
            run_simulation(pipeline, &cfg.devices, cfg.simulation.clone(), cancel).await;
        }
        Command::Serve => {
            let app = routes::router(build_pipeline(&cfg, &pool).await?);
            tracing::info!("Listening on {}", cfg.http_addr);

            let listener = tokio::net::TcpListener::bind(cfg.http_addr).await?;
            axum::serve(listener, app).await?;
        }
        Command::ExportCache { output } => {
            let output = output
                .or_else(|| cfg.metadata_cache_path.clone())
                .unwrap_or_else(|| PathBuf::from("metadata_cache.json"));
            export_cache(pool, &output).await?;
        }
    }

    Ok(())
}

// ---

/// Wire the metadata store, enrichment engine and both sinks.
async fn build_pipeline(cfg: &Config, pool: &PgPool) -> Result<Pipeline> {
    // ---
    let (store, source_label): (Arc<dyn MetadataStore>, &str) = match &cfg.metadata_cache_path {
        Some(path) => (Arc::new(CachedMetadataStore::from_file(path).await?), "metadata-cache"),
        None => (Arc::new(PgMetadataStore::new(pool.clone())), "postgres"),
    };

    let engine = EnrichmentEngine::new(store).with_source(source_label);
    let writer = DualSinkWriter::new(
        Arc::new(PgPrimarySink::new(pool.clone())),
        Arc::new(FsBackupSink::new(&cfg.backup_root)),
        cfg.primary_table.clone(),
        cfg.backup_prefix.clone(),
    );
    Ok(Pipeline::new(engine, writer))
}

/// Snapshot every device in the `turbines` table into a cache file.
async fn export_cache(pool: PgPool, output: &Path) -> Result<()> {
    // ---
    let store = PgMetadataStore::new(pool);
    let devices = store.list_devices().await?;
    let cache = CachedMetadataStore::snapshot(&store, &devices).await?;
    cache.save(output).await?;

    tracing::info!(
        "Exported metadata for {} of {} devices to {}",
        cache.device_count(),
        devices.len(),
        output.display()
    );
    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `TELEMETRY_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, falling back to `TELEMETRY_LOG_LEVEL`
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked. It installs the subscriber globally
/// for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("TELEMETRY_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("TELEMETRY_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
