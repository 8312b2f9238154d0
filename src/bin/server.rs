//! thermodb Server Binary
//!
//! Reads `topic payload` lines (the `mosquitto_sub -v` output format) from
//! stdin, persists them and keeps a text report up to date.
//!
//! ```text
//! mosquitto_sub -v -t 'zigbee2mqtt/Temperature/#' | thermodb-server --sensors sensors.json
//! ```

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam::channel;
use jiff::tz::TimeZone;
use thermodb::aggregate::SystemClock;
use thermodb::config::SyncStrategy;
use thermodb::ingest::{Adapter, Ingestor};
use thermodb::report::ReportOptions;
use thermodb::{report, Config, Engine, Layout, Result, SensorDescriptor, ThermoError};
use tracing_subscriber::{fmt, EnvFilter};

/// thermodb Server
#[derive(Parser, Debug)]
#[command(name = "thermodb-server")]
#[command(about = "Persist temperature sensor telemetry into a fixed-slot database")]
#[command(version)]
struct Args {
    /// Database file (created if missing)
    #[arg(short, long, default_value = "./temps.db")]
    db: PathBuf,

    /// JSON file listing the sensors, in storage order
    #[arg(short, long)]
    sensors: PathBuf,

    /// Aggregate cache file (default: <db>.cache)
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Time zone for day buckets and reports
    #[arg(short = 'z', long, default_value = thermodb::config::DEFAULT_TIME_ZONE)]
    time_zone: String,

    /// File sized with 365-day years (no leap days)
    #[arg(long)]
    legacy_layout: bool,

    /// Append sensors that are new in the sensors file
    #[arg(long)]
    allow_growth: bool,

    /// Bound the ingestion queue
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// fsync after this many writes (default: only on shutdown)
    #[arg(long)]
    sync_every: Option<usize>,

    /// Rewrite this report file while running
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Seconds between report rewrites
    #[arg(long, default_value = "30")]
    report_interval: u64,

    /// JSON file of sensor groups for the highs/lows table
    #[arg(short, long)]
    groups: Option<PathBuf>,

    /// Sensor indices to list in the report, in order (e.g. 1,2,0,3)
    #[arg(long, value_delimiter = ',')]
    order: Vec<usize>,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,thermodb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("thermodb server v{}", thermodb::VERSION);
    tracing::info!("Database: {}", args.db.display());

    if let Err(e) = run(args) {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

fn run(args: Args) -> Result<()> {
    let sensors = load_sensors(&args.sensors)?;
    let options = ReportOptions {
        order: (!args.order.is_empty()).then(|| args.order.clone()),
        groups: match &args.groups {
            Some(path) => report::load_groups(path)?,
            None => Vec::new(),
        },
    };
    let time_zone = TimeZone::get(&args.time_zone)
        .map_err(|e| ThermoError::Config(format!("time zone '{}': {}", args.time_zone, e)))?;

    // Build config from args
    let mut builder = Config::builder()
        .db_path(&args.db)
        .display_time_zone(time_zone.clone())
        .allow_growth(args.allow_growth);
    if args.legacy_layout {
        builder = builder.layout(Layout::legacy());
    }
    if let Some(cache) = &args.cache {
        builder = builder.cache_path(cache);
    }
    if let Some(capacity) = args.queue_capacity {
        builder = builder.queue_capacity(capacity);
    }
    if let Some(count) = args.sync_every {
        builder = builder.sync_strategy(SyncStrategy::EveryNWrites { count });
    }
    let config = builder.build();

    // Open engine (startup failures are fatal)
    let engine = Arc::new(Engine::open(config, &sensors)?);
    tracing::info!("Engine initialized with {} sensors", engine.database().sensor_count());

    let adapter = Adapter::new(&engine.database().sensors());
    let ingest = Ingestor::spawn(Arc::clone(&engine))?;

    // Periodic report writer, reading snapshots alongside the writer thread
    let (stop_tx, stop_rx) = channel::bounded::<()>(1);
    let reporter = args.report.clone().map(|path| {
        let engine = Arc::clone(&engine);
        let tz = time_zone.clone();
        let options = options.clone();
        let ticker = channel::tick(Duration::from_secs(args.report_interval.max(1)));
        thread::spawn(move || loop {
            write_report(&engine, &tz, &options, &path);
            channel::select! {
                recv(ticker) -> _ => {}
                recv(stop_rx) -> _ => break,
            }
        })
    });

    tracing::info!("Loaded. Reading messages from stdin");
    let fed = adapter.feed(io::stdin().lock(), &ingest.sender(), &SystemClock);
    match &fed {
        Ok(queued) => tracing::info!("Input closed after {} messages, shutting down", queued),
        Err(e) => tracing::error!("Input failed, shutting down: {}", e),
    }

    // Always drain the queue and close, even when input failed
    let stopped = ingest.shutdown();
    if let Ok(stats) = &stopped {
        tracing::info!(
            "Recorded {} events ({} cleared, {} rejected)",
            stats.recorded,
            stats.cleared,
            stats.rejected
        );
    }

    drop(stop_tx);
    if let Some(reporter) = reporter {
        let _ = reporter.join();
    }
    if let Some(path) = &args.report {
        write_report(&engine, &time_zone, &options, path);
    }

    let closed = engine.close();
    fed?;
    stopped?;
    closed
}

/// Read the sensor list (JSON array of descriptors)
fn load_sensors(path: &Path) -> Result<Vec<SensorDescriptor>> {
    let file = File::open(path).map_err(|e| {
        ThermoError::Config(format!("cannot open sensors file {}: {}", path.display(), e))
    })?;
    let sensors: Vec<SensorDescriptor> = serde_json::from_reader(io::BufReader::new(file))?;
    for sensor in &sensors {
        sensor.validate()?;
    }
    Ok(sensors)
}

/// Render and write the report; failures are logged only
fn write_report(engine: &Engine, tz: &TimeZone, options: &ReportOptions, path: &Path) {
    let text = report::render_with(&engine.snapshot(), tz, options);
    if let Err(e) = fs::write(path, text) {
        tracing::warn!("Failed to write report {}: {}", path.display(), e);
    }
}
