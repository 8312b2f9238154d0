//! thermodb CLI
//!
//! Inspects an existing database. Never creates or grows the file.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use jiff::tz::TimeZone;
use jiff::Timestamp;
use thermodb::aggregate::{Aggregator, SystemClock};
use thermodb::config::SyncStrategy;
use thermodb::report::ReportOptions;
use thermodb::{report, Config, Database, Event, Layout, Result, ThermoError};
use tracing_subscriber::{fmt, EnvFilter};

/// thermodb CLI
#[derive(Parser, Debug)]
#[command(name = "thermodb-cli")]
#[command(about = "Inspect a thermodb database")]
struct Args {
    /// Database file
    #[arg(short, long, default_value = "./temps.db")]
    db: PathBuf,

    /// Time zone for dates and reports
    #[arg(short = 'z', long, default_value = thermodb::config::DEFAULT_TIME_ZONE)]
    time_zone: String,

    /// File sized with 365-day years (no leap days)
    #[arg(long)]
    legacy_layout: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the sensors stored in the file
    Info,

    /// Print stored records
    Dump {
        /// Only this sensor (default: all)
        #[arg(short, long)]
        sensor: Option<usize>,

        /// Interleave sensors in timestamp order
        #[arg(short, long)]
        merged: bool,
    },

    /// Read the slot containing a timestamp
    Read {
        /// Sensor index
        sensor: usize,

        /// RFC 3339 timestamp, e.g. 2024-06-01T12:00:00Z
        timestamp: String,
    },

    /// Rebuild the aggregate view and print the report
    Report {
        /// JSON file of sensor groups for the highs/lows table
        #[arg(short, long)]
        groups: Option<PathBuf>,

        /// Sensor indices to list, in order (e.g. 1,2,0,3)
        #[arg(long, value_delimiter = ',')]
        order: Vec<usize>,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let tz = TimeZone::get(&args.time_zone)
        .map_err(|e| ThermoError::Config(format!("time zone '{}': {}", args.time_zone, e)))?;
    let layout = if args.legacy_layout {
        Layout::legacy()
    } else {
        Layout::default()
    };
    let db = Database::open_existing(&args.db, layout, SyncStrategy::OnClose)?;

    match args.command {
        Commands::Info => {
            let layout = db.layout();
            println!("{}", db.path().display());
            println!(
                "  {} sensors, {} slots per section, {} bytes per section",
                db.sensor_count(),
                layout.slot_count(),
                layout.section_size()
            );
            println!("  range {} .. {}", layout.epoch(), layout.end());
            for (index, sensor) in db.sensors().iter().enumerate() {
                println!(
                    "  #{:<3} device {:<3} {:<40} {}",
                    index, sensor.device_id, sensor.label, sensor.topic
                );
            }
        }
        Commands::Dump { sensor, merged } => {
            let events: Box<dyn Iterator<Item = Result<Event>> + '_> = match (sensor, merged) {
                (Some(sensor), _) => Box::new(db.iter_sensor(sensor)?),
                (None, true) => Box::new(db.iter_merged()),
                (None, false) => Box::new(db.iter_all()),
            };
            for event in events {
                print_event(&event?, &tz);
            }
        }
        Commands::Read { sensor, timestamp } => {
            let ts: Timestamp = timestamp
                .parse()
                .map_err(|e| ThermoError::Config(format!("timestamp '{}': {}", timestamp, e)))?;
            match db.read_by_timestamp(sensor, ts)? {
                Some(record) => {
                    let slot_start = db.layout().truncate(ts)?;
                    print_event(&Event::from_record(sensor, slot_start, &record), &tz);
                }
                None => println!("no reading"),
            }
        }
        Commands::Report { groups, order } => {
            let config = Config::builder()
                .db_path(&args.db)
                .layout(layout)
                .display_time_zone(tz.clone())
                .build();
            let aggregator = Aggregator::rebuild(&db, &config, Arc::new(SystemClock))?;
            let options = ReportOptions {
                order: (!order.is_empty()).then_some(order),
                groups: match groups {
                    Some(path) => report::load_groups(&path)?,
                    None => Vec::new(),
                },
            };
            print!("{}", report::render_with(&aggregator.snapshot(), &tz, &options));
        }
    }

    Ok(())
}

fn print_event(event: &Event, tz: &TimeZone) {
    let time = report::readable_time(event.timestamp, tz);
    match event.decode() {
        Ok(Some(r)) => println!(
            "{}, sensor #{}: v{} #{} -- {:.2}% humid -- {:.2}°C -- {}V -- {} link -- {}% batt",
            time,
            event.sensor + 1,
            r.version,
            r.device_id,
            r.humidity_percent(),
            r.temperature_celsius(),
            r.voltage,
            r.link_quality,
            r.battery
        ),
        Ok(None) => println!("{}, sensor #{}: absent", time, event.sensor + 1),
        Err(e) => println!("{}, sensor #{}: {} {:?}", time, event.sensor + 1, e, event.record),
    }
}
