//! Report Module
//!
//! Plain-text reports rendered from an aggregate snapshot.
//!
//! Highs and lows are shown either per sensor or per named group of
//! sensors (e.g. "inside" / "outside"), where a group's range for a date
//! spans every member's range. A display order picks which sensors are
//! listed, and in what order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use jiff::civil::Date;
use jiff::tz::TimeZone;
use jiff::{SignedDuration, Timestamp};
use serde::Deserialize;

use crate::aggregate::{DayRange, SensorSnapshot, Snapshot};
use crate::error::{Result, ThermoError};

/// Column width of the highs/lows table
const COLUMN_WIDTH: usize = 16;

/// Repeat the highs/lows column header every this many rows
const HEADER_EVERY: usize = 50;

/// Placeholder for a date without readings (same width as a range)
const NO_RANGE: &str = "--           ";

/// Named set of sensors reported as one highs/lows column
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SensorGroup {
    pub name: String,

    /// Sensor indices
    pub sensors: Vec<usize>,
}

impl SensorGroup {
    pub fn new(name: impl Into<String>, sensors: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            sensors,
        }
    }
}

/// What a report shows beyond the defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOptions {
    /// Sensor indices to list, in display order (default: all, by index)
    ///
    /// Indices that name no sensor are skipped.
    pub order: Option<Vec<usize>>,

    /// Highs/lows columns per group instead of per sensor
    pub groups: Vec<SensorGroup>,
}

/// Read a JSON array of groups, e.g. `[{"name":"outside","sensors":[1,2]}]`
pub fn load_groups(path: &Path) -> Result<Vec<SensorGroup>> {
    let file = File::open(path).map_err(|e| {
        ThermoError::Config(format!("cannot open groups file {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Full report: current readings, then historical highs and lows
pub fn render(snapshot: &Snapshot, tz: &TimeZone) -> String {
    render_with(snapshot, tz, &ReportOptions::default())
}

/// Full report with highs and lows per sensor group
pub fn render_grouped(snapshot: &Snapshot, tz: &TimeZone, groups: &[SensorGroup]) -> String {
    let options = ReportOptions {
        order: None,
        groups: groups.to_vec(),
    };
    render_with(snapshot, tz, &options)
}

/// Full report shaped by `options`
pub fn render_with(snapshot: &Snapshot, tz: &TimeZone, options: &ReportOptions) -> String {
    let shown = Shown::new(snapshot, options.order.as_deref());

    let mut out = current_table(snapshot, tz, &shown);
    out.push_str("\n-------------\n\n");
    if options.groups.is_empty() {
        out.push_str(&sensor_high_low(snapshot, tz, &shown));
    } else {
        out.push_str(&render_group_high_low(snapshot, tz, &options.groups));
    }
    out
}

/// Table of the latest reading of every sensor
pub fn render_current(snapshot: &Snapshot, tz: &TimeZone) -> String {
    current_table(snapshot, tz, &Shown::new(snapshot, None))
}

/// Sensors selected for display, in display order
struct Shown<'a> {
    sensors: Vec<&'a SensorSnapshot>,
}

impl<'a> Shown<'a> {
    fn new(snapshot: &'a Snapshot, order: Option<&[usize]>) -> Self {
        let sensors = match order {
            Some(order) => order
                .iter()
                .filter_map(|&index| snapshot.sensors.get(index))
                .collect(),
            None => snapshot.sensors.iter().collect(),
        };
        Self { sensors }
    }
}

fn current_table(snapshot: &Snapshot, tz: &TimeZone, shown: &Shown<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Current Temperatures");
    let _ = writeln!(out, "  last updated: {}", readable_time(snapshot.taken_at, tz));
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<27}   {:>7}     {:>7}     Last update",
        "Sensor", "Temp", "Humid"
    );

    for sensor in &shown.sensors {
        let temperature = sensor
            .temperature
            .map(|t| format!("{:>5.2}°C", t))
            .unwrap_or_else(|| "--".to_string());
        let humidity = sensor
            .humidity
            .map(|h| format!("{:>6.2}%", h))
            .unwrap_or_else(|| "--".to_string());
        let elapsed = match sensor.last_update {
            Some(ts) => readable_elapsed(snapshot.taken_at.duration_since(ts)),
            None => "never".to_string(),
        };

        let _ = writeln!(
            out,
            "{:<27}   {:>7}     {:>7}     {}",
            sensor.descriptor.label, temperature, humidity, elapsed
        );
    }

    out
}

/// Per-date temperature ranges of every sensor, newest date first
pub fn render_high_low(snapshot: &Snapshot, tz: &TimeZone) -> String {
    sensor_high_low(snapshot, tz, &Shown::new(snapshot, None))
}

fn sensor_high_low(snapshot: &Snapshot, tz: &TimeZone, shown: &Shown<'_>) -> String {
    let columns: Vec<Column<'_>> = shown
        .sensors
        .iter()
        .map(|sensor| Column {
            label: &sensor.descriptor.label,
            days: sensor.days.clone(),
        })
        .collect();

    high_low_table(snapshot.taken_at, tz, &columns)
}

/// Per-date temperature ranges of every group, newest date first
///
/// Indices that name no sensor are ignored.
pub fn render_group_high_low(snapshot: &Snapshot, tz: &TimeZone, groups: &[SensorGroup]) -> String {
    let columns: Vec<Column<'_>> = groups
        .iter()
        .map(|group| {
            let mut days: BTreeMap<Date, DayRange> = BTreeMap::new();
            for sensor in group.sensors.iter().filter_map(|&i| snapshot.sensors.get(i)) {
                for (date, range) in &sensor.days {
                    days.entry(*date)
                        .and_modify(|merged| {
                            merged.extend(range.min);
                            merged.extend(range.max);
                        })
                        .or_insert(*range);
                }
            }
            Column {
                label: &group.name,
                days,
            }
        })
        .collect();

    high_low_table(snapshot.taken_at, tz, &columns)
}

struct Column<'a> {
    label: &'a str,
    days: BTreeMap<Date, DayRange>,
}

fn high_low_table(taken_at: Timestamp, tz: &TimeZone, columns: &[Column<'_>]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Historical highs and lows");
    let _ = writeln!(out, "  last updated: {}", readable_time(taken_at, tz));

    let dates: BTreeSet<Date> = columns
        .iter()
        .flat_map(|column| column.days.keys().copied())
        .collect();

    let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
        let _ = writeln!(out, "\n(no readings)");
        return out;
    };

    let mut date = last;
    let mut row = 0;
    loop {
        if row % HEADER_EVERY == 0 {
            let _ = write!(out, "\n{:<13}", "Date");
            for column in columns {
                let label: String = column.label.chars().take(COLUMN_WIDTH - 1).collect();
                let _ = write!(out, "{:<width$}", label, width = COLUMN_WIDTH);
            }
            let _ = writeln!(out);
        }

        let _ = write!(out, "{}   ", date);
        for column in columns {
            let cell = format_range(column.days.get(&date));
            let _ = write!(out, "{:<width$}", cell, width = COLUMN_WIDTH);
        }
        let _ = writeln!(out);

        row += 1;
        if date <= first {
            break;
        }
        match date.yesterday() {
            Ok(previous) => date = previous,
            Err(_) => break,
        }
    }

    out
}

fn format_range(range: Option<&DayRange>) -> String {
    match range {
        Some(range) => format!("{:>5.2}-{:>5.2}°C", range.min, range.max),
        None => NO_RANGE.to_string(),
    }
}

/// Local wall time, e.g. `2024-03-01 7:05pm`
pub fn readable_time(ts: Timestamp, tz: &TimeZone) -> String {
    tz.to_datetime(ts).strftime("%Y-%m-%d %-I:%M%P").to_string()
}

/// Coarse "time ago" text for the last update column
pub fn readable_elapsed(elapsed: SignedDuration) -> String {
    let total = elapsed.as_secs().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;

    if days > 100 {
        "offline".to_string()
    } else if days > 0 {
        format!("{} days ago", days)
    } else if hours > 0 {
        format!("{} hours, {:0>2} min ago", hours, minutes)
    } else {
        format!("{} minutes ago", minutes)
    }
}
