//! Payload adapter
//!
//! Turns `(topic, JSON payload)` messages into events. Messages for unknown
//! topics and malformed payloads are dropped here and never reach the engine.

use std::collections::HashMap;
use std::io::{BufRead, ErrorKind};

use jiff::Timestamp;
use serde::Deserialize;

use crate::aggregate::Clock;
use crate::error::{Result, ThermoError};
use crate::event::Event;
use crate::record::Record;
use crate::storage::SensorDescriptor;

use super::worker::EventSender;

/// Fields read from a device payload
///
/// Temperature and humidity are required; the device fields default to 0
/// when the device does not report them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Payload {
    pub temperature: f64,
    pub humidity: f64,
    #[serde(default)]
    pub voltage: Option<f64>,
    #[serde(default, rename = "linkquality")]
    pub link_quality: Option<f64>,
    #[serde(default)]
    pub battery: Option<f64>,
}

impl Payload {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| ThermoError::Serialization(format!("bad payload: {}", e)))
    }

    /// Encode as a record for the given device
    pub fn to_record(&self, device_id: u8) -> Result<Record> {
        Record::new(
            device_id,
            self.humidity,
            self.temperature,
            saturate(self.voltage, u16::MAX.into()) as u16,
            saturate(self.link_quality, u8::MAX.into()) as u8,
            saturate(self.battery, u8::MAX.into()) as u8,
        )
    }
}

/// Round and clamp an optional device field into `[0, max]`
fn saturate(value: Option<f64>, max: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.round().clamp(0.0, max),
        _ => 0.0,
    }
}

/// Resolves topics to sensors and payloads to events
#[derive(Debug, Clone)]
pub struct Adapter {
    topics: HashMap<String, usize>,
    device_ids: Vec<u8>,
}

impl Adapter {
    pub fn new(sensors: &[SensorDescriptor]) -> Self {
        let topics = sensors
            .iter()
            .enumerate()
            .map(|(index, sensor)| (sensor.topic.clone(), index))
            .collect();
        let device_ids = sensors.iter().map(|sensor| sensor.device_id).collect();

        Self { topics, device_ids }
    }

    /// Sensor index for a topic
    pub fn sensor_for(&self, topic: &str) -> Option<usize> {
        self.topics.get(topic).copied()
    }

    /// Convert one message into an event stamped with `received_at`
    pub fn to_event(&self, topic: &str, payload: &[u8], received_at: Timestamp) -> Option<Event> {
        let Some(sensor) = self.sensor_for(topic) else {
            tracing::debug!(topic, "Dropping message for unknown topic");
            return None;
        };

        let record = Payload::parse(payload).and_then(|p| p.to_record(self.device_ids[sensor]));
        match record {
            Ok(record) => Some(Event::from_record(sensor, received_at, &record)),
            Err(e) => {
                tracing::warn!(topic, error = %e, "Dropping malformed payload");
                None
            }
        }
    }

    /// Convert a `topic payload` line (the `mosquitto_sub -v` format)
    pub fn parse_line(&self, line: &str, received_at: Timestamp) -> Option<Event> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some((topic, payload)) = line.split_once(char::is_whitespace) else {
            tracing::warn!(line, "Dropping line without payload");
            return None;
        };

        self.to_event(topic, payload.trim_start().as_bytes(), received_at)
    }

    /// Queue every `topic payload` line of a reader until end of input
    ///
    /// Lines are stamped with `clock` as they are read. Invalid UTF-8 is
    /// replaced rather than rejected, so a garbled line is dropped like any
    /// other malformed message. Returns the number of events queued; stops
    /// early only on a read error or when the writer has gone away.
    pub fn feed<R: BufRead>(&self, mut reader: R, sender: &EventSender, clock: &dyn Clock) -> Result<u64> {
        let mut buf = Vec::new();
        let mut queued = 0;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => return Ok(queued),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            let line = String::from_utf8_lossy(&buf);
            if let Some(event) = self.parse_line(&line, clock.now()) {
                sender.send(event)?;
                queued += 1;
            }
        }
    }
}
