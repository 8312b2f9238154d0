//! Record field definitions
//!
//! A decoded telemetry reading with scaled accessors.

use crate::error::{Result, ThermoError};

use super::RECORD_VERSION;

/// A single decoded telemetry reading
///
/// Humidity and temperature are kept in hundredths, exactly as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    /// Format version (always 1 for valid records)
    pub version: u8,

    /// Physical device number, 1-255
    pub device_id: u8,

    /// Relative humidity in hundredths of a percent
    pub humidity: i16,

    /// Temperature in hundredths of a degree Celsius
    pub temperature: i16,

    /// Supply voltage in device-specific units
    pub voltage: u16,

    /// Link quality, 0-100
    pub link_quality: u8,

    /// Battery level in percent, 0-100
    pub battery: u8,
}

impl Record {
    /// Build a version 1 record from human units
    ///
    /// Humidity and temperature are rounded to the nearest hundredth. Values
    /// that do not fit a signed 16-bit hundredths encoding are rejected.
    pub fn new(
        device_id: u8,
        humidity_percent: f64,
        temperature_celsius: f64,
        voltage: u16,
        link_quality: u8,
        battery: u8,
    ) -> Result<Self> {
        if device_id == 0 {
            return Err(ThermoError::InvalidRecord(
                "device id must be between 1 and 255".to_string(),
            ));
        }

        Ok(Self {
            version: RECORD_VERSION,
            device_id,
            humidity: to_hundredths("humidity", humidity_percent)?,
            temperature: to_hundredths("temperature", temperature_celsius)?,
            voltage,
            link_quality,
            battery,
        })
    }

    /// Humidity in percent
    pub fn humidity_percent(&self) -> f64 {
        f64::from(self.humidity) / 100.0
    }

    /// Temperature in degrees Celsius
    pub fn temperature_celsius(&self) -> f64 {
        f64::from(self.temperature) / 100.0
    }
}

/// Scale to hundredths, rounding to nearest
fn to_hundredths(field: &str, value: f64) -> Result<i16> {
    let scaled = (value * 100.0).round();
    if !scaled.is_finite() || scaled < f64::from(i16::MIN) || scaled > f64::from(i16::MAX) {
        return Err(ThermoError::InvalidRecord(format!(
            "{} {} does not fit the hundredths encoding",
            field, value
        )));
    }
    Ok(scaled as i16)
}
