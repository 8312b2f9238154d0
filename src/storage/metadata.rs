//! Section metadata header
//!
//! The first `HEADER_SIZE` bytes of a section hold newline-terminated JSON
//! documents followed by zero padding:
//!
//! ```text
//! 1\n
//! {"mqtt_topic":"zigbee2mqtt/Temperature/Sensor02","row_id":2,"human_readable":"02 - Outside - Front"}\n
//! \0\0\0 ... \0
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThermoError};

use super::HEADER_SIZE;

/// Current header format version (first JSON document)
pub const METADATA_VERSION: u64 = 1;

/// Identity of one sensor, stored in its section header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    /// Source topic, only used by the ingestion adapter
    #[serde(rename = "mqtt_topic")]
    pub topic: String,

    /// Physical device number written into every record
    #[serde(rename = "row_id")]
    pub device_id: u8,

    /// Human-readable label for reports
    #[serde(rename = "human_readable")]
    pub label: String,
}

impl SensorDescriptor {
    pub fn new(topic: impl Into<String>, device_id: u8, label: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            device_id,
            label: label.into(),
        }
    }

    /// Check the fields that records depend on
    pub fn validate(&self) -> Result<()> {
        if self.device_id == 0 {
            return Err(ThermoError::Metadata(format!(
                "sensor '{}' has device id 0 (must be 1-255)",
                self.label
            )));
        }
        Ok(())
    }
}

/// Render a header block (version line, descriptor line, zero padding)
pub fn encode_header(descriptor: &SensorDescriptor) -> Result<Vec<u8>> {
    let mut header = format!("{}\n", METADATA_VERSION).into_bytes();
    serde_json::to_writer(&mut header, descriptor)?;
    header.push(b'\n');

    // Keep at least one zero byte so the JSON end is always found
    if header.len() >= HEADER_SIZE as usize {
        return Err(ThermoError::Metadata(format!(
            "header for '{}' is {} bytes (max {})",
            descriptor.label,
            header.len(),
            HEADER_SIZE - 1
        )));
    }

    header.resize(HEADER_SIZE as usize, 0);
    Ok(header)
}

/// Parse a header block back into a descriptor
///
/// Fails if the version line is not `1` or the block does not hold exactly
/// the two expected JSON documents.
pub fn decode_header(block: &[u8]) -> Result<SensorDescriptor> {
    let end = block.iter().position(|&b| b == 0).unwrap_or(block.len());
    let text = std::str::from_utf8(&block[..end])
        .map_err(|e| ThermoError::Metadata(format!("header is not UTF-8: {}", e)))?;

    let mut lines = text.lines().filter(|line| !line.trim().is_empty());

    let version: u64 = match lines.next() {
        Some(line) => serde_json::from_str(line)
            .map_err(|e| ThermoError::Metadata(format!("bad version line: {}", e)))?,
        None => return Err(ThermoError::Metadata("header is empty".to_string())),
    };
    if version != METADATA_VERSION {
        return Err(ThermoError::Metadata(format!(
            "unsupported header version {}",
            version
        )));
    }

    let descriptor: SensorDescriptor = match lines.next() {
        Some(line) => serde_json::from_str(line)
            .map_err(|e| ThermoError::Metadata(format!("bad sensor descriptor: {}", e)))?,
        None => return Err(ThermoError::Metadata("missing sensor descriptor".to_string())),
    };

    if lines.next().is_some() {
        return Err(ThermoError::Metadata(
            "unexpected documents after sensor descriptor".to_string(),
        ));
    }

    Ok(descriptor)
}
