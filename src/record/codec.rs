//! Record codec
//!
//! Encoding and decoding functions for the on-disk record format.

use bytes::{Buf, BufMut};

use crate::error::{Result, ThermoError};

use super::{Record, RECORD_SIZE, RECORD_VERSION};

// =============================================================================
// Encoding
// =============================================================================

/// Encode a record to its 10-byte big-endian form
pub fn encode_record(record: &Record) -> [u8; RECORD_SIZE] {
    let mut out = [0u8; RECORD_SIZE];
    let mut buf = &mut out[..];

    buf.put_u8(record.version);
    buf.put_u8(record.device_id);
    buf.put_i16(record.humidity);
    buf.put_i16(record.temperature);
    buf.put_u16(record.voltage);
    buf.put_u8(record.link_quality);
    buf.put_u8(record.battery);

    out
}

// =============================================================================
// Decoding
// =============================================================================

/// True iff all bytes are zero (no reading stored)
pub fn is_absent(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}

/// Decode a record
///
/// Returns:
/// - `Ok(None)`: the all-zero absent record
/// - `Ok(Some(record))`: a valid version 1 record
/// - `Err(InvalidRecord)`: wrong length or unsupported version
pub fn decode_record(bytes: &[u8]) -> Result<Option<Record>> {
    if bytes.len() != RECORD_SIZE {
        return Err(ThermoError::InvalidRecord(format!(
            "expected {} bytes, got {}",
            RECORD_SIZE,
            bytes.len()
        )));
    }

    if is_absent(bytes) {
        return Ok(None);
    }

    let mut buf = bytes;
    let record = Record {
        version: buf.get_u8(),
        device_id: buf.get_u8(),
        humidity: buf.get_i16(),
        temperature: buf.get_i16(),
        voltage: buf.get_u16(),
        link_quality: buf.get_u8(),
        battery: buf.get_u8(),
    };

    if record.version != RECORD_VERSION {
        return Err(ThermoError::InvalidRecord(format!(
            "unsupported record version {}",
            record.version
        )));
    }

    Ok(Some(record))
}
