//! Tests for Database
//!
//! These tests verify:
//! - Creating a file (size, zero fill, headers)
//! - Validating existing files (size, headers, sensor count)
//! - Slot reads/writes by index and by timestamp
//! - Rejection of malformed writes and out-of-range timestamps
//! - Append-only growth, and a rejected growth leaving the file intact

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use jiff::{SignedDuration, Timestamp};
use tempfile::TempDir;
use thermodb::config::SyncStrategy;
use thermodb::record::{encode_record, Record, ABSENT_RECORD};
use thermodb::storage::{decode_header, encode_header, Database, Layout, SensorDescriptor, EPOCH, HEADER_SIZE};
use thermodb::ThermoError;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("temps.db");
    (temp_dir, path)
}

fn small_layout() -> Layout {
    Layout::new(EPOCH, 2_000).unwrap()
}

fn sensors(count: usize) -> Vec<SensorDescriptor> {
    (0..count)
        .map(|i| {
            SensorDescriptor::new(
                format!("zigbee2mqtt/Temperature/Sensor{:02}", i + 1),
                (i + 1) as u8,
                format!("{:02} - Room {}", i + 1, i + 1),
            )
        })
        .collect()
}

fn open_db(path: &Path, count: usize) -> Database {
    Database::open(path, small_layout(), &sensors(count), SyncStrategy::OnClose).unwrap()
}

fn record(temperature: f64) -> Record {
    Record::new(1, 50.0, temperature, 3000, 90, 100).unwrap()
}

fn after_epoch(seconds: i64) -> Timestamp {
    EPOCH.checked_add(SignedDuration::from_secs(seconds)).unwrap()
}

// =============================================================================
// Create Tests
// =============================================================================

#[test]
fn test_create_file_size() {
    let (_temp, path) = setup_temp_path();

    let db = open_db(&path, 3);

    assert_eq!(db.sensor_count(), 3);
    assert_eq!(fs::metadata(&path).unwrap().len(), 3 * small_layout().section_size());
}

#[test]
fn test_create_default_layout_size() {
    let (_temp, path) = setup_temp_path();

    let db = Database::open(&path, Layout::default(), &sensors(2), SyncStrategy::OnClose).unwrap();

    assert_eq!(db.sensor_count(), 2);
    assert_eq!(fs::metadata(&path).unwrap().len(), 2 * 67_422_880);
}

#[test]
fn test_create_zero_except_headers() {
    let (_temp, path) = setup_temp_path();
    let descriptors = sensors(3);
    let layout = small_layout();

    let db = Database::open(&path, layout, &descriptors, SyncStrategy::OnClose).unwrap();
    db.close().unwrap();

    let bytes = fs::read(&path).unwrap();
    let section = layout.section_size() as usize;

    for (i, descriptor) in descriptors.iter().enumerate() {
        let start = i * section;
        let header = encode_header(descriptor).unwrap();

        assert_eq!(&bytes[start..start + HEADER_SIZE as usize], header.as_slice());
        assert!(bytes[start + HEADER_SIZE as usize..start + section]
            .iter()
            .all(|&b| b == 0));
    }
}

#[test]
fn test_header_text() {
    let descriptor = SensorDescriptor::new("zigbee2mqtt/Temperature/Sensor02", 2, "02 - Outside - Front");
    let header = encode_header(&descriptor).unwrap();

    let text_end = header.iter().position(|&b| b == 0).unwrap();
    let text = std::str::from_utf8(&header[..text_end]).unwrap();

    assert_eq!(header.len(), HEADER_SIZE as usize);
    assert!(text.starts_with("1\n{"));
    assert!(text.ends_with("}\n"));
    assert!(text.contains("\"mqtt_topic\":\"zigbee2mqtt/Temperature/Sensor02\""));
    assert!(text.contains("\"row_id\":2"));
    assert!(text.contains("\"human_readable\":\"02 - Outside - Front\""));
}

#[test]
fn test_create_rejects_device_zero() {
    let (_temp, path) = setup_temp_path();
    let bad = vec![SensorDescriptor::new("t", 0, "bad")];

    let result = Database::open(&path, small_layout(), &bad, SyncStrategy::OnClose);

    assert!(matches!(result, Err(ThermoError::Metadata(_))));
    assert!(!path.exists());
}

// =============================================================================
// Open Existing Tests
// =============================================================================

#[test]
fn test_reopen_preserves_data() {
    let (_temp, path) = setup_temp_path();

    {
        let db = open_db(&path, 2);
        db.write_by_slot(1, 42, &encode_record(&record(19.5))).unwrap();
        db.close().unwrap();
    }

    let db = open_db(&path, 2);
    assert_eq!(db.read_by_slot(1, 42).unwrap(), Some(record(19.5)));
    assert_eq!(db.sensors(), sensors(2));
}

#[test]
fn test_open_existing_missing_file() {
    let (_temp, path) = setup_temp_path();

    let result = Database::open_existing(&path, small_layout(), SyncStrategy::OnClose);

    assert!(matches!(result, Err(ThermoError::Io(_))));
    assert!(!path.exists());
}

#[test]
fn test_open_foreign_file_size() {
    let (_temp, path) = setup_temp_path();
    fs::write(&path, vec![0u8; 12_345]).unwrap();

    let result = Database::open(&path, small_layout(), &sensors(1), SyncStrategy::OnClose);

    assert!(matches!(result, Err(ThermoError::Corrupt(_))));
}

#[test]
fn test_open_with_different_layout_fails() {
    let (_temp, path) = setup_temp_path();
    open_db(&path, 1).close().unwrap();

    let other = Layout::new(EPOCH, 1_234).unwrap();
    let result = Database::open_existing(&path, other, SyncStrategy::OnClose);

    assert!(matches!(result, Err(ThermoError::Corrupt(_))));
}

#[test]
fn test_open_bad_header_version() {
    let (_temp, path) = setup_temp_path();
    open_db(&path, 2).close().unwrap();

    // Turn the second section's "1\n" into "2\n"
    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(small_layout().section_size())).unwrap();
    file.write_all(b"2").unwrap();
    drop(file);

    let result = Database::open_existing(&path, small_layout(), SyncStrategy::OnClose);
    assert!(matches!(result, Err(ThermoError::Metadata(_))));
}

#[test]
fn test_open_zeroed_header() {
    let (_temp, path) = setup_temp_path();
    let layout = small_layout();
    fs::write(&path, vec![0u8; layout.section_size() as usize]).unwrap();

    let result = Database::open_existing(&path, layout, SyncStrategy::OnClose);
    assert!(matches!(result, Err(ThermoError::Metadata(_))));
}

#[test]
fn test_open_requires_enough_sensors() {
    let (_temp, path) = setup_temp_path();
    open_db(&path, 2).close().unwrap();

    let result = Database::open(&path, small_layout(), &sensors(3), SyncStrategy::OnClose);

    assert!(matches!(
        result,
        Err(ThermoError::SensorCount { expected: 3, found: 2 })
    ));
}

#[test]
fn test_open_with_fewer_sensors_is_fine() {
    let (_temp, path) = setup_temp_path();
    open_db(&path, 3).close().unwrap();

    let db = open_db(&path, 2);
    assert_eq!(db.sensor_count(), 3);
}

// =============================================================================
// Metadata Tests
// =============================================================================

#[test]
fn test_read_metadata() {
    let (_temp, path) = setup_temp_path();
    let db = open_db(&path, 3);

    assert_eq!(db.read_metadata(2).unwrap(), sensors(3)[2]);
    assert!(matches!(db.read_metadata(3), Err(ThermoError::UnknownSensor(3))));
}

#[test]
fn test_decode_header_rejects_extra_documents() {
    let mut block = b"1\n{\"mqtt_topic\":\"t\",\"row_id\":1,\"human_readable\":\"x\"}\n{}\n".to_vec();
    block.resize(HEADER_SIZE as usize, 0);

    assert!(matches!(decode_header(&block), Err(ThermoError::Metadata(_))));
}

#[test]
fn test_decode_header_rejects_missing_descriptor() {
    let mut block = b"1\n".to_vec();
    block.resize(HEADER_SIZE as usize, 0);

    assert!(matches!(decode_header(&block), Err(ThermoError::Metadata(_))));
}

#[test]
fn test_decode_header_ignores_unknown_fields() {
    let mut block =
        b"1\n{\"mqtt_topic\":\"t\",\"row_id\":4,\"human_readable\":\"x\",\"room\":\"den\"}\n".to_vec();
    block.resize(HEADER_SIZE as usize, 0);

    let descriptor = decode_header(&block).unwrap();
    assert_eq!(descriptor, SensorDescriptor::new("t", 4, "x"));
}

// =============================================================================
// Read/Write Tests
// =============================================================================

#[test]
fn test_write_read_slot() {
    let (_temp, path) = setup_temp_path();
    let db = open_db(&path, 2);

    db.write_by_slot(0, 17, &encode_record(&record(21.25))).unwrap();

    assert_eq!(db.read_by_slot(0, 17).unwrap(), Some(record(21.25)));
    assert_eq!(db.read_by_slot(0, 16).unwrap(), None);
    assert_eq!(db.read_by_slot(0, 18).unwrap(), None);
    assert_eq!(db.read_by_slot(1, 17).unwrap(), None);
}

#[test]
fn test_last_write_wins() {
    let (_temp, path) = setup_temp_path();
    let db = open_db(&path, 1);

    db.write_by_slot(0, 5, &encode_record(&record(10.0))).unwrap();
    db.write_by_slot(0, 5, &encode_record(&record(11.0))).unwrap();

    assert_eq!(db.read_by_slot(0, 5).unwrap(), Some(record(11.0)));
}

#[test]
fn test_is_occupied() {
    let (_temp, path) = setup_temp_path();
    let db = open_db(&path, 1);

    assert!(!db.is_occupied(0, 5).unwrap());

    db.write_by_slot(0, 5, &encode_record(&record(1.0))).unwrap();
    assert!(db.is_occupied(0, 5).unwrap());

    // Unsupported versions still occupy the slot
    let mut bytes = encode_record(&record(1.0));
    bytes[0] = 9;
    db.write_by_slot(0, 6, &bytes).unwrap();
    assert!(db.is_occupied(0, 6).unwrap());

    db.write_by_slot(0, 5, &ABSENT_RECORD).unwrap();
    assert!(!db.is_occupied(0, 5).unwrap());

    assert!(matches!(db.is_occupied(1, 5), Err(ThermoError::UnknownSensor(1))));
    assert!(matches!(db.is_occupied(0, 2_000), Err(ThermoError::OutOfRange(_))));
}

#[test]
fn test_write_absent_clears_slot() {
    let (_temp, path) = setup_temp_path();
    let db = open_db(&path, 1);

    db.write_by_slot(0, 5, &encode_record(&record(10.0))).unwrap();
    db.write_by_slot(0, 5, &ABSENT_RECORD).unwrap();

    assert_eq!(db.read_by_slot(0, 5).unwrap(), None);
}

#[test]
fn test_write_read_by_timestamp() {
    let (_temp, path) = setup_temp_path();
    let db = open_db(&path, 1);

    db.write_by_timestamp(0, after_epoch(3_610), &encode_record(&record(5.5)))
        .unwrap();

    // Same 5-minute bucket (3600..3900)
    assert_eq!(db.read_by_timestamp(0, after_epoch(3_600)).unwrap(), Some(record(5.5)));
    assert_eq!(db.read_by_timestamp(0, after_epoch(3_899)).unwrap(), Some(record(5.5)));
    assert_eq!(db.read_by_slot(0, 12).unwrap(), Some(record(5.5)));
    assert_eq!(db.read_by_timestamp(0, after_epoch(3_900)).unwrap(), None);
}

#[test]
fn test_timestamp_out_of_range() {
    let (_temp, path) = setup_temp_path();
    let db = open_db(&path, 1);
    let bytes = encode_record(&record(1.0));

    let before = EPOCH.checked_sub(SignedDuration::from_secs(1)).unwrap();
    let after = small_layout().end();

    assert!(matches!(db.read_by_timestamp(0, before), Err(ThermoError::OutOfRange(_))));
    assert!(matches!(db.read_by_timestamp(0, after), Err(ThermoError::OutOfRange(_))));
    assert!(matches!(db.write_by_timestamp(0, before, &bytes), Err(ThermoError::OutOfRange(_))));
    assert!(matches!(db.write_by_timestamp(0, after, &bytes), Err(ThermoError::OutOfRange(_))));
}

#[test]
fn test_slot_out_of_range() {
    let (_temp, path) = setup_temp_path();
    let db = open_db(&path, 1);

    let result = db.read_by_slot(0, 2_000);
    assert!(matches!(result, Err(ThermoError::OutOfRange(_))));
}

#[test]
fn test_write_wrong_length_rejected() {
    let (_temp, path) = setup_temp_path();
    let db = open_db(&path, 1);

    let result = db.write_by_slot(0, 3, &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
    assert!(matches!(result, Err(ThermoError::InvalidRecord(_))));

    let result = db.write_by_slot(0, 3, &[1u8; 11]);
    assert!(matches!(result, Err(ThermoError::InvalidRecord(_))));

    assert_eq!(db.read_by_slot(0, 3).unwrap(), None);
}

#[test]
fn test_unknown_sensor() {
    let (_temp, path) = setup_temp_path();
    let db = open_db(&path, 2);

    let result = db.write_by_slot(2, 0, &encode_record(&record(1.0)));
    assert!(matches!(result, Err(ThermoError::UnknownSensor(2))));

    let result = db.read_by_slot(5, 0);
    assert!(matches!(result, Err(ThermoError::UnknownSensor(5))));
}

#[test]
fn test_read_unsupported_version() {
    let (_temp, path) = setup_temp_path();
    let db = open_db(&path, 1);

    let mut bytes = encode_record(&record(1.0));
    bytes[0] = 9;
    db.write_by_slot(0, 0, &bytes).unwrap();

    let result = db.read_by_slot(0, 0);
    assert!(matches!(result, Err(ThermoError::InvalidRecord(_))));
}

#[test]
fn test_sync_strategies_write_through() {
    for strategy in [
        SyncStrategy::EveryWrite,
        SyncStrategy::EveryNWrites { count: 2 },
        SyncStrategy::OnClose,
    ] {
        let (_temp, path) = setup_temp_path();
        let db = Database::open(&path, small_layout(), &sensors(1), strategy).unwrap();

        for slot in 0..5 {
            db.write_by_slot(0, slot, &encode_record(&record(slot as f64))).unwrap();
        }

        for slot in 0..5 {
            assert_eq!(db.read_by_slot(0, slot).unwrap(), Some(record(slot as f64)));
        }
    }
}

// =============================================================================
// Growth Tests
// =============================================================================

#[test]
fn test_grow_preserves_existing_sections() {
    let (_temp, path) = setup_temp_path();
    let layout = small_layout();
    let db = open_db(&path, 2);

    db.write_by_slot(0, 1, &encode_record(&record(1.0))).unwrap();
    db.write_by_slot(1, 1_999, &encode_record(&record(2.0))).unwrap();
    db.sync().unwrap();
    let before = fs::read(&path).unwrap();

    let new_sensor = SensorDescriptor::new("zigbee2mqtt/Temperature/Sensor13", 13, "13 - Basement - Workshop");
    let index = db.grow_by_sensor(new_sensor.clone()).unwrap();
    db.sync().unwrap();
    let after = fs::read(&path).unwrap();

    assert_eq!(index, 2);
    assert_eq!(db.sensor_count(), 3);
    assert_eq!(after.len() as u64, before.len() as u64 + layout.section_size());
    assert_eq!(&after[..before.len()], before.as_slice());

    let new_section = &after[before.len()..];
    let header = encode_header(&new_sensor).unwrap();
    assert_eq!(&new_section[..HEADER_SIZE as usize], header.as_slice());
    assert!(new_section[HEADER_SIZE as usize..].iter().all(|&b| b == 0));

    assert_eq!(db.read_metadata(2).unwrap(), new_sensor);
    assert_eq!(db.read_by_slot(2, 0).unwrap(), None);
}

#[test]
fn test_rejected_growth_keeps_file_openable() {
    let (_temp, path) = setup_temp_path();
    let db = open_db(&path, 2);

    let bad = SensorDescriptor::new("zigbee2mqtt/Temperature/Sensor03", 0, "03 - Room 3");
    assert!(db.grow_by_sensor(bad).is_err());
    assert_eq!(db.sensor_count(), 2);
    assert_eq!(fs::metadata(&path).unwrap().len(), 2 * small_layout().section_size());

    let index = db.grow_by_sensor(sensors(3).remove(2)).unwrap();
    assert_eq!(index, 2);
    db.close().unwrap();

    let reopened = Database::open_existing(&path, small_layout(), SyncStrategy::OnClose).unwrap();
    assert_eq!(reopened.sensors(), sensors(3));
}

#[test]
fn test_open_or_grow_appends_missing_sensors() {
    let (_temp, path) = setup_temp_path();
    open_db(&path, 2).close().unwrap();

    let db = Database::open_or_grow(&path, small_layout(), &sensors(4), SyncStrategy::OnClose).unwrap();

    assert_eq!(db.sensor_count(), 4);
    assert_eq!(db.sensors(), sensors(4));
    assert_eq!(fs::metadata(&path).unwrap().len(), 4 * small_layout().section_size());
}

#[test]
fn test_open_or_grow_rejects_reorder() {
    let (_temp, path) = setup_temp_path();
    open_db(&path, 2).close().unwrap();

    let mut reordered = sensors(3);
    reordered.swap(0, 1);

    let result = Database::open_or_grow(&path, small_layout(), &reordered, SyncStrategy::OnClose);
    assert!(matches!(result, Err(ThermoError::Growth(_))));
    assert_eq!(fs::metadata(&path).unwrap().len(), 2 * small_layout().section_size());
}
