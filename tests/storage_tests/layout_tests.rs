//! Tests for Layout
//!
//! These tests verify:
//! - Production constants (slot count, section size, range)
//! - Timestamp → slot → timestamp truncation
//! - Range rejection at both ends
//! - Byte offsets of sections and slots

use jiff::{SignedDuration, Timestamp};
use thermodb::storage::{Layout, EPOCH, HEADER_SIZE, LEGACY_SLOT_COUNT, SLOT_COUNT, SLOT_SECONDS};
use thermodb::ThermoError;

// =============================================================================
// Helper Functions
// =============================================================================

fn ts(s: &str) -> Timestamp {
    s.parse().unwrap()
}

fn after_epoch(seconds: i64) -> Timestamp {
    EPOCH.checked_add(SignedDuration::from_secs(seconds)).unwrap()
}

// =============================================================================
// Constants
// =============================================================================

#[test]
fn test_default_layout_constants() {
    let layout = Layout::default();

    assert_eq!(layout.epoch(), ts("2024-01-01T00:00:00Z"));
    assert_eq!(layout.slot_count(), SLOT_COUNT);
    assert_eq!(SLOT_COUNT, 23_376 * 288);
    assert_eq!(layout.section_size(), 67_422_880);
    assert_eq!(layout.end(), ts("2088-01-01T00:00:00Z"));
}

#[test]
fn test_default_matches_explicit_construction() {
    let layout = Layout::new(EPOCH, SLOT_COUNT).unwrap();

    assert_eq!(layout, Layout::default());
}

#[test]
fn test_horizon_is_last_slot() {
    let layout = Layout::default();

    let slot = layout.slot_for(ts("2087-12-31T23:59:59Z")).unwrap();
    assert_eq!(slot, SLOT_COUNT - 1);
}

// =============================================================================
// Timestamp <-> Slot
// =============================================================================

#[test]
fn test_slot_boundaries() {
    let layout = Layout::default();

    assert_eq!(layout.slot_for(EPOCH).unwrap(), 0);
    assert_eq!(layout.slot_for(after_epoch(299)).unwrap(), 0);
    assert_eq!(layout.slot_for(after_epoch(300)).unwrap(), 1);
    assert_eq!(layout.slot_for(after_epoch(86_400)).unwrap(), 288);
}

#[test]
fn test_timestamp_for_slot() {
    let layout = Layout::default();

    assert_eq!(layout.timestamp_for(0).unwrap(), EPOCH);
    assert_eq!(layout.timestamp_for(12).unwrap(), ts("2024-01-01T01:00:00Z"));
}

#[test]
fn test_truncation_is_idempotent() {
    let layout = Layout::default();

    for s in [
        "2024-01-01T00:00:00Z",
        "2024-02-29T13:37:42.123Z",
        "2031-07-04T04:04:59Z",
        "2087-12-31T23:59:59.999Z",
    ] {
        let t = ts(s);
        let truncated = layout.truncate(t).unwrap();

        assert!(truncated <= t);
        assert!(t.duration_since(truncated) < SignedDuration::from_secs(SLOT_SECONDS));
        assert_eq!(truncated.as_second() % SLOT_SECONDS, 0);
        assert_eq!(layout.truncate(truncated).unwrap(), truncated);
        assert_eq!(layout.slot_for(truncated).unwrap(), layout.slot_for(t).unwrap());
    }
}

#[test]
fn test_same_bucket_same_slot() {
    let layout = Layout::default();

    let a = layout.slot_for(ts("2025-05-05T10:10:00Z")).unwrap();
    let b = layout.slot_for(ts("2025-05-05T10:14:59Z")).unwrap();
    let c = layout.slot_for(ts("2025-05-05T10:15:00Z")).unwrap();

    assert_eq!(a, b);
    assert_eq!(c, a + 1);
}

// =============================================================================
// Range Tests
// =============================================================================

#[test]
fn test_before_epoch_rejected() {
    let layout = Layout::default();

    let result = layout.slot_for(ts("2023-12-31T23:59:59Z"));
    assert!(matches!(result, Err(ThermoError::OutOfRange(_))));
}

#[test]
fn test_end_rejected() {
    let layout = Layout::default();

    let result = layout.slot_for(layout.end());
    assert!(matches!(result, Err(ThermoError::OutOfRange(_))));
}

#[test]
fn test_slot_past_count_rejected() {
    let layout = Layout::default();

    let result = layout.timestamp_for(SLOT_COUNT);
    assert!(matches!(result, Err(ThermoError::OutOfRange(_))));
}

#[test]
fn test_small_layout_range() {
    let layout = Layout::new(EPOCH, 10).unwrap();

    assert_eq!(layout.end(), after_epoch(3_000));
    assert_eq!(layout.slot_for(after_epoch(2_999)).unwrap(), 9);
    assert!(layout.slot_for(after_epoch(3_000)).is_err());
}

// =============================================================================
// Offsets
// =============================================================================

#[test]
fn test_offsets() {
    let layout = Layout::new(EPOCH, 1_000).unwrap();

    assert_eq!(layout.section_size(), HEADER_SIZE + 10_000);
    assert_eq!(layout.section_offset(0), 0);
    assert_eq!(layout.section_offset(3), 3 * layout.section_size());
    assert_eq!(layout.slot_offset(0, 0), HEADER_SIZE);
    assert_eq!(layout.slot_offset(1, 7), layout.section_size() + HEADER_SIZE + 70);
}

#[test]
fn test_legacy_layout() {
    let legacy = Layout::legacy();

    assert_eq!(LEGACY_SLOT_COUNT, 6_727_680);
    assert_eq!(legacy, Layout::new(EPOCH, LEGACY_SLOT_COUNT).unwrap());
    assert_eq!(legacy.section_size(), 67_376_800);
    assert_eq!(legacy.end(), ts("2087-12-16T00:00:00Z"));
    assert_ne!(legacy.section_size(), Layout::default().section_size());
}
