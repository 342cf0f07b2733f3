//! ---
//! ems_section: "02-device-telemetry"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Trailing-window average over recent power samples."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use crate::errors::{MeterError, Result};

/// Length of the trailing window reported as `..._last15m_avg`.
pub const AVERAGE_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Fixed-capacity ring of optional samples.
///
/// Slots start empty and are overwritten oldest-first once the cursor wraps.
/// Empty slots never take part in the average.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingAverage {
    slots: Vec<Option<f64>>,
    cursor: usize,
}

impl RollingAverage {
    /// Capacity is clamped to at least one slot.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            cursor: 0,
        }
    }

    /// `floor(window / sample_interval)` slots, never fewer than one.
    pub fn for_window(window: Duration, sample_interval: Duration) -> Result<Self> {
        if sample_interval.is_zero() {
            return Err(MeterError::InvalidSampleInterval);
        }
        let capacity = window.as_millis() / sample_interval.as_millis().max(1);
        let capacity = usize::try_from(capacity).unwrap_or(usize::MAX);
        Ok(Self::with_capacity(capacity))
    }

    /// Fifteen-minute window sampled every `sample_interval`.
    pub fn fifteen_minutes(sample_interval: Duration) -> Result<Self> {
        Self::for_window(AVERAGE_WINDOW, sample_interval)
    }

    pub fn store(&mut self, value: f64) {
        self.slots[self.cursor] = Some(value);
        self.cursor = (self.cursor + 1) % self.slots.len();
    }

    /// Mean of the occupied slots, `0.0` when nothing has been stored.
    pub fn average(&self) -> f64 {
        let (sum, count) = self
            .slots
            .iter()
            .flatten()
            .fold((0.0_f64, 0usize), |(sum, count), value| (sum + value, count + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn slot(&self, index: usize) -> Option<f64> {
        self.slots.get(index).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_follows_sample_interval() {
        let buffer = RollingAverage::fifteen_minutes(Duration::from_millis(60_000)).unwrap();
        assert_eq!(buffer.capacity(), 15);
        assert_eq!(buffer.cursor(), 0);
        assert_eq!(buffer.occupied(), 0);

        let buffer = RollingAverage::fifteen_minutes(Duration::from_millis(7_000)).unwrap();
        assert_eq!(buffer.capacity(), 128);
    }

    #[test]
    fn oversized_interval_clamps_to_one_slot() {
        let mut buffer = RollingAverage::fifteen_minutes(Duration::from_secs(3600)).unwrap();
        assert_eq!(buffer.capacity(), 1);
        buffer.store(10.0);
        buffer.store(30.0);
        assert_eq!(buffer.average(), 30.0);
        assert_eq!(buffer.cursor(), 0);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = RollingAverage::fifteen_minutes(Duration::ZERO).unwrap_err();
        assert!(matches!(err, MeterError::InvalidSampleInterval));
    }

    #[test]
    fn store_advances_cursor() {
        let mut buffer = RollingAverage::with_capacity(15);
        buffer.store(1000.0);
        assert_eq!(buffer.slot(0), Some(1000.0));
        assert_eq!(buffer.cursor(), 1);
        buffer.store(2000.0);
        assert_eq!(buffer.slot(1), Some(2000.0));
        assert_eq!(buffer.cursor(), 2);
    }

    #[test]
    fn wraps_and_overwrites_oldest_slot() {
        let mut buffer = RollingAverage::with_capacity(15);
        for i in 0u8..15 {
            buffer.store(f64::from(i) * 100.0);
        }
        assert_eq!(buffer.cursor(), 0);
        assert_eq!(buffer.occupied(), 15);
        buffer.store(9999.0);
        assert_eq!(buffer.slot(0), Some(9999.0));
        assert_eq!(buffer.cursor(), 1);
        assert_eq!(buffer.occupied(), 15);
    }

    #[test]
    fn empty_buffer_averages_to_zero() {
        assert_eq!(RollingAverage::with_capacity(4).average(), 0.0);
    }

    #[test]
    fn average_skips_empty_slots() {
        let mut buffer = RollingAverage::with_capacity(15);
        buffer.store(1000.0);
        buffer.store(2000.0);
        assert_eq!(buffer.average(), 1500.0);
        buffer.store(3000.0);
        assert_eq!(buffer.average(), 2000.0);
    }

    #[test]
    fn average_tracks_only_the_trailing_window() {
        let mut buffer = RollingAverage::with_capacity(3);
        for value in [100.0, 200.0, 300.0, 400.0] {
            buffer.store(value);
        }
        assert_eq!(buffer.average(), 300.0);
    }
}
