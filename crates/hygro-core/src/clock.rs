//! Wall-clock time and calendar-day keys.
//!
//! Day boundaries are detected on a monotonic day count (days since the
//! common era, in local time) rather than a day-of-month, so month and year
//! ends compare like any other day.

use core::cell::Cell;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::info;
use thiserror_no_std::Error;

use crate::sensors::MicrosTimer;

/// Clock values from before this year come from an unsynchronized clock.
pub const MIN_VALID_YEAR: i32 = 2020;

pub const SECS_PER_DAY: i64 = 86_400;

/// Monotonic calendar-day number, in local time
pub type DayKey = i32;

/// Source of wall-clock time in Unix seconds.
///
/// Until synchronized, implementations typically report something close to
/// the epoch; [`CalendarTime::from_epoch`] rejects those values.
pub trait WallClock {
    fn now(&self) -> i64;
}

impl<C: WallClock> WallClock for &C {
    fn now(&self) -> i64 {
        (*self).now()
    }
}

/// A validated wall-clock sample broken into the fields the rollover
/// engine needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarTime {
    pub day: DayKey,
    /// 0 = Sunday
    pub weekday: u8,
    pub epoch_seconds: i64,
}

impl CalendarTime {
    /// Returns `None` for out-of-range timestamps and anything before
    /// [`MIN_VALID_YEAR`] in local time.
    pub fn from_epoch(epoch_seconds: i64, utc_offset_secs: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(utc_offset_secs)?;
        let local = DateTime::from_timestamp(epoch_seconds, 0)?.with_timezone(&offset);
        if local.year() < MIN_VALID_YEAR {
            return None;
        }

        let date = local.date_naive();
        Some(Self {
            day: date.num_days_from_ce(),
            weekday: date.weekday().num_days_from_sunday() as u8,
            epoch_seconds,
        })
    }
}

/// Weekday (0 = Sunday) of a day key.
pub fn weekday_of(day: DayKey) -> u8 {
    NaiveDate::from_num_days_from_ce_opt(day)
        .map(|date| date.weekday().num_days_from_sunday() as u8)
        .unwrap_or(0)
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}

/// Wall clock built from a free-running microsecond timer plus an offset
/// learned from an external time source.
///
/// Before the first [`SyncedClock::sync`] it reports seconds since boot,
/// which the year guard treats as "clock unknown". Safe to share between
/// the sensor task and whichever task receives the time.
pub struct SyncedClock<T> {
    timer: T,
    offset_us: Mutex<CriticalSectionRawMutex, Cell<Option<i64>>>,
}

impl<T: MicrosTimer> SyncedClock<T> {
    pub const fn new(timer: T) -> Self {
        Self {
            timer,
            offset_us: Mutex::new(Cell::new(None)),
        }
    }

    /// Set the wall time. Non-positive timestamps are rejected.
    pub fn sync(&self, epoch_seconds: i64) -> Result<(), ClockError> {
        if epoch_seconds <= 0 {
            return Err(ClockError::InvalidTimestamp(epoch_seconds));
        }

        let offset = epoch_seconds
            .saturating_mul(1_000_000)
            .saturating_sub(self.timer.now_micros() as i64);
        self.offset_us.lock(|cell| cell.set(Some(offset)));

        info!("Wall clock synchronized to {}", epoch_seconds);
        Ok(())
    }

    pub fn is_synced(&self) -> bool {
        self.offset_us.lock(|cell| cell.get().is_some())
    }
}

impl<T: MicrosTimer> WallClock for SyncedClock<T> {
    fn now(&self) -> i64 {
        let offset = self.offset_us.lock(|cell| cell.get()).unwrap_or(0);
        (self.timer.now_micros() as i64).saturating_add(offset) / 1_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell as StdCell;

    const MAR_15_2024_UTC: i64 = 1_710_460_800;

    struct FakeTimer(StdCell<u64>);

    impl MicrosTimer for FakeTimer {
        fn now_micros(&self) -> u64 {
            self.0.get()
        }
    }

    #[test]
    fn test_unsynced_epoch_rejected() {
        assert_eq!(CalendarTime::from_epoch(0, 0), None);
        assert_eq!(CalendarTime::from_epoch(120, 28_800), None);
        // 2019-12-31 23:59:59 UTC
        assert_eq!(CalendarTime::from_epoch(1_577_836_799, 0), None);
        assert!(CalendarTime::from_epoch(1_577_836_800, 0).is_some());
    }

    #[test]
    fn test_calendar_fields() {
        let time = CalendarTime::from_epoch(MAR_15_2024_UTC, 0).unwrap();
        assert_eq!(time.day, 738_960);
        assert_eq!(time.weekday, 5);
        assert_eq!(time.epoch_seconds, MAR_15_2024_UTC);
        assert_eq!(weekday_of(time.day), 5);
    }

    #[test]
    fn test_utc_offset_moves_the_day() {
        // 16:00 UTC on the 14th is already the 15th at UTC+8
        let utc = CalendarTime::from_epoch(MAR_15_2024_UTC - 8 * 3600, 0).unwrap();
        let local = CalendarTime::from_epoch(MAR_15_2024_UTC - 8 * 3600, 8 * 3600).unwrap();
        assert_eq!(local.day, utc.day + 1);
        assert_eq!(local.weekday, 5);
    }

    #[test]
    fn test_month_and_year_ends_are_consecutive() {
        // 2024-01-31 -> 2024-02-01
        let jan31 = CalendarTime::from_epoch(1_706_659_200, 0).unwrap();
        let feb01 = CalendarTime::from_epoch(1_706_745_600, 0).unwrap();
        assert_eq!(feb01.day - jan31.day, 1);

        // 2023-12-31 -> 2024-01-01
        let dec31 = CalendarTime::from_epoch(1_703_980_800, 0).unwrap();
        let jan01 = CalendarTime::from_epoch(1_704_067_200, 0).unwrap();
        assert_eq!(jan01.day - dec31.day, 1);
        assert_eq!(dec31.weekday, 0);
    }

    #[test]
    fn test_synced_clock() {
        let clock = SyncedClock::new(FakeTimer(StdCell::new(5_000_000)));
        assert!(!clock.is_synced());
        assert_eq!(clock.now(), 5);

        assert_eq!(clock.sync(0), Err(ClockError::InvalidTimestamp(0)));
        assert_eq!(clock.sync(-3), Err(ClockError::InvalidTimestamp(-3)));

        clock.sync(MAR_15_2024_UTC).unwrap();
        assert!(clock.is_synced());
        assert_eq!(clock.now(), MAR_15_2024_UTC);

        clock.timer.0.set(65_000_000);
        assert_eq!(clock.now(), MAR_15_2024_UTC + 60);
    }
}
