//! Wall clock and FAT timestamps for the firmware

use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use embassy_time::Instant;
use embedded_sdmmc::{TimeSource, Timestamp};
use hygro_core::clock::{ClockError, SyncedClock, WallClock};
use hygro_core::sensors::MicrosTimer;

/// Microseconds since boot from the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyTimer;

impl MicrosTimer for EmbassyTimer {
    fn now_micros(&self) -> u64 {
        Instant::now().as_micros()
    }
}

/// Shared wall clock. Unsynchronized until [`sync_wall_clock`] is called.
pub static WALL_CLOCK: SyncedClock<EmbassyTimer> = SyncedClock::new(EmbassyTimer);

/// Hand the firmware a wall-clock time learned elsewhere (network, RTC).
pub fn sync_wall_clock(epoch_seconds: i64) -> Result<(), ClockError> {
    WALL_CLOCK.sync(epoch_seconds)
}

/// Stamps files written to the SD card with local wall-clock time.
///
/// Before the clock is synchronized every file gets the FAT epoch,
/// 1980-01-01 00:00.
#[derive(Debug, Clone, Copy)]
pub struct CardTimeSource {
    utc_offset_secs: i32,
}

impl CardTimeSource {
    pub const fn new(utc_offset_secs: i32) -> Self {
        Self { utc_offset_secs }
    }
}

impl TimeSource for CardTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        let local = FixedOffset::east_opt(self.utc_offset_secs).and_then(|offset| {
            DateTime::from_timestamp(WALL_CLOCK.now(), 0).map(|utc| utc.with_timezone(&offset))
        });

        match local {
            Some(time) if (1980..=2107).contains(&time.year()) => Timestamp {
                year_since_1970: (time.year() - 1970) as u8,
                zero_indexed_month: time.month0() as u8,
                zero_indexed_day: time.day0() as u8,
                hours: time.hour() as u8,
                minutes: time.minute() as u8,
                seconds: time.second() as u8,
            },
            _ => Timestamp {
                year_since_1970: 10,
                zero_indexed_month: 0,
                zero_indexed_day: 0,
                hours: 0,
                minutes: 0,
                seconds: 0,
            },
        }
    }
}
