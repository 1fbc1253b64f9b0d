pub mod blob;
pub mod extremes;
pub mod persistence;
pub mod rollover;

pub use blob::{BlobStore, MemoryBlobStore};
pub use extremes::{DailyExtremes, ExtremesTracker};
pub use persistence::{HistoryStore, PersistError, PersistMode};
pub use rollover::{RolloverEngine, RolloverOutcome, RolloverState};

use core::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::clock::DayKey;

/// Number of completed days kept in the history ring
pub const HISTORY_DAYS: usize = 7;

/// Archived extremes of one completed calendar day.
///
/// Slot 0 of the history ring is always the most recently completed day.
/// Invalid slots carry no data: either nothing was archived yet, or no
/// reading was accepted on that day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// 0 = Sunday
    pub weekday: u8,
    pub max_temp: f32,
    pub min_temp: f32,
    pub max_hum: f32,
    pub min_hum: f32,
    /// Unix seconds, one day before the rollover that archived this entry
    pub timestamp: i64,
    pub valid: bool,
}

impl HistoryEntry {
    /// Invalid entry, usable in `const` contexts
    pub const EMPTY: Self = Self {
        weekday: 0,
        max_temp: 0.0,
        min_temp: 0.0,
        max_hum: 0.0,
        min_hum: 0.0,
        timestamp: 0,
        valid: false,
    };

    pub fn archived(weekday: u8, timestamp: i64, extremes: &DailyExtremes) -> Self {
        Self {
            weekday,
            max_temp: extremes.max_temp,
            min_temp: extremes.min_temp,
            max_hum: extremes.max_hum,
            min_hum: extremes.min_hum,
            timestamp,
            valid: true,
        }
    }

    /// Placeholder for a day without accepted readings
    pub fn missing(weekday: u8, timestamp: i64) -> Self {
        Self {
            weekday,
            timestamp,
            ..Self::default()
        }
    }
}

impl Display for HistoryEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if !self.valid {
            return write!(f, "[HistoryEntry] weekday: {}, no data", self.weekday);
        }

        write!(
            f,
            "[HistoryEntry] weekday: {}, temp: {:.1}..{:.1}°C, humidity: {:.1}..{:.1}%",
            self.weekday, self.min_temp, self.max_temp, self.min_hum, self.max_hum
        )
    }
}

/// Everything that survives a power cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PersistedState {
    pub history: [HistoryEntry; HISTORY_DAYS],
    /// Last calendar day processed by the rollover engine, `None` on cold start
    pub cursor: Option<DayKey>,
}
