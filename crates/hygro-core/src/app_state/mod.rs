//! State published by the sensor task for everyone else to read

mod status;

pub use status::*;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::sensors::Reading;
use crate::storage::{DailyExtremes, HISTORY_DAYS, HistoryEntry};

/// One consistent view of the pipeline's outputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// Last accepted reading, `None` until the first one
    pub latest: Option<Reading>,
    pub today: Option<DailyExtremes>,
    pub history: [HistoryEntry; HISTORY_DAYS],
    pub status: RunStatus,
}

impl Snapshot {
    pub const fn new() -> Self {
        Self {
            latest: None,
            today: None,
            history: [HistoryEntry::EMPTY; HISTORY_DAYS],
            status: RunStatus::new(),
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared snapshot store.
///
/// The writer swaps in a whole [`Snapshot`] at once, so readers never
/// observe a half-updated cycle. The lock is a critical section held only
/// for the copy, which makes it usable from any task or interrupt.
pub struct SharedState {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Snapshot>>,
}

impl SharedState {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Snapshot::new())),
        }
    }

    /// Replace the published snapshot.
    pub fn publish(&self, snapshot: Snapshot) {
        self.inner.lock(|cell| *cell.borrow_mut() = snapshot);
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock(|cell| *cell.borrow())
    }

    pub fn get_latest_reading(&self) -> Option<Reading> {
        self.inner.lock(|cell| cell.borrow().latest)
    }

    pub fn get_today_extremes(&self) -> Option<DailyExtremes> {
        self.inner.lock(|cell| cell.borrow().today)
    }

    pub fn get_history(&self) -> [HistoryEntry; HISTORY_DAYS] {
        self.inner.lock(|cell| cell.borrow().history)
    }

    pub fn status(&self) -> RunStatus {
        self.inner.lock(|cell| cell.borrow().status)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
