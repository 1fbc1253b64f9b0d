//! Day rollover state machine.
//!
//! Each cycle the engine compares the current calendar day with the day it
//! is tracking. When the day changes it archives the tracker's snapshot into
//! slot 0 of the history ring, persists ring and cursor together, and
//! resets the tracker for the new day.
//!
//! Readings taken while the clock is unset carry no date. If the first valid
//! sample after them lands on a later day than the cursor, they belong to
//! that later day: the cursor day is archived without readings and the
//! tracker carries over as today's extremes.

use log::{debug, info, warn};

use super::blob::BlobStore;
use super::extremes::ExtremesTracker;
use super::persistence::{HistoryStore, PersistError};
use super::{HISTORY_DAYS, HistoryEntry, PersistedState};
use crate::clock::{CalendarTime, DayKey, SECS_PER_DAY, weekday_of};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverState {
    /// No valid clock sample seen yet and no cursor was persisted
    Uninitialized,
    TrackingDay(DayKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloverOutcome {
    /// The clock is not set; nothing was evaluated
    ClockInvalid,
    NoChange,
    /// First valid clock sample, tracking starts at this day
    Started(DayKey),
    Archived {
        completed: DayKey,
        today: DayKey,
        /// Calendar days the ring was shifted by
        shifted: usize,
        persisted: Result<(), PersistError>,
    },
}

pub struct RolloverEngine {
    state: RolloverState,
    history: [HistoryEntry; HISTORY_DAYS],
    /// The tracker took readings since the last valid clock sample
    undated: bool,
}

impl RolloverEngine {
    /// Resume from a loaded state; a persisted cursor resumes tracking that day.
    pub fn new(persisted: PersistedState) -> Self {
        let state = match persisted.cursor {
            Some(day) => RolloverState::TrackingDay(day),
            None => RolloverState::Uninitialized,
        };
        Self {
            state,
            history: persisted.history,
            undated: false,
        }
    }

    /// Record that the tracker accepted a reading while the clock was unset.
    pub fn note_undated_reading(&mut self) {
        self.undated = true;
    }

    pub fn has_undated_readings(&self) -> bool {
        self.undated
    }

    pub fn state(&self) -> RolloverState {
        self.state
    }

    /// Slot 0 is the most recently completed day
    pub fn history(&self) -> &[HistoryEntry; HISTORY_DAYS] {
        &self.history
    }

    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            history: self.history,
            cursor: match self.state {
                RolloverState::TrackingDay(day) => Some(day),
                RolloverState::Uninitialized => None,
            },
        }
    }

    /// Evaluate one clock sample.
    ///
    /// `now` is `None` while the wall clock is unsynchronized. On a day
    /// change the store is written exactly once. The tracker is reset on a
    /// day change unless it holds undated readings, which then count toward
    /// the new day.
    pub fn tick<S: BlobStore>(
        &mut self,
        now: Option<CalendarTime>,
        tracker: &mut ExtremesTracker,
        store: &mut HistoryStore<S>,
    ) -> RolloverOutcome {
        let Some(now) = now else {
            debug!("Clock not set, skipping rollover check");
            return RolloverOutcome::ClockInvalid;
        };
        let undated = core::mem::take(&mut self.undated);

        let tracked = match self.state {
            RolloverState::Uninitialized => {
                info!("Tracking day {} (weekday {})", now.day, now.weekday);
                self.state = RolloverState::TrackingDay(now.day);
                return RolloverOutcome::Started(now.day);
            }
            RolloverState::TrackingDay(day) if day == now.day => return RolloverOutcome::NoChange,
            RolloverState::TrackingDay(day) => day,
        };

        let shifted = if now.day > tracked {
            now.day.saturating_sub(tracked) as usize
        } else {
            warn!("Clock moved back from day {} to {}", tracked, now.day);
            1
        };
        if undated {
            warn!(
                "Readings taken before the clock was set are kept for day {}",
                now.day
            );
            self.archive(tracked, shifted, &now, None);
        } else {
            self.archive(tracked, shifted, &now, Some(tracker));
            tracker.reset();
        }
        self.state = RolloverState::TrackingDay(now.day);

        let persisted = store.save(&self.persisted_state());
        if let Err(e) = &persisted {
            warn!("History not persisted: {}", e);
        }

        RolloverOutcome::Archived {
            completed: tracked,
            today: now.day,
            shifted,
            persisted,
        }
    }

    fn archive(
        &mut self,
        completed: DayKey,
        shifted: usize,
        now: &CalendarTime,
        tracker: Option<&ExtremesTracker>,
    ) {
        let shift = shifted.min(HISTORY_DAYS);
        self.history.copy_within(0..HISTORY_DAYS - shift, shift);

        // Days in the gap get placeholders with their own weekday and time
        for slot in 0..shift {
            let days_ago = slot as i32 + 1;
            self.history[slot] = HistoryEntry::missing(
                weekday_of(now.day - days_ago),
                now.epoch_seconds - SECS_PER_DAY * days_ago as i64,
            );
        }

        if shifted > HISTORY_DAYS {
            info!("Day {} fell out of the history window", completed);
            return;
        }

        let slot = shifted - 1;
        let timestamp = now.epoch_seconds - SECS_PER_DAY * shifted as i64;
        let weekday = weekday_of(completed);
        let completed_day = tracker.and_then(|t| t.snapshot().map(|e| (e, t.samples())));
        self.history[slot] = match completed_day {
            Some((extremes, samples)) => {
                info!(
                    "Day {} archived to slot {}: {} ({} samples)",
                    completed,
                    slot,
                    extremes,
                    samples
                );
                HistoryEntry::archived(weekday, timestamp, &extremes)
            }
            None => {
                info!("Day {} ended without readings", completed);
                HistoryEntry::missing(weekday, timestamp)
            }
        };
    }
}
