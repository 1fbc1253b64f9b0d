//! Periodic acquisition pipeline.
//!
//! One cycle: check for a day rollover, acquire a frame, validate it, fold
//! it into today's extremes, and publish a fresh [`Snapshot`]. Failures are
//! logged and counted; the previous accepted reading stays published and
//! the next cycle is the retry.

use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::app_state::{RunStatus, SharedState, Snapshot};
use crate::clock::{CalendarTime, WallClock};
use crate::config::MonitorConfig;
use crate::sensors::{Frame, FrameValidator, Reading, Sensor, SensorError};
use crate::storage::{
    BlobStore, ExtremesTracker, HistoryStore, RolloverEngine, RolloverOutcome,
};

/// What a single [`Monitor::run_cycle`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub rollover: RolloverOutcome,
    pub reading: Result<Reading, SensorError>,
}

pub struct Monitor<'a, S, C, B> {
    config: MonitorConfig<'a>,
    sensor: S,
    validator: FrameValidator,
    clock: C,
    store: HistoryStore<B>,
    engine: RolloverEngine,
    tracker: ExtremesTracker,
    latest: Option<Reading>,
    status: RunStatus,
    shared: &'a SharedState,
}

impl<'a, S, C, B> Monitor<'a, S, C, B>
where
    S: Sensor<Readings = Frame>,
    C: WallClock,
    B: BlobStore,
{
    /// Load the persisted history and publish it before the first cycle.
    pub fn new(
        config: MonitorConfig<'a>,
        sensor: S,
        clock: C,
        store: B,
        shared: &'a SharedState,
    ) -> Self {
        let mut store = HistoryStore::new(store, config.namespace);
        let engine = RolloverEngine::new(store.load());

        let mut status = RunStatus::new();
        status.persistence = store.mode();

        let monitor = Self {
            validator: FrameValidator::new(config.checksum),
            config,
            sensor,
            clock,
            store,
            engine,
            tracker: ExtremesTracker::new(),
            latest: None,
            status,
            shared,
        };
        monitor.publish();
        monitor
    }

    pub fn config(&self) -> &MonitorConfig<'a> {
        &self.config
    }

    pub fn tracker(&self) -> &ExtremesTracker {
        &self.tracker
    }

    pub fn engine(&self) -> &RolloverEngine {
        &self.engine
    }

    pub fn history_store(&self) -> &HistoryStore<B> {
        &self.store
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    /// Tear down and hand back the blob store.
    pub fn into_store(self) -> B {
        self.store.into_inner()
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let now = CalendarTime::from_epoch(self.clock.now(), self.config.utc_offset_secs);
        self.status.clock_valid = now.is_some();

        // Rollover first so the closing day never sees the new day's first reading
        let rollover = self.engine.tick(now, &mut self.tracker, &mut self.store);
        self.status.persistence = self.store.mode();

        let reading = self.acquire().await;
        match reading {
            Ok(reading) => {
                debug!("{}", reading);
                self.tracker.observe(&reading);
                if now.is_none() {
                    self.engine.note_undated_reading();
                }
                self.latest = Some(reading);
                self.status.record_success();
            }
            Err(SensorError::Decode(e)) => {
                error!("Sensor read failed: {}", e);
                self.status.record_failure(SensorError::Decode(e));
            }
            Err(SensorError::Validation(e)) => {
                warn!("Discarding frame: {}", e);
                self.status.record_failure(SensorError::Validation(e));
            }
        }
        self.status.cycles = self.status.cycles.wrapping_add(1);

        self.publish();
        CycleReport { rollover, reading }
    }

    /// Run cycles forever at the configured cadence.
    pub async fn run<D: DelayNs>(&mut self, mut delay: D) -> ! {
        info!(
            "Monitor started, polling every {} ms",
            self.config.poll_interval_ms
        );

        loop {
            let report = self.run_cycle().await;
            if let RolloverOutcome::Archived { completed, .. } = report.rollover {
                info!("Rolled over from day {}; {}", completed, self.status);
            }
            delay.delay_ms(self.config.poll_interval_ms).await;
        }
    }

    async fn acquire(&mut self) -> Result<Reading, SensorError> {
        let frame = self.sensor.read().await?;
        Ok(self.validator.validate(frame.bytes())?)
    }

    fn publish(&self) {
        self.shared.publish(Snapshot {
            latest: self.latest,
            today: self.tracker.snapshot(),
            history: *self.engine.history(),
            status: self.status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SECS_PER_DAY;
    use crate::config::DEFAULT_NAMESPACE;
    use crate::sensors::sim::{PeerBehavior, SimDelay, SimLine, SimTimer, SimulatedDht11};
    use crate::sensors::{DecodeError, Dht11, ValidationError};
    use crate::storage::{MemoryBlobStore, PersistMode};
    use core::cell::Cell;
    use embassy_futures::block_on;

    // 2024-03-15 12:00 local at UTC+8
    const NOON: i64 = 1_710_460_800 + 4 * 3600;

    struct FixedClock(Cell<i64>);

    impl WallClock for FixedClock {
        fn now(&self) -> i64 {
            self.0.get()
        }
    }

    type SimMonitor<'a> =
        Monitor<'a, Dht11<SimLine, SimTimer, SimDelay>, &'a FixedClock, MemoryBlobStore>;

    fn monitor<'a>(
        sim: &SimulatedDht11,
        clock: &'a FixedClock,
        shared: &'a SharedState,
    ) -> SimMonitor<'a> {
        let (line, timer, delay) = sim.split();
        Monitor::new(
            MonitorConfig::default(),
            Dht11::new(line, timer, delay),
            clock,
            MemoryBlobStore::new(),
            shared,
        )
    }

    #[test]
    fn test_cycle_publishes_reading_and_extremes() {
        let sim = SimulatedDht11::new([45, 0, 23, 4, 72]);
        let clock = FixedClock(Cell::new(NOON));
        let shared = SharedState::new();
        let mut monitor = monitor(&sim, &clock, &shared);

        let first = block_on(monitor.run_cycle());
        assert!(matches!(first.rollover, RolloverOutcome::Started(_)));
        assert!(first.reading.is_ok());

        sim.set_frame([60, 0, 30, 0, 90]);
        block_on(monitor.run_cycle());

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.latest.map(|r| r.temperature_int), Some(30));
        let today = snapshot.today.unwrap();
        assert_eq!(today.max_temp, 30.0);
        assert!((today.min_temp - 23.4).abs() < 1e-4);
        assert_eq!(today.max_hum, 60.0);
        assert_eq!(today.min_hum, 45.0);
        assert!(snapshot.status.clock_valid);
        assert_eq!(snapshot.status.cycles, 2);
    }

    #[test]
    fn test_rejected_frame_keeps_previous_reading() {
        let sim = SimulatedDht11::new([45, 0, 23, 4, 72]);
        let clock = FixedClock(Cell::new(NOON));
        let shared = SharedState::new();
        let mut monitor = monitor(&sim, &clock, &shared);
        block_on(monitor.run_cycle());

        // 95 %RH is above the rated range
        sim.set_frame([95, 0, 23, 4, 122]);
        let report = block_on(monitor.run_cycle());

        assert!(matches!(
            report.reading,
            Err(SensorError::Validation(ValidationError::OutOfRange { .. }))
        ));
        assert_eq!(shared.get_latest_reading().map(|r| r.humidity_int), Some(45));
        assert_eq!(monitor.tracker().samples(), 1);
        assert_eq!(shared.status().consecutive_failures, 1);
    }

    #[test]
    fn test_silent_sensor_counts_failures() {
        let sim = SimulatedDht11::new([45, 0, 23, 4, 72]);
        sim.set_behavior(PeerBehavior::Silent);
        let clock = FixedClock(Cell::new(NOON));
        let shared = SharedState::new();
        let mut monitor = monitor(&sim, &clock, &shared);

        for _ in 0..3 {
            let report = block_on(monitor.run_cycle());
            assert_eq!(
                report.reading,
                Err(SensorError::Decode(DecodeError::NoResponseLow))
            );
        }

        let status = shared.status();
        assert_eq!(status.consecutive_failures, 3);
        assert_eq!(shared.get_latest_reading(), None);
        assert_eq!(shared.get_today_extremes(), None);
    }

    #[test]
    fn test_day_change_archives_before_new_reading() {
        let sim = SimulatedDht11::new([45, 0, 23, 4, 72]);
        let clock = FixedClock(Cell::new(NOON));
        let shared = SharedState::new();
        let mut monitor = monitor(&sim, &clock, &shared);
        block_on(monitor.run_cycle());

        clock.0.set(NOON + SECS_PER_DAY);
        sim.set_frame([50, 0, 10, 0, 60]);
        let report = block_on(monitor.run_cycle());

        assert!(matches!(
            report.rollover,
            RolloverOutcome::Archived { persisted: Ok(()), .. }
        ));
        let history = shared.get_history();
        assert!(history[0].valid);
        assert!((history[0].max_temp - 23.4).abs() < 1e-4);
        // The new day starts from the reading taken after the rollover
        assert_eq!(shared.get_today_extremes().map(|e| e.max_temp), Some(10.0));
        assert_eq!(monitor.history_store().store().commits(), 1);
        assert!(
            monitor
                .history_store()
                .store()
                .committed(DEFAULT_NAMESPACE, "history")
                .is_some()
        );
    }

    #[test]
    fn test_unsynced_clock_still_tracks_readings() {
        let sim = SimulatedDht11::new([45, 0, 23, 4, 72]);
        let clock = FixedClock(Cell::new(37));
        let shared = SharedState::new();
        let mut monitor = monitor(&sim, &clock, &shared);

        let report = block_on(monitor.run_cycle());

        assert_eq!(report.rollover, RolloverOutcome::ClockInvalid);
        assert!(report.reading.is_ok());
        assert!(!shared.status().clock_valid);
        assert!(shared.get_today_extremes().is_some());
        assert_eq!(shared.status().persistence, PersistMode::Backed);
    }
}
