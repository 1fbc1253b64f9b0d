//! Desktop simulator for the hygro-rs acquisition pipeline.
//!
//! Runs the real `Monitor` against the cycle-accurate simulated DHT11, a
//! wall clock that jumps one hour per cycle, and a directory-backed blob
//! store. Halfway through, the monitor is torn down and rebuilt from the
//! store, the same way a power cycle would on the device.
//!
//! Usage: `hygro-simulator [DAYS] [DATA_DIR]`
//!
//! Set `RUST_LOG=debug` to see every decoded reading.

mod dir_store;

use std::cell::Cell;
use std::f32::consts::TAU;
use std::ops::Range;
use std::path::PathBuf;

use embassy_futures::block_on;
use log::{info, warn};

use hygro_core::app_state::SharedState;
use hygro_core::clock::WallClock;
use hygro_core::config::MonitorConfig;
use hygro_core::monitor::Monitor;
use hygro_core::sensors::Dht11;
use hygro_core::sensors::sim::{PeerBehavior, SimulatedDht11};
use hygro_core::storage::RolloverOutcome;

use dir_store::DirBlobStore;

const DEFAULT_DAYS: u32 = 10;

/// One cycle per simulated hour
const CYCLES_PER_DAY: u32 = 24;
const SECS_PER_CYCLE: i64 = 3600;

/// 2024-03-15 00:00 UTC
const START_EPOCH: i64 = 1_710_460_800;

/// The wall clock only becomes valid after this many cycles, like a device
/// waiting for its first time sync.
const UNSYNCED_CYCLES: u32 = 2;

/// Every Nth cycle the peer stays silent
const SILENT_EVERY: u32 = 17;
/// Every Nth cycle the peer sends an implausible frame
const IMPLAUSIBLE_EVERY: u32 = 29;

struct FastForwardClock {
    now: Cell<i64>,
}

impl FastForwardClock {
    fn at(cycle: u32) -> i64 {
        if cycle < UNSYNCED_CYCLES {
            // Seconds since boot, before the first sync
            return cycle as i64 * 2;
        }
        START_EPOCH + cycle as i64 * SECS_PER_CYCLE
    }

    fn set_cycle(&self, cycle: u32) {
        self.now.set(Self::at(cycle));
    }
}

impl WallClock for FastForwardClock {
    fn now(&self) -> i64 {
        self.now.get()
    }
}

/// Diurnal temperature and humidity swing with a slow drift across days.
fn weather_frame(cycle: u32) -> [u8; 5] {
    let day = cycle / CYCLES_PER_DAY;
    let hour = (cycle % CYCLES_PER_DAY) as f32;

    // Warmest and driest mid-afternoon
    let swing = (TAU * (hour - 9.0) / 24.0).sin();
    let temperature = 22.0 + 6.0 * swing + (day % 5) as f32 * 0.8;
    let humidity = 55.0 - 18.0 * swing;

    encode_frame(humidity, temperature)
}

fn encode_frame(humidity: f32, temperature: f32) -> [u8; 5] {
    let humidity = (humidity * 10.0).round().clamp(0.0, 2559.0) as u16;
    let temperature = (temperature * 10.0).round().clamp(0.0, 2559.0) as u16;

    let mut frame = [
        (humidity / 10) as u8,
        (humidity % 10) as u8,
        (temperature / 10) as u8,
        (temperature % 10) as u8,
        0,
    ];
    frame[4] = frame[..4].iter().fold(0u8, |sum, &b| sum.wrapping_add(b));
    frame
}

/// Set up the simulated peer for `cycle`, including the occasional fault.
fn drive_peer(sim: &SimulatedDht11, cycle: u32) {
    if cycle > 0 && cycle % SILENT_EVERY == 0 {
        sim.set_behavior(PeerBehavior::Silent);
        return;
    }

    sim.set_behavior(PeerBehavior::Normal);
    if cycle > 0 && cycle % IMPLAUSIBLE_EVERY == 0 {
        sim.set_frame(encode_frame(97.0, 24.0));
    } else {
        sim.set_frame(weather_frame(cycle));
    }
}

fn run_segment(
    config: MonitorConfig<'_>,
    sim: &SimulatedDht11,
    clock: &FastForwardClock,
    store: DirBlobStore,
    shared: &SharedState,
    cycles: Range<u32>,
) -> DirBlobStore {
    let (line, timer, delay) = sim.split();
    let mut monitor = Monitor::new(config, Dht11::new(line, timer, delay), clock, store, shared);
    info!(
        "Monitor up, persistence {:?}, {} valid day(s) loaded",
        monitor.history_store().mode(),
        shared.get_history().iter().filter(|e| e.valid).count()
    );

    for cycle in cycles {
        clock.set_cycle(cycle);
        drive_peer(sim, cycle);

        let report = block_on(monitor.run_cycle());
        if let RolloverOutcome::Archived {
            completed,
            persisted,
            ..
        } = &report.rollover
        {
            info!("Archived day {} (persisted: {})", completed, persisted.is_ok());
        }
    }

    monitor.into_store()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let days = args
        .next()
        .and_then(|arg| arg.parse::<u32>().ok())
        .unwrap_or(DEFAULT_DAYS);
    let data_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("hygro-simulator"));

    info!("Starting hygro-rs simulator");
    info!("Simulating {} day(s), storing history in {}", days, data_dir.display());

    let config = MonitorConfig::default();
    let sim = SimulatedDht11::new(weather_frame(0));
    let clock = FastForwardClock {
        now: Cell::new(FastForwardClock::at(0)),
    };
    let shared = SharedState::new();

    let total = days * CYCLES_PER_DAY;
    let restart_at = total / 2;

    let store = DirBlobStore::new(&data_dir);
    let store = run_segment(config, &sim, &clock, store, &shared, 0..restart_at);
    warn!("Simulated power cycle at cycle {}", restart_at);
    let store = run_segment(config, &sim, &clock, store, &shared, restart_at..total);

    let snapshot = shared.snapshot();
    println!();
    println!("{}", snapshot.status);
    if let Some(reading) = snapshot.latest {
        println!("latest  {}", reading);
    }
    if let Some(today) = snapshot.today {
        println!("today   {}", today);
    }
    for (slot, entry) in snapshot.history.iter().enumerate() {
        println!("slot {}  {}", slot, entry);
    }
    println!("history stored under {}", store.root().display());

    info!("Simulator exiting");
}
