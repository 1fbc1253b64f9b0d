//! Cycle-accurate DHT11 peer for host tests and the desktop simulator.
//!
//! Time only advances through the delay handle, so a transceiver polling in
//! 1 µs steps sees exactly the waveform a real sensor would produce. The
//! line, timer and delay handles share one simulated bus.

use alloc::rc::Rc;
use core::cell::RefCell;

use super::line::{DataLine, MicrosTimer};

/// Peer wait between the host release and its acknowledge
pub const ACK_DELAY_US: u64 = 25;
pub const ACK_LOW_US: u64 = 80;
pub const ACK_HIGH_US: u64 = 80;
pub const BIT_LOW_US: u64 = 50;
pub const ZERO_HIGH_US: u64 = 26;
pub const ONE_HIGH_US: u64 = 70;
pub const FINAL_LOW_US: u64 = 50;
/// Shortest start signal the peer answers to
pub const MIN_START_LOW_US: u64 = 18_000;

/// How the simulated peer misbehaves, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerBehavior {
    #[default]
    Normal,
    /// Never answers the start signal
    Silent,
    /// Acknowledges low but never releases
    StuckLow,
    /// Completes the acknowledge but never starts the data
    NeverStartsData,
    /// Holds the line low from the given bit onwards
    TruncateAfter(u8),
    /// Sends all 40 bits but never releases the closing low
    HoldsLineAfterFrame,
}

struct BusState {
    now_us: u64,
    host_low_since: Option<u64>,
    /// Set when the host ends a long enough start signal
    response_start: Option<u64>,
    frame: [u8; 5],
    behavior: PeerBehavior,
    responses: u32,
}

impl BusState {
    fn host_releases(&mut self) {
        let Some(since) = self.host_low_since.take() else {
            return;
        };
        if self.now_us - since >= MIN_START_LOW_US {
            self.response_start = Some(self.now_us);
            if self.behavior != PeerBehavior::Silent {
                self.responses += 1;
            }
        }
    }

    fn bit(&self, index: usize) -> bool {
        self.frame[index / 8] & (1 << (7 - index % 8)) != 0
    }

    /// Level the peer drives `elapsed` µs after the host release; `true` when
    /// it leaves the line to the pull-up.
    fn peer_level(&self, elapsed: u64) -> bool {
        let mut edge = ACK_DELAY_US;
        if elapsed < edge {
            return true;
        }
        if self.behavior == PeerBehavior::StuckLow {
            return false;
        }
        edge += ACK_LOW_US;
        if elapsed < edge {
            return false;
        }
        if self.behavior == PeerBehavior::NeverStartsData {
            return true;
        }
        edge += ACK_HIGH_US;
        if elapsed < edge {
            return true;
        }

        for index in 0..40 {
            if self.behavior == PeerBehavior::TruncateAfter(index as u8) {
                return false;
            }
            edge += BIT_LOW_US;
            if elapsed < edge {
                return false;
            }
            edge += if self.bit(index) { ONE_HIGH_US } else { ZERO_HIGH_US };
            if elapsed < edge {
                return true;
            }
        }

        if self.behavior == PeerBehavior::HoldsLineAfterFrame {
            return false;
        }
        elapsed >= edge + FINAL_LOW_US
    }

    fn line_high(&self) -> bool {
        if self.host_low_since.is_some() {
            return false;
        }
        match self.response_start {
            Some(start) if self.behavior != PeerBehavior::Silent => {
                self.peer_level(self.now_us - start)
            }
            _ => true,
        }
    }
}

/// Control handle for a simulated sensor.
#[derive(Clone)]
pub struct SimulatedDht11 {
    bus: Rc<RefCell<BusState>>,
}

impl SimulatedDht11 {
    pub fn new(frame: [u8; 5]) -> Self {
        Self {
            bus: Rc::new(RefCell::new(BusState {
                now_us: 0,
                host_low_since: None,
                response_start: None,
                frame,
                behavior: PeerBehavior::Normal,
                responses: 0,
            })),
        }
    }

    /// Line, timer and delay handles for a transceiver.
    pub fn split(&self) -> (SimLine, SimTimer, SimDelay) {
        (
            SimLine {
                bus: self.bus.clone(),
            },
            SimTimer {
                bus: self.bus.clone(),
            },
            SimDelay {
                bus: self.bus.clone(),
            },
        )
    }

    /// Frame sent on the next request
    pub fn set_frame(&self, frame: [u8; 5]) {
        self.bus.borrow_mut().frame = frame;
    }

    pub fn set_behavior(&self, behavior: PeerBehavior) {
        self.bus.borrow_mut().behavior = behavior;
    }

    /// Number of start signals the peer answered
    pub fn responses(&self) -> u32 {
        self.bus.borrow().responses
    }

    pub fn now_micros(&self) -> u64 {
        self.bus.borrow().now_us
    }
}

pub struct SimLine {
    bus: Rc<RefCell<BusState>>,
}

impl DataLine for SimLine {
    fn set_output_high(&mut self) {
        self.bus.borrow_mut().host_releases();
    }

    fn set_output_low(&mut self) {
        let mut bus = self.bus.borrow_mut();
        if bus.host_low_since.is_none() {
            bus.host_low_since = Some(bus.now_us);
            bus.response_start = None;
        }
    }

    fn set_input(&mut self) {
        self.bus.borrow_mut().host_releases();
    }

    fn is_high(&mut self) -> bool {
        self.bus.borrow().line_high()
    }
}

pub struct SimTimer {
    bus: Rc<RefCell<BusState>>,
}

impl MicrosTimer for SimTimer {
    fn now_micros(&self) -> u64 {
        self.bus.borrow().now_us
    }
}

pub struct SimDelay {
    bus: Rc<RefCell<BusState>>,
}

impl SimDelay {
    fn advance_ns(&mut self, ns: u64) {
        self.bus.borrow_mut().now_us += ns.div_ceil(1000);
    }
}

impl embedded_hal::delay::DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.advance_ns(ns as u64);
    }

    fn delay_us(&mut self, us: u32) {
        self.advance_ns(us as u64 * 1000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance_ns(ms as u64 * 1_000_000);
    }
}

impl embedded_hal_async::delay::DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.advance_ns(ns as u64);
    }

    async fn delay_us(&mut self, us: u32) {
        self.advance_ns(us as u64 * 1000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.advance_ns(ms as u64 * 1_000_000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::delay::DelayNs;

    #[test]
    fn test_waveform_starts_with_acknowledge() {
        let sim = SimulatedDht11::new([0; 5]);
        let (mut line, _timer, mut delay) = sim.split();

        line.set_output_low();
        DelayNs::delay_ms(&mut delay, 20);
        line.set_input();

        assert!(line.is_high());
        DelayNs::delay_us(&mut delay, ACK_DELAY_US as u32);
        assert!(line.is_low());
        DelayNs::delay_us(&mut delay, ACK_LOW_US as u32);
        assert!(line.is_high());
        DelayNs::delay_us(&mut delay, ACK_HIGH_US as u32);
        assert!(line.is_low());
    }

    #[test]
    fn test_idle_line_is_high() {
        let sim = SimulatedDht11::new([0; 5]);
        let (mut line, _timer, _delay) = sim.split();
        assert!(line.is_high());
    }
}
