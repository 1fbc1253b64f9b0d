//! DHT11 single-wire transceiver.
//!
//! The host pulls the line low for 20 ms to request a reading, then releases
//! it. The sensor acknowledges with ~80 µs low and ~80 µs high, then shifts out
//! 40 bits. Every bit starts with ~50 µs low; the length of the following high
//! phase carries the value (~26 µs for 0, ~70 µs for 1). A final ~50 µs low
//! ends the frame before the line returns to idle high.

use embedded_hal::delay::DelayNs;
use embedded_hal_async::delay::DelayNs as AsyncDelayNs;
use log::{debug, trace};
use thiserror_no_std::Error;

use super::critical::SamplingGuard;
use super::frame::Frame;
use super::line::{DataLine, MicrosTimer};
use super::{Sensor, SensorError};

/// Bus-idle high level held before the start signal
pub const IDLE_HIGH_US: u32 = 10;
/// Host start signal; the datasheet asks for at least 18 ms
pub const START_LOW_MS: u32 = 20;
/// Host release before switching to input
pub const RELEASE_SETTLE_US: u32 = 30;
/// Bound for each of the three handshake edges
pub const RESPONSE_TIMEOUT_US: u64 = 120;
/// Bound on the leading low phase of a bit
pub const BIT_LOW_TIMEOUT_US: u64 = 100;
/// Cap on a measured bit high phase
pub const BIT_HIGH_CAP_US: u64 = 100;
/// High phases longer than this decode as 1
pub const ONE_THRESHOLD_US: u64 = 40;
/// Bound on the closing low phase after the last bit
pub const FINAL_RELEASE_TIMEOUT_US: u64 = 56;
/// The sensor ignores requests for this long after power-on
pub const POWER_UP_SETTLE_MS: u32 = 1200;

pub const FRAME_BITS: usize = 40;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("sensor did not pull the line low after the start signal")]
    NoResponseLow,
    #[error("sensor did not release the line after its acknowledge")]
    NoResponseHigh,
    #[error("sensor did not pull the line low to start the data")]
    NoDataStart,
    #[error("bit {bit} low phase longer than 100 µs")]
    BitTimeout { bit: u8 },
    #[error("line not released after the last bit")]
    NoFinalRelease,
}

/// Phase durations observed during the most recent acquisition attempt.
///
/// Entries past the point of failure stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTimings {
    /// Time to reach each handshake edge: ack low, ack high, data start
    pub handshake_us: [u16; 3],
    /// Leading low phase of each bit
    pub bit_low_us: [u16; FRAME_BITS],
    /// High phase of each bit, capped at [`BIT_HIGH_CAP_US`]
    pub bit_high_us: [u16; FRAME_BITS],
}

impl Default for FrameTimings {
    fn default() -> Self {
        Self {
            handshake_us: [0; 3],
            bit_low_us: [0; FRAME_BITS],
            bit_high_us: [0; FRAME_BITS],
        }
    }
}

/// Owns the data line and decodes one frame per request.
///
/// The transceiver never blocks longer than the sum of its fixed bounds, so a
/// disconnected sensor costs about 20 ms per attempt.
pub struct Dht11<L, T, D> {
    line: L,
    timer: T,
    delay: D,
    timings: FrameTimings,
    powered_up: bool,
}

impl<L, T, D> Dht11<L, T, D>
where
    L: DataLine,
    T: MicrosTimer,
    D: DelayNs,
{
    pub fn new(line: L, timer: T, delay: D) -> Self {
        Self {
            line,
            timer,
            delay,
            timings: FrameTimings::default(),
            powered_up: false,
        }
    }

    /// Timings of the last attempt, successful or not.
    pub fn last_timings(&self) -> &FrameTimings {
        &self.timings
    }

    /// Request and decode one frame, busy-waiting through the start signal.
    ///
    /// The first call also waits out the power-up settle time.
    pub fn acquire_reading(&mut self) -> Result<Frame, DecodeError> {
        if !self.powered_up {
            self.delay.delay_ms(POWER_UP_SETTLE_MS);
            self.powered_up = true;
        }

        self.begin_start_signal();
        self.delay.delay_ms(START_LOW_MS);
        self.end_start_signal();

        self.read_response()
    }

    fn begin_start_signal(&mut self) {
        self.timings = FrameTimings::default();

        self.line.set_output_high();
        self.delay.delay_us(IDLE_HIGH_US);
        self.line.set_output_low();
    }

    fn end_start_signal(&mut self) {
        self.line.set_output_high();
        self.delay.delay_us(RELEASE_SETTLE_US);
        self.line.set_input();
    }

    /// Poll at 1 µs until the line reaches `high`. Returns the elapsed time,
    /// or `None` once `timeout_us` has passed.
    fn wait_for_level(&mut self, high: bool, timeout_us: u64) -> Option<u64> {
        let start = self.timer.now_micros();
        loop {
            let elapsed = self.timer.now_micros().saturating_sub(start);
            if elapsed > timeout_us {
                return None;
            }
            if self.line.is_high() == high {
                return Some(elapsed);
            }
            self.delay.delay_us(1);
        }
    }

    /// Length of the current high phase, capped at `cap_us`.
    fn measure_high(&mut self, cap_us: u64) -> u64 {
        let start = self.timer.now_micros();
        while self.line.is_high() {
            if self.timer.now_micros().saturating_sub(start) > cap_us {
                break;
            }
            self.delay.delay_us(1);
        }
        self.timer.now_micros().saturating_sub(start)
    }

    fn read_response(&mut self) -> Result<Frame, DecodeError> {
        let ack_low = self
            .wait_for_level(false, RESPONSE_TIMEOUT_US)
            .ok_or(DecodeError::NoResponseLow)?;
        let ack_high = self
            .wait_for_level(true, RESPONSE_TIMEOUT_US)
            .ok_or(DecodeError::NoResponseHigh)?;
        let data_start = self
            .wait_for_level(false, RESPONSE_TIMEOUT_US)
            .ok_or(DecodeError::NoDataStart)?;
        self.timings.handshake_us = [ack_low as u16, ack_high as u16, data_start as u16];

        let bytes = self.sample_bits()?;

        self.wait_for_level(true, FINAL_RELEASE_TIMEOUT_US)
            .ok_or(DecodeError::NoFinalRelease)?;

        let frame = Frame(bytes);
        debug!("DHT11 frame {:02x?}", frame.bytes());
        trace!("DHT11 timings {:?}", self.timings);
        Ok(frame)
    }

    /// Sample the 40 data bits with interrupts masked. Scheduler or interrupt
    /// jitter here corrupts the high-phase measurement.
    fn sample_bits(&mut self) -> Result<[u8; 5], DecodeError> {
        let mut bytes = [0u8; 5];
        let _guard = SamplingGuard::acquire();

        for bit in 0..FRAME_BITS {
            let low = self
                .wait_for_level(true, BIT_LOW_TIMEOUT_US)
                .ok_or(DecodeError::BitTimeout { bit: bit as u8 })?;
            let high = self.measure_high(BIT_HIGH_CAP_US);

            self.timings.bit_low_us[bit] = low as u16;
            self.timings.bit_high_us[bit] = high as u16;

            if high > ONE_THRESHOLD_US {
                bytes[bit / 8] |= 1 << (7 - bit % 8);
            }
        }

        Ok(bytes)
    }
}

impl<L, T, D> Sensor for Dht11<L, T, D>
where
    L: DataLine,
    T: MicrosTimer,
    D: DelayNs + AsyncDelayNs,
{
    type Readings = Frame;

    /// Same protocol as [`Dht11::acquire_reading`], but the power-up wait and
    /// the 20 ms start signal yield to the executor.
    async fn read(&mut self) -> Result<Frame, SensorError> {
        if !self.powered_up {
            AsyncDelayNs::delay_ms(&mut self.delay, POWER_UP_SETTLE_MS).await;
            self.powered_up = true;
        }

        self.begin_start_signal();
        AsyncDelayNs::delay_ms(&mut self.delay, START_LOW_MS).await;
        self.end_start_signal();

        self.read_response().map_err(SensorError::from)
    }
}
