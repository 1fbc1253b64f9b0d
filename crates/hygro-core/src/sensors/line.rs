//! Single-wire data line and microsecond timer abstractions.
//!
//! The DHT11 shares one line for the host request and the sensor response,
//! so the transceiver needs a pin it can both drive and read back, plus a
//! free-running microsecond clock to time the phases between edges.

use core::fmt::Debug;

use embedded_hal::digital::{InputPin, OutputPin};
use log::trace;

/// A bidirectional data line that can be driven by the host or released to
/// the peer.
pub trait DataLine {
    /// Drive the line high (output mode)
    fn set_output_high(&mut self);
    /// Drive the line low (output mode)
    fn set_output_low(&mut self);
    /// Stop driving and let the peer (and the pull-up) own the line
    fn set_input(&mut self);
    /// Sample the current line level
    fn is_high(&mut self) -> bool;

    fn is_low(&mut self) -> bool {
        !self.is_high()
    }
}

/// Free-running microsecond counter. Wrap-around is not handled; a 64-bit
/// counter outlives the device.
pub trait MicrosTimer {
    fn now_micros(&self) -> u64;
}

impl<T: MicrosTimer> MicrosTimer for &T {
    fn now_micros(&self) -> u64 {
        (*self).now_micros()
    }
}

/// Adapts an open-drain `embedded-hal` pin into a [`DataLine`].
///
/// With an open-drain output, driving high only releases the line, so
/// "input mode" is the released state and the pin can be read back at any
/// time. GPIO on the supported targets is infallible, so a HAL error does
/// not abort the transfer: a failed read counts as a low level and the
/// first failure is traced.
pub struct OpenDrainLine<P> {
    pin: P,
    faulted: bool,
}

impl<P> OpenDrainLine<P>
where
    P: InputPin + OutputPin,
{
    pub const fn new(pin: P) -> Self {
        Self {
            pin,
            faulted: false,
        }
    }

    pub fn release(self) -> P {
        self.pin
    }

    /// Whether the pin has reported a HAL error since construction
    pub fn has_faulted(&self) -> bool {
        self.faulted
    }

    fn note_fault(&mut self, operation: &str, error: impl Debug) {
        if !self.faulted {
            self.faulted = true;
            trace!("Data line {} failed: {:?}", operation, error);
        }
    }
}

impl<P> DataLine for OpenDrainLine<P>
where
    P: InputPin + OutputPin,
{
    fn set_output_high(&mut self) {
        if let Err(e) = self.pin.set_high() {
            self.note_fault("set_high", e);
        }
    }

    fn set_output_low(&mut self) {
        if let Err(e) = self.pin.set_low() {
            self.note_fault("set_low", e);
        }
    }

    fn set_input(&mut self) {
        if let Err(e) = self.pin.set_high() {
            self.note_fault("release", e);
        }
    }

    fn is_high(&mut self) -> bool {
        match self.pin.is_high() {
            Ok(level) => level,
            Err(e) => {
                self.note_fault("read", e);
                false
            }
        }
    }
}
