mod critical;
pub mod dht11;
pub mod frame;
pub mod line;
#[cfg(any(test, feature = "simulation"))]
pub mod sim;

use thiserror_no_std::Error;

pub use critical::SamplingGuard;
pub use dht11::{DecodeError, Dht11, FrameTimings};
pub use frame::{ChecksumPolicy, Frame, FrameValidator, Reading, ValidationError, validate};
pub use line::{DataLine, MicrosTimer, OpenDrainLine};

/// Why an acquisition cycle produced no new reading.
///
/// Both kinds are transient: the previous accepted reading stays
/// authoritative and the next cycle retries implicitly.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("decode failed: {0}")]
    Decode(DecodeError),
    #[error("frame rejected: {0}")]
    Validation(ValidationError),
}

impl From<DecodeError> for SensorError {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<ValidationError> for SensorError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Trait for sensors that produce typed readings.
pub trait Sensor {
    /// The type of readings this sensor produces.
    type Readings;

    /// Read the sensor and return typed readings.
    fn read(&mut self) -> impl Future<Output = Result<Self::Readings, SensorError>>;
}
