//! Decoded DHT11 frames and their validation into plausible readings.

use core::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Lowest temperature the DHT11 is rated for, in tenths of a degree Celsius.
pub const MIN_TEMPERATURE_TENTHS: i16 = -200;
/// Highest temperature the DHT11 is rated for, in tenths of a degree Celsius.
pub const MAX_TEMPERATURE_TENTHS: i16 = 600;
/// Lowest relative humidity the DHT11 is rated for, in tenths of a percent.
pub const MIN_HUMIDITY_TENTHS: i16 = 50;
/// Highest relative humidity the DHT11 is rated for, in tenths of a percent.
pub const MAX_HUMIDITY_TENTHS: i16 = 900;

/// The five bytes shifted out by the sensor, most significant bit first.
///
/// Layout: `[humidity_int, humidity_frac, temperature_int, temperature_frac, checksum]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Frame(pub [u8; 5]);

impl Frame {
    pub const fn bytes(&self) -> &[u8; 5] {
        &self.0
    }

    /// 8-bit sum of the four payload bytes, as the sensor computes it.
    pub fn expected_checksum(&self) -> u8 {
        self.0[..4]
            .iter()
            .fold(0u8, |sum, &byte| sum.wrapping_add(byte))
    }

    pub fn checksum_matches(&self) -> bool {
        self.expected_checksum() == self.0[4]
    }

    /// Interpret the payload without any plausibility checks.
    pub const fn reading(&self) -> Reading {
        Reading {
            humidity_int: self.0[0],
            humidity_frac: self.0[1],
            temperature_int: self.0[2],
            temperature_frac: self.0[3],
        }
    }
}

/// One humidity/temperature reading as carried on the wire.
///
/// The fractional fields count tenths, so `temperature_int = 23` and
/// `temperature_frac = 4` mean 23.4 °C.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub humidity_int: u8,
    pub humidity_frac: u8,
    pub temperature_int: u8,
    pub temperature_frac: u8,
}

impl Reading {
    pub const fn temperature_tenths(&self) -> i16 {
        self.temperature_int as i16 * 10 + self.temperature_frac as i16
    }

    pub const fn humidity_tenths(&self) -> i16 {
        self.humidity_int as i16 * 10 + self.humidity_frac as i16
    }

    /// Temperature in degrees Celsius
    pub fn temperature(&self) -> f32 {
        self.temperature_tenths() as f32 / 10.0
    }

    /// Relative humidity in percent
    pub fn humidity(&self) -> f32 {
        self.humidity_tenths() as f32 / 10.0
    }
}

impl Display for Reading {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "[Reading] temperature: {}.{}°C, humidity: {}.{}%",
            self.temperature_int, self.temperature_frac, self.humidity_int, self.humidity_frac
        )
    }
}

/// Whether the fifth frame byte is checked against the payload sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumPolicy {
    /// Accept frames regardless of the checksum byte
    #[default]
    Ignore,
    /// Reject frames whose checksum byte does not match
    Enforce,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("reading out of range: {temperature_tenths} d°C, {humidity_tenths} d%RH")]
    OutOfRange {
        temperature_tenths: i16,
        humidity_tenths: i16,
    },
    #[error("checksum mismatch: expected {expected:#04x}, received {received:#04x}")]
    Checksum { expected: u8, received: u8 },
}

/// Gates decoded frames into physically plausible readings.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameValidator {
    checksum: ChecksumPolicy,
}

impl FrameValidator {
    pub const fn new(checksum: ChecksumPolicy) -> Self {
        Self { checksum }
    }

    /// Accepts the frame iff temperature is within [-20, 60] °C and humidity
    /// within [5, 90] %RH, bounds inclusive.
    pub fn validate(&self, bytes: &[u8; 5]) -> Result<Reading, ValidationError> {
        let frame = Frame(*bytes);

        if self.checksum == ChecksumPolicy::Enforce && !frame.checksum_matches() {
            return Err(ValidationError::Checksum {
                expected: frame.expected_checksum(),
                received: bytes[4],
            });
        }

        let reading = frame.reading();
        let temperature_tenths = reading.temperature_tenths();
        let humidity_tenths = reading.humidity_tenths();

        let temperature_ok =
            (MIN_TEMPERATURE_TENTHS..=MAX_TEMPERATURE_TENTHS).contains(&temperature_tenths);
        let humidity_ok = (MIN_HUMIDITY_TENTHS..=MAX_HUMIDITY_TENTHS).contains(&humidity_tenths);

        if temperature_ok && humidity_ok {
            Ok(reading)
        } else {
            Err(ValidationError::OutOfRange {
                temperature_tenths,
                humidity_tenths,
            })
        }
    }
}

/// Validate with the default policy (checksum ignored).
pub fn validate(bytes: &[u8; 5]) -> Result<Reading, ValidationError> {
    FrameValidator::default().validate(bytes)
}
