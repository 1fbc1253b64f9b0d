//! DHT11 data line on an ESP32-S3 GPIO
//!
//! The sensor and the host share a single wire with an external pull-up.
//! A `Flex` pin in open-drain mode can pull the wire low, release it, and
//! read it back without reconfiguring between phases.

use esp_hal::gpio::{DriveMode, Flex, InputConfig, OutputConfig, Pin, Pull};
use hygro_core::sensors::OpenDrainLine;

pub type Dht11Line<'d> = OpenDrainLine<Flex<'d>>;

/// Configure `pin` for the DHT11 and leave the line released (high).
pub fn dht11_line<'d>(pin: impl Pin + 'd) -> Dht11Line<'d> {
    let mut flex = Flex::new(pin);

    flex.apply_input_config(&InputConfig::default().with_pull(Pull::Up));
    flex.apply_output_config(
        &OutputConfig::default()
            .with_drive_mode(DriveMode::OpenDrain)
            .with_pull(Pull::Up),
    );
    flex.set_high();
    flex.set_input_enable(true);
    flex.set_output_enable(true);

    OpenDrainLine::new(flex)
}
