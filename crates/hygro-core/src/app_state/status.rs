use core::fmt::Display;

use crate::sensors::SensorError;
use crate::storage::PersistMode;

/// Health of the acquisition pipeline, published with every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStatus {
    /// Whether the last cycle saw a plausible wall-clock time
    pub clock_valid: bool,
    pub persistence: PersistMode,
    /// Cycles since the last accepted reading that produced none
    pub consecutive_failures: u32,
    pub last_error: Option<SensorError>,
    pub cycles: u32,
}

impl RunStatus {
    pub const fn new() -> Self {
        Self {
            clock_valid: false,
            persistence: PersistMode::Backed,
            consecutive_failures: 0,
            last_error: None,
            cycles: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self, error: SensorError) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error);
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "[RunStatus] cycles: {}, clock: {}, persistence: {:?}, failures: {}",
            self.cycles,
            if self.clock_valid { "set" } else { "unset" },
            self.persistence,
            self.consecutive_failures
        )?;
        if let Some(error) = self.last_error {
            write!(f, ", last error: {}", error)?;
        }
        Ok(())
    }
}
