use core::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::sensors::Reading;

/// Running extremes of the day in progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyExtremes {
    pub max_temp: f32,
    pub min_temp: f32,
    pub max_hum: f32,
    pub min_hum: f32,
}

impl DailyExtremes {
    /// All four extremes set to the reading's values
    pub fn seeded(reading: &Reading) -> Self {
        let temperature = reading.temperature();
        let humidity = reading.humidity();
        Self {
            max_temp: temperature,
            min_temp: temperature,
            max_hum: humidity,
            min_hum: humidity,
        }
    }

    fn widen(&mut self, reading: &Reading) {
        let temperature = reading.temperature();
        let humidity = reading.humidity();
        self.max_temp = self.max_temp.max(temperature);
        self.min_temp = self.min_temp.min(temperature);
        self.max_hum = self.max_hum.max(humidity);
        self.min_hum = self.min_hum.min(humidity);
    }
}

impl Display for DailyExtremes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "[DailyExtremes] temp: {:.1}..{:.1}°C, humidity: {:.1}..{:.1}%",
            self.min_temp, self.max_temp, self.min_hum, self.max_hum
        )
    }
}

/// Min/max tracker for the current day.
///
/// Starts empty and is seeded by the first reading after a reset rather
/// than by ±infinity sentinels, so the first day never reports a bogus
/// extreme.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtremesTracker {
    extremes: Option<DailyExtremes>,
    samples: u32,
}

impl ExtremesTracker {
    pub const fn new() -> Self {
        Self {
            extremes: None,
            samples: 0,
        }
    }

    /// Fold an accepted reading into today's extremes.
    pub fn observe(&mut self, reading: &Reading) {
        match self.extremes.as_mut() {
            Some(extremes) => extremes.widen(reading),
            None => self.extremes = Some(DailyExtremes::seeded(reading)),
        }
        self.samples = self.samples.saturating_add(1);
    }

    /// Today's extremes, `None` until the first reading after a reset.
    pub fn snapshot(&self) -> Option<DailyExtremes> {
        self.extremes
    }

    /// Readings folded in since the last reset
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Forget today's extremes; the next reading seeds them again.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reading(temperature: (u8, u8), humidity: (u8, u8)) -> Reading {
        Reading {
            humidity_int: humidity.0,
            humidity_frac: humidity.1,
            temperature_int: temperature.0,
            temperature_frac: temperature.1,
        }
    }

    #[test]
    fn test_first_observation_seeds_all_extremes() {
        let mut tracker = ExtremesTracker::new();
        assert_eq!(tracker.snapshot(), None);

        tracker.observe(&reading((12, 5), (40, 0)));

        let extremes = tracker.snapshot().unwrap();
        assert_eq!(extremes.max_temp, extremes.min_temp);
        assert_eq!(extremes.max_hum, extremes.min_hum);
        assert!((extremes.max_temp - 12.5).abs() < 1e-4);
        assert!((extremes.min_hum - 40.0).abs() < 1e-4);
    }

    #[test]
    fn test_widens_independently() {
        let mut tracker = ExtremesTracker::new();
        tracker.observe(&reading((20, 0), (50, 0)));
        tracker.observe(&reading((25, 0), (45, 0)));
        tracker.observe(&reading((18, 0), (55, 0)));

        let extremes = tracker.snapshot().unwrap();
        assert_eq!(extremes.max_temp, 25.0);
        assert_eq!(extremes.min_temp, 18.0);
        assert_eq!(extremes.max_hum, 55.0);
        assert_eq!(extremes.min_hum, 45.0);
        assert_eq!(tracker.samples(), 3);
    }

    #[test]
    fn test_reset_reseeds() {
        let mut tracker = ExtremesTracker::new();
        tracker.observe(&reading((30, 0), (80, 0)));
        tracker.reset();
        assert_eq!(tracker.snapshot(), None);
        assert_eq!(tracker.samples(), 0);

        tracker.observe(&reading((10, 0), (20, 0)));
        let extremes = tracker.snapshot().unwrap();
        assert_eq!(extremes.max_temp, 10.0);
        assert_eq!(extremes.max_hum, 20.0);
    }

    proptest! {
        #[test]
        fn prop_extremes_never_narrow(
            readings in prop::collection::vec(any::<(u8, u8, u8, u8)>(), 1..40),
            replay in any::<prop::sample::Index>(),
        ) {
            let readings: alloc::vec::Vec<Reading> = readings
                .into_iter()
                .map(|(hi, hf, ti, tf)| reading((ti, tf), (hi, hf)))
                .collect();

            let mut tracker = ExtremesTracker::new();
            let mut previous: Option<DailyExtremes> = None;
            for r in readings.iter().chain(core::iter::once(&readings[replay.index(readings.len())])) {
                tracker.observe(r);
                let current = tracker.snapshot().unwrap();
                if let Some(previous) = previous {
                    prop_assert!(current.max_temp >= previous.max_temp);
                    prop_assert!(current.min_temp <= previous.min_temp);
                    prop_assert!(current.max_hum >= previous.max_hum);
                    prop_assert!(current.min_hum <= previous.min_hum);
                }
                prop_assert!(current.min_temp <= r.temperature() && r.temperature() <= current.max_temp);
                previous = Some(current);
            }
        }
    }
}
