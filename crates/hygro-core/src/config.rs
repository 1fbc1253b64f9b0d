use serde::{Deserialize, Serialize};

use crate::sensors::ChecksumPolicy;

/// Default cadence of the sensor task. The DHT11 needs at least one second
/// between requests; two leaves headroom for a slow peer.
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 2000;

/// China Standard Time (UTC+8).
pub const DEFAULT_UTC_OFFSET_SECS: i32 = 8 * 3600;

pub const DEFAULT_NAMESPACE: &str = "dht_hist";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct MonitorConfig<'a> {
    /// Delay between two acquisition cycles, in milliseconds.
    pub poll_interval_ms: u32,
    /// Offset applied to wall-clock time before computing calendar days.
    pub utc_offset_secs: i32,
    /// Blob store namespace holding the history ring and rollover cursor.
    pub namespace: &'a str,
    pub checksum: ChecksumPolicy,
}

impl Default for MonitorConfig<'_> {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            utc_offset_secs: DEFAULT_UTC_OFFSET_SECS,
            namespace: DEFAULT_NAMESPACE,
            checksum: ChecksumPolicy::Ignore,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_survives_postcard() {
        let config = MonitorConfig {
            poll_interval_ms: 5000,
            utc_offset_secs: -5 * 3600,
            namespace: "attic",
            checksum: ChecksumPolicy::Enforce,
        };

        let bytes = postcard::to_allocvec(&config).unwrap();
        let decoded: MonitorConfig<'_> = postcard::from_bytes(&bytes).unwrap();

        assert_eq!(config, decoded);
    }

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.utc_offset_secs, 28800);
        assert_eq!(config.checksum, ChecksumPolicy::Ignore);
    }
}
