//! Decoder tuning that can be shared across crates.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Intervals kept for gap classification and the RPM moving average
pub const INTERVAL_HISTORY_LEN: usize = 8;

/// Phase tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DecoderConfig {
    /// Capture timer frequency (ticks per second)
    #[validate(range(min = 1))]
    pub tick_rate_hz: u64,

    /// Longest tolerated gap between two primary edges before a desync fault
    #[validate(range(min = 1))]
    pub max_tooth_interval_ticks: u64,

    /// Intervals below this are treated as noise by the gap detector
    pub noise_floor_ticks: u64,

    /// RPM samples further than this factor from the moving average are rejected
    #[validate(range(min = 1.0))]
    pub rpm_outlier_factor: f64,

    /// Consecutive rejected samples after which the average is re-seeded
    #[validate(range(min = 1))]
    pub max_consecutive_outliers: u32,

    /// Tolerance (degrees) for a secondary edge around its expected angle
    #[validate(range(min = 0.0, max = 360.0))]
    pub secondary_window_deg: f64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 1_000_000,
            max_tooth_interval_ticks: 500_000,
            noise_floor_ticks: 1,
            rpm_outlier_factor: 2.0,
            max_consecutive_outliers: 4,
            secondary_window_deg: 15.0,
        }
    }
}

impl DecoderConfig {
    /// Convert a rotational speed to ticks per degree
    pub fn ticks_per_degree(&self, rpm: f64) -> f64 {
        // 1 rpm = 6 deg/s
        self.tick_rate_hz as f64 / (rpm * 6.0)
    }

    /// RPM implied by `degrees` travelled in `ticks`
    #[inline]
    pub fn rpm_from(&self, degrees: f64, ticks: u64) -> f64 {
        if ticks == 0 {
            return 0.0;
        }
        degrees * self.tick_rate_hz as f64 / (6.0 * ticks as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(DecoderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_outlier_factor() {
        let config = DecoderConfig {
            rpm_outlier_factor: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rpm_conversions_agree() {
        let config = DecoderConfig::default();
        let ticks_per_deg = config.ticks_per_degree(3000.0);
        // 3000 rpm = 18000 deg/s -> 55.55 us/deg
        assert!((ticks_per_deg - 55.5555).abs() < 1e-3);
        let rpm = config.rpm_from(360.0, (360.0 * ticks_per_deg) as u64);
        assert!((rpm - 3000.0).abs() / 3000.0 < 1e-3);
    }

    #[test]
    fn test_partial_toml_like_json_uses_defaults() {
        let config: DecoderConfig = serde_json::from_str(r#"{"tick_rate_hz": 10000}"#).unwrap();
        assert_eq!(config.tick_rate_hz, 10_000);
        assert_eq!(config.max_consecutive_outliers, 4);
    }
}
