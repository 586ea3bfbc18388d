//! Instantaneous RPM with moving-average outlier rejection.

use std::fmt;

use contracts::{DecoderConfig, INTERVAL_HISTORY_LEN};
use ringbuf::{traits::*, StaticRb};

/// Result of offering one tooth interval to the estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RpmUpdate {
    /// Sample used; carries the new instantaneous RPM
    Accepted(f64),
    /// Sample too far from the moving average; RPM unchanged
    Rejected,
    /// Enough consecutive rejections that the average restarted from this sample
    Reseeded(f64),
}

/// Samples are stored as ticks per degree so teeth of different widths
/// (a missing-tooth gap, for instance) are directly comparable.
pub struct RpmEstimator {
    window: StaticRb<f64, INTERVAL_HISTORY_LEN>,
    config: DecoderConfig,
    consecutive_outliers: u32,
    rpm: f64,
}

impl fmt::Debug for RpmEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpmEstimator")
            .field("samples", &self.window.occupied_len())
            .field("rpm", &self.rpm)
            .field("consecutive_outliers", &self.consecutive_outliers)
            .finish()
    }
}

impl RpmEstimator {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            window: StaticRb::default(),
            config: config.clone(),
            consecutive_outliers: 0,
            rpm: 0.0,
        }
    }

    /// Offer `ticks` elapsed over `degrees` of rotation
    pub fn update(&mut self, degrees: f64, ticks: u64) -> RpmUpdate {
        if ticks == 0 || degrees <= 0.0 {
            return RpmUpdate::Rejected;
        }
        let sample = ticks as f64 / degrees;

        if let Some(avg) = self.average_ticks_per_degree() {
            let factor = self.config.rpm_outlier_factor;
            if sample < avg / factor || sample > avg * factor {
                self.consecutive_outliers += 1;
                if self.consecutive_outliers < self.config.max_consecutive_outliers {
                    return RpmUpdate::Rejected;
                }
                self.window = StaticRb::default();
                self.accept(sample, degrees, ticks);
                return RpmUpdate::Reseeded(self.rpm);
            }
        }

        self.accept(sample, degrees, ticks);
        RpmUpdate::Accepted(self.rpm)
    }

    fn accept(&mut self, sample: f64, degrees: f64, ticks: u64) {
        self.consecutive_outliers = 0;
        self.window.push_overwrite(sample);
        self.rpm = self.config.rpm_from(degrees, ticks);
    }

    /// Moving average of accepted samples
    pub fn average_ticks_per_degree(&self) -> Option<f64> {
        let len = self.window.occupied_len();
        if len == 0 {
            return None;
        }
        Some(self.window.iter().sum::<f64>() / len as f64)
    }

    /// Last accepted instantaneous RPM, 0.0 before any sample
    #[inline]
    pub fn rpm(&self) -> f64 {
        self.rpm
    }

    pub fn reset(&mut self) {
        self.window = StaticRb::default();
        self.consecutive_outliers = 0;
        self.rpm = 0.0;
    }
}
