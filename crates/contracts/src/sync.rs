//! Synchronization vocabulary shared by the builder and the decoder.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Timestamp, TriggerError};

/// Acceptance window for the ratio `current_interval / previous_interval`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioRange {
    pub low: f64,
    pub high: f64,
}

impl RatioRange {
    /// Create a validated range (`0 < low <= high`, both finite)
    pub fn new(low: f64, high: f64) -> Result<Self, TriggerError> {
        if !low.is_finite() || !high.is_finite() {
            return Err(TriggerError::configuration(format!(
                "gap ratio bounds must be finite, got ({low}, {high})"
            )));
        }
        if low <= 0.0 || high <= 0.0 {
            return Err(TriggerError::configuration(format!(
                "gap ratio bounds must be > 0, got ({low}, {high})"
            )));
        }
        if low > high {
            return Err(TriggerError::configuration(format!(
                "gap ratio low ({low}) must be <= high ({high})"
            )));
        }
        Ok(Self { low, high })
    }

    #[inline]
    pub fn contains(&self, ratio: f64) -> bool {
        ratio >= self.low && ratio <= self.high
    }
}

impl fmt::Display for RatioRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3}, {:.3}]", self.low, self.high)
    }
}

/// What the secondary wheel contributes to decoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryRole {
    /// No secondary wheel
    #[default]
    None,
    /// Secondary edges are present but not needed for sync
    Auxiliary,
    /// Cam-speed phase pulse that resolves which crank revolution we are in
    CamPhase,
    /// Crank-speed reference pin; one of its pulses per cycle is masked upstream
    /// and the timeline only carries the surviving one
    MaskedCrankReference,
}

impl SecondaryRole {
    /// Sync requires a confirming secondary edge
    #[inline]
    pub fn needs_secondary_input(self) -> bool {
        matches!(
            self,
            SecondaryRole::CamPhase | SecondaryRole::MaskedCrankReference
        )
    }

    #[inline]
    pub fn is_cam_phase(self) -> bool {
        self == SecondaryRole::CamPhase
    }

    /// Secondary wheel is exempt from rise/fall alternation
    #[inline]
    pub fn is_masked(self) -> bool {
        self == SecondaryRole::MaskedCrankReference
    }
}

/// How the decoder finds its angular landmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acquisition {
    /// Enlarged gap on the primary wheel
    PrimaryGap,
    /// Evenly spaced primary teeth plus a secondary reference pin
    SecondaryPin,
}

/// Decoder synchronization status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    NotSynchronized,
    Tentative,
    Synchronized,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::NotSynchronized => "not_synchronized",
            SyncStatus::Tentative => "tentative",
            SyncStatus::Synchronized => "synchronized",
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            SyncStatus::NotSynchronized => 0,
            SyncStatus::Tentative => 1,
            SyncStatus::Synchronized => 2,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of decoder state (for diagnostics and consumers)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DecoderSnapshot {
    pub status: SyncStatus,

    /// Index into the timeline's tooth table (valid when synchronized)
    pub tooth_index: u32,

    /// Template angle of the last decoded tooth (degrees)
    pub tooth_angle: f64,

    /// Engine angle relative to TDC #1 (degrees)
    pub engine_angle: f64,

    /// Last accepted instantaneous RPM (0.0 when unknown)
    pub rpm: f64,

    /// Timestamp of the last accepted edge
    pub last_edge_timestamp: Option<Timestamp>,

    /// Total edges accepted by the decoder
    pub edges_seen: u64,

    /// Times SYNCHRONIZED was reached
    pub sync_count: u64,

    /// Desync faults raised
    pub desync_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_range_validation() {
        assert!(RatioRange::new(1.5, 3.0).is_ok());
        assert!(RatioRange::new(2.0, 2.0).is_ok());
        assert!(RatioRange::new(0.0, 1.0).is_err());
        assert!(RatioRange::new(3.0, 1.5).is_err());
        assert!(RatioRange::new(f64::NAN, 1.5).is_err());
    }

    #[test]
    fn test_ratio_range_contains_is_inclusive() {
        let range = RatioRange::new(1.5, 3.0).unwrap();
        assert!(range.contains(1.5));
        assert!(range.contains(3.0));
        assert!(!range.contains(1.0));
        assert!(!range.contains(3.01));
    }

    #[test]
    fn test_secondary_role_flags() {
        assert!(!SecondaryRole::None.needs_secondary_input());
        assert!(!SecondaryRole::Auxiliary.needs_secondary_input());
        assert!(SecondaryRole::CamPhase.needs_secondary_input());
        assert!(SecondaryRole::CamPhase.is_cam_phase());
        assert!(SecondaryRole::MaskedCrankReference.needs_secondary_input());
        assert!(!SecondaryRole::MaskedCrankReference.is_cam_phase());
        assert!(SecondaryRole::MaskedCrankReference.is_masked());
    }

    #[test]
    fn test_status_gauge_values_are_ordered() {
        assert_eq!(SyncStatus::NotSynchronized.as_u8(), 0);
        assert!(SyncStatus::Tentative.as_u8() < SyncStatus::Synchronized.as_u8());
    }
}
