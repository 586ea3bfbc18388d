//! Edges - the unit of information flowing from a trigger sensor.
//!
//! `TriggerEvent` is the template edge (angle-domain, built once),
//! `LiveEdge` is the runtime edge (time-domain, produced by the capture driver).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Capture timestamp in driver ticks (monotonic).
pub type Timestamp = u64;

/// Edge polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Rise,
    Fall,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Rise => "rise",
            EdgeKind::Fall => "fall",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trigger wheel an edge belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wheel {
    /// Main high-resolution wheel (usually crank)
    Primary,
    /// Low-resolution phase / reference wheel
    Secondary,
}

impl Wheel {
    /// Both wheels in declaration order
    pub const ALL: [Wheel; 2] = [Wheel::Primary, Wheel::Secondary];

    /// Dense index usable for per-wheel arrays
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Wheel::Primary => 0,
            Wheel::Secondary => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Wheel::Primary => "primary",
            Wheel::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Wheel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which edge polarity is authoritative for synchronization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEdge {
    /// Only rising edges are decoded
    #[default]
    Rise,
    /// Only falling edges are decoded
    Fall,
    /// Every edge is decoded
    Both,
}

impl SyncEdge {
    /// Whether an edge of `kind` takes part in decoding
    #[inline]
    pub fn accepts(self, kind: EdgeKind) -> bool {
        match self {
            SyncEdge::Rise => kind == EdgeKind::Rise,
            SyncEdge::Fall => kind == EdgeKind::Fall,
            SyncEdge::Both => true,
        }
    }
}

/// Engine cycle type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    /// 360° cycle
    TwoStroke,
    /// 720° cycle, primary wheel turns once per cycle (cam speed)
    FourStrokeCam,
    /// 720° cycle, primary wheel turns twice per cycle (crank speed)
    FourStrokeCrank,
}

impl CycleKind {
    /// Engine cycle length in degrees
    #[inline]
    pub fn cycle_length(self) -> f64 {
        match self {
            CycleKind::TwoStroke => 360.0,
            CycleKind::FourStrokeCam | CycleKind::FourStrokeCrank => 720.0,
        }
    }

    /// Angular span covered by one turn of the primary wheel
    #[inline]
    pub fn primary_revolution(self) -> f64 {
        match self {
            CycleKind::TwoStroke | CycleKind::FourStrokeCrank => 360.0,
            CycleKind::FourStrokeCam => 720.0,
        }
    }
}

/// Template edge: one expected edge within an engine cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TriggerEvent {
    /// Angle in `[0, cycle_length)` degrees
    pub angle: f64,
    pub kind: EdgeKind,
    pub wheel: Wheel,
}

impl TriggerEvent {
    #[inline]
    pub fn new(angle: f64, kind: EdgeKind, wheel: Wheel) -> Self {
        Self { angle, kind, wheel }
    }
}

/// Runtime edge as delivered by the capture driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveEdge {
    pub timestamp: Timestamp,
    pub wheel: Wheel,
    pub kind: EdgeKind,
}

impl LiveEdge {
    #[inline]
    pub fn new(timestamp: Timestamp, wheel: Wheel, kind: EdgeKind) -> Self {
        Self {
            timestamp,
            wheel,
            kind,
        }
    }

    #[inline]
    pub fn primary(timestamp: Timestamp, kind: EdgeKind) -> Self {
        Self::new(timestamp, Wheel::Primary, kind)
    }

    #[inline]
    pub fn secondary(timestamp: Timestamp, kind: EdgeKind) -> Self {
        Self::new(timestamp, Wheel::Secondary, kind)
    }
}
