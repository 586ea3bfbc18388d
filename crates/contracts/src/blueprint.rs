//! TriggerBlueprint - Config Loader output
//!
//! Declarative description of a trigger pattern plus decoder tuning, as read
//! from a TOML/JSON file. Turned into an `EventTimeline` by the waveform builder.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{CycleKind, DecoderConfig, EdgeKind, SecondaryRole, SyncEdge, Wheel};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Human-readable pattern name
    pub name: String,

    /// Wheel pattern
    pub pattern: PatternBlueprint,

    /// Decoder tuning
    #[serde(default)]
    pub decoder: DecoderConfig,
}

/// Wheel pattern description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternBlueprint {
    /// Engine cycle type
    pub cycle: CycleKind,

    /// Authoritative edge polarity
    #[serde(default)]
    pub sync_edge: SyncEdge,

    /// Generated tooth patterns, applied in order
    #[serde(default)]
    pub wheels: Vec<ToothPatternSpec>,

    /// Manually placed edges (reference pins, cam pulses)
    #[serde(default)]
    pub events: Vec<ManualEventSpec>,

    /// Primary gap ratio window
    #[serde(default)]
    pub sync_gap: Option<GapRangeSpec>,

    /// Secondary gap ratio window
    #[serde(default)]
    pub secondary_sync_gap: Option<GapRangeSpec>,

    /// Trigger angle of TDC #1 (degrees)
    #[serde(default)]
    pub tdc_position: f64,

    /// Secondary wheel role; inferred when omitted
    #[serde(default)]
    pub secondary_role: Option<SecondaryRole>,
}

/// Generated tooth pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ToothPatternSpec {
    /// `tooth_count` identical teeth
    EvenlySpaced {
        wheel: Wheel,
        tooth_count: u32,
        #[serde(default = "default_duty_cycle")]
        duty_cycle: f64,
        /// Angular span of one pattern repetition; defaults to the wheel revolution
        #[serde(default)]
        span: Option<f64>,
    },
    /// `tooth_count - skipped_count` teeth followed by one enlarged gap
    SkippedTooth {
        wheel: Wheel,
        tooth_count: u32,
        skipped_count: u32,
        #[serde(default = "default_duty_cycle")]
        duty_cycle: f64,
        #[serde(default)]
        start_offset: f64,
        #[serde(default)]
        span: Option<f64>,
    },
}

impl ToothPatternSpec {
    pub fn wheel(&self) -> Wheel {
        match self {
            Self::EvenlySpaced { wheel, .. } | Self::SkippedTooth { wheel, .. } => *wheel,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        match self {
            Self::EvenlySpaced { .. } => "evenly_spaced",
            Self::SkippedTooth { .. } => "skipped_tooth",
        }
    }
}

fn default_duty_cycle() -> f64 {
    0.5
}

/// Single manually placed edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct ManualEventSpec {
    #[validate(range(min = 0.0, max = 720.0))]
    pub angle: f64,
    pub kind: EdgeKind,
    pub wheel: Wheel,
}

/// Gap ratio window as written in config files
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct GapRangeSpec {
    #[validate(range(exclusive_min = 0.0))]
    pub low: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub high: f64,
}

impl TriggerBlueprint {
    /// Total number of edges the generated patterns will produce, per wheel
    pub fn expected_edge_counts(&self) -> [usize; 2] {
        let cycle = self.pattern.cycle.cycle_length();
        let revolution = self.pattern.cycle.primary_revolution();
        let mut counts = [0usize; 2];
        for spec in &self.pattern.wheels {
            let (teeth, span) = match spec {
                ToothPatternSpec::EvenlySpaced {
                    tooth_count, span, ..
                } => (*tooth_count as usize, span.unwrap_or(revolution)),
                ToothPatternSpec::SkippedTooth {
                    tooth_count,
                    skipped_count,
                    span,
                    ..
                } => (
                    tooth_count.saturating_sub(*skipped_count) as usize,
                    span.unwrap_or(revolution),
                ),
            };
            let repeats = if span > 0.0 {
                (cycle / span).round() as usize
            } else {
                0
            };
            counts[spec.wheel().index()] += 2 * teeth * repeats;
        }
        for event in &self.pattern.events {
            counts[event.wheel.index()] += 1;
        }
        counts
    }
}
