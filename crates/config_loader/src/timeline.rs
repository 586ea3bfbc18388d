//! Blueprint → EventTimeline.

use contracts::{ToothPatternSpec, TriggerBlueprint, TriggerError};
use tracing::instrument;
use waveform::{EventTimeline, WaveformBuilder};

/// Drive a [`WaveformBuilder`] through every step the blueprint describes.
///
/// Patterns without an explicit span cover one turn of the primary wheel and
/// are repeated by the builder to fill the cycle.
#[instrument(skip(blueprint), fields(name = %blueprint.name))]
pub fn build_timeline(blueprint: &TriggerBlueprint) -> Result<EventTimeline, TriggerError> {
    let pattern = &blueprint.pattern;
    let revolution = pattern.cycle.primary_revolution();

    let mut builder = WaveformBuilder::new();
    builder.initialize(pattern.cycle, pattern.sync_edge)?;

    for spec in &pattern.wheels {
        match *spec {
            ToothPatternSpec::EvenlySpaced {
                wheel,
                tooth_count,
                duty_cycle,
                span,
            } => builder.add_evenly_spaced_teeth(
                wheel,
                tooth_count,
                duty_cycle,
                span.unwrap_or(revolution),
            )?,
            ToothPatternSpec::SkippedTooth {
                wheel,
                tooth_count,
                skipped_count,
                duty_cycle,
                start_offset,
                span,
            } => builder.add_skipped_tooth_pattern(
                wheel,
                tooth_count,
                skipped_count,
                duty_cycle,
                start_offset,
                span.unwrap_or(revolution),
            )?,
        }
    }

    for event in &pattern.events {
        builder.add_event(event.angle, event.kind, event.wheel)?;
    }
    if let Some(gap) = pattern.sync_gap {
        builder.set_synchronization_gap_range(gap.low, gap.high)?;
    }
    if let Some(gap) = pattern.secondary_sync_gap {
        builder.set_secondary_synchronization_gap_range(gap.low, gap.high)?;
    }
    if let Some(role) = pattern.secondary_role {
        builder.set_secondary_role(role)?;
    }
    builder.set_tdc_position(pattern.tdc_position)?;

    builder.finalize()
}
