//! Declarative construction of an [`EventTimeline`].

use contracts::{
    CycleKind, EdgeKind, RatioRange, SecondaryRole, SyncEdge, TriggerError, TriggerEvent, Wheel,
};
use tracing::instrument;

use crate::pattern::{EvenlySpacedTeeth, SkippedToothPattern, ToothPattern};
use crate::shape::{self, RawShape, ANGLE_EPSILON};
use crate::timeline::EventTimeline;

/// Collects trigger edges and sync parameters, then validates them once in
/// [`finalize`](Self::finalize).
///
/// ```
/// use contracts::{CycleKind, SyncEdge, Wheel};
/// use waveform::WaveformBuilder;
///
/// let mut builder = WaveformBuilder::new();
/// builder.initialize(CycleKind::FourStrokeCam, SyncEdge::Rise).unwrap();
/// builder
///     .add_skipped_tooth_pattern(Wheel::Primary, 36, 1, 0.5, 0.0, 720.0)
///     .unwrap();
/// builder.set_synchronization_gap_range(1.5, 3.0).unwrap();
/// let timeline = builder.finalize().unwrap();
/// assert_eq!(timeline.events(Wheel::Primary).len(), 70);
/// ```
#[derive(Debug, Default)]
pub struct WaveformBuilder {
    cycle: Option<(CycleKind, SyncEdge)>,
    primary: Vec<TriggerEvent>,
    secondary: Vec<TriggerEvent>,
    sync_gap: Option<RatioRange>,
    secondary_sync_gap: Option<RatioRange>,
    tdc_position: f64,
    secondary_role: Option<SecondaryRole>,
}

impl WaveformBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cycle length and authoritative edge polarity. Only once.
    pub fn initialize(&mut self, cycle: CycleKind, sync_edge: SyncEdge) -> Result<(), TriggerError> {
        if let Some((existing, _)) = self.cycle {
            return Err(TriggerError::configuration(format!(
                "builder already initialized as {existing:?}"
            )));
        }
        self.cycle = Some((cycle, sync_edge));
        Ok(())
    }

    /// Cycle length in degrees, once initialized
    pub fn cycle_length(&self) -> Option<f64> {
        self.cycle.map(|(kind, _)| kind.cycle_length())
    }

    /// `2 * tooth_count` edges spaced `span / tooth_count` apart
    pub fn add_evenly_spaced_teeth(
        &mut self,
        wheel: Wheel,
        tooth_count: u32,
        duty_cycle: f64,
        span: f64,
    ) -> Result<(), TriggerError> {
        self.add_pattern(&EvenlySpacedTeeth {
            wheel,
            tooth_count,
            duty_cycle,
            span,
        })
    }

    /// `tooth_count - skipped_count` teeth and one enlarged gap per `span`
    pub fn add_skipped_tooth_pattern(
        &mut self,
        wheel: Wheel,
        tooth_count: u32,
        skipped_count: u32,
        duty_cycle: f64,
        start_offset: f64,
        span: f64,
    ) -> Result<(), TriggerError> {
        self.add_pattern(&SkippedToothPattern {
            wheel,
            tooth_count,
            skipped_count,
            duty_cycle,
            start_offset,
            span,
        })
    }

    /// Lay a pattern out end to end until it fills the cycle.
    #[instrument(skip(self, pattern), fields(wheel = %pattern.wheel(), span = pattern.span()))]
    pub fn add_pattern(&mut self, pattern: &impl ToothPattern) -> Result<(), TriggerError> {
        let cycle = self.require_cycle()?;
        pattern.validate()?;

        let span = pattern.span();
        let repeats = cycle / span;
        if repeats < 1.0 - ANGLE_EPSILON || (repeats - repeats.round()).abs() > ANGLE_EPSILON {
            return Err(TriggerError::configuration(format!(
                "pattern span {span} does not divide the {cycle} degree cycle"
            )));
        }

        let one = pattern.events();
        let events = match pattern.wheel() {
            Wheel::Primary => &mut self.primary,
            Wheel::Secondary => &mut self.secondary,
        };
        // collisions between patterns surface as DuplicateAngle at finalize
        for r in 0..repeats.round() as usize {
            let shift = r as f64 * span;
            events.extend(
                one.iter()
                    .map(|e| TriggerEvent::new(e.angle + shift, e.kind, e.wheel)),
            );
        }
        tracing::debug!(repeats = repeats.round(), edges = one.len(), "Pattern added");
        Ok(())
    }

    /// Place a single edge
    pub fn add_event(&mut self, angle: f64, kind: EdgeKind, wheel: Wheel) -> Result<(), TriggerError> {
        let cycle = self.require_cycle()?;
        if !angle.is_finite() || angle < 0.0 || angle >= cycle {
            return Err(TriggerError::configuration(format!(
                "{wheel} {kind} at {angle} outside [0, {cycle})"
            )));
        }
        let events = match wheel {
            Wheel::Primary => &mut self.primary,
            Wheel::Secondary => &mut self.secondary,
        };
        if events.iter().any(|e| (e.angle - angle).abs() < ANGLE_EPSILON) {
            return Err(TriggerError::configuration(format!(
                "{wheel} already has an event at {angle}"
            )));
        }
        events.push(TriggerEvent::new(angle, kind, wheel));
        Ok(())
    }

    pub fn set_synchronization_gap_range(&mut self, low: f64, high: f64) -> Result<(), TriggerError> {
        self.require_cycle()?;
        self.sync_gap = Some(RatioRange::new(low, high)?);
        Ok(())
    }

    pub fn set_secondary_synchronization_gap_range(
        &mut self,
        low: f64,
        high: f64,
    ) -> Result<(), TriggerError> {
        self.require_cycle()?;
        self.secondary_sync_gap = Some(RatioRange::new(low, high)?);
        Ok(())
    }

    pub fn set_secondary_role(&mut self, role: SecondaryRole) -> Result<(), TriggerError> {
        self.require_cycle()?;
        self.secondary_role = Some(role);
        Ok(())
    }

    /// Trigger angle of TDC #1
    pub fn set_tdc_position(&mut self, angle: f64) -> Result<(), TriggerError> {
        let cycle = self.require_cycle()?;
        if !angle.is_finite() || angle < 0.0 || angle >= cycle {
            return Err(TriggerError::configuration(format!(
                "tdc position {angle} outside [0, {cycle})"
            )));
        }
        self.tdc_position = angle;
        Ok(())
    }

    /// Validate the collected shape and freeze it.
    #[instrument(skip(self), fields(primary = self.primary.len(), secondary = self.secondary.len()))]
    pub fn finalize(self) -> Result<EventTimeline, TriggerError> {
        let Some((cycle_kind, sync_edge)) = self.cycle else {
            return Err(TriggerError::configuration(
                "finalize called before initialize",
            ));
        };
        shape::finalize(RawShape {
            cycle_kind,
            sync_edge,
            primary: self.primary,
            secondary: self.secondary,
            sync_gap: self.sync_gap,
            secondary_sync_gap: self.secondary_sync_gap,
            tdc_position: self.tdc_position,
            secondary_role: self.secondary_role,
        })
    }

    fn require_cycle(&self) -> Result<f64, TriggerError> {
        self.cycle_length()
            .ok_or_else(|| TriggerError::configuration("builder not initialized"))
    }
}
