//! Tooth-pattern strategies.
//!
//! Each strategy generates the edges of one pattern repetition over its own
//! angular span. The builder lays repetitions end to end to fill the cycle.

use contracts::{EdgeKind, TriggerError, TriggerEvent, Wheel};

/// A generator of evenly spaced tooth edges
pub trait ToothPattern {
    /// Wheel the edges belong to
    fn wheel(&self) -> Wheel;

    /// Angular span of one repetition (degrees)
    fn span(&self) -> f64;

    /// Check parameters
    fn validate(&self) -> Result<(), TriggerError>;

    /// Edges of one repetition, angle-sorted, angles in `[0, span)`
    fn events(&self) -> Vec<TriggerEvent>;
}

/// `tooth_count` identical teeth spread over the span
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvenlySpacedTeeth {
    pub wheel: Wheel,
    pub tooth_count: u32,
    pub duty_cycle: f64,
    pub span: f64,
}

impl ToothPattern for EvenlySpacedTeeth {
    fn wheel(&self) -> Wheel {
        self.wheel
    }

    fn span(&self) -> f64 {
        self.span
    }

    fn validate(&self) -> Result<(), TriggerError> {
        if self.tooth_count == 0 {
            return Err(TriggerError::configuration(
                "evenly spaced pattern needs at least one tooth",
            ));
        }
        validate_duty_cycle(self.duty_cycle)?;
        validate_span(self.span)
    }

    fn events(&self) -> Vec<TriggerEvent> {
        tooth_edges(
            self.wheel,
            self.tooth_count,
            self.tooth_count,
            self.duty_cycle,
            0.0,
            self.span,
        )
    }
}

/// `tooth_count - skipped_count` teeth followed by one gap of
/// `skipped_count + 1` tooth widths
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkippedToothPattern {
    pub wheel: Wheel,
    pub tooth_count: u32,
    pub skipped_count: u32,
    pub duty_cycle: f64,
    pub start_offset: f64,
    pub span: f64,
}

impl SkippedToothPattern {
    /// Teeth actually present on the wheel
    pub fn present_teeth(&self) -> u32 {
        self.tooth_count.saturating_sub(self.skipped_count)
    }
}

impl ToothPattern for SkippedToothPattern {
    fn wheel(&self) -> Wheel {
        self.wheel
    }

    fn span(&self) -> f64 {
        self.span
    }

    fn validate(&self) -> Result<(), TriggerError> {
        if self.tooth_count == 0 {
            return Err(TriggerError::configuration(
                "skipped tooth pattern needs at least one tooth",
            ));
        }
        if self.skipped_count >= self.tooth_count {
            return Err(TriggerError::configuration(format!(
                "skipped_count ({}) must be < tooth_count ({})",
                self.skipped_count, self.tooth_count
            )));
        }
        if !self.start_offset.is_finite() {
            return Err(TriggerError::configuration(format!(
                "start_offset must be finite, got {}",
                self.start_offset
            )));
        }
        validate_duty_cycle(self.duty_cycle)?;
        validate_span(self.span)
    }

    fn events(&self) -> Vec<TriggerEvent> {
        tooth_edges(
            self.wheel,
            self.tooth_count,
            self.present_teeth(),
            self.duty_cycle,
            self.start_offset,
            self.span,
        )
    }
}

fn validate_duty_cycle(duty_cycle: f64) -> Result<(), TriggerError> {
    if !(duty_cycle > 0.0 && duty_cycle < 1.0) {
        return Err(TriggerError::configuration(format!(
            "duty_cycle must be in (0, 1), got {duty_cycle}"
        )));
    }
    Ok(())
}

fn validate_span(span: f64) -> Result<(), TriggerError> {
    if !span.is_finite() || span <= 0.0 {
        return Err(TriggerError::configuration(format!(
            "pattern span must be a positive angle, got {span}"
        )));
    }
    Ok(())
}

/// Teeth `0..present` of a wheel divided into `slots` equal tooth widths
fn tooth_edges(
    wheel: Wheel,
    slots: u32,
    present: u32,
    duty_cycle: f64,
    start_offset: f64,
    span: f64,
) -> Vec<TriggerEvent> {
    let width = span / slots as f64;
    let mut events = Vec::with_capacity(2 * present as usize);
    for i in 0..present {
        let rise = start_offset + i as f64 * width;
        let fall = rise + duty_cycle * width;
        events.push(TriggerEvent::new(wrap(rise, span), EdgeKind::Rise, wheel));
        events.push(TriggerEvent::new(wrap(fall, span), EdgeKind::Fall, wheel));
    }
    events.sort_by(|a, b| a.angle.total_cmp(&b.angle));
    events
}

/// Wrap into `[0, span)`
pub(crate) fn wrap(angle: f64, span: f64) -> f64 {
    let wrapped = angle.rem_euclid(span);
    // rem_euclid may round up to `span` for tiny negative inputs
    if wrapped >= span {
        0.0
    } else {
        wrapped
    }
}
