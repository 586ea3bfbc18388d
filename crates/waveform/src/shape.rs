//! Shape validation and derivation of the tracker tables.

use contracts::{
    Acquisition, CycleKind, RatioRange, SecondaryRole, ShapeErrorCode, SyncEdge, TriggerError,
    TriggerEvent, Wheel,
};

use crate::timeline::{spacing, EventTimeline};

/// Two angles closer than this are the same angle
pub(crate) const ANGLE_EPSILON: f64 = 1e-6;

/// Everything the builder collected, before validation
pub(crate) struct RawShape {
    pub cycle_kind: CycleKind,
    pub sync_edge: SyncEdge,
    pub primary: Vec<TriggerEvent>,
    pub secondary: Vec<TriggerEvent>,
    pub sync_gap: Option<RatioRange>,
    pub secondary_sync_gap: Option<RatioRange>,
    pub tdc_position: f64,
    pub secondary_role: Option<SecondaryRole>,
}

pub(crate) fn finalize(raw: RawShape) -> Result<EventTimeline, TriggerError> {
    let RawShape {
        cycle_kind,
        sync_edge,
        mut primary,
        mut secondary,
        sync_gap,
        secondary_sync_gap,
        tdc_position,
        secondary_role,
    } = raw;
    let cycle = cycle_kind.cycle_length();

    let secondary_role = match secondary_role {
        Some(role) => role,
        None if secondary.is_empty() => SecondaryRole::None,
        None => SecondaryRole::Auxiliary,
    };

    for events in [&mut primary, &mut secondary] {
        events.sort_by(|a, b| a.angle.total_cmp(&b.angle));
    }
    check_wheel(&primary, Wheel::Primary, cycle, true)?;
    check_wheel(&secondary, Wheel::Secondary, cycle, !secondary_role.is_masked())?;

    if primary.is_empty() {
        return Err(TriggerError::shape(
            ShapeErrorCode::EmptyRequiredWheel,
            "primary wheel has no events",
        ));
    }
    if secondary_role != SecondaryRole::None && secondary.is_empty() {
        return Err(TriggerError::shape(
            ShapeErrorCode::EmptyRequiredWheel,
            format!("secondary role {secondary_role:?} declared but the secondary wheel has no events"),
        ));
    }

    let teeth: Vec<f64> = primary
        .iter()
        .filter(|e| sync_edge.accepts(e.kind))
        .map(|e| e.angle)
        .collect();
    if teeth.is_empty() {
        return Err(TriggerError::shape(
            ShapeErrorCode::EmptyRequiredWheel,
            format!("primary wheel has no {sync_edge:?} edges"),
        ));
    }

    let gap_teeth = match sync_gap {
        Some(range) => {
            let gaps = matching_gaps(&teeth, cycle, range);
            check_gaps(&gaps, teeth.len(), range, secondary_role)?;
            gaps
        }
        None => Vec::new(),
    };
    let acquisition = if sync_gap.is_some() {
        Acquisition::PrimaryGap
    } else {
        Acquisition::SecondaryPin
    };

    if secondary_sync_gap.is_some() && secondary.is_empty() {
        return Err(TriggerError::shape(
            ShapeErrorCode::ConflictingGapConfiguration,
            "secondary gap range set without a secondary wheel",
        ));
    }

    let uses_refs =
        secondary_role.needs_secondary_input() || acquisition == Acquisition::SecondaryPin;
    if acquisition == Acquisition::SecondaryPin && secondary.is_empty() {
        return Err(TriggerError::shape(
            ShapeErrorCode::ConflictingGapConfiguration,
            "no synchronization source: neither a primary gap range nor a secondary wheel",
        ));
    }

    let secondary_refs = if uses_refs {
        let refs = reference_edges(&secondary, sync_edge, secondary_sync_gap, cycle)?;
        check_refs(&refs, &teeth, acquisition)?;
        refs
    } else {
        Vec::new()
    };

    tracing::debug!(
        cycle = cycle,
        teeth = teeth.len(),
        gaps = gap_teeth.len(),
        refs = secondary_refs.len(),
        ?acquisition,
        ?secondary_role,
        "Trigger shape finalized"
    );

    Ok(EventTimeline {
        cycle_kind,
        sync_edge,
        primary,
        secondary,
        sync_gap,
        secondary_sync_gap,
        tdc_position,
        secondary_role,
        acquisition,
        teeth,
        gap_teeth,
        secondary_refs,
    })
}

/// Range, uniqueness and (optionally) alternation of one angle-sorted wheel
fn check_wheel(
    events: &[TriggerEvent],
    wheel: Wheel,
    cycle: f64,
    alternation: bool,
) -> Result<(), TriggerError> {
    for event in events {
        if !event.angle.is_finite() || event.angle < 0.0 || event.angle >= cycle {
            return Err(TriggerError::shape(
                ShapeErrorCode::AngleOutOfRange,
                format!("{wheel} {} at {} outside [0, {cycle})", event.kind, event.angle),
            ));
        }
    }
    for pair in events.windows(2) {
        if (pair[1].angle - pair[0].angle).abs() < ANGLE_EPSILON {
            return Err(TriggerError::shape(
                ShapeErrorCode::DuplicateAngle,
                format!("two {wheel} events at {}", pair[0].angle),
            ));
        }
    }
    if alternation && events.len() >= 2 {
        let n = events.len();
        for i in 0..n {
            let (a, b) = (&events[i], &events[(i + 1) % n]);
            if a.kind == b.kind {
                return Err(TriggerError::shape(
                    ShapeErrorCode::EdgeAlternation,
                    format!(
                        "{wheel} has consecutive {} edges at {} and {}",
                        a.kind, a.angle, b.angle
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Indices whose spacing ratio to the previous tooth falls inside `range`
fn matching_gaps(angles: &[f64], cycle: f64, range: RatioRange) -> Vec<usize> {
    let n = angles.len();
    (0..n)
        .filter(|&i| {
            let ratio = spacing(angles, i, cycle) / spacing(angles, (i + n - 1) % n, cycle);
            range.contains(ratio)
        })
        .collect()
}

fn check_gaps(
    gaps: &[usize],
    teeth: usize,
    range: RatioRange,
    role: SecondaryRole,
) -> Result<(), TriggerError> {
    let conflict = |message: String| {
        Err(TriggerError::shape(
            ShapeErrorCode::ConflictingGapConfiguration,
            message,
        ))
    };
    if gaps.is_empty() {
        return conflict(format!("gap range {range} matches no tooth"));
    }
    if gaps.len() == teeth {
        return conflict(format!("gap range {range} matches every tooth"));
    }
    if gaps.len() > 1 {
        let period = teeth / gaps.len();
        let regular = teeth % gaps.len() == 0
            && gaps.windows(2).all(|w| w[1] - w[0] == period)
            && gaps[0] < period;
        if !regular {
            return conflict(format!(
                "gap range {range} matches {} irregularly spaced teeth",
                gaps.len()
            ));
        }
        if !role.needs_secondary_input() {
            return conflict(format!(
                "{} gaps per cycle cannot be told apart without a phase input",
                gaps.len()
            ));
        }
    }
    Ok(())
}

/// Authoritative secondary edges, narrowed by the secondary gap range if set
fn reference_edges(
    secondary: &[TriggerEvent],
    sync_edge: SyncEdge,
    range: Option<RatioRange>,
    cycle: f64,
) -> Result<Vec<TriggerEvent>, TriggerError> {
    let authoritative: Vec<TriggerEvent> = secondary
        .iter()
        .filter(|e| sync_edge.accepts(e.kind))
        .copied()
        .collect();
    if authoritative.is_empty() {
        return Err(TriggerError::shape(
            ShapeErrorCode::EmptyRequiredWheel,
            format!("secondary wheel has no {sync_edge:?} edges"),
        ));
    }
    let Some(range) = range else {
        return Ok(authoritative);
    };

    let angles: Vec<f64> = authoritative.iter().map(|e| e.angle).collect();
    let matched = matching_gaps(&angles, cycle, range);
    if matched.is_empty() || (matched.len() == angles.len() && angles.len() > 1) {
        return Err(TriggerError::shape(
            ShapeErrorCode::ConflictingGapConfiguration,
            format!("secondary gap range {range} does not single out a reference"),
        ));
    }
    Ok(matched.into_iter().map(|i| authoritative[i]).collect())
}

fn check_refs(
    refs: &[TriggerEvent],
    teeth: &[f64],
    acquisition: Acquisition,
) -> Result<(), TriggerError> {
    if refs.len() > 1 {
        return Err(TriggerError::shape(
            ShapeErrorCode::AmbiguousReference,
            format!(
                "{} secondary reference edges per cycle (at {}); restrict the polarity or set a secondary gap range",
                refs.len(),
                refs.iter()
                    .map(|e| format!("{}", e.angle))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ));
    }
    if acquisition == Acquisition::SecondaryPin {
        for reference in refs {
            if teeth
                .iter()
                .any(|&t| (t - reference.angle).abs() < ANGLE_EPSILON)
            {
                return Err(TriggerError::shape(
                    ShapeErrorCode::AmbiguousReference,
                    format!(
                        "secondary reference at {} coincides with a primary tooth",
                        reference.angle
                    ),
                ));
            }
        }
    }
    Ok(())
}
