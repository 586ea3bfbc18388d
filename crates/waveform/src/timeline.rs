//! Finalized, read-only trigger template.

use contracts::{
    Acquisition, CycleKind, EdgeKind, RatioRange, SecondaryRole, SyncEdge, TriggerEvent, Wheel,
};
use serde::Serialize;

/// Immutable description of one engine cycle of trigger edges.
///
/// Only produced by [`crate::WaveformBuilder::finalize`], so every instance
/// already satisfies the shape invariants. Besides the raw events it carries
/// the tables the phase tracker indexes on the hot path:
///
/// - `teeth`: angles of the authoritative primary edges, ascending
/// - `gap_teeth`: indices into `teeth` of the tooth that ends each sync gap
/// - `secondary_refs`: authoritative secondary edges used as references
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventTimeline {
    pub(crate) cycle_kind: CycleKind,
    pub(crate) sync_edge: SyncEdge,
    pub(crate) primary: Vec<TriggerEvent>,
    pub(crate) secondary: Vec<TriggerEvent>,
    pub(crate) sync_gap: Option<RatioRange>,
    pub(crate) secondary_sync_gap: Option<RatioRange>,
    pub(crate) tdc_position: f64,
    pub(crate) secondary_role: SecondaryRole,
    pub(crate) acquisition: Acquisition,
    pub(crate) teeth: Vec<f64>,
    pub(crate) gap_teeth: Vec<usize>,
    pub(crate) secondary_refs: Vec<TriggerEvent>,
}

impl EventTimeline {
    pub fn cycle_kind(&self) -> CycleKind {
        self.cycle_kind
    }

    /// 360 or 720 degrees
    pub fn cycle_length(&self) -> f64 {
        self.cycle_kind.cycle_length()
    }

    pub fn sync_edge(&self) -> SyncEdge {
        self.sync_edge
    }

    /// Angle-sorted events of one wheel
    pub fn events(&self, wheel: Wheel) -> &[TriggerEvent] {
        match wheel {
            Wheel::Primary => &self.primary,
            Wheel::Secondary => &self.secondary,
        }
    }

    /// All events across both wheels, angle-sorted (primary first on ties)
    pub fn merged_events(&self) -> Vec<TriggerEvent> {
        let mut all: Vec<TriggerEvent> = self
            .primary
            .iter()
            .chain(self.secondary.iter())
            .copied()
            .collect();
        all.sort_by(|a, b| a.angle.total_cmp(&b.angle));
        all
    }

    /// Total event count across both wheels
    pub fn len(&self) -> usize {
        self.primary.len() + self.secondary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sync_gap_range(&self) -> Option<RatioRange> {
        self.sync_gap
    }

    pub fn secondary_gap_range(&self) -> Option<RatioRange> {
        self.secondary_sync_gap
    }

    /// Trigger angle at which engine angle 0 (TDC #1) occurs
    pub fn tdc_position(&self) -> f64 {
        self.tdc_position
    }

    pub fn secondary_role(&self) -> SecondaryRole {
        self.secondary_role
    }

    /// Whether full sync requires a confirming secondary edge
    pub fn needs_secondary_input(&self) -> bool {
        self.secondary_role.needs_secondary_input()
    }

    pub fn secondary_is_cam_phase(&self) -> bool {
        self.secondary_role.is_cam_phase()
    }

    pub fn acquisition(&self) -> Acquisition {
        self.acquisition
    }

    /// Angles of the authoritative primary edges
    pub fn teeth(&self) -> &[f64] {
        &self.teeth
    }

    pub fn tooth_count(&self) -> usize {
        self.teeth.len()
    }

    pub fn tooth_angle(&self, index: usize) -> f64 {
        self.teeth[index % self.teeth.len()]
    }

    /// Degrees from tooth `index - 1` to tooth `index`, wrapping at the cycle end
    pub fn tooth_spacing(&self, index: usize) -> f64 {
        spacing(&self.teeth, index % self.teeth.len(), self.cycle_length())
    }

    /// Indices of the teeth that end a sync gap, ascending
    pub fn gap_teeth(&self) -> &[usize] {
        &self.gap_teeth
    }

    pub fn is_gap_tooth(&self, index: usize) -> bool {
        self.gap_teeth.binary_search(&index).is_ok()
    }

    /// Teeth from one gap to the next (equal for every gap)
    pub fn teeth_between_gaps(&self) -> usize {
        if self.gap_teeth.is_empty() {
            self.teeth.len()
        } else {
            self.teeth.len() / self.gap_teeth.len()
        }
    }

    /// Secondary edges the tracker uses as phase references
    pub fn secondary_refs(&self) -> &[TriggerEvent] {
        &self.secondary_refs
    }

    pub fn secondary_ref_for(&self, kind: EdgeKind) -> Option<&TriggerEvent> {
        self.secondary_refs.iter().find(|e| e.kind == kind)
    }

    /// Degrees from the gap tooth `gap_teeth[k]` forward to the secondary reference
    pub fn secondary_offset_from_gap(&self, k: usize, reference: &TriggerEvent) -> f64 {
        let gap_angle = self.teeth[self.gap_teeth[k]];
        (reference.angle - gap_angle).rem_euclid(self.cycle_length())
    }

    /// Index of the first tooth strictly after `angle`, wrapping to 0
    pub fn first_tooth_after(&self, angle: f64) -> usize {
        let idx = self.teeth.partition_point(|&t| t <= angle);
        if idx == self.teeth.len() {
            0
        } else {
            idx
        }
    }

    /// Teeth passed going forward from `from` (exclusive) to `to` (inclusive)
    pub fn teeth_forward(&self, from: usize, to: usize) -> usize {
        let n = self.teeth.len();
        (to + n - from % n) % n
    }
}

pub(crate) fn spacing(teeth: &[f64], index: usize, cycle: f64) -> f64 {
    let n = teeth.len();
    if n < 2 {
        return cycle;
    }
    let prev = teeth[(index + n - 1) % n];
    let delta = (teeth[index] - prev).rem_euclid(cycle);
    if delta == 0.0 {
        cycle
    } else {
        delta
    }
}
