//! Phase tracker: live edges in, synchronized engine angle and RPM out.

use std::fmt;

use contracts::{
    Acquisition, DecoderConfig, DecoderSnapshot, DesyncFault, DesyncReason, EdgeKind, LiveEdge,
    SyncStatus, Timestamp, TriggerError, TriggerEvent, Wheel,
};
use metrics::{Counter, Gauge};
use tracing::instrument;
use validator::Validate;
use waveform::EventTimeline;

use crate::gap::{classify_with_floor, GapClass};
use crate::history::IntervalHistory;
use crate::rpm::{RpmEstimator, RpmUpdate};

/// What a single [`PhaseTracker::feed`] call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Edge not used: polarity not authoritative, timestamp not increasing,
    /// or a secondary edge the timeline has no use for
    Ignored,
    /// Edge consumed; status after the edge
    Accepted(SyncStatus),
    /// Edge completed acquisition
    Acquired { tooth_index: u32 },
}

/// Mutable decode state, owned by the tracker
#[derive(Debug, Default)]
struct DecoderState {
    status: SyncStatus,
    /// Index into `EventTimeline::teeth` of the last primary tooth
    tooth_index: usize,
    last_edge: [Option<Timestamp>; 2],
    history: [IntervalHistory; 2],
    /// Primary teeth since the landmark that started TENTATIVE
    teeth_since_landmark: usize,
    /// Degrees travelled since that landmark
    travel_deg: f64,
    /// Primary teeth since a secondary reference seen while NOT_SYNCHRONIZED,
    /// and when that reference arrived
    reference_seen: Option<(usize, Timestamp)>,
    edges_seen: u64,
    ignored: u64,
    sync_count: u64,
    desync_count: u64,
}

/// Metric handles resolved once at construction; the feed path only bumps them.
///
/// Handles taken before a recorder is installed stay no-ops.
struct DecodeMetrics {
    edges: [Counter; 2],
    ignored: Counter,
    rpm: Gauge,
    rpm_outliers: Counter,
    sync_acquired: Counter,
    desync: [Counter; DesyncReason::ALL.len()],
}

impl DecodeMetrics {
    fn register() -> Self {
        Self {
            edges: Wheel::ALL
                .map(|wheel| metrics::counter!("trigger_edges_total", "wheel" => wheel.as_str())),
            ignored: metrics::counter!("trigger_edges_ignored_total"),
            rpm: metrics::gauge!("trigger_rpm"),
            rpm_outliers: metrics::counter!("trigger_rpm_outliers_total"),
            sync_acquired: metrics::counter!("trigger_sync_acquired_total"),
            desync: DesyncReason::ALL.map(|reason| {
                metrics::counter!("trigger_desync_total", "reason" => reason.as_str())
            }),
        }
    }
}

impl fmt::Debug for DecodeMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeMetrics").finish_non_exhaustive()
    }
}

/// Trigger decoder state machine.
///
/// Owns its [`EventTimeline`] and all decode state. `feed` is bounded and
/// allocation-free; the only heap data is sized at construction.
#[derive(Debug)]
pub struct PhaseTracker {
    timeline: EventTimeline,
    config: DecoderConfig,
    /// Degrees from each candidate gap forward to the secondary reference
    secondary_offsets: Vec<f64>,
    /// Teeth from the secondary reference forward to each candidate gap
    teeth_to_gap: Vec<usize>,
    reference: Option<TriggerEvent>,
    rpm: RpmEstimator,
    state: DecoderState,
    metrics: DecodeMetrics,
}

impl PhaseTracker {
    /// Build a tracker for `timeline`. Fails on an invalid `config`.
    #[instrument(skip_all, fields(teeth = timeline.tooth_count(), acquisition = ?timeline.acquisition()))]
    pub fn new(timeline: EventTimeline, config: DecoderConfig) -> Result<Self, TriggerError> {
        config.validate().map_err(|e| {
            TriggerError::config_validation("decoder", e.to_string())
        })?;
        let rpm = RpmEstimator::new(&config);
        let mut tracker = Self {
            timeline,
            config,
            secondary_offsets: Vec::new(),
            teeth_to_gap: Vec::new(),
            reference: None,
            rpm,
            state: DecoderState::default(),
            metrics: DecodeMetrics::register(),
        };
        tracker.derive_tables();
        tracing::debug!("Phase tracker ready");
        Ok(tracker)
    }

    fn derive_tables(&mut self) {
        self.reference = self.timeline.secondary_refs().first().copied();
        self.secondary_offsets = match self.reference {
            Some(reference) if self.timeline.acquisition() == Acquisition::PrimaryGap => (0..self
                .timeline
                .gap_teeth()
                .len())
                .map(|k| self.timeline.secondary_offset_from_gap(k, &reference))
                .collect(),
            _ => Vec::new(),
        };
        self.teeth_to_gap = match self.reference {
            Some(reference) if !self.secondary_offsets.is_empty() => {
                let n = self.timeline.tooth_count();
                let from = self.tooth_before(reference.angle);
                self.timeline
                    .gap_teeth()
                    .iter()
                    .map(|&gap| match self.timeline.teeth_forward(from, gap) {
                        0 => n,
                        teeth => teeth,
                    })
                    .collect()
            }
            _ => Vec::new(),
        };
    }

    /// Swap in a new template and start over from NOT_SYNCHRONIZED.
    ///
    /// Exclusive access guarantees no edge is evaluated against a mix of the
    /// old and new template.
    #[instrument(skip_all, fields(teeth = timeline.tooth_count()))]
    pub fn reconfigure(&mut self, timeline: EventTimeline) {
        self.timeline = timeline;
        self.derive_tables();
        self.rpm.reset();
        self.state = DecoderState::default();
        tracing::info!("Decoder reconfigured");
    }

    pub fn timeline(&self) -> &EventTimeline {
        &self.timeline
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Convenience wrapper around [`feed`](Self::feed)
    #[inline]
    pub fn feed_edge(
        &mut self,
        timestamp: Timestamp,
        wheel: Wheel,
        kind: EdgeKind,
    ) -> Result<FeedOutcome, DesyncFault> {
        self.feed(LiveEdge::new(timestamp, wheel, kind))
    }

    /// Process one live edge.
    ///
    /// `Err` reports a desync fault; the tracker has already recovered to
    /// NOT_SYNCHRONIZED (or re-entered TENTATIVE when the faulting edge is
    /// itself a landmark) and keeps accepting edges.
    pub fn feed(&mut self, edge: LiveEdge) -> Result<FeedOutcome, DesyncFault> {
        if !self.timeline.sync_edge().accepts(edge.kind) {
            return Ok(self.ignore());
        }
        let wheel = edge.wheel.index();
        if let Some(last) = self.state.last_edge[wheel] {
            if edge.timestamp <= last {
                tracing::trace!(timestamp = edge.timestamp, last, wheel = %edge.wheel, "Stale edge");
                return Ok(self.ignore());
            }
        }

        match edge.wheel {
            Wheel::Primary => self.on_primary(edge),
            Wheel::Secondary => self.on_secondary(edge),
        }
    }

    /// Watchdog: raise the missing-edge fault without waiting for an edge.
    pub fn poll(&mut self, now: Timestamp) -> Result<(), DesyncFault> {
        let Some(last) = self.state.last_edge[Wheel::Primary.index()] else {
            return Ok(());
        };
        if self.state.status == SyncStatus::NotSynchronized
            || now.saturating_sub(last) <= self.config.max_tooth_interval_ticks
        {
            return Ok(());
        }
        let fault = self.desync(DesyncReason::EdgeTimeout, now);
        self.state.history.iter_mut().for_each(IntervalHistory::clear);
        self.rpm.reset();
        Err(fault)
    }

    fn ignore(&mut self) -> FeedOutcome {
        self.state.ignored += 1;
        self.metrics.ignored.increment(1);
        FeedOutcome::Ignored
    }

    fn on_primary(&mut self, edge: LiveEdge) -> Result<FeedOutcome, DesyncFault> {
        let ts = edge.timestamp;
        let p = Wheel::Primary.index();
        let previous_edge = self.state.last_edge[p].replace(ts);
        self.state.edges_seen += 1;
        self.metrics.edges[p].increment(1);
        self.count_reference_tooth(ts, previous_edge.map(|p| ts - p));

        let Some(previous_edge) = previous_edge else {
            return Ok(FeedOutcome::Accepted(self.state.status));
        };
        let dt = ts - previous_edge;

        if dt > self.config.max_tooth_interval_ticks {
            self.state.history.iter_mut().for_each(IntervalHistory::clear);
            self.state.reference_seen = None;
            self.rpm.reset();
            if self.state.status == SyncStatus::NotSynchronized {
                return Ok(FeedOutcome::Accepted(SyncStatus::NotSynchronized));
            }
            return Err(self.desync(DesyncReason::EdgeTimeout, ts));
        }

        let class = self.classify_primary(dt);
        self.state.history[p].push(dt);

        match self.state.status {
            SyncStatus::NotSynchronized => Ok(self.try_gap_landmark(class, dt, ts)),
            SyncStatus::Tentative => self.tentative_primary(class, dt, ts),
            SyncStatus::Synchronized => self.synchronized_primary(class, dt, ts),
        }
    }

    fn classify_primary(&self, dt: u64) -> GapClass {
        match (
            self.timeline.sync_gap_range(),
            self.state.history[Wheel::Primary.index()].latest(),
        ) {
            (Some(range), Some(previous)) => {
                classify_with_floor(previous, dt, range, self.config.noise_floor_ticks)
            }
            _ => GapClass::Normal,
        }
    }

    /// NOT_SYNCHRONIZED primary edge: a gap starts TENTATIVE, or acquires
    /// outright when a secondary reference led it by the right tooth count
    fn try_gap_landmark(&mut self, class: GapClass, dt: u64, ts: Timestamp) -> FeedOutcome {
        if self.timeline.acquisition() != Acquisition::PrimaryGap {
            return FeedOutcome::Accepted(self.state.status);
        }
        if class == GapClass::GapCandidate {
            let teeth = self.state.reference_seen.map(|(t, _)| t);
            if let Some(gap) = teeth.and_then(|t| self.gap_after_reference(t)) {
                self.state.tooth_index = gap;
                self.update_rpm(self.timeline.tooth_spacing(gap), dt);
                return self.acquire(ts);
            }
            self.enter_tentative(self.timeline.gap_teeth()[0], ts);
            return FeedOutcome::Accepted(SyncStatus::Tentative);
        }
        if self.first_interval_was_gap(dt) {
            // landmark was the previous edge, this one is already the tooth after it
            let teeth = self.state.reference_seen.map(|(t, _)| t);
            if let Some(gap) = teeth.and_then(|t| self.gap_after_reference(t.checked_sub(1)?)) {
                self.state.tooth_index = gap;
                self.advance_tooth(dt);
                return self.acquire(ts);
            }
            self.enter_tentative(self.timeline.gap_teeth()[0], ts);
            self.advance_tooth(dt);
            return FeedOutcome::Accepted(SyncStatus::Tentative);
        }
        FeedOutcome::Accepted(self.state.status)
    }

    /// Gap tooth lying exactly `teeth` primary teeth after the secondary reference
    fn gap_after_reference(&self, teeth: usize) -> Option<usize> {
        let k = self.teeth_to_gap.iter().position(|&t| t == teeth)?;
        Some(self.timeline.gap_teeth()[k])
    }

    /// Reference seen before any landmark: count teeth until the next gap.
    /// The first tooth after it also checks the reference sat inside its window.
    fn count_reference_tooth(&mut self, ts: Timestamp, dt: Option<u64>) {
        let Some((teeth, seen_at)) = self.state.reference_seen else {
            return;
        };
        let teeth = teeth + 1;
        let keep = teeth <= self.timeline.tooth_count()
            && (teeth > 1 || self.reference_lead_matches(ts.saturating_sub(seen_at), dt));
        self.state.reference_seen = keep.then_some((teeth, seen_at));
    }

    /// Degrees from the reference to the following tooth, measured against
    /// that tooth's own interval
    fn reference_lead_matches(&self, since_reference: u64, dt: Option<u64>) -> bool {
        let (Some(reference), Some(dt)) = (self.reference, dt) else {
            return false;
        };
        if dt == 0 {
            return false;
        }
        let tooth = self.timeline.first_tooth_after(reference.angle);
        let lead = (self.timeline.tooth_angle(tooth) - reference.angle)
            .rem_euclid(self.timeline.cycle_length());
        let measured = since_reference as f64 / dt as f64 * self.timeline.tooth_spacing(tooth);
        (measured - lead).abs() <= self.config.secondary_window_deg
    }

    /// The very first interval after start-up (or a stall) had nothing to be
    /// compared against; judge it backwards from the one that followed.
    fn first_interval_was_gap(&self, dt: u64) -> bool {
        let history = &self.state.history[Wheel::Primary.index()];
        let (Some(range), Some(first)) = (self.timeline.sync_gap_range(), history.oldest()) else {
            return false;
        };
        history.len() == 2
            && classify_with_floor(dt, first, range, self.config.noise_floor_ticks)
                == GapClass::GapCandidate
    }

    fn enter_tentative(&mut self, tooth_index: usize, ts: Timestamp) {
        self.state.status = SyncStatus::Tentative;
        self.state.tooth_index = tooth_index;
        self.state.teeth_since_landmark = 0;
        self.state.travel_deg = 0.0;
        self.state.reference_seen = None;
        tracing::debug!(timestamp = ts, tooth_index, "Landmark found, tentative");
    }

    fn advance_tooth(&mut self, dt: u64) {
        let n = self.timeline.tooth_count();
        self.state.tooth_index = (self.state.tooth_index + 1) % n;
        self.state.teeth_since_landmark += 1;
        let spacing = self.timeline.tooth_spacing(self.state.tooth_index);
        self.state.travel_deg += spacing;
        self.update_rpm(spacing, dt);
    }

    fn update_rpm(&mut self, degrees: f64, dt: u64) {
        match self.rpm.update(degrees, dt) {
            RpmUpdate::Accepted(rpm) => {
                if self.state.status == SyncStatus::Synchronized {
                    self.metrics.rpm.set(rpm);
                }
            }
            RpmUpdate::Rejected => {
                self.metrics.rpm_outliers.increment(1);
            }
            RpmUpdate::Reseeded(rpm) => {
                self.metrics.rpm_outliers.increment(1);
                tracing::debug!(rpm, "RPM average re-seeded");
            }
        }
    }

    fn tentative_primary(
        &mut self,
        class: GapClass,
        dt: u64,
        ts: Timestamp,
    ) -> Result<FeedOutcome, DesyncFault> {
        self.advance_tooth(dt);
        let is_gap = class == GapClass::GapCandidate;

        if self.timeline.acquisition() == Acquisition::SecondaryPin {
            if self.state.teeth_since_landmark > self.timeline.tooth_count() {
                return Err(self.desync(DesyncReason::SecondaryTimeout, ts));
            }
            return Ok(FeedOutcome::Accepted(SyncStatus::Tentative));
        }

        let expected = self.timeline.teeth_between_gaps();
        let count = self.state.teeth_since_landmark;

        if !self.timeline.needs_secondary_input() {
            if is_gap && count == expected {
                return Ok(self.acquire(ts));
            }
            if is_gap {
                return Err(self.restart_at_gap(DesyncReason::ToothCountMismatch, ts));
            }
            if count >= expected {
                return Err(self.desync(DesyncReason::ToothCountMismatch, ts));
            }
            return Ok(FeedOutcome::Accepted(SyncStatus::Tentative));
        }

        if is_gap && count % expected != 0 {
            return Err(self.restart_at_gap(DesyncReason::ToothCountMismatch, ts));
        }
        let deadline = self.secondary_deadline();
        if self.state.travel_deg > deadline {
            let fault = self.desync(DesyncReason::SecondaryTimeout, ts);
            if is_gap {
                self.enter_tentative(self.timeline.gap_teeth()[0], ts);
            }
            return Err(fault);
        }
        Ok(FeedOutcome::Accepted(SyncStatus::Tentative))
    }

    /// Travel past which no candidate can still be confirmed
    fn secondary_deadline(&self) -> f64 {
        self.secondary_offsets.iter().copied().fold(0.0, f64::max)
            + self.config.secondary_window_deg
    }

    fn restart_at_gap(&mut self, reason: DesyncReason, ts: Timestamp) -> DesyncFault {
        let fault = self.desync(reason, ts);
        self.enter_tentative(self.timeline.gap_teeth()[0], ts);
        fault
    }

    fn synchronized_primary(
        &mut self,
        class: GapClass,
        dt: u64,
        ts: Timestamp,
    ) -> Result<FeedOutcome, DesyncFault> {
        self.advance_tooth(dt);
        if self.timeline.acquisition() == Acquisition::PrimaryGap {
            let expected_gap = self.timeline.is_gap_tooth(self.state.tooth_index);
            match (class, expected_gap) {
                (GapClass::GapCandidate, false) => {
                    let fault = self.desync(DesyncReason::UnexpectedGap, ts);
                    self.enter_tentative(self.timeline.gap_teeth()[0], ts);
                    return Err(fault);
                }
                (GapClass::Normal, true) => {
                    return Err(self.desync(DesyncReason::MissedGap, ts));
                }
                _ => {}
            }
        } else if self.state.teeth_since_landmark > self.timeline.tooth_count() {
            return Err(self.desync(DesyncReason::SecondaryTimeout, ts));
        }
        Ok(FeedOutcome::Accepted(SyncStatus::Synchronized))
    }

    fn on_secondary(&mut self, edge: LiveEdge) -> Result<FeedOutcome, DesyncFault> {
        let Some(reference) = self.reference else {
            return Ok(self.ignore());
        };
        let ts = edge.timestamp;
        let s = Wheel::Secondary.index();
        let previous_edge = self.state.last_edge[s].replace(ts);
        self.state.edges_seen += 1;
        self.metrics.edges[s].increment(1);

        let dt = previous_edge.map(|p| ts - p);
        let previous_dt = self.state.history[s].latest();
        if let Some(dt) = dt {
            self.state.history[s].push(dt);
        }

        let is_reference = edge.kind == reference.kind
            && match self.timeline.secondary_gap_range() {
                Some(range) => match (previous_dt, dt) {
                    (Some(previous), Some(dt)) => {
                        classify_with_floor(previous, dt, range, self.config.noise_floor_ticks)
                            == GapClass::GapCandidate
                    }
                    _ => false,
                },
                None => true,
            };
        if !is_reference {
            return Ok(FeedOutcome::Accepted(self.state.status));
        }

        match (self.timeline.acquisition(), self.state.status) {
            (Acquisition::SecondaryPin, SyncStatus::NotSynchronized) => {
                self.enter_tentative(self.tooth_before(reference.angle), ts);
                Ok(FeedOutcome::Accepted(SyncStatus::Tentative))
            }
            (Acquisition::SecondaryPin, SyncStatus::Tentative) => {
                if self.state.teeth_since_landmark == self.timeline.tooth_count() {
                    Ok(self.acquire(ts))
                } else {
                    let fault = self.desync(DesyncReason::ToothCountMismatch, ts);
                    self.enter_tentative(self.tooth_before(reference.angle), ts);
                    Err(fault)
                }
            }
            (Acquisition::SecondaryPin, SyncStatus::Synchronized) => {
                let expected = self.tooth_before(reference.angle);
                if self.state.tooth_index == expected {
                    self.state.teeth_since_landmark = 0;
                    Ok(FeedOutcome::Accepted(SyncStatus::Synchronized))
                } else {
                    let fault = self.desync(DesyncReason::ToothCountMismatch, ts);
                    self.enter_tentative(expected, ts);
                    Err(fault)
                }
            }
            (Acquisition::PrimaryGap, SyncStatus::NotSynchronized) => {
                if !self.teeth_to_gap.is_empty() {
                    self.state.reference_seen = Some((0, ts));
                }
                Ok(FeedOutcome::Accepted(SyncStatus::NotSynchronized))
            }
            (Acquisition::PrimaryGap, SyncStatus::Tentative) => {
                self.confirm_candidate(reference, ts)
            }
            (Acquisition::PrimaryGap, SyncStatus::Synchronized) => {
                let angle = self.extrapolated_tooth_angle(ts);
                let error = angular_distance(angle, reference.angle, self.timeline.cycle_length());
                if error > self.config.secondary_window_deg {
                    tracing::debug!(angle, expected = reference.angle, error, "Secondary out of window");
                    return Err(self.desync(DesyncReason::SecondaryMismatch, ts));
                }
                Ok(FeedOutcome::Accepted(SyncStatus::Synchronized))
            }
        }
    }

    /// TENTATIVE secondary reference: find which gap the landmark really was
    fn confirm_candidate(
        &mut self,
        reference: TriggerEvent,
        ts: Timestamp,
    ) -> Result<FeedOutcome, DesyncFault> {
        let travel = self.state.travel_deg + self.degrees_since_last_tooth(ts);
        let window = self.config.secondary_window_deg;
        let cycle = self.timeline.cycle_length();
        let matched = self
            .secondary_offsets
            .iter()
            .position(|&offset| angular_distance(travel, offset, cycle) <= window);

        let Some(k) = matched else {
            tracing::debug!(travel, expected = ?self.secondary_offsets, "Secondary matches no candidate gap");
            return Err(self.desync(DesyncReason::SecondaryMismatch, ts));
        };
        let n = self.timeline.tooth_count();
        self.state.tooth_index = (self.timeline.gap_teeth()[k] + self.state.teeth_since_landmark) % n;
        tracing::trace!(candidate = k, travel, reference = reference.angle, "Candidate gap confirmed");
        Ok(self.acquire(ts))
    }

    /// Last tooth at or before the pin angle
    fn tooth_before(&self, angle: f64) -> usize {
        let n = self.timeline.tooth_count();
        (self.timeline.first_tooth_after(angle) + n - 1) % n
    }

    fn acquire(&mut self, ts: Timestamp) -> FeedOutcome {
        self.state.status = SyncStatus::Synchronized;
        self.state.teeth_since_landmark = 0;
        self.state.travel_deg = 0.0;
        self.state.reference_seen = None;
        self.state.sync_count += 1;
        self.metrics.sync_acquired.increment(1);
        tracing::info!(
            timestamp = ts,
            tooth_index = self.state.tooth_index,
            edges_seen = self.state.edges_seen,
            "Trigger synchronized"
        );
        FeedOutcome::Acquired {
            tooth_index: self.state.tooth_index as u32,
        }
    }

    fn desync(&mut self, reason: DesyncReason, ts: Timestamp) -> DesyncFault {
        let fault = DesyncFault {
            reason,
            timestamp: ts,
            previous: self.state.status,
            tooth_index: self.state.tooth_index as u32,
        };
        self.state.status = SyncStatus::NotSynchronized;
        self.state.teeth_since_landmark = 0;
        self.state.travel_deg = 0.0;
        self.state.reference_seen = None;
        self.state.desync_count += 1;
        self.metrics.desync[reason.index()].increment(1);
        tracing::warn!(
            reason = %reason,
            timestamp = ts,
            previous = %fault.previous,
            tooth_index = fault.tooth_index,
            "Trigger desync"
        );
        fault
    }

    /// Degrees rotated since the last primary tooth, capped at the next tooth
    fn degrees_since_last_tooth(&self, ts: Timestamp) -> f64 {
        let Some(last) = self.state.last_edge[Wheel::Primary.index()] else {
            return 0.0;
        };
        let next_spacing = self.timeline.tooth_spacing(self.state.tooth_index + 1);
        match self.ticks_per_degree() {
            Some(tpd) if tpd > 0.0 => (ts.saturating_sub(last) as f64 / tpd).min(next_spacing),
            _ => 0.0,
        }
    }

    fn ticks_per_degree(&self) -> Option<f64> {
        self.rpm.average_ticks_per_degree().or_else(|| {
            self.state.history[Wheel::Primary.index()]
                .latest()
                .map(|dt| dt as f64 / self.timeline.tooth_spacing(self.state.tooth_index))
        })
    }

    fn extrapolated_tooth_angle(&self, ts: Timestamp) -> f64 {
        (self.timeline.tooth_angle(self.state.tooth_index) + self.degrees_since_last_tooth(ts))
            .rem_euclid(self.timeline.cycle_length())
    }

    fn engine_angle(&self, trigger_angle: f64) -> f64 {
        (trigger_angle - self.timeline.tdc_position()).rem_euclid(self.timeline.cycle_length())
    }

    fn require_sync(&self) -> Result<(), TriggerError> {
        if self.state.status == SyncStatus::Synchronized {
            Ok(())
        } else {
            Err(TriggerError::NotSynchronized {
                status: self.state.status,
            })
        }
    }

    // ===== Queries =====

    #[inline]
    pub fn sync_status(&self) -> SyncStatus {
        self.state.status
    }

    /// Engine angle (TDC #1 = 0) of the last decoded tooth
    pub fn current_angle(&self) -> Result<f64, TriggerError> {
        self.require_sync()?;
        Ok(self.engine_angle(self.timeline.tooth_angle(self.state.tooth_index)))
    }

    /// Engine angle at `timestamp`, interpolated from the last tooth
    pub fn angle_at(&self, timestamp: Timestamp) -> Result<f64, TriggerError> {
        self.require_sync()?;
        Ok(self.engine_angle(self.extrapolated_tooth_angle(timestamp)))
    }

    /// Template angle of the last decoded tooth
    pub fn tooth_angle(&self) -> Result<f64, TriggerError> {
        self.require_sync()?;
        Ok(self.timeline.tooth_angle(self.state.tooth_index))
    }

    pub fn current_rpm(&self) -> Result<f64, TriggerError> {
        self.require_sync()?;
        Ok(self.rpm.rpm())
    }

    #[inline]
    pub fn tooth_index(&self) -> usize {
        self.state.tooth_index
    }

    pub fn ignored_count(&self) -> u64 {
        self.state.ignored
    }

    pub fn snapshot(&self) -> DecoderSnapshot {
        let synced = self.state.status == SyncStatus::Synchronized;
        let tooth_angle = self.timeline.tooth_angle(self.state.tooth_index);
        DecoderSnapshot {
            status: self.state.status,
            tooth_index: self.state.tooth_index as u32,
            tooth_angle: if synced { tooth_angle } else { 0.0 },
            engine_angle: if synced {
                self.engine_angle(tooth_angle)
            } else {
                0.0
            },
            rpm: if synced { self.rpm.rpm() } else { 0.0 },
            last_edge_timestamp: self.state.last_edge[Wheel::Primary.index()],
            edges_seen: self.state.edges_seen,
            sync_count: self.state.sync_count,
            desync_count: self.state.desync_count,
        }
    }
}

/// Shortest distance between two angles on a circle of `cycle` degrees
fn angular_distance(a: f64, b: f64, cycle: f64) -> f64 {
    let d = (a - b).rem_euclid(cycle);
    d.min(cycle - d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{CycleKind, SecondaryRole, SyncEdge};
    use waveform::WaveformBuilder;

    const TPD: f64 = 100.0;

    fn missing_tooth_36_1() -> EventTimeline {
        let mut builder = WaveformBuilder::new();
        builder.initialize(CycleKind::TwoStroke, SyncEdge::Rise).unwrap();
        builder
            .add_skipped_tooth_pattern(Wheel::Primary, 36, 1, 0.5, 0.0, 360.0)
            .unwrap();
        builder.set_synchronization_gap_range(1.5, 3.0).unwrap();
        builder.finalize().unwrap()
    }

    fn crank_with_cam() -> EventTimeline {
        let mut builder = WaveformBuilder::new();
        builder
            .initialize(CycleKind::FourStrokeCrank, SyncEdge::Rise)
            .unwrap();
        builder
            .add_skipped_tooth_pattern(Wheel::Primary, 36, 1, 0.5, 0.0, 360.0)
            .unwrap();
        builder.set_synchronization_gap_range(1.5, 3.0).unwrap();
        builder.add_event(95.0, EdgeKind::Rise, Wheel::Secondary).unwrap();
        builder.add_event(275.0, EdgeKind::Fall, Wheel::Secondary).unwrap();
        builder.set_secondary_role(SecondaryRole::CamPhase).unwrap();
        builder.set_tdc_position(90.0).unwrap();
        builder.finalize().unwrap()
    }

    fn pinned_36() -> EventTimeline {
        let mut builder = WaveformBuilder::new();
        builder.initialize(CycleKind::TwoStroke, SyncEdge::Rise).unwrap();
        builder
            .add_evenly_spaced_teeth(Wheel::Primary, 36, 0.5, 360.0)
            .unwrap();
        builder.add_event(15.0, EdgeKind::Rise, Wheel::Secondary).unwrap();
        builder
            .set_secondary_role(SecondaryRole::MaskedCrankReference)
            .unwrap();
        builder.finalize().unwrap()
    }

    /// Edges of every event from `start` (unwrapped degrees) on, at `TPD` ticks per degree
    fn edges(timeline: &EventTimeline, start: f64, cycles: usize, secondary: bool) -> Vec<LiveEdge> {
        let cycle = timeline.cycle_length();
        let mut out = Vec::new();
        for c in 0..cycles {
            for event in timeline.merged_events() {
                if event.wheel == Wheel::Secondary && !secondary {
                    continue;
                }
                let angle = c as f64 * cycle + event.angle;
                if angle < start {
                    continue;
                }
                let ts = 1_000 + ((angle - start) * TPD).round() as u64;
                out.push(LiveEdge::new(ts, event.wheel, event.kind));
            }
        }
        out
    }

    fn tracker(timeline: EventTimeline) -> PhaseTracker {
        PhaseTracker::new(timeline, DecoderConfig::default()).unwrap()
    }

    /// Feed until synchronized; returns how many edges it took
    fn feed_until_sync(tracker: &mut PhaseTracker, edges: &[LiveEdge]) -> Option<usize> {
        for (i, edge) in edges.iter().enumerate() {
            if let Ok(FeedOutcome::Acquired { .. }) = tracker.feed(*edge) {
                return Some(i + 1);
            }
        }
        None
    }

    #[test]
    fn test_gap_sync_within_two_cycles() {
        let timeline = missing_tooth_36_1();
        let per_cycle = timeline.len();
        let all = edges(&timeline, 0.0, 3, true);
        let mut tracker = tracker(timeline);

        assert!(matches!(
            tracker.current_angle(),
            Err(TriggerError::NotSynchronized { .. })
        ));
        let used = feed_until_sync(&mut tracker, &all).expect("never synchronized");
        assert!(used <= 2 * per_cycle + 1, "took {used} edges");
        assert_eq!(tracker.tooth_index(), 0);
        assert_eq!(tracker.current_angle().unwrap(), 0.0);
    }

    #[test]
    fn test_gap_as_first_interval_is_recognized() {
        // first edge is the last tooth before the gap: 340 -> 360 is the gap
        let timeline = missing_tooth_36_1();
        let all = edges(&timeline, 340.0, 4, true);
        let mut tracker = tracker(timeline);
        let mut rises = all.iter().filter(|e| e.kind == EdgeKind::Rise);
        for edge in rises.by_ref().take(3) {
            tracker.feed(*edge).unwrap();
        }
        assert_eq!(tracker.sync_status(), SyncStatus::Tentative);
        assert_eq!(tracker.tooth_index(), 1);

        // one revolution after the gap
        let used = rises.take(34).filter(|e| tracker.feed(**e).is_ok()).count();
        assert_eq!(used, 34);
        assert_eq!(tracker.sync_status(), SyncStatus::Synchronized);
        assert_eq!(tracker.tooth_index(), 0);
    }

    #[test]
    fn test_angle_follows_teeth_and_interpolates() {
        let timeline = missing_tooth_36_1();
        let all = edges(&timeline, 0.0, 3, true);
        let mut tracker = tracker(timeline);
        let used = feed_until_sync(&mut tracker, &all).unwrap();

        // three more rising edges: teeth 1, 2, 3
        let mut fed = 0;
        let mut last_ts = 0;
        for edge in &all[used..] {
            tracker.feed(*edge).unwrap();
            if edge.kind == EdgeKind::Rise {
                fed += 1;
                last_ts = edge.timestamp;
            }
            if fed == 3 {
                break;
            }
        }
        assert!((tracker.current_angle().unwrap() - 30.0).abs() < 1e-9);
        let halfway = tracker.angle_at(last_ts + (5.0 * TPD) as u64).unwrap();
        assert!((halfway - 35.0).abs() < 1e-6, "got {halfway}");
    }

    #[test]
    fn test_rpm_matches_analytic_value() {
        let timeline = missing_tooth_36_1();
        let all = edges(&timeline, 0.0, 3, true);
        let mut tracker = tracker(timeline);
        assert!(tracker.current_rpm().is_err());
        for edge in &all {
            tracker.feed(*edge).unwrap();
        }
        // 100 ticks per degree at 1 MHz = 10_000 deg/s
        let expected = 10_000.0 / 6.0;
        let rpm = tracker.current_rpm().unwrap();
        assert!((rpm - expected).abs() / expected < 0.01, "rpm {rpm}");
    }

    #[test]
    fn test_non_authoritative_and_stale_edges_ignored() {
        let mut tracker = tracker(missing_tooth_36_1());
        assert_eq!(
            tracker.feed_edge(100, Wheel::Primary, EdgeKind::Fall),
            Ok(FeedOutcome::Ignored)
        );
        tracker.feed_edge(200, Wheel::Primary, EdgeKind::Rise).unwrap();
        assert_eq!(
            tracker.feed_edge(150, Wheel::Primary, EdgeKind::Rise),
            Ok(FeedOutcome::Ignored)
        );
        assert_eq!(
            tracker.feed_edge(200, Wheel::Primary, EdgeKind::Rise),
            Ok(FeedOutcome::Ignored)
        );
        assert_eq!(tracker.ignored_count(), 3);
        assert_eq!(tracker.snapshot().edges_seen, 1);
    }

    fn synced_missing_tooth() -> (PhaseTracker, Timestamp) {
        let timeline = missing_tooth_36_1();
        // through tooth 34 of the third revolution
        let all: Vec<LiveEdge> = edges(&timeline, 0.0, 3, true)
            .into_iter()
            .filter(|e| e.kind == EdgeKind::Rise)
            .collect();
        let mut tracker = tracker(timeline);
        let mut last = 0;
        for edge in &all {
            tracker.feed(*edge).unwrap();
            last = edge.timestamp;
        }
        assert_eq!(tracker.sync_status(), SyncStatus::Synchronized);
        assert_eq!(tracker.tooth_index(), 34);
        (tracker, last)
    }

    #[test]
    fn test_missed_gap_desyncs() {
        let (mut tracker, last) = synced_missing_tooth();
        let fault = tracker
            .feed_edge(last + 1_000, Wheel::Primary, EdgeKind::Rise)
            .unwrap_err();
        assert_eq!(fault.reason, DesyncReason::MissedGap);
        assert_eq!(fault.previous, SyncStatus::Synchronized);
        assert_eq!(tracker.sync_status(), SyncStatus::NotSynchronized);
        assert!(tracker.current_angle().is_err());
    }

    #[test]
    fn test_unexpected_gap_desyncs_and_retries() {
        let (mut tracker, last) = synced_missing_tooth();
        // proper gap and tooth 1, then a double-width interval at tooth 2
        tracker
            .feed_edge(last + 2_000, Wheel::Primary, EdgeKind::Rise)
            .unwrap();
        tracker
            .feed_edge(last + 3_000, Wheel::Primary, EdgeKind::Rise)
            .unwrap();
        let fault = tracker
            .feed_edge(last + 5_000, Wheel::Primary, EdgeKind::Rise)
            .unwrap_err();
        assert_eq!(fault.reason, DesyncReason::UnexpectedGap);
        assert_eq!(tracker.sync_status(), SyncStatus::Tentative);
        assert_eq!(tracker.snapshot().desync_count, 1);
    }

    #[test]
    fn test_edge_timeout_and_watchdog() {
        let (mut tracker, last) = synced_missing_tooth();
        assert!(tracker.poll(last + 100).is_ok());
        let fault = tracker.poll(last + 600_000).unwrap_err();
        assert_eq!(fault.reason, DesyncReason::EdgeTimeout);
        assert_eq!(tracker.sync_status(), SyncStatus::NotSynchronized);
        // idle decoder: no second fault
        assert!(tracker.poll(last + 900_000).is_ok());

        let (mut tracker, last) = synced_missing_tooth();
        let fault = tracker
            .feed_edge(last + 600_000, Wheel::Primary, EdgeKind::Rise)
            .unwrap_err();
        assert_eq!(fault.reason, DesyncReason::EdgeTimeout);
    }

    #[test]
    fn test_cam_phase_resolves_crank_revolution() {
        // 0: cam at 95 first, acquired on the gap at 360 (tooth 35)
        // 400: gap at 720 first, acquired on the cam with tooth 90 = TDC last
        for (start, tooth) in [(0.0, 35), (400.0, 9)] {
            let timeline = crank_with_cam();
            let all = edges(&timeline, start, 4, true);
            let mut tracker = tracker(timeline);
            feed_until_sync(&mut tracker, &all).expect("never synchronized");
            assert_eq!(tracker.tooth_index(), tooth, "start {start}");
            let expected = (tracker.timeline().tooth_angle(tooth) - 90.0).rem_euclid(720.0);
            assert!((tracker.current_angle().unwrap() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_cam_before_gap_needs_matching_tooth_count() {
        let timeline = crank_with_cam();
        let mut tracker = tracker(timeline);
        let tooth = |t: u64| LiveEdge::primary(1_000 + t * 1_000, EdgeKind::Rise);
        // teeth at 60..90, cam at 95
        for t in 6..=9 {
            tracker.feed(tooth(t)).unwrap();
        }
        tracker
            .feed(LiveEdge::secondary(9_500 + 1_000, EdgeKind::Rise))
            .unwrap();
        // one tooth short of the gap at 360: teeth 100..330 then a gap
        for t in 10..=33 {
            tracker.feed(tooth(t)).unwrap();
        }
        tracker.feed(tooth(35)).unwrap();
        assert_eq!(tracker.sync_status(), SyncStatus::Tentative);
    }

    #[test]
    fn test_cam_phase_primary_only_never_synchronizes() {
        let timeline = crank_with_cam();
        let all = edges(&timeline, 0.0, 6, false);
        let mut tracker = tracker(timeline);
        let mut saw_tentative = false;
        let mut timeouts = 0;
        for edge in &all {
            match tracker.feed(*edge) {
                Err(fault) => {
                    assert_eq!(fault.reason, DesyncReason::SecondaryTimeout);
                    timeouts += 1;
                }
                Ok(outcome) => assert!(!matches!(outcome, FeedOutcome::Acquired { .. })),
            }
            saw_tentative |= tracker.sync_status() == SyncStatus::Tentative;
            assert_ne!(tracker.sync_status(), SyncStatus::Synchronized);
        }
        assert!(saw_tentative);
        assert!(timeouts > 0);
    }

    #[test]
    fn test_secondary_pin_acquisition() {
        let timeline = pinned_36();
        let all = edges(&timeline, 0.0, 3, true);
        let mut tracker = tracker(timeline);
        feed_until_sync(&mut tracker, &all).expect("never synchronized");
        assert_eq!(tracker.tooth_index(), 1);
        assert!((tracker.current_angle().unwrap() - 10.0).abs() < 1e-9);

        // pin keeps confirming
        let rest: Vec<LiveEdge> = edges(tracker.timeline(), 0.0, 3, true)
            .into_iter()
            .filter(|e| e.timestamp > tracker.snapshot().last_edge_timestamp.unwrap_or(0))
            .collect();
        for edge in rest {
            tracker.feed(edge).unwrap();
        }
        assert_eq!(tracker.sync_status(), SyncStatus::Synchronized);
    }

    #[test]
    fn test_secondary_pin_missing_times_out() {
        let timeline = pinned_36();
        let all = edges(&timeline, 0.0, 2, true);
        let primary_only = edges(&timeline, 720.0, 5, false);
        let mut tracker = tracker(timeline);
        for edge in &all {
            tracker.feed(*edge).unwrap();
        }
        assert_eq!(tracker.sync_status(), SyncStatus::Synchronized);

        let offset = all.last().map(|e| e.timestamp).unwrap_or(0);
        let mut fault = None;
        for edge in primary_only {
            let shifted = LiveEdge::new(edge.timestamp + offset, edge.wheel, edge.kind);
            if let Err(f) = tracker.feed(shifted) {
                fault = Some(f);
                break;
            }
        }
        assert_eq!(fault.map(|f| f.reason), Some(DesyncReason::SecondaryTimeout));
    }

    #[test]
    fn test_auxiliary_secondary_edges_ignored() {
        let mut builder = WaveformBuilder::new();
        builder.initialize(CycleKind::TwoStroke, SyncEdge::Rise).unwrap();
        builder
            .add_skipped_tooth_pattern(Wheel::Primary, 36, 1, 0.5, 0.0, 360.0)
            .unwrap();
        builder.set_synchronization_gap_range(1.5, 3.0).unwrap();
        builder.add_event(45.0, EdgeKind::Rise, Wheel::Secondary).unwrap();
        builder.add_event(90.0, EdgeKind::Fall, Wheel::Secondary).unwrap();
        let mut tracker = tracker(builder.finalize().unwrap());
        assert_eq!(
            tracker.feed_edge(10, Wheel::Secondary, EdgeKind::Rise),
            Ok(FeedOutcome::Ignored)
        );
    }

    /// Cam with three pulses per cycle; only the one after the long interval is the reference
    fn crank_with_cam_train() -> EventTimeline {
        let mut builder = WaveformBuilder::new();
        builder
            .initialize(CycleKind::FourStrokeCrank, SyncEdge::Rise)
            .unwrap();
        builder
            .add_skipped_tooth_pattern(Wheel::Primary, 36, 1, 0.5, 0.0, 360.0)
            .unwrap();
        builder.set_synchronization_gap_range(1.5, 3.0).unwrap();
        for rise in [95.0, 155.0, 215.0] {
            builder.add_event(rise, EdgeKind::Rise, Wheel::Secondary).unwrap();
            builder
                .add_event(rise + 5.0, EdgeKind::Fall, Wheel::Secondary)
                .unwrap();
        }
        builder.set_secondary_role(SecondaryRole::CamPhase).unwrap();
        builder.set_secondary_synchronization_gap_range(2.0, 20.0).unwrap();
        builder.finalize().unwrap()
    }

    #[test]
    fn test_secondary_reference_picked_by_gap_ratio() {
        let timeline = crank_with_cam_train();
        assert_eq!(timeline.secondary_refs().len(), 1);
        assert_eq!(timeline.secondary_refs()[0].angle, 95.0);

        let all = edges(&timeline, 0.0, 4, true);
        let mut tracker = tracker(timeline);
        let mut acquired = None;
        for edge in &all {
            match tracker.feed(*edge) {
                Ok(FeedOutcome::Acquired { .. }) => {
                    acquired.get_or_insert((*edge, tracker.tooth_index()));
                }
                Ok(_) => {}
                Err(fault) => panic!("unexpected fault {fault:?} at {}", edge.timestamp),
            }
        }

        // 95 and 155 of the first cycle have no previous interval; 215 is 1:1.
        // first usable 600:60 interval ends on the 95 pulse of cycle two
        let (edge, tooth) = acquired.expect("never synchronized");
        assert_eq!(edge.wheel, Wheel::Secondary);
        assert_eq!(edge.timestamp, 1_000 + (815.0 * TPD) as u64);
        assert_eq!(tooth, 9);
        // later 155/215 pulses are not checked against the window
        assert_eq!(tracker.sync_status(), SyncStatus::Synchronized);
        assert_eq!(tracker.snapshot().desync_count, 0);
    }

    #[test]
    fn test_secondary_ratio_outside_range_is_not_a_reference() {
        let timeline = crank_with_cam_train();
        // evenly spaced cam pulses: one lands on 95 every cycle, but every ratio is 1
        let mut all = edges(&timeline, 0.0, 4, false);
        all.extend((0..12).map(|k| {
            let angle = 95.0 + 240.0 * k as f64;
            LiveEdge::new(1_000 + (angle * TPD) as u64, Wheel::Secondary, EdgeKind::Rise)
        }));
        all.sort_by_key(|e| e.timestamp);

        let mut tracker = tracker(timeline);
        let mut faults = Vec::new();
        for edge in &all {
            match tracker.feed(*edge) {
                Ok(FeedOutcome::Acquired { .. }) => {
                    panic!("synchronized on a 1:1 secondary interval at {}", edge.timestamp)
                }
                Ok(_) => {}
                Err(fault) => faults.push(fault.reason),
            }
        }
        assert_ne!(tracker.sync_status(), SyncStatus::Synchronized);
        assert!(!faults.is_empty());
        assert!(
            faults.iter().all(|r| *r == DesyncReason::SecondaryTimeout),
            "{faults:?}"
        );
    }

    #[test]
    fn test_reconfigure_resets_to_not_synchronized() {
        let (mut tracker, _) = synced_missing_tooth();
        tracker.reconfigure(pinned_36());
        assert_eq!(tracker.sync_status(), SyncStatus::NotSynchronized);
        assert_eq!(tracker.snapshot(), DecoderSnapshot::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DecoderConfig {
            tick_rate_hz: 0,
            ..Default::default()
        };
        let err = PhaseTracker::new(missing_tooth_36_1(), config).unwrap_err();
        assert!(matches!(err, TriggerError::ConfigValidation { .. }));
    }
}
