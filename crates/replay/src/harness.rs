//! Feeding recorded or synthetic edge sequences through a tracker.

use std::fmt;

use contracts::{DecoderSnapshot, DesyncFault, LiveEdge, SyncStatus, Timestamp, TriggerEvent};
use decoder::{FeedOutcome, PhaseTracker};
use serde::Serialize;
use tracing::instrument;
use waveform::EventTimeline;

/// First timestamp handed out by [`replay`]
pub const REPLAY_START_TIMESTAMP: Timestamp = 1_000;

/// Outcome of one replay run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayReport {
    /// Edges handed to the tracker
    pub edges_fed: usize,
    /// Edges the tracker ignored
    pub ignored: usize,
    /// 1-based position of the edge that first completed acquisition
    pub first_sync_edge: Option<usize>,
    /// Desync faults in arrival order
    pub faults: Vec<DesyncFault>,
    pub final_status: SyncStatus,
    /// RPM at the end of the run, if synchronized
    pub final_rpm: Option<f64>,
    /// Engine angle at the end of the run, if synchronized
    pub final_angle: Option<f64>,
    pub snapshot: DecoderSnapshot,
}

impl ReplayReport {
    pub fn synchronized(&self) -> bool {
        self.final_status == SyncStatus::Synchronized
    }
}

impl fmt::Display for ReplayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Replay Report ===")?;
        writeln!(f, "Edges fed: {}", self.edges_fed)?;
        writeln!(f, "Ignored: {}", self.ignored)?;
        match self.first_sync_edge {
            Some(n) => writeln!(f, "First sync at edge: {n}")?,
            None => writeln!(f, "First sync at edge: never")?,
        }
        writeln!(f, "Faults: {}", self.faults.len())?;
        for fault in &self.faults {
            writeln!(f, "  - {fault}")?;
        }
        writeln!(f, "Final status: {}", self.final_status)?;
        if let Some(rpm) = self.final_rpm {
            writeln!(f, "RPM: {rpm:.1}")?;
        }
        if let Some(angle) = self.final_angle {
            writeln!(f, "Engine angle: {angle:.2}°")?;
        }
        Ok(())
    }
}

/// Event sequence of `cycles` full cycles, both wheels merged in angle order
pub fn cycle_sequence(timeline: &EventTimeline, cycles: usize) -> Vec<TriggerEvent> {
    let one = timeline.merged_events();
    let mut out = Vec::with_capacity(one.len() * cycles);
    for _ in 0..cycles {
        out.extend_from_slice(&one);
    }
    out
}

/// Feed `edges` with a fixed delay between consecutive edges.
///
/// Only wheel and edge kind of each event are used; timestamps are
/// `REPLAY_START_TIMESTAMP + i * delay`.
#[instrument(skip(tracker, edges))]
pub fn replay<I>(tracker: &mut PhaseTracker, edges: I, delay: Timestamp) -> ReplayReport
where
    I: IntoIterator<Item = TriggerEvent>,
{
    let timed = edges.into_iter().enumerate().map(|(i, event)| {
        LiveEdge::new(
            REPLAY_START_TIMESTAMP + i as Timestamp * delay,
            event.wheel,
            event.kind,
        )
    });
    replay_timed(tracker, timed)
}

/// Feed already timestamped edges
pub fn replay_timed<I>(tracker: &mut PhaseTracker, edges: I) -> ReplayReport
where
    I: IntoIterator<Item = LiveEdge>,
{
    let mut report = ReplayReport::default();
    for edge in edges {
        report.edges_fed += 1;
        match tracker.feed(edge) {
            Ok(FeedOutcome::Ignored) => report.ignored += 1,
            Ok(FeedOutcome::Acquired { .. }) => {
                report.first_sync_edge.get_or_insert(report.edges_fed);
            }
            Ok(FeedOutcome::Accepted(_)) => {}
            Err(fault) => report.faults.push(fault),
        }
    }
    report.final_status = tracker.sync_status();
    report.final_rpm = tracker.current_rpm().ok();
    report.final_angle = tracker.current_angle().ok();
    report.snapshot = tracker.snapshot();
    tracing::debug!(
        edges = report.edges_fed,
        faults = report.faults.len(),
        first_sync = ?report.first_sync_edge,
        "Replay finished"
    );
    report
}
