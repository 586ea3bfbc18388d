//! Timestamped edge streams for a wheel spinning at constant speed.

use contracts::{LiveEdge, Timestamp, Wheel};
use rand::{rngs::StdRng, Rng, SeedableRng};
use waveform::EventTimeline;

use crate::harness::REPLAY_START_TIMESTAMP;

/// How the secondary wheel appears in the generated stream
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SecondaryMode {
    #[default]
    Present,
    /// No secondary edges at all (sensor failure)
    Dropped,
    /// Every secondary edge arrives this many degrees late
    Delayed { degrees: f64 },
}

/// Generates the edges an ideal sensor pair would see.
///
/// Unlike [`crate::replay`] the timestamps follow the real angular spacing,
/// so missing-tooth gaps and RPM are visible to the tracker.
#[derive(Debug, Clone)]
pub struct EdgeSynthesizer<'a> {
    timeline: &'a EventTimeline,
    rpm: f64,
    tick_rate_hz: u64,
    start_angle: f64,
    start_timestamp: Timestamp,
    secondary: SecondaryMode,
    jitter_deg: f64,
    seed: u64,
}

impl<'a> EdgeSynthesizer<'a> {
    pub fn new(timeline: &'a EventTimeline, rpm: f64) -> Self {
        Self {
            timeline,
            rpm,
            tick_rate_hz: 1_000_000,
            start_angle: 0.0,
            start_timestamp: REPLAY_START_TIMESTAMP,
            secondary: SecondaryMode::Present,
            jitter_deg: 0.0,
            seed: 0,
        }
    }

    pub fn tick_rate_hz(mut self, hz: u64) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    /// Trigger angle the wheel is at when the stream starts
    pub fn start_angle(mut self, angle: f64) -> Self {
        self.start_angle = angle.rem_euclid(self.timeline.cycle_length());
        self
    }

    pub fn start_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.start_timestamp = timestamp;
        self
    }

    pub fn secondary(mut self, mode: SecondaryMode) -> Self {
        self.secondary = mode;
        self
    }

    /// Uniform per-edge angle noise in `[-degrees, degrees]`, reproducible per seed
    pub fn jitter(mut self, degrees: f64, seed: u64) -> Self {
        self.jitter_deg = degrees.abs();
        self.seed = seed;
        self
    }

    pub fn ticks_per_degree(&self) -> f64 {
        self.tick_rate_hz as f64 / (self.rpm * 6.0)
    }

    /// Edges of `cycles` full cycles starting at the configured angle,
    /// ordered by timestamp
    pub fn generate(&self, cycles: usize) -> Vec<LiveEdge> {
        let cycle = self.timeline.cycle_length();
        let end = self.start_angle + cycles as f64 * cycle;
        let tpd = self.ticks_per_degree();
        let mut rng = StdRng::seed_from_u64(self.seed);

        let events = self.timeline.merged_events();
        let mut out: Vec<(f64, LiveEdge)> = Vec::with_capacity(events.len() * (cycles + 1));
        for c in 0..=cycles {
            for event in &events {
                let mut angle = c as f64 * cycle + event.angle;
                if event.wheel == Wheel::Secondary {
                    match self.secondary {
                        SecondaryMode::Present => {}
                        SecondaryMode::Dropped => continue,
                        SecondaryMode::Delayed { degrees } => angle += degrees,
                    }
                }
                if angle < self.start_angle || angle >= end {
                    continue;
                }
                if self.jitter_deg > 0.0 {
                    angle += rng.random_range(-self.jitter_deg..=self.jitter_deg);
                }
                let elapsed = ((angle - self.start_angle).max(0.0) * tpd).round() as Timestamp;
                out.push((
                    angle,
                    LiveEdge::new(self.start_timestamp + elapsed, event.wheel, event.kind),
                ));
            }
        }
        out.sort_by(|a, b| a.0.total_cmp(&b.0));
        out.into_iter().map(|(_, edge)| edge).collect()
    }
}
