//! Replay pipeline - synthesizer → edge queue → decode worker.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{LiveEdge, TriggerBlueprint};
use decoder::{DecodeWorker, EdgeProducer, EdgeQueue, PhaseTracker};
use observability::{record_desync, record_snapshot};
use replay::{EdgeSynthesizer, SecondaryMode};
use tracing::{debug, info, warn};
use waveform::EventTimeline;

use super::PipelineStats;

/// Interval between snapshot samples while the worker runs
const SAMPLE_PERIOD: Duration = Duration::from_millis(5);

/// Wait applied when the edge queue is full
const BACKPRESSURE_WAIT: Duration = Duration::from_micros(200);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub blueprint: TriggerBlueprint,

    pub timeline: EventTimeline,

    /// Engine cycles to synthesize
    pub cycles: usize,

    pub rpm: f64,

    pub start_angle: f64,

    pub secondary: SecondaryMode,

    /// Per-edge angle noise (degrees) and its seed
    pub jitter: (f64, u64),

    /// Edge queue capacity
    pub queue_capacity: usize,

    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline to completion
    pub async fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let config = self.config;

        if let Some(port) = config.metrics_port {
            observability::install_metrics_exporter(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let (jitter_deg, seed) = config.jitter;
        let edges = EdgeSynthesizer::new(&config.timeline, config.rpm)
            .tick_rate_hz(config.blueprint.decoder.tick_rate_hz)
            .start_angle(config.start_angle)
            .secondary(config.secondary)
            .jitter(jitter_deg, seed)
            .generate(config.cycles);

        info!(
            pattern = %config.blueprint.name,
            edges = edges.len(),
            cycles = config.cycles,
            rpm = config.rpm,
            "Synthesized edge stream"
        );

        let mut stats = PipelineStats {
            edges_generated: edges.len() as u64,
            ..Default::default()
        };

        let tracker = PhaseTracker::new(config.timeline, config.blueprint.decoder.clone())
            .context("Failed to create phase tracker")?;
        let (tx, rx) = EdgeQueue::with_capacity(config.queue_capacity);
        let mut worker = DecodeWorker::spawn(tracker, rx).context("Failed to start decode worker")?;

        let feeder = tokio::spawn(feed_edges(tx, edges));
        let feeder_abort = feeder.abort_handle();

        let sampling = sample_until_fed(&mut worker, feeder, &mut stats);
        let outcome = match config.timeout {
            Some(timeout) => tokio::time::timeout(timeout, sampling).await.ok(),
            None => Some(sampling.await),
        };
        match outcome {
            Some(fed) => stats.edges_fed = fed?,
            None => {
                warn!("Replay timed out");
                feeder_abort.abort();
                stats.timed_out = true;
            }
        }

        info!("Shutting down decode worker...");
        let tracker = worker
            .stop()
            .context("Decode worker terminated abnormally")?;
        drain_faults(&mut worker, &mut stats);
        let dropped = worker.faults_dropped();
        if dropped > 0 {
            warn!(dropped, "Fault queue overflowed; per-reason counts are incomplete");
            stats.decoder_metrics.total_faults += dropped;
        }

        stats.final_snapshot = tracker.snapshot();
        stats.final_rpm = tracker.current_rpm().ok();
        stats.final_angle = tracker.current_angle().ok();
        record_snapshot(&stats.final_snapshot);
        stats.decoder_metrics.update(&stats.final_snapshot);
        if stats.timed_out {
            stats.edges_fed = stats.final_snapshot.edges_seen + tracker.ignored_count();
        }
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            status = %stats.final_snapshot.status,
            faults = stats.final_snapshot.desync_count,
            "Replay complete"
        );

        Ok(stats)
    }
}

/// Push every edge, waiting for room instead of dropping
async fn feed_edges(mut tx: EdgeProducer, edges: Vec<LiveEdge>) -> u64 {
    let mut fed = 0u64;
    for edge in edges {
        while tx.vacant_len() == 0 {
            tokio::time::sleep(BACKPRESSURE_WAIT).await;
        }
        if tx.push(edge).is_ok() {
            fed += 1;
        }
    }
    debug!(fed, dropped = tx.stats().dropped(), "Feeder finished");
    fed
}

/// Sample the worker until the feeder task completes; returns edges fed
async fn sample_until_fed(
    worker: &mut DecodeWorker,
    mut feeder: tokio::task::JoinHandle<u64>,
    stats: &mut PipelineStats,
) -> Result<u64> {
    let mut ticker = tokio::time::interval(SAMPLE_PERIOD);

    loop {
        tokio::select! {
            joined = &mut feeder => {
                return joined.context("Edge feeder task failed");
            }
            _ = ticker.tick() => {
                let snapshot = worker.snapshot();
                record_snapshot(&snapshot);
                stats.decoder_metrics.update(&snapshot);
                drain_faults(worker, stats);
            }
        }
    }
}

/// Record every fault the worker queued since the last drain
fn drain_faults(worker: &mut DecodeWorker, stats: &mut PipelineStats) {
    for fault in worker.take_faults() {
        record_desync(&fault);
        stats.decoder_metrics.record_fault(&fault);
    }
}
