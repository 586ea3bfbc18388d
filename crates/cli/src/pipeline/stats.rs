//! Replay statistics and metrics.

use std::time::Duration;

use contracts::DecoderSnapshot;
use observability::DecoderMetricsAggregator;
use serde::Serialize;

/// Statistics from a replay run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Edges produced by the synthesizer
    pub edges_generated: u64,

    /// Edges handed to the decode worker
    pub edges_fed: u64,

    /// Total duration of the run
    pub duration: Duration,

    /// Whether the run was cut short by the timeout
    pub timed_out: bool,

    /// Decoder state after the worker drained its queue
    pub final_snapshot: DecoderSnapshot,

    pub final_rpm: Option<f64>,

    pub final_angle: Option<f64>,

    /// Snapshot samples taken while the worker was running
    pub decoder_metrics: DecoderMetricsAggregator,
}

/// JSON view of [`PipelineStats`]
#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub edges_generated: u64,
    pub edges_fed: u64,
    pub duration_secs: f64,
    pub edges_per_sec: f64,
    pub timed_out: bool,
    pub snapshot: DecoderSnapshot,
    pub final_rpm: Option<f64>,
    pub final_angle: Option<f64>,
    pub sampled_faults: std::collections::BTreeMap<&'static str, u64>,
}

impl PipelineStats {
    /// Edge throughput of the decode path
    pub fn edges_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.edges_fed as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn report(&self) -> StatsReport {
        StatsReport {
            edges_generated: self.edges_generated,
            edges_fed: self.edges_fed,
            duration_secs: self.duration.as_secs_f64(),
            edges_per_sec: self.edges_per_sec(),
            timed_out: self.timed_out,
            snapshot: self.final_snapshot,
            final_rpm: self.final_rpm,
            final_angle: self.final_angle,
            sampled_faults: self.decoder_metrics.fault_counts.clone(),
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Replay Statistics                         ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        let snapshot = &self.final_snapshot;
        println!("📊 Overview");
        println!("   ├─ Duration: {:.3}s", self.duration.as_secs_f64());
        println!("   ├─ Edges generated: {}", self.edges_generated);
        println!("   ├─ Edges fed: {}", self.edges_fed);
        println!("   ├─ Edges decoded: {}", snapshot.edges_seen);
        println!("   ├─ Throughput: {:.0} edges/s", self.edges_per_sec());
        if self.timed_out {
            println!("   ├─ ⚠ Timed out before all edges were fed");
        }
        println!("   └─ Final status: {}", snapshot.status);

        println!("\n🎯 Decoder");
        println!("   ├─ Sync acquisitions: {}", snapshot.sync_count);
        println!("   ├─ Desync faults: {}", snapshot.desync_count);
        match self.final_rpm {
            Some(rpm) => println!("   ├─ RPM: {:.1}", rpm),
            None => println!("   ├─ RPM: n/a"),
        }
        match self.final_angle {
            Some(angle) => println!("   └─ Engine angle: {:.2}°", angle),
            None => println!("   └─ Engine angle: n/a"),
        }

        let summary = self.decoder_metrics.summary();
        println!("\n📈 Sampled Metrics");
        println!(
            "   ├─ Samples: {} ({:.2}% synchronized)",
            summary.samples, summary.sync_rate
        );
        println!("   └─ RPM: {}", summary.rpm);

        if !summary.fault_counts.is_empty() {
            println!("\n⚠️  Faults by reason");
            for (reason, count) in &summary.fault_counts {
                println!("   ├─ {}: {}", reason, count);
            }
        }

        println!();
    }
}
