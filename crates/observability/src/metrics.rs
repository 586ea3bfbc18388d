//! Decoder 指标收集模块
//!
//! 基于 DecoderSnapshot / DesyncFault 收集和统计解码器的运行指标。
//! 边沿计数、同步次数等热路径指标由 decoder crate 直接上报。

use std::collections::BTreeMap;

use contracts::{DecoderSnapshot, DesyncFault, SyncStatus};
use metrics::{counter, gauge, histogram};

/// 从 DecoderSnapshot 记录指标
///
/// 由消费线程周期性调用 (例如每次从 mailbox 读出快照后)。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_snapshot;
///
/// let snapshot = worker.snapshot();
/// record_snapshot(&snapshot);
/// ```
pub fn record_snapshot(snapshot: &DecoderSnapshot) {
    gauge!("trigger_sync_status").set(snapshot.status.as_u8() as f64);
    gauge!("trigger_edges_seen").set(snapshot.edges_seen as f64);
    gauge!("trigger_sync_count").set(snapshot.sync_count as f64);
    gauge!("trigger_desync_count").set(snapshot.desync_count as f64);

    // 仅在同步状态下角度/转速有意义
    if snapshot.status == SyncStatus::Synchronized {
        gauge!("trigger_engine_angle_degrees").set(snapshot.engine_angle);
        gauge!("trigger_tooth_index").set(snapshot.tooth_index as f64);
        histogram!("trigger_rpm_hist").record(snapshot.rpm);
    }
}

/// 记录一次失步故障 (计数已由 decoder 上报，这里补充故障位置信息)
pub fn record_desync(fault: &DesyncFault) {
    gauge!("trigger_last_desync_tooth_index").set(fault.tooth_index as f64);
    counter!(
        "trigger_desync_reported_total",
        "reason" => fault.reason.as_str(),
        "previous" => fault.previous.as_str()
    )
    .increment(1);
}

/// 解码器指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DecoderMetricsAggregator {
    /// 快照样本数
    pub samples: u64,

    /// 处于同步状态的样本数
    pub synchronized_samples: u64,

    /// 失步故障总数
    pub total_faults: u64,

    /// 转速统计 (仅同步样本)
    pub rpm_stats: RunningStats,

    /// 各原因的失步次数
    pub fault_counts: BTreeMap<&'static str, u64>,
}

impl DecoderMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新快照统计
    pub fn update(&mut self, snapshot: &DecoderSnapshot) {
        self.samples += 1;
        if snapshot.status == SyncStatus::Synchronized {
            self.synchronized_samples += 1;
            if snapshot.rpm > 0.0 {
                self.rpm_stats.push(snapshot.rpm);
            }
        }
    }

    /// 更新故障统计
    pub fn record_fault(&mut self, fault: &DesyncFault) {
        self.total_faults += 1;
        *self.fault_counts.entry(fault.reason.as_str()).or_insert(0) += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            samples: self.samples,
            synchronized_samples: self.synchronized_samples,
            sync_rate: if self.samples > 0 {
                self.synchronized_samples as f64 / self.samples as f64 * 100.0
            } else {
                0.0
            },
            total_faults: self.total_faults,
            rpm: StatsSummary::from(&self.rpm_stats),
            fault_counts: self.fault_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub samples: u64,
    pub synchronized_samples: u64,
    pub sync_rate: f64,
    pub total_faults: u64,
    pub rpm: StatsSummary,
    pub fault_counts: BTreeMap<&'static str, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Decoder Metrics Summary ===")?;
        writeln!(f, "Samples: {}", self.samples)?;
        writeln!(
            f,
            "Synchronized: {} ({:.2}%)",
            self.synchronized_samples, self.sync_rate
        )?;
        writeln!(f, "Desync faults: {}", self.total_faults)?;
        writeln!(f, "RPM: {}", self.rpm)?;

        if !self.fault_counts.is_empty() {
            writeln!(f, "Faults by reason:")?;
            for (reason, count) in &self.fault_counts {
                writeln!(f, "  {}: {}", reason, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.2} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::DesyncReason;

    fn synced(rpm: f64) -> DecoderSnapshot {
        DecoderSnapshot {
            status: SyncStatus::Synchronized,
            rpm,
            ..Default::default()
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_only_counts_synced_rpm() {
        let mut aggregator = DecoderMetricsAggregator::new();
        aggregator.update(&DecoderSnapshot::default());
        aggregator.update(&synced(1000.0));
        aggregator.update(&synced(1200.0));

        assert_eq!(aggregator.samples, 3);
        assert_eq!(aggregator.synchronized_samples, 2);
        assert_eq!(aggregator.rpm_stats.count(), 2);
        assert!((aggregator.rpm_stats.mean() - 1100.0).abs() < 1e-9);
    }

    #[test]
    fn test_fault_counts_by_reason() {
        let mut aggregator = DecoderMetricsAggregator::new();
        let fault = DesyncFault {
            reason: DesyncReason::MissedGap,
            timestamp: 10,
            previous: SyncStatus::Synchronized,
            tooth_index: 4,
        };
        aggregator.record_fault(&fault);
        aggregator.record_fault(&fault);

        let summary = aggregator.summary();
        assert_eq!(summary.total_faults, 2);
        assert_eq!(summary.fault_counts.get("missed_gap"), Some(&2));
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = DecoderMetricsAggregator::new();
        for _ in 0..3 {
            aggregator.update(&synced(1500.0));
        }
        aggregator.update(&DecoderSnapshot::default());

        let output = aggregator.summary().to_string();
        assert!(output.contains("Samples: 4"));
        assert!(output.contains("75.00%"));
        assert!(output.contains("mean=1500.0"));
    }

    #[test]
    fn test_record_without_recorder_is_noop() {
        record_snapshot(&synced(900.0));
        record_desync(&DesyncFault {
            reason: DesyncReason::EdgeTimeout,
            timestamp: 1,
            previous: SyncStatus::Tentative,
            tooth_index: 0,
        });
    }
}
