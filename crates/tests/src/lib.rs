//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 配置文件 → EventTimeline → PhaseTracker 的 e2e 测试
//! - 解码线程 + 边沿队列

/// Sample configurations shipped with the workspace
#[cfg(test)]
fn config_path(file: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../configs")
        .join(file)
}

#[cfg(test)]
const CONFIG_FILES: [&str; 5] = [
    "36-1-cam.toml",
    "60-2-cam.toml",
    "135-1-cam.toml",
    "135-pin.toml",
    "12-1-two-stroke.json",
];

#[cfg(test)]
mod contract_tests {
    use contracts::{ConfigVersion, DesyncReason, EdgeKind, SyncEdge, SyncStatus};

    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = ConfigVersion::V1;
        assert_eq!(SyncStatus::default(), SyncStatus::NotSynchronized);
    }

    #[test]
    fn test_sync_edge_authority() {
        assert!(SyncEdge::Rise.accepts(EdgeKind::Rise));
        assert!(!SyncEdge::Rise.accepts(EdgeKind::Fall));
        assert!(SyncEdge::Both.accepts(EdgeKind::Fall));
    }

    #[test]
    fn test_desync_reason_labels_are_distinct() {
        let labels = [
            DesyncReason::UnexpectedGap,
            DesyncReason::MissedGap,
            DesyncReason::ToothCountMismatch,
            DesyncReason::SecondaryMismatch,
            DesyncReason::SecondaryTimeout,
            DesyncReason::EdgeTimeout,
        ]
        .map(DesyncReason::as_str);
        let mut unique = labels.to_vec();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), labels.len());
    }
}

#[cfg(test)]
mod config_file_tests {
    use super::{config_path, CONFIG_FILES};
    use config_loader::ConfigLoader;
    use contracts::Wheel;

    #[test]
    fn test_all_shipped_configs_build() {
        for file in CONFIG_FILES {
            let (blueprint, timeline) = ConfigLoader::load_timeline_from_path(&config_path(file))
                .unwrap_or_else(|e| panic!("{file}: {e}"));
            let [primary, secondary] = blueprint.expected_edge_counts();
            assert_eq!(timeline.events(Wheel::Primary).len(), primary, "{file}");
            assert_eq!(timeline.events(Wheel::Secondary).len(), secondary, "{file}");
            assert!(timeline.tooth_count() > 0, "{file}");
        }
    }

    #[test]
    fn test_135_1_primary_edge_count() {
        let (_, timeline) =
            ConfigLoader::load_timeline_from_path(&config_path("135-1-cam.toml")).unwrap();
        assert_eq!(timeline.events(Wheel::Primary).len(), 2 * (135 - 1));
        assert!(timeline.needs_secondary_input());
    }

    #[test]
    fn test_toml_round_trip_keeps_timeline() {
        let (blueprint, timeline) =
            ConfigLoader::load_timeline_from_path(&config_path("60-2-cam.toml")).unwrap();
        let text = ConfigLoader::to_toml(&blueprint).unwrap();
        let reloaded =
            ConfigLoader::load_from_str(&text, config_loader::ConfigFormat::Toml).unwrap();
        let rebuilt = config_loader::build_timeline(&reloaded).unwrap();
        assert_eq!(rebuilt.merged_events(), timeline.merged_events());
    }
}

#[cfg(test)]
mod e2e_tests {
    use super::{config_path, CONFIG_FILES};
    use config_loader::ConfigLoader;
    use contracts::{Acquisition, SyncEdge, SyncStatus, TriggerBlueprint};
    use decoder::{FeedOutcome, PhaseTracker};
    use observability::DecoderMetricsAggregator;
    use replay::{
        cycle_sequence, replay, replay_timed, EdgeSynthesizer, SecondaryMode, REPLAY_START_TIMESTAMP,
    };
    use waveform::EventTimeline;

    const RPM: f64 = 1_000.0;

    fn load(file: &str) -> (TriggerBlueprint, EventTimeline) {
        ConfigLoader::load_timeline_from_path(&config_path(file)).unwrap()
    }

    fn tracker(blueprint: &TriggerBlueprint, timeline: EventTimeline) -> PhaseTracker {
        PhaseTracker::new(timeline, blueprint.decoder.clone()).unwrap()
    }

    /// 从任意起始角度出发，两个周期内必须同步。
    ///
    /// 计时从第一个被采纳的边沿开始：非权威极性的边沿对解码器不可见。
    #[test]
    fn test_sync_within_two_cycles_from_any_offset() {
        for file in CONFIG_FILES {
            let (blueprint, timeline) = load(file);
            let cycle = timeline.cycle_length();
            for step in 0..48 {
                let start = step as f64 * cycle / 48.0 + 0.37;
                let synth = EdgeSynthesizer::new(&timeline, RPM).start_angle(start);
                let limit = (2.0 * cycle * synth.ticks_per_degree()).ceil() as u64 + 1;
                let edges = synth.generate(3);
                let mut tracker = tracker(&blueprint, timeline.clone());

                let mut first = None;
                let mut acquired = None;
                for edge in &edges {
                    match tracker.feed(*edge) {
                        Ok(FeedOutcome::Ignored) => continue,
                        Ok(FeedOutcome::Acquired { .. }) => {
                            first.get_or_insert(edge.timestamp);
                            acquired = Some(edge.timestamp);
                            break;
                        }
                        _ => {
                            first.get_or_insert(edge.timestamp);
                        }
                    }
                }
                let (Some(first), Some(acquired)) = (first, acquired) else {
                    panic!("{file}: start {start} never synchronized");
                };
                assert!(
                    acquired - first <= limit,
                    "{file}: start {start} took {} ticks (limit {limit})",
                    acquired - first
                );
            }
        }
    }

    #[test]
    fn test_angle_tracks_synthetic_wheel() {
        let (blueprint, timeline) = load("36-1-cam.toml");
        let edges = EdgeSynthesizer::new(&timeline, RPM)
            .start_angle(200.0)
            .generate(3);
        let mut tracker = tracker(&blueprint, timeline);
        let report = replay_timed(&mut tracker, edges);

        assert!(report.synchronized(), "{report}");
        assert!(report.faults.is_empty(), "{report}");
        // last edge of cycle 3 is the fall of the tooth at 190 (tdc 90)
        let angle = report.final_angle.unwrap();
        assert!((angle - 100.0).abs() < 1e-9, "angle {angle}");
        let rpm = report.final_rpm.unwrap();
        assert!((rpm - RPM).abs() / RPM < 0.01, "rpm {rpm}");
    }

    /// 135 齿均布 + 1 个参考脉冲，固定延时 400 个边沿
    #[test]
    fn test_135_pin_fixed_delay() {
        let (blueprint, timeline) = load("135-pin.toml");
        let per_cycle = timeline.len();
        // 135 齿 × 2 + 参考脉冲的上升沿和下降沿
        assert_eq!(per_cycle, 272);
        assert_eq!(blueprint.pattern.sync_edge, SyncEdge::Rise);
        assert_eq!(timeline.secondary_refs().len(), 1);

        let delay = 100;
        let edges = cycle_sequence(&timeline, 2).into_iter().take(400);
        let mut tracker = tracker(&blueprint, timeline);
        let report = replay(&mut tracker, edges, delay);

        assert_eq!(report.edges_fed, 400);
        assert!(report.first_sync_edge.unwrap() < 400, "{report}");
        assert!(report.faults.is_empty(), "{report}");
        // the pin's fall never reaches the state machine
        assert!(tracker.ignored_count() > 135, "{report}");

        // two fixed delays between rising edges, 720/135 degrees per tooth
        let expected = blueprint.decoder.rpm_from(720.0 / 135.0, 2 * delay);
        let rpm = report.final_rpm.unwrap();
        assert!(rpm > 0.0);
        assert!((rpm - expected).abs() / expected < 0.01, "rpm {rpm} vs {expected}");
    }

    #[test]
    fn test_135_1_delayed_secondary_within_window() {
        let (blueprint, timeline) = load("135-1-cam.toml");
        assert_eq!(blueprint.decoder.secondary_window_deg, 2.5);
        assert_eq!(timeline.tdc_position(), 60.0);
        for delay in [0.0, 1.0, 2.0, -2.0] {
            let edges = EdgeSynthesizer::new(&timeline, RPM)
                .start_angle(300.0)
                .secondary(SecondaryMode::Delayed { degrees: delay })
                .generate(3);
            let mut tracker = tracker(&blueprint, timeline.clone());
            let report = replay_timed(&mut tracker, edges);
            assert!(report.synchronized(), "delay {delay}: {report}");
            assert!(report.faults.is_empty(), "delay {delay}: {report}");

            // last edge is the rise of tooth 56; engine angle is shifted by TDC
            let tooth = 56.0 * 720.0 / 135.0;
            assert!((tracker.tooth_angle().unwrap() - tooth).abs() < 1e-6);
            let angle = report.final_angle.unwrap();
            assert!((angle - (tooth - 60.0)).abs() < 1e-6, "delay {delay}: angle {angle}");
        }
    }

    #[test]
    fn test_135_1_secondary_outside_window_desyncs() {
        let (blueprint, timeline) = load("135-1-cam.toml");
        // 0: cam before the gap; 300: gap before the cam
        for start in [0.0, 300.0] {
            let edges = EdgeSynthesizer::new(&timeline, RPM)
                .start_angle(start)
                .secondary(SecondaryMode::Delayed { degrees: 3.5 })
                .generate(3);
            let mut tracker = tracker(&blueprint, timeline.clone());
            let report = replay_timed(&mut tracker, edges);
            assert_eq!(report.first_sync_edge, None, "start {start}: {report}");
            assert!(!report.faults.is_empty());
        }
    }

    /// 需要凸轮信号的模式只喂曲轴信号，永远停在 TENTATIVE
    #[test]
    fn test_primary_only_never_synchronizes() {
        for file in ["135-1-cam.toml", "36-1-cam.toml", "135-pin.toml"] {
            let (blueprint, timeline) = load(file);
            let edges = EdgeSynthesizer::new(&timeline, RPM)
                .secondary(SecondaryMode::Dropped)
                .generate(4);
            let mut tracker = tracker(&blueprint, timeline);

            let gap_landmarks = tracker.timeline().acquisition() == Acquisition::PrimaryGap;
            let mut saw_tentative = false;
            for edge in edges {
                let outcome = tracker.feed(edge);
                assert!(
                    !matches!(outcome, Ok(FeedOutcome::Acquired { .. })),
                    "{file} synchronized without secondary"
                );
                saw_tentative |= tracker.sync_status() == SyncStatus::Tentative;
            }
            // 参考销模式没有销就连 TENTATIVE 都进不去
            assert_eq!(saw_tentative, gap_landmarks, "{file}");
            assert!(tracker.current_angle().is_err());
            assert!(tracker.current_rpm().is_err());
        }
    }

    #[test]
    fn test_jitter_keeps_sync() {
        let (blueprint, timeline) = load("36-1-cam.toml");
        let edges = EdgeSynthesizer::new(&timeline, RPM)
            .start_angle(45.0)
            .jitter(0.2, 42)
            .generate(6);
        let mut tracker = tracker(&blueprint, timeline);
        let report = replay_timed(&mut tracker, edges);

        assert!(report.synchronized(), "{report}");
        assert!(report.faults.is_empty(), "{report}");
        let rpm = report.final_rpm.unwrap();
        assert!((rpm - RPM).abs() / RPM < 0.1, "rpm {rpm}");
    }

    #[test]
    fn test_speed_change_keeps_sync() {
        // 1000 rpm then 1500 rpm, stitched at a cycle boundary
        let (blueprint, timeline) = load("60-2-cam.toml");
        let slow = EdgeSynthesizer::new(&timeline, RPM);
        let resume = REPLAY_START_TIMESTAMP
            + (2.0 * timeline.cycle_length() * slow.ticks_per_degree()).round() as u64;
        let fast = EdgeSynthesizer::new(&timeline, 1.5 * RPM)
            .start_timestamp(resume)
            .generate(2);
        let slow = slow.generate(2);
        let mut tracker = tracker(&blueprint, timeline);
        let report = replay_timed(&mut tracker, slow.into_iter().chain(fast));

        assert!(report.synchronized(), "{report}");
        let rpm = report.final_rpm.unwrap();
        assert!((rpm - 1.5 * RPM).abs() / (1.5 * RPM) < 0.01, "rpm {rpm}");
    }

    #[test]
    fn test_metrics_aggregator_over_replay() {
        let (blueprint, timeline) = load("36-1-cam.toml");
        let edges = EdgeSynthesizer::new(&timeline, RPM).generate(3);
        let mut tracker = tracker(&blueprint, timeline);
        let mut aggregator = DecoderMetricsAggregator::new();
        for edge in edges {
            if let Err(fault) = tracker.feed(edge) {
                aggregator.record_fault(&fault);
            }
            aggregator.update(&tracker.snapshot());
        }
        let summary = aggregator.summary();
        assert_eq!(summary.total_faults, 0);
        assert!(summary.sync_rate > 0.0 && summary.sync_rate < 100.0);
        assert!((summary.rpm.mean - RPM).abs() / RPM < 0.01);
    }

    #[test]
    fn test_stall_drops_sync() {
        let (blueprint, timeline) = load("36-1-cam.toml");
        let mut edges = EdgeSynthesizer::new(&timeline, RPM).generate(3);
        let last = edges.last().map(|e| e.timestamp).unwrap_or_default();
        let max = blueprint.decoder.max_tooth_interval_ticks;
        edges.push(contracts::LiveEdge::primary(
            last + 2 * max,
            contracts::EdgeKind::Rise,
        ));

        let mut tracker = tracker(&blueprint, timeline);
        let report = replay_timed(&mut tracker, edges);
        assert!(report.first_sync_edge.is_some());
        assert_eq!(report.final_status, SyncStatus::NotSynchronized);
        assert_eq!(
            report.faults.last().map(|f| f.reason),
            Some(contracts::DesyncReason::EdgeTimeout)
        );
        assert!(report.final_rpm.is_none());
    }
}

#[cfg(test)]
mod worker_tests {
    use std::time::Duration;

    use super::config_path;
    use config_loader::ConfigLoader;
    use contracts::SyncStatus;
    use decoder::{DecodeWorker, EdgeQueue, PhaseTracker};
    use replay::EdgeSynthesizer;

    /// End-to-end test: EdgeSynthesizer -> EdgeQueue -> DecodeWorker
    ///
    /// 生产端在 tokio 任务中推送，队列满时让出；解码线程独立消费。
    #[tokio::test]
    async fn test_e2e_queue_to_worker() {
        let (blueprint, timeline) =
            ConfigLoader::load_timeline_from_path(&config_path("60-2-cam.toml")).unwrap();
        let edges = EdgeSynthesizer::new(&timeline, 1_200.0)
            .start_angle(123.0)
            .generate(4);
        let total = edges.len();
        let tracker = PhaseTracker::new(timeline, blueprint.decoder.clone()).unwrap();

        let (mut tx, rx) = EdgeQueue::with_capacity(32);
        let worker = DecodeWorker::spawn(tracker, rx).unwrap();

        let feeder = tokio::spawn(async move {
            for edge in edges {
                while tx.vacant_len() == 0 {
                    tokio::time::sleep(Duration::from_micros(200)).await;
                }
                if tx.push(edge).is_err() {
                    return Err(edge);
                }
            }
            Ok(tx.stats().pushed())
        });
        let pushed = tokio::time::timeout(Duration::from_secs(10), feeder)
            .await
            .expect("feeder timed out")
            .unwrap()
            .unwrap();
        assert_eq!(pushed as usize, total);

        let tracker = worker.shutdown().unwrap();
        assert_eq!(tracker.sync_status(), SyncStatus::Synchronized);
        let rpm = tracker.current_rpm().unwrap();
        assert!((rpm - 1_200.0).abs() / 1_200.0 < 0.01, "rpm {rpm}");
    }

    #[test]
    fn test_worker_publishes_snapshots() {
        let (blueprint, timeline) =
            ConfigLoader::load_timeline_from_path(&config_path("135-pin.toml")).unwrap();
        let edges = EdgeSynthesizer::new(&timeline, 900.0).generate(3);
        let tracker = PhaseTracker::new(timeline, blueprint.decoder.clone()).unwrap();

        let (mut tx, rx) = EdgeQueue::with_capacity(edges.len());
        let worker = DecodeWorker::spawn(tracker, rx).unwrap();
        let total = edges.len() as u64;
        for edge in edges {
            tx.push(edge).unwrap();
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while worker.snapshot().status != SyncStatus::Synchronized
            && std::time::Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(1));
        }
        let snapshot = worker.snapshot();
        assert_eq!(snapshot.status, SyncStatus::Synchronized);
        assert_eq!(snapshot.sync_count, 1);
        assert_eq!(worker.fault_count(), 0);
        assert!(worker.last_fault().is_none());

        let tracker = worker.shutdown().unwrap();
        // rises of both wheels; falls are ignored
        assert_eq!(tracker.snapshot().edges_seen + tracker.ignored_count(), total);
    }
}
