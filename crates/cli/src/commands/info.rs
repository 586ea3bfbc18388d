//! `info` command implementation.

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::{
    Acquisition, CycleKind, DecoderConfig, SecondaryRole, SyncEdge, TriggerBlueprint,
    TriggerEvent, Wheel,
};
use serde::Serialize;
use tracing::info;
use waveform::EventTimeline;

use crate::cli::InfoArgs;

/// Pattern info for JSON output
#[derive(Serialize)]
struct PatternInfo {
    name: String,
    version: String,
    cycle: CycleKind,
    cycle_degrees: f64,
    sync_edge: SyncEdge,
    tdc_position: f64,
    acquisition: Acquisition,
    secondary_role: SecondaryRole,
    wheels: Vec<WheelInfo>,
    teeth: usize,
    gap_teeth: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sync_gap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secondary_sync_gap: Option<String>,
    secondary_refs: Vec<TriggerEvent>,
    decoder: DecoderConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    events: Vec<TriggerEvent>,
}

#[derive(Serialize)]
struct WheelInfo {
    wheel: Wheel,
    edges: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading pattern info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let (blueprint, timeline) = ConfigLoader::load_timeline_from_path(&args.config)
        .with_context(|| format!("Failed to load pattern from {}", args.config.display()))?;

    if args.json {
        let info = build_pattern_info(&blueprint, &timeline, args.events);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize pattern info")?;
        println!("{}", json);
    } else {
        print_pattern_info(&blueprint, &timeline, args.events);
    }

    Ok(())
}

fn build_pattern_info(
    blueprint: &TriggerBlueprint,
    timeline: &EventTimeline,
    with_events: bool,
) -> PatternInfo {
    PatternInfo {
        name: blueprint.name.clone(),
        version: format!("{:?}", blueprint.version),
        cycle: timeline.cycle_kind(),
        cycle_degrees: timeline.cycle_length(),
        sync_edge: timeline.sync_edge(),
        tdc_position: timeline.tdc_position(),
        acquisition: timeline.acquisition(),
        secondary_role: timeline.secondary_role(),
        wheels: Wheel::ALL
            .iter()
            .map(|&wheel| WheelInfo {
                wheel,
                edges: timeline.events(wheel).len(),
            })
            .collect(),
        teeth: timeline.tooth_count(),
        gap_teeth: timeline.gap_teeth().to_vec(),
        sync_gap: timeline.sync_gap_range().map(|r| r.to_string()),
        secondary_sync_gap: timeline.secondary_gap_range().map(|r| r.to_string()),
        secondary_refs: timeline.secondary_refs().to_vec(),
        decoder: blueprint.decoder.clone(),
        events: if with_events {
            timeline.merged_events()
        } else {
            Vec::new()
        },
    }
}

fn print_pattern_info(blueprint: &TriggerBlueprint, timeline: &EventTimeline, with_events: bool) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  Trigger Pattern                             ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⚙️  Pattern");
    println!("   ├─ Name: {}", blueprint.name);
    println!("   ├─ Version: {:?}", blueprint.version);
    println!(
        "   ├─ Cycle: {:?} ({}°)",
        timeline.cycle_kind(),
        timeline.cycle_length()
    );
    println!("   ├─ Sync edge: {:?}", timeline.sync_edge());
    println!("   └─ TDC position: {}°", timeline.tdc_position());

    println!("\n🔧 Wheels");
    for (i, wheel) in Wheel::ALL.iter().enumerate() {
        let prefix = if i == Wheel::ALL.len() - 1 { "└─" } else { "├─" };
        println!(
            "   {} {}: {} edges",
            prefix,
            wheel,
            timeline.events(*wheel).len()
        );
    }

    println!("\n🎯 Synchronization");
    println!("   ├─ Acquisition: {:?}", timeline.acquisition());
    println!("   ├─ Secondary role: {:?}", timeline.secondary_role());
    println!("   ├─ Decoded teeth: {}", timeline.tooth_count());
    match timeline.sync_gap_range() {
        Some(range) => println!(
            "   ├─ Sync gap: {} at teeth {:?}",
            range,
            timeline.gap_teeth()
        ),
        None => println!("   ├─ Sync gap: none"),
    }
    if let Some(range) = timeline.secondary_gap_range() {
        println!("   ├─ Secondary gap: {}", range);
    }
    if timeline.secondary_refs().is_empty() {
        println!("   └─ Secondary references: none");
    } else {
        let refs: Vec<String> = timeline
            .secondary_refs()
            .iter()
            .map(|e| format!("{} @ {:.3}°", e.kind, e.angle))
            .collect();
        println!("   └─ Secondary references: {}", refs.join(", "));
    }

    let decoder = &blueprint.decoder;
    println!("\n⏱  Decoder");
    println!("   ├─ Tick rate: {} Hz", decoder.tick_rate_hz);
    println!(
        "   ├─ Max tooth interval: {} ticks",
        decoder.max_tooth_interval_ticks
    );
    println!("   ├─ Noise floor: {} ticks", decoder.noise_floor_ticks);
    println!(
        "   ├─ RPM outliers: x{} (reseed after {})",
        decoder.rpm_outlier_factor, decoder.max_consecutive_outliers
    );
    println!("   └─ Secondary window: ±{}°", decoder.secondary_window_deg);

    if with_events {
        let events = timeline.merged_events();
        println!("\n📋 Events ({})", events.len());
        for (i, event) in events.iter().enumerate() {
            let prefix = if i == events.len() - 1 { "└─" } else { "├─" };
            println!(
                "   {} {:>9.3}°  {:<9} {}",
                prefix,
                event.angle,
                event.wheel.as_str(),
                event.kind
            );
        }
    }

    println!();
}
