//! `replay` command implementation.

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use replay::SecondaryMode;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::ReplayArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `replay` command
pub async fn run_replay(args: &ReplayArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }
    if !(args.rpm.is_finite() && args.rpm > 0.0) {
        anyhow::bail!("--rpm must be a positive number, got {}", args.rpm);
    }

    let (blueprint, timeline) = ConfigLoader::load_timeline_from_path(&args.config)
        .with_context(|| format!("Failed to load pattern from {}", args.config.display()))?;

    info!(
        name = %blueprint.name,
        teeth = timeline.tooth_count(),
        acquisition = ?timeline.acquisition(),
        "Pattern loaded"
    );

    let pipeline_config = PipelineConfig {
        blueprint,
        timeline,
        cycles: args.cycles,
        rpm: args.rpm,
        start_angle: args.start_angle,
        secondary: secondary_mode(args),
        jitter: (args.jitter, args.seed),
        queue_capacity: args.queue_capacity,
        timeout: if args.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(args.timeout))
        },
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    let pipeline = Pipeline::new(pipeline_config);
    let shutdown_signal = setup_shutdown_signal();

    info!("Starting replay...");

    tokio::select! {
        result = pipeline.run() => {
            let stats = result.context("Replay execution failed")?;
            info!(
                edges = stats.edges_fed,
                status = %stats.final_snapshot.status,
                edges_per_sec = format!("{:.0}", stats.edges_per_sec()),
                "Replay completed successfully"
            );
            if args.json {
                let json = serde_json::to_string_pretty(&stats.report())
                    .context("Failed to serialize replay report")?;
                println!("{}", json);
            } else {
                stats.print_summary();
            }
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping replay...");
        }
    }

    Ok(())
}

fn secondary_mode(args: &ReplayArgs) -> SecondaryMode {
    if args.drop_secondary {
        SecondaryMode::Dropped
    } else if let Some(degrees) = args.secondary_delay {
        SecondaryMode::Delayed { degrees }
    } else {
        SecondaryMode::Present
    }
}

/// Ctrl+C and SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
