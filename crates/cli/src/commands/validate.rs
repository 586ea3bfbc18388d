//! `validate` command implementation.

use anyhow::{Context, Result};
use config_loader::{build_timeline, ConfigLoader};
use contracts::{Acquisition, SecondaryRole, TriggerBlueprint, Wheel};
use serde::Serialize;
use tracing::info;
use waveform::EventTimeline;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<PatternSummary>,
}

impl ValidationResult {
    fn invalid(config_path: String, error: String, error_code: Option<&'static str>) -> Self {
        Self {
            valid: false,
            config_path,
            error: Some(error),
            error_code,
            warnings: None,
            summary: None,
        }
    }
}

#[derive(Serialize)]
struct PatternSummary {
    name: String,
    cycle_degrees: f64,
    primary_edges: usize,
    secondary_edges: usize,
    teeth: usize,
    sync_gaps: usize,
    acquisition: Acquisition,
    secondary_role: SecondaryRole,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult::invalid(
            config_path,
            format!("File not found: {}", args.config.display()),
            None,
        );
    }

    let blueprint = match ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => blueprint,
        Err(e) => return ValidationResult::invalid(config_path, e.to_string(), None),
    };

    // 结构性错误只有在 finalize 时才能发现
    let timeline = match build_timeline(&blueprint) {
        Ok(timeline) => timeline,
        Err(e) => {
            let code = e.shape_code().map(|c| c.as_str());
            return ValidationResult::invalid(config_path, e.to_string(), code);
        }
    };

    let warnings = collect_warnings(&blueprint, &timeline);
    ValidationResult {
        valid: true,
        config_path,
        error: None,
        error_code: None,
        warnings: if warnings.is_empty() {
            None
        } else {
            Some(warnings)
        },
        summary: Some(PatternSummary {
            name: blueprint.name.clone(),
            cycle_degrees: timeline.cycle_length(),
            primary_edges: timeline.events(Wheel::Primary).len(),
            secondary_edges: timeline.events(Wheel::Secondary).len(),
            teeth: timeline.tooth_count(),
            sync_gaps: timeline.gap_teeth().len(),
            acquisition: timeline.acquisition(),
            secondary_role: timeline.secondary_role(),
        }),
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &TriggerBlueprint, timeline: &EventTimeline) -> Vec<String> {
    let mut warnings = Vec::new();

    if timeline.secondary_role() == SecondaryRole::Auxiliary {
        warnings.push(
            "Secondary edges are auxiliary and will be ignored by the decoder".to_string(),
        );
    }

    if blueprint.pattern.secondary_role.is_none() && !timeline.events(Wheel::Secondary).is_empty()
    {
        warnings.push(format!(
            "secondary_role not set - inferred as {:?}",
            timeline.secondary_role()
        ));
    }

    // 次级窗口超过齿距时，相邻齿之间无法区分参考边沿
    let min_spacing = (0..timeline.tooth_count())
        .map(|i| timeline.tooth_spacing(i))
        .fold(f64::INFINITY, f64::min);
    if timeline.needs_secondary_input() && blueprint.decoder.secondary_window_deg >= min_spacing
    {
        warnings.push(format!(
            "decoder.secondary_window_deg ({}) is not smaller than the tooth spacing ({:.3})",
            blueprint.decoder.secondary_window_deg, min_spacing
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Name: {}", summary.name);
            println!("  Cycle: {}°", summary.cycle_degrees);
            println!(
                "  Edges: {} primary / {} secondary",
                summary.primary_edges, summary.secondary_edges
            );
            println!("  Teeth: {} ({} sync gaps)", summary.teeth, summary.sync_gaps);
            println!("  Acquisition: {:?}", summary.acquisition);
            println!("  Secondary role: {:?}", summary.secondary_role);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
