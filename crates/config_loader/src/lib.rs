//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON trigger pattern files
//! - Validate configuration legality
//! - Generate `TriggerBlueprint` and build its `EventTimeline`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let (blueprint, timeline) =
//!     ConfigLoader::load_timeline_from_path(Path::new("configs/36-1-cam.toml")).unwrap();
//! println!("{}: {} teeth", blueprint.name, timeline.tooth_count());
//! ```

mod parser;
mod timeline;
mod validator;

pub use contracts::TriggerBlueprint;
pub use parser::ConfigFormat;
pub use timeline::build_timeline;

use contracts::TriggerError;
use std::path::Path;
use waveform::EventTimeline;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<TriggerBlueprint, TriggerError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<TriggerBlueprint, TriggerError> {
        Self::parse_and_validate(content, format)
    }

    /// Load a file and build its timeline in one step
    ///
    /// # Errors
    /// Everything [`Self::load_from_path`] reports, plus builder and shape
    /// errors from finalizing the timeline.
    pub fn load_timeline_from_path(
        path: &Path,
    ) -> Result<(TriggerBlueprint, EventTimeline), TriggerError> {
        let blueprint = Self::load_from_path(path)?;
        let timeline = build_timeline(&blueprint)?;
        Ok((blueprint, timeline))
    }

    /// Serialize TriggerBlueprint to TOML string
    pub fn to_toml(blueprint: &TriggerBlueprint) -> Result<String, TriggerError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| TriggerError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize TriggerBlueprint to JSON string
    pub fn to_json(blueprint: &TriggerBlueprint) -> Result<String, TriggerError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| TriggerError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, TriggerError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            TriggerError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            TriggerError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, TriggerError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<TriggerBlueprint, TriggerError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        tracing::debug!(name = %blueprint.name, ?format, "Configuration loaded");
        Ok(blueprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Acquisition, SecondaryRole, ShapeErrorCode};

    const CAM_36_1_TOML: &str = r#"
name = "36-1 crank with cam"

[pattern]
cycle = "four_stroke_crank"
sync_edge = "rise"
tdc_position = 90.0
secondary_role = "cam_phase"

[[pattern.wheels]]
strategy = "skipped_tooth"
wheel = "primary"
tooth_count = 36
skipped_count = 1

[[pattern.events]]
angle = 95.0
kind = "rise"
wheel = "secondary"

[pattern.sync_gap]
low = 1.5
high = 3.0

[decoder]
secondary_window_deg = 10.0
"#;

    #[test]
    fn test_load_from_str_toml() {
        let bp = ConfigLoader::load_from_str(CAM_36_1_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.name, "36-1 crank with cam");
        assert_eq!(bp.decoder.secondary_window_deg, 10.0);
    }

    #[test]
    fn test_build_timeline_repeats_crank_pattern() {
        let bp = ConfigLoader::load_from_str(CAM_36_1_TOML, ConfigFormat::Toml).unwrap();
        let timeline = build_timeline(&bp).unwrap();
        // 35 teeth per revolution, two revolutions per cycle
        assert_eq!(timeline.tooth_count(), 70);
        assert_eq!(timeline.gap_teeth().len(), 2);
        assert_eq!(timeline.acquisition(), Acquisition::PrimaryGap);
        assert_eq!(timeline.secondary_role(), SecondaryRole::CamPhase);
        assert_eq!(timeline.tdc_position(), 90.0);
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(CAM_36_1_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.name, bp2.name);
        assert_eq!(bp.pattern.wheels, bp2.pattern.wheels);
        assert_eq!(bp.decoder, bp2.decoder);
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(CAM_36_1_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.pattern.events, bp2.pattern.events);
    }

    #[test]
    fn test_shape_error_surfaces_from_build() {
        // a secondary edge sitting exactly on a tooth in pin mode is ambiguous
        let content = r#"
name = "bad pin"
[pattern]
cycle = "two_stroke"
secondary_role = "masked_crank_reference"
[[pattern.wheels]]
strategy = "evenly_spaced"
wheel = "primary"
tooth_count = 24
[[pattern.events]]
angle = 30.0
kind = "rise"
wheel = "secondary"
"#;
        let bp = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap();
        let err = build_timeline(&bp).unwrap_err();
        assert_eq!(err.shape_code(), Some(ShapeErrorCode::AmbiguousReference));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = ConfigLoader::load_from_path(Path::new("pattern.yaml")).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }
}
