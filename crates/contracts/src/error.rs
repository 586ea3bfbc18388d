//! Layered error definitions
//!
//! Categorized by source: configuration / shape / runtime / config file

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::{SyncStatus, Timestamp};

/// Unified error type
#[derive(Debug, Error)]
pub enum TriggerError {
    // ===== Builder Errors =====
    /// Builder misuse (double init, angle out of range, invalid gap range)
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Structural invariant violated at finalize
    #[error("shape definition error [{code}]: {message}")]
    ShapeDefinition {
        code: ShapeErrorCode,
        message: String,
    },

    // ===== Runtime Errors =====
    /// Query made while the decoder is not synchronized
    #[error("decoder not synchronized (status: {status})")]
    NotSynchronized { status: SyncStatus },

    /// Decoder lost synchronization
    #[error(transparent)]
    Desync(#[from] DesyncFault),

    // ===== Config File Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TriggerError {
    /// Create builder configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create shape definition error
    pub fn shape(code: ShapeErrorCode, message: impl Into<String>) -> Self {
        Self::ShapeDefinition {
            code,
            message: message.into(),
        }
    }

    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Diagnostic code if this is a shape definition error
    pub fn shape_code(&self) -> Option<ShapeErrorCode> {
        match self {
            Self::ShapeDefinition { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Diagnostic code carried by [`TriggerError::ShapeDefinition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeErrorCode {
    /// Two events on the same wheel share an angle
    DuplicateAngle,
    /// Event angle outside `[0, cycle_length)` or not finite
    AngleOutOfRange,
    /// A wheel the pattern depends on has no events
    EmptyRequiredWheel,
    /// Gap ranges do not describe a usable, unambiguous landmark
    ConflictingGapConfiguration,
    /// Two consecutive edges of the same kind on an unmasked wheel
    EdgeAlternation,
    /// Secondary reference edges cannot be told apart
    AmbiguousReference,
}

impl ShapeErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateAngle => "duplicate_angle",
            Self::AngleOutOfRange => "angle_out_of_range",
            Self::EmptyRequiredWheel => "empty_required_wheel",
            Self::ConflictingGapConfiguration => "conflicting_gap_configuration",
            Self::EdgeAlternation => "edge_alternation",
            Self::AmbiguousReference => "ambiguous_reference",
        }
    }
}

impl fmt::Display for ShapeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the decoder dropped back to NOT_SYNCHRONIZED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DesyncReason {
    /// No primary edge for longer than the configured maximum
    EdgeTimeout,
    /// Gap seen at a tooth index where none is expected
    UnexpectedGap,
    /// Expected gap not seen
    MissedGap,
    /// Tooth count between two landmarks does not match the pattern
    ToothCountMismatch,
    /// Required secondary edge did not arrive within its window
    SecondaryTimeout,
    /// Secondary edge arrived at an angle inconsistent with the pattern
    SecondaryMismatch,
}

impl DesyncReason {
    pub const ALL: [DesyncReason; 6] = [
        Self::EdgeTimeout,
        Self::UnexpectedGap,
        Self::MissedGap,
        Self::ToothCountMismatch,
        Self::SecondaryTimeout,
        Self::SecondaryMismatch,
    ];

    /// Position in [`DesyncReason::ALL`]
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Static label (used as a metrics label on the decode path)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EdgeTimeout => "edge_timeout",
            Self::UnexpectedGap => "unexpected_gap",
            Self::MissedGap => "missed_gap",
            Self::ToothCountMismatch => "tooth_count_mismatch",
            Self::SecondaryTimeout => "secondary_timeout",
            Self::SecondaryMismatch => "secondary_mismatch",
        }
    }
}

impl fmt::Display for DesyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime desync fault. Recoverable: the decoder re-acquires on its own.
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize)]
#[error("desync fault ({reason}) at t={timestamp} from {previous} (tooth {tooth_index})")]
pub struct DesyncFault {
    pub reason: DesyncReason,
    pub timestamp: Timestamp,
    pub previous: SyncStatus,
    pub tooth_index: u32,
}
