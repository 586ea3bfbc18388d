//! # Waveform
//!
//! Trigger wheel templates: the declarative [`WaveformBuilder`], its tooth
//! pattern strategies and the immutable [`EventTimeline`] they produce.
//!
//! A timeline is validated once in [`WaveformBuilder::finalize`]; there is no
//! other way to construct one, so a decoder never sees an invalid template.

mod builder;
mod pattern;
mod shape;
mod timeline;

pub use builder::WaveformBuilder;
pub use pattern::{EvenlySpacedTeeth, SkippedToothPattern, ToothPattern};
pub use timeline::EventTimeline;
