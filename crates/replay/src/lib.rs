//! Offline drivers for the phase tracker: fixed-delay replay of template
//! sequences and a constant-speed edge synthesizer.

mod harness;
mod synth;

pub use harness::{cycle_sequence, replay, replay_timed, ReplayReport, REPLAY_START_TIMESTAMP};
pub use synth::{EdgeSynthesizer, SecondaryMode};
