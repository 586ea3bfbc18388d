//! # Contracts
//!
//! Frozen interface contracts, defining inter-crate data structures.
//! All business crates depend on this crate, reverse dependencies are prohibited.
//!
//! ## Angle / Time Model
//! - Template angles are engine-cycle degrees in `[0, cycle_length)`
//! - Live timestamps are monotonic capture ticks (`u64`); the tick rate lives
//!   in [`DecoderConfig`]

mod blueprint;
mod decoder_config;
mod edge;
mod error;
mod sync;

pub use blueprint::*;
pub use decoder_config::*;
pub use edge::*;
pub use error::*;
pub use sync::*;
