//! # Decoder
//!
//! Live trigger decoding against an [`EventTimeline`](waveform::EventTimeline).
//!
//! - [`classify`] / [`classify_with_floor`]: stateless gap detection
//! - [`PhaseTracker`]: NOT_SYNCHRONIZED → TENTATIVE → SYNCHRONIZED state machine
//! - [`EdgeQueue`], [`SnapshotMailbox`], [`DecodeWorker`]: running the tracker
//!   on a dedicated thread
//!
//! ## Usage
//!
//! ```ignore
//! use decoder::PhaseTracker;
//!
//! let mut tracker = PhaseTracker::new(timeline, DecoderConfig::default())?;
//! for edge in edges {
//!     if let Err(fault) = tracker.feed(edge) {
//!         tracing::warn!(%fault, "lost sync");
//!     }
//! }
//! let angle = tracker.current_angle()?;
//! ```

mod gap;
mod history;
mod mailbox;
mod queue;
mod rpm;
mod tracker;
mod worker;

pub use gap::{classify, classify_with_floor, GapClass};
pub use history::IntervalHistory;
pub use mailbox::SnapshotMailbox;
pub use queue::{EdgeConsumer, EdgeProducer, EdgeQueue, QueueStats};
pub use rpm::{RpmEstimator, RpmUpdate};
pub use tracker::{FeedOutcome, PhaseTracker};
pub use worker::DecodeWorker;
