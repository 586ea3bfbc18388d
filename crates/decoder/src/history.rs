//! Fixed-size ring of recent inter-edge intervals.

use std::fmt;

use contracts::INTERVAL_HISTORY_LEN;
use ringbuf::{traits::*, StaticRb};

/// Last [`INTERVAL_HISTORY_LEN`] intervals of one wheel, oldest first.
///
/// Backed by a `StaticRb`, so pushing never allocates.
pub struct IntervalHistory {
    ring: StaticRb<u64, INTERVAL_HISTORY_LEN>,
    latest: Option<u64>,
}

impl fmt::Debug for IntervalHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalHistory")
            .field("len", &self.ring.occupied_len())
            .field("latest", &self.latest)
            .finish()
    }
}

impl Default for IntervalHistory {
    fn default() -> Self {
        Self {
            ring: StaticRb::default(),
            latest: None,
        }
    }
}

impl IntervalHistory {
    /// Record an interval, overwriting the oldest when full
    #[inline]
    pub fn push(&mut self, interval: u64) {
        self.ring.push_overwrite(interval);
        self.latest = Some(interval);
    }

    /// Most recent interval
    #[inline]
    pub fn latest(&self) -> Option<u64> {
        self.latest
    }

    /// Oldest interval still stored
    #[inline]
    pub fn oldest(&self) -> Option<u64> {
        self.ring.iter().next().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.latest.is_none()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
