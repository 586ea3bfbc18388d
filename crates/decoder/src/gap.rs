//! Stateless gap classification.

use contracts::RatioRange;

/// Verdict for one inter-edge interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapClass {
    Normal,
    GapCandidate,
}

/// Classify `current` against `previous` with no noise floor.
#[inline]
pub fn classify(previous: u64, current: u64, range: RatioRange) -> GapClass {
    classify_with_floor(previous, current, range, 0)
}

/// `GapCandidate` iff `current / previous` lies in `range`.
///
/// A previous interval of zero or below `noise_floor` never yields a
/// candidate.
#[inline]
pub fn classify_with_floor(
    previous: u64,
    current: u64,
    range: RatioRange,
    noise_floor: u64,
) -> GapClass {
    if previous == 0 || previous < noise_floor {
        return GapClass::Normal;
    }
    let ratio = current as f64 / previous as f64;
    if range.contains(ratio) {
        GapClass::GapCandidate
    } else {
        GapClass::Normal
    }
}
