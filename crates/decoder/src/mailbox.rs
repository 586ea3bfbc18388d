//! Seqlock mailbox for publishing decoder snapshots.

use std::cell::UnsafeCell;
use std::sync::atomic::{fence, AtomicU32, Ordering};

/// Lock-free single-writer / multi-reader cell for `Copy` values.
///
/// The writer bumps the sequence to an odd value, stores the payload, then
/// bumps it back to even. Readers retry while the sequence is odd or changed
/// under them, so the writer never waits.
pub struct SnapshotMailbox<T: Copy> {
    seq: AtomicU32,
    data: UnsafeCell<T>,
}

// SAFETY: readers only copy `T` out and discard torn copies; a single writer
// is required by `write`'s contract.
unsafe impl<T: Copy + Send> Sync for SnapshotMailbox<T> {}

impl<T: Copy + Default> Default for SnapshotMailbox<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Copy> SnapshotMailbox<T> {
    pub const fn new(value: T) -> Self {
        Self {
            seq: AtomicU32::new(0),
            data: UnsafeCell::new(value),
        }
    }

    /// Publish a value. Must only be called from one thread.
    pub fn write(&self, value: T) {
        self.seq.fetch_add(1, Ordering::AcqRel);
        // SAFETY: single writer; the odd sequence makes readers discard
        // anything they copy while this store is in progress.
        unsafe {
            *self.data.get() = value;
        }
        self.seq.fetch_add(1, Ordering::Release);
    }

    /// Latest fully written value
    pub fn read(&self) -> T {
        loop {
            let start = self.seq.load(Ordering::Acquire);
            if start & 1 != 0 {
                std::hint::spin_loop();
                continue;
            }
            // SAFETY: `T: Copy`; a torn copy is detected below and dropped.
            let value = unsafe { std::ptr::read_volatile(self.data.get()) };
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == start {
                return value;
            }
        }
    }
}
