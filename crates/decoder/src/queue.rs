//! Lock-free SPSC queue carrying live edges from the capture side to the
//! decode thread.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use contracts::LiveEdge;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};

/// Counters shared by both queue ends
#[derive(Debug, Default)]
pub struct QueueStats {
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl QueueStats {
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Edges rejected because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Constructor for a bounded edge queue
pub struct EdgeQueue;

impl EdgeQueue {
    /// Split a queue of `capacity` edges into its two ends
    pub fn with_capacity(capacity: usize) -> (EdgeProducer, EdgeConsumer) {
        let (prod, cons) = HeapRb::<LiveEdge>::new(capacity.max(1)).split();
        let stats = Arc::new(QueueStats::default());
        (
            EdgeProducer {
                inner: prod,
                stats: Arc::clone(&stats),
            },
            EdgeConsumer { inner: cons, stats },
        )
    }
}

/// Capture-side end. Never blocks.
pub struct EdgeProducer {
    inner: HeapProd<LiveEdge>,
    stats: Arc<QueueStats>,
}

impl fmt::Debug for EdgeProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeProducer")
            .field("vacant", &self.inner.vacant_len())
            .field("dropped", &self.stats.dropped())
            .finish()
    }
}

impl EdgeProducer {
    /// Enqueue an edge; a full queue hands it back and counts the drop
    #[inline]
    pub fn push(&mut self, edge: LiveEdge) -> Result<(), LiveEdge> {
        match self.inner.try_push(edge) {
            Ok(()) => {
                self.stats.pushed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(edge) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("trigger_queue_dropped_total").increment(1);
                Err(edge)
            }
        }
    }

    /// Free slots; a producer that must not drop can wait on this
    #[inline]
    pub fn vacant_len(&self) -> usize {
        self.inner.vacant_len()
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

/// Decode-side end
pub struct EdgeConsumer {
    inner: HeapCons<LiveEdge>,
    stats: Arc<QueueStats>,
}

impl fmt::Debug for EdgeConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeConsumer")
            .field("len", &self.inner.occupied_len())
            .finish()
    }
}

impl EdgeConsumer {
    #[inline]
    pub fn pop(&mut self) -> Option<LiveEdge> {
        self.inner.try_pop()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}
