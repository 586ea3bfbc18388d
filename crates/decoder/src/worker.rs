//! Dedicated decode thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use contracts::{DecoderSnapshot, DesyncFault, TriggerError};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use waveform::EventTimeline;

use crate::mailbox::SnapshotMailbox;
use crate::queue::EdgeConsumer;
use crate::tracker::PhaseTracker;

const CONTROL_QUEUE_LEN: usize = 4;
const FAULT_QUEUE_LEN: usize = 256;
const IDLE_SLEEP: Duration = Duration::from_micros(100);

enum Control {
    Reconfigure(Box<EventTimeline>),
}

/// State shared between the worker handle and its thread
#[derive(Default)]
struct Shared {
    running: AtomicBool,
    snapshot: SnapshotMailbox<DecoderSnapshot>,
    last_fault: SnapshotMailbox<Option<DesyncFault>>,
    faults: AtomicU64,
    /// Faults that found the fault queue full
    faults_dropped: AtomicU64,
}

/// Runs a [`PhaseTracker`] on its own thread, fed from an edge queue.
///
/// Snapshots are published through a seqlock after every drained batch, so
/// readers never block the decode loop. Every desync fault is also queued for
/// [`take_faults`](Self::take_faults). Reconfiguration is applied between
/// edges.
pub struct DecodeWorker {
    handle: Option<JoinHandle<PhaseTracker>>,
    control: HeapProd<Control>,
    faults: HeapCons<DesyncFault>,
    shared: Arc<Shared>,
}

impl DecodeWorker {
    /// Move `tracker` onto a new decode thread reading `edges`
    pub fn spawn(tracker: PhaseTracker, edges: EdgeConsumer) -> Result<Self, TriggerError> {
        let (control, control_rx) = HeapRb::<Control>::new(CONTROL_QUEUE_LEN).split();
        let (fault_tx, faults) = HeapRb::<DesyncFault>::new(FAULT_QUEUE_LEN).split();
        let shared = Arc::new(Shared::default());
        shared.running.store(true, Ordering::Release);
        shared.snapshot.write(tracker.snapshot());

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("trigger-decode".into())
            .spawn(move || decode_loop(tracker, edges, control_rx, fault_tx, &thread_shared))?;

        tracing::info!("Decode worker started");
        Ok(Self {
            handle: Some(handle),
            control,
            faults,
            shared,
        })
    }

    /// Latest published decoder state
    pub fn snapshot(&self) -> DecoderSnapshot {
        self.shared.snapshot.read()
    }

    /// Most recent desync fault, if any
    pub fn last_fault(&self) -> Option<DesyncFault> {
        self.shared.last_fault.read()
    }

    pub fn fault_count(&self) -> u64 {
        self.shared.faults.load(Ordering::Relaxed)
    }

    /// Faults lost because nobody drained the fault queue in time
    pub fn faults_dropped(&self) -> u64 {
        self.shared.faults_dropped.load(Ordering::Relaxed)
    }

    /// Drain queued faults in the order they happened
    pub fn take_faults(&mut self) -> impl Iterator<Item = DesyncFault> + '_ {
        self.faults.pop_iter()
    }

    /// Queue a template swap; applied before the next edge is decoded
    pub fn reconfigure(&mut self, timeline: EventTimeline) -> Result<(), TriggerError> {
        self.control
            .try_push(Control::Reconfigure(Box::new(timeline)))
            .map_err(|_| TriggerError::configuration("reconfiguration queue full"))
    }

    /// Drain queued edges, stop the thread and return the tracker
    pub fn shutdown(mut self) -> Option<PhaseTracker> {
        self.stop()
    }

    /// Like [`shutdown`](Self::shutdown) but keeps the handle, so faults
    /// raised by the final batch can still be taken afterwards
    pub fn stop(&mut self) -> Option<PhaseTracker> {
        self.shared.running.store(false, Ordering::Release);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(tracker) => {
                tracing::info!("Decode worker stopped");
                Some(tracker)
            }
            Err(_) => {
                tracing::error!("Decode worker panicked");
                None
            }
        }
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn decode_loop(
    mut tracker: PhaseTracker,
    mut edges: EdgeConsumer,
    mut control: HeapCons<Control>,
    mut faults: HeapProd<DesyncFault>,
    shared: &Shared,
) -> PhaseTracker {
    loop {
        // read before draining so edges pushed before shutdown are still decoded
        let running = shared.running.load(Ordering::Acquire);

        while let Some(Control::Reconfigure(timeline)) = control.try_pop() {
            tracker.reconfigure(*timeline);
            shared.snapshot.write(tracker.snapshot());
        }

        let mut drained = 0usize;
        while let Some(edge) = edges.pop() {
            if let Err(fault) = tracker.feed(edge) {
                shared.faults.fetch_add(1, Ordering::Relaxed);
                shared.last_fault.write(Some(fault));
                if faults.try_push(fault).is_err() {
                    shared.faults_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            drained += 1;
        }
        if drained > 0 {
            shared.snapshot.write(tracker.snapshot());
        }

        if !running {
            return tracker;
        }
        if drained == 0 {
            thread::sleep(IDLE_SLEEP);
        }
    }
}
