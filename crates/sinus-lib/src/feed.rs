use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use crate::detector::{BeatRecord, Detector};
use crate::ring::{slot, BUFFER_SIZE};

/// Single-producer single-consumer raw-sample ring.
///
/// Models the acquisition-interrupt / main-loop split: the producer's only
/// job is to drop the latest converter result into the ring and advance the
/// monotonically increasing fill index; the consumer polls the fill index
/// and drains every published slot in order. The fill index is the only
/// cross-thread signal; its release store makes the slot write visible to
/// the acquire load on the other side.
///
/// A published slot stays valid until the producer laps the ring; the
/// system is sized so the consumer never falls a full ring behind, and that
/// overrun is a sizing bug rather than a runtime condition.
pub struct SampleFeed {
    slots: Box<[UnsafeCell<u16>]>,
    fill_index: AtomicI64,
    shutdown: AtomicBool,
}

// The slots are written by exactly one thread and read by exactly one other,
// ordered through fill_index.
unsafe impl Send for SampleFeed {}
unsafe impl Sync for SampleFeed {}

impl SampleFeed {
    pub fn new() -> Self {
        let slots = (0..BUFFER_SIZE).map(|_| UnsafeCell::new(0)).collect();
        Self {
            slots,
            fill_index: AtomicI64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Producer side: store the next sample and publish it. A no-op once the
    /// feed is shut down.
    pub fn publish(&self, sample: u16) {
        if self.shutdown.load(Ordering::Relaxed) {
            return;
        }
        let index = self.fill_index.load(Ordering::Relaxed);
        // SAFETY: single producer; the consumer reads this slot only after
        // observing the release store below.
        unsafe { *self.slots[slot(index)].get() = sample };
        self.fill_index.store(index + 1, Ordering::Release);
    }

    /// One past the newest published index.
    pub fn fill_index(&self) -> i64 {
        self.fill_index.load(Ordering::Acquire)
    }

    /// Consumer side: read a published sample. `index` must be below the
    /// observed fill index and within one ring of it.
    pub fn read(&self, index: i64) -> u16 {
        let fill = self.fill_index.load(Ordering::Acquire);
        debug_assert!(index < fill, "reading an unpublished slot");
        debug_assert!(
            fill - index <= BUFFER_SIZE as i64,
            "producer lapped the consumer"
        );
        // SAFETY: the assertions above exclude every slot the producer could
        // still be writing.
        unsafe { *self.slots[slot(index)].get() }
    }

    /// Stop the producer and leave all state frozen for inspection.
    pub fn shut_down(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

impl Default for SampleFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer cursor: drains a feed into a detector in strict index order.
#[derive(Debug, Default)]
pub struct FeedCursor {
    next_index: i64,
}

impl FeedCursor {
    pub fn new() -> Self {
        Self { next_index: 0 }
    }

    /// Index of the next sample to process.
    pub fn next_index(&self) -> i64 {
        self.next_index
    }

    /// Process one pending sample, if any.
    pub fn poll(&mut self, feed: &SampleFeed, detector: &mut Detector) -> Option<BeatRecord> {
        if self.next_index < feed.fill_index() {
            let sample = feed.read(self.next_index);
            let record = detector.process(self.next_index, sample);
            self.next_index += 1;
            Some(record)
        } else {
            None
        }
    }
}
