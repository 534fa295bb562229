// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fixed-capacity SPSC ring of pre-allocated frame buffers.
//!
//! The producer (render loop) and consumer (async writer) coordinate
//! strictly through the atomic `write_idx`/`read_idx` pair; the ring
//! holds at most `capacity - 1` frames. Slots are pre-allocated at
//! construction and copied into/out of, never reallocated. Each slot's
//! mutex is uncontended by construction (the indices keep producer and
//! consumer on disjoint slots); it exists as the safe-Rust witness, not
//! as a synchronization point.
//!
//! Backpressure is drop-at-source: a write into a full ring bumps
//! `frames_dropped` and returns `false`; the producer carries on.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// SPSC frame ring buffer.
#[derive(Debug)]
pub struct FrameRing {
    slots: Vec<Mutex<Vec<u8>>>,
    capacity: usize,
    frame_size: usize,
    write_idx: AtomicUsize,
    read_idx: AtomicUsize,
    frames_written: AtomicU64,
    frames_read: AtomicU64,
    frames_dropped: AtomicU64,
}

impl FrameRing {
    /// Allocates `capacity` slots of `frame_size` bytes each.
    pub fn new(capacity: usize, frame_size: usize) -> Self {
        debug_assert!(capacity >= 2, "ring needs at least two slots");
        let slots = (0..capacity)
            .map(|_| Mutex::new(vec![0u8; frame_size]))
            .collect();
        Self {
            slots,
            capacity,
            frame_size,
            write_idx: AtomicUsize::new(0),
            read_idx: AtomicUsize::new(0),
            frames_written: AtomicU64::new(0),
            frames_read: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    /// Frame size every write must match.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Producer: copies `frame` into the ring.
    ///
    /// Returns `false` without copying when the frame length mismatches
    /// or the ring is full (the latter bumps `frames_dropped`).
    pub fn try_write(&self, frame: &[u8]) -> bool {
        if frame.len() != self.frame_size {
            debug_assert_eq!(frame.len(), self.frame_size, "frame size mismatch");
            return false;
        }
        let write = self.write_idx.load(Ordering::Relaxed);
        let next = (write + 1) % self.capacity;
        if next == self.read_idx.load(Ordering::Acquire) {
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        {
            let mut slot = self.slots[write]
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.copy_from_slice(frame);
        }
        self.write_idx.store(next, Ordering::Release);
        self.frames_written.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Consumer: copies the oldest frame into `out` (resized to the frame
    /// size). Returns `false` when the ring is empty.
    pub fn try_read(&self, out: &mut Vec<u8>) -> bool {
        let read = self.read_idx.load(Ordering::Relaxed);
        if read == self.write_idx.load(Ordering::Acquire) {
            return false;
        }
        {
            let slot = self.slots[read]
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            out.resize(self.frame_size, 0);
            out.copy_from_slice(&slot);
        }
        self.read_idx
            .store((read + 1) % self.capacity, Ordering::Release);
        self.frames_read.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Frames currently queued: `(write - read) mod capacity`.
    pub fn available(&self) -> usize {
        let write = self.write_idx.load(Ordering::Acquire);
        let read = self.read_idx.load(Ordering::Acquire);
        (write + self.capacity - read) % self.capacity
    }

    /// Total successful writes.
    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }

    /// Total successful reads.
    pub fn frames_read(&self) -> u64 {
        self.frames_read.load(Ordering::Relaxed)
    }

    /// Total writes rejected by a full ring.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame(byte: u8, size: usize) -> Vec<u8> {
        vec![byte; size]
    }

    #[test]
    fn overflow_drops_the_capacityth_write() {
        let ring = FrameRing::new(16, 8);
        for i in 0..15 {
            assert!(ring.try_write(&frame(i, 8)), "write {i} should fit");
        }
        // slot 16 would collide with the read index: dropped
        assert!(!ring.try_write(&frame(15, 8)));
        assert_eq!(ring.frames_dropped(), 1);
        assert_eq!(ring.available(), 15);

        let mut out = Vec::new();
        assert!(ring.try_read(&mut out));
        assert_eq!(out, frame(0, 8));
        // one slot freed: the next write succeeds
        assert!(ring.try_write(&frame(15, 8)));
    }

    #[test]
    fn read_empty_returns_false() {
        let ring = FrameRing::new(4, 8);
        let mut out = Vec::new();
        assert!(!ring.try_read(&mut out));
    }

    #[test]
    fn wrong_frame_size_rejected() {
        let ring = FrameRing::new(4, 8);
        assert!(!ring.try_write(&frame(1, 7)));
        assert_eq!(ring.frames_written(), 0);
    }

    #[test]
    fn fifo_order_preserved() {
        let ring = FrameRing::new(8, 4);
        for i in 0..5 {
            assert!(ring.try_write(&frame(i, 4)));
        }
        let mut out = Vec::new();
        for i in 0..5 {
            assert!(ring.try_read(&mut out));
            assert_eq!(out[0], i);
        }
    }

    #[test]
    fn spsc_threads_preserve_order_and_accounting() {
        use std::sync::Arc;

        let ring = Arc::new(FrameRing::new(16, 4));
        let producer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                let mut written = 0u32;
                let mut seq = 0u8;
                while written < 1000 {
                    if ring.try_write(&frame(seq, 4)) {
                        written += 1;
                        seq = seq.wrapping_add(1);
                    }
                }
            })
        };
        let consumer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                let mut out = Vec::new();
                let mut expected = 0u8;
                let mut read = 0u32;
                while read < 1000 {
                    if ring.try_read(&mut out) {
                        assert_eq!(out[0], expected, "frames reordered");
                        expected = expected.wrapping_add(1);
                        read += 1;
                    }
                }
            })
        };
        producer.join().expect("producer");
        consumer.join().expect("consumer");
        assert_eq!(ring.frames_written(), 1000);
        assert_eq!(ring.frames_read(), 1000);
        assert_eq!(ring.available(), 0);
    }

    proptest! {
        // occupancy never exceeds capacity - 1 and the counters balance
        #[test]
        fn occupancy_invariant(ops in proptest::collection::vec(any::<bool>(), 1..200)) {
            let ring = FrameRing::new(8, 4);
            let mut out = Vec::new();
            for (i, is_write) in ops.into_iter().enumerate() {
                if is_write {
                    ring.try_write(&frame(i as u8, 4));
                } else {
                    ring.try_read(&mut out);
                }
                prop_assert!(ring.available() <= 7);
                let balance = ring.frames_written() - ring.frames_read();
                prop_assert_eq!(balance as usize, ring.available());
            }
        }
    }
}
