// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Triple-buffered snapshot pool: single producer, single consumer.
//!
//! Three pre-allocated [`GameSnapshot`] slots rotate between three roles:
//! the producer's back slot, the shared (most recently published) slot,
//! and the consumer's front slot. Publishing swaps back with shared;
//! reading swaps front with shared when a fresh publish is pending. The
//! three indices stay a permutation of `{0, 1, 2}`, so the writer never
//! touches a slot the reader holds — the writer always makes progress and
//! the reader observes at most one frame of staleness.
//!
//! Each slot sits behind a `RwLock` that is uncontended by construction;
//! the lock is the safe-Rust witness for the disjointness argument, not a
//! synchronization point. `acquire_read` never blocks in steady state and
//! always returns either the latest published snapshot or, at startup,
//! the initial empty one.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::snapshot::GameSnapshot;

/// Bit flagging the shared slot as not-yet-consumed.
const FRESH: usize = 0b100;
/// Mask extracting the slot index.
const IDX_MASK: usize = 0b011;

/// Triple-buffered SP/SC snapshot container.
#[derive(Debug)]
pub struct SnapshotPool {
    slots: [RwLock<GameSnapshot>; 3],
    /// Shared slot index, possibly tagged [`FRESH`].
    shared: AtomicUsize,
    /// Producer-owned back slot index.
    back: AtomicUsize,
    /// Consumer-owned front slot index.
    front: AtomicUsize,
    next_seq: AtomicU64,
}

impl Default for SnapshotPool {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotPool {
    /// Pre-allocates all three slots with cap-sized slices.
    pub fn new() -> Self {
        Self {
            slots: [
                RwLock::new(GameSnapshot::with_caps()),
                RwLock::new(GameSnapshot::with_caps()),
                RwLock::new(GameSnapshot::with_caps()),
            ],
            shared: AtomicUsize::new(1),
            back: AtomicUsize::new(2),
            front: AtomicUsize::new(0),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Producer: returns the back slot, reset for the given tick with the
    /// next sequence number and a fresh wall-clock stamp. Zero allocation;
    /// slice capacities are preserved across resets.
    ///
    /// Single-producer contract: only the simulation kernel calls this,
    /// and it publishes before acquiring again.
    pub fn acquire_write(&self, tick: u64, seed: u64) -> RwLockWriteGuard<'_, GameSnapshot> {
        let idx = self.back.load(Ordering::Relaxed);
        let mut guard = self.slots[idx]
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        guard.reset(seq, unix_ms(), tick, seed);
        guard
    }

    /// Producer: publishes the back slot to the consumer with release
    /// semantics and adopts the previous shared slot as the new back.
    pub fn publish_write(&self) {
        let idx = self.back.load(Ordering::Relaxed);
        let old = self.shared.swap(idx | FRESH, Ordering::Release);
        self.back.store(old & IDX_MASK, Ordering::Relaxed);
    }

    /// Consumer: returns the most recently published snapshot, swapping
    /// the front slot in with acquire semantics when a fresh publish is
    /// pending. Never blocks; without a pending publish it re-reads the
    /// current front slot.
    pub fn acquire_read(&self) -> RwLockReadGuard<'_, GameSnapshot> {
        let cur = self.shared.load(Ordering::Acquire);
        if cur & FRESH != 0 {
            let mine = self.front.load(Ordering::Relaxed);
            let old = self.shared.swap(mine, Ordering::AcqRel);
            self.front.store(old & IDX_MASK, Ordering::Relaxed);
        }
        let idx = self.front.load(Ordering::Relaxed);
        self.slots[idx].read().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}
