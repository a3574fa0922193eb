//! Lock-free atomic flag backend
//!
//! A single word holding 0 (free) or 1 (held). Both transitions are one
//! compare-and-swap attempt; nothing ever spins or waits here.
//!
//! The transitions are written once in [`FlagCell`], generic over the word
//! type, so the loom tests run the same code on loom's atomics.

use core::sync::atomic::{AtomicU32, Ordering};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// Atomic word the flag transitions operate on
pub(crate) trait FlagWord {
    fn cas(&self, current: u32, new: u32, success: Ordering, failure: Ordering) -> bool;
    fn get(&self, order: Ordering) -> u32;
}

impl FlagWord for AtomicU32 {
    fn cas(&self, current: u32, new: u32, success: Ordering, failure: Ordering) -> bool {
        self.compare_exchange(current, new, success, failure).is_ok()
    }

    fn get(&self, order: Ordering) -> u32 {
        self.load(order)
    }
}

#[cfg(all(test, feature = "loom"))]
impl FlagWord for loom::sync::atomic::AtomicU32 {
    fn cas(&self, current: u32, new: u32, success: Ordering, failure: Ordering) -> bool {
        self.compare_exchange(current, new, success, failure).is_ok()
    }

    fn get(&self, order: Ordering) -> u32 {
        self.load(order)
    }
}

#[derive(Debug)]
pub(crate) struct FlagCell<W> {
    word: W,
}

impl<W: FlagWord> FlagCell<W> {
    /// Wrap a word that currently holds `UNLOCKED`.
    pub(crate) const fn from_word(word: W) -> Self {
        Self { word }
    }

    pub(crate) fn try_lock(&self) -> bool {
        self.word
            .cas(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
    }

    pub(crate) fn try_unlock(&self) -> bool {
        self.word
            .cas(LOCKED, UNLOCKED, Ordering::Release, Ordering::Relaxed)
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.word.get(Ordering::Relaxed) == LOCKED
    }
}

/// Atomic mutex flag
#[derive(Debug)]
pub struct AtomicFlag {
    cell: FlagCell<AtomicU32>,
}

impl AtomicFlag {
    pub const fn new() -> Self {
        Self {
            cell: FlagCell::from_word(AtomicU32::new(UNLOCKED)),
        }
    }

    /// Attempt the 0 → 1 transition once.
    ///
    /// Returns `true` if the caller now holds the flag.
    pub fn try_lock(&self) -> bool {
        self.cell.try_lock()
    }

    /// Attempt the 1 → 0 transition once.
    ///
    /// Returns `false` if the flag was not held.
    pub fn try_unlock(&self) -> bool {
        self.cell.try_unlock()
    }

    pub fn is_locked(&self) -> bool {
        self.cell.is_locked()
    }
}

impl Default for AtomicFlag {
    fn default() -> Self {
        Self::new()
    }
}
