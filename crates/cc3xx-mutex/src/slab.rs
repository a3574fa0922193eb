//! Fixed-capacity slab of kernel mutex storage
//!
//! The pool owns `capacity` kernel mutex slots up front. A counting
//! semaphore tracks free slots so `allocate` can wait for one to be
//! returned, and a LIFO free list picks which slot is handed out: the most
//! recently returned slot is reused first.
//!
//! A [`SlabBlock`] is the handle to one slot. Dropping it returns the slot
//! to the pool, so a block can never be handed back twice.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::ops::Deref;

use cc3xx_hal::{KernelMutex, KernelSemaphore, Platform, Timeout};
use log::{debug, trace, warn};

/// Slab allocation errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlabError {
    /// No slot became free within the wait bound
    Exhausted,
    /// Semaphore granted a slot but the free list was empty
    Corrupted,
}

impl fmt::Display for SlabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlabError::Exhausted => write!(f, "no free mutex slot"),
            SlabError::Corrupted => write!(f, "mutex slab free list corrupted"),
        }
    }
}

struct SlabPool<P: Platform> {
    slots: Box<[P::Mutex]>,
    free: spin::Mutex<Vec<usize>>,
    available: P::Semaphore,
}

impl<P: Platform> SlabPool<P> {
    fn release(&self, index: usize) {
        self.free.lock().push(index);
        self.available.give();
        trace!("[slab] slot {} returned", index);
    }
}

/// Fixed-capacity allocator for kernel mutex storage
pub struct Slab<P: Platform> {
    pool: Arc<SlabPool<P>>,
}

impl<P: Platform> Slab<P> {
    /// Create a pool of `capacity` cleared slots.
    pub fn new(capacity: usize) -> Self {
        let slots: Box<[P::Mutex]> = (0..capacity).map(|_| P::Mutex::default()).collect();
        // Reversed so slot 0 is handed out first
        let free: Vec<usize> = (0..capacity).rev().collect();

        Self {
            pool: Arc::new(SlabPool {
                slots,
                free: spin::Mutex::new(free),
                available: P::Semaphore::new(capacity, capacity),
            }),
        }
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.pool.slots.len()
    }

    /// Slots currently free
    ///
    /// Read from the free list, so `available() + in_use()` always equals
    /// `capacity()`. A caller that already holds a semaphore permit but has
    /// not yet popped its slot still counts that slot as free.
    pub fn available(&self) -> usize {
        self.pool.free.lock().len()
    }

    /// Slots currently handed out
    pub fn in_use(&self) -> usize {
        self.capacity() - self.available()
    }

    /// Take a slot, waiting until one is free.
    pub fn allocate(&self) -> Result<SlabBlock<P>, SlabError> {
        self.allocate_timeout(Timeout::Forever)
    }

    /// Take a slot, waiting at most `timeout`.
    ///
    /// The returned slot's storage is cleared. On `SlabError::Corrupted`
    /// the semaphore permit is returned before the error is reported.
    pub fn allocate_timeout(&self, timeout: Timeout) -> Result<SlabBlock<P>, SlabError> {
        if let Err(e) = self.pool.available.take(timeout) {
            warn!("[slab] no free slot ({}): {}", self.capacity(), e);
            return Err(SlabError::Exhausted);
        }

        let index = match self.pool.free.lock().pop() {
            Some(index) => index,
            None => {
                // Permit goes back so the pool accounting stays usable
                self.pool.available.give();
                return Err(SlabError::Corrupted);
            }
        };

        let block = SlabBlock {
            pool: Arc::clone(&self.pool),
            index,
        };
        block.clear();
        debug!("[slab] slot {} allocated", index);
        Ok(block)
    }

    /// Hand a slot back to the pool.
    pub fn release(&self, block: SlabBlock<P>) {
        drop(block);
    }
}

impl<P: Platform> fmt::Debug for Slab<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slab")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

/// One kernel mutex slot borrowed from a [`Slab`]
pub struct SlabBlock<P: Platform> {
    pool: Arc<SlabPool<P>>,
    index: usize,
}

impl<P: Platform> SlabBlock<P> {
    /// Slot position inside the pool
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<P: Platform> Deref for SlabBlock<P> {
    type Target = P::Mutex;

    fn deref(&self) -> &P::Mutex {
        &self.pool.slots[self.index]
    }
}

impl<P: Platform> Drop for SlabBlock<P> {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

impl<P: Platform> fmt::Debug for SlabBlock<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlabBlock").field("index", &self.index).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc3xx_hal::{HalError, NoHwMutex};
    use cc3xx_hal_mock::{MockKernelMutex, MockPlatform};
    use core::sync::atomic::{AtomicUsize, Ordering};

    type TestSlab = Slab<MockPlatform>;

    /// Semaphore that grants every take, counting gives
    struct GrantingSemaphore {
        gives: AtomicUsize,
    }

    impl KernelSemaphore for GrantingSemaphore {
        fn new(_initial: usize, _limit: usize) -> Self {
            Self {
                gives: AtomicUsize::new(0),
            }
        }

        fn take(&self, _timeout: Timeout) -> Result<(), HalError> {
            Ok(())
        }

        fn give(&self) {
            self.gives.fetch_add(1, Ordering::SeqCst);
        }

        fn count(&self) -> usize {
            usize::MAX
        }
    }

    struct OvercountPlatform;

    impl Platform for OvercountPlatform {
        type Mutex = MockKernelMutex;
        type Semaphore = GrantingSemaphore;
        type HwMutex = NoHwMutex;

        fn hw_mutex(&self) -> Option<&NoHwMutex> {
            None
        }
    }

    #[test]
    fn test_capacity_accounting() {
        let slab = TestSlab::new(4);
        assert_eq!(slab.capacity(), 4);
        assert_eq!(slab.available(), 4);

        let a = slab.allocate().unwrap();
        let b = slab.allocate().unwrap();
        assert_eq!(slab.available(), 2);
        assert_eq!(slab.in_use(), 2);
        assert_ne!(a.index(), b.index());

        slab.release(a);
        drop(b);
        assert_eq!(slab.available(), 4);
        assert_eq!(slab.in_use(), 0);
    }

    #[test]
    fn test_accounting_sums_to_capacity() {
        let slab = TestSlab::new(3);
        let mut held = alloc::vec::Vec::new();
        for _ in 0..3 {
            assert_eq!(slab.available() + slab.in_use(), slab.capacity());
            held.push(slab.allocate().unwrap());
        }
        assert_eq!(slab.available(), 0);
        assert_eq!(slab.in_use(), 3);
    }

    #[test]
    fn test_corrupted_returns_permit() {
        let slab: Slab<OvercountPlatform> = Slab::new(1);
        let _only = slab.allocate().unwrap();

        assert_eq!(
            slab.allocate_timeout(Timeout::NoWait).unwrap_err(),
            SlabError::Corrupted
        );
        assert_eq!(slab.pool.available.gives.load(Ordering::SeqCst), 1);
        assert_eq!(slab.in_use(), 1);
    }

    #[test]
    fn test_first_slot_is_zero() {
        let slab = TestSlab::new(3);
        assert_eq!(slab.allocate().unwrap().index(), 0);
    }

    #[test]
    fn test_lifo_reuse() {
        let slab = TestSlab::new(8);
        let _a = slab.allocate().unwrap();
        let b = slab.allocate().unwrap();
        let _c = slab.allocate().unwrap();
        let freed = b.index();

        drop(b);
        assert_eq!(slab.allocate().unwrap().index(), freed);
    }

    #[test]
    fn test_bounded_exhaustion() {
        let slab = TestSlab::new(1);
        let _only = slab.allocate().unwrap();

        assert_eq!(
            slab.allocate_timeout(Timeout::NoWait).unwrap_err(),
            SlabError::Exhausted
        );
        assert_eq!(
            slab.allocate_timeout(Timeout::from_millis(10)).unwrap_err(),
            SlabError::Exhausted
        );
    }

    #[test]
    fn test_allocated_slot_is_cleared() {
        let slab = TestSlab::new(1);
        let block = slab.allocate().unwrap();
        block.init();
        block.lock(Timeout::Forever).unwrap();
        assert!(block.is_locked());
        drop(block);

        let block = slab.allocate().unwrap();
        assert!(!block.is_initialized());
        assert!(!block.is_locked());
    }
}
