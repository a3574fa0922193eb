//! Platform mutex record
//!
//! A [`MutexRecord`] is what the crypto runtime holds for each mutex: the
//! backend storage together with its [`MutexState`]. The record owns its
//! storage, so a slab block stays alive exactly as long as the record
//! refers to it.
//!
//! Embedded kernel mutex storage is boxed. Kernel objects such as a Zephyr
//! `k_mutex` point into themselves once constructed, so the storage keeps
//! one address while the record moves into the registry and the runtime.

use alloc::boxed::Box;
use core::fmt;

use cc3xx_hal::{HwMutexId, KernelMutex, Platform};

use crate::atomic::AtomicFlag;
use crate::slab::SlabBlock;
use crate::status::MutexState;

/// Backend storage referenced by a record
pub enum MutexHandle<P: Platform> {
    /// No storage yet; `init` draws a slab block
    Null,
    /// Kernel mutex storage owned by the record, at a fixed address
    Static(Box<P::Mutex>),
    /// Kernel mutex storage borrowed from the slab
    Slab(SlabBlock<P>),
    /// Atomic flag storage
    Atomic(AtomicFlag),
    /// Hardware mutex; the id lives in the record state
    Peripheral,
}

impl<P: Platform> MutexHandle<P> {
    pub fn is_null(&self) -> bool {
        matches!(self, MutexHandle::Null)
    }

    /// Kernel mutex storage, if this handle has any
    pub fn native(&self) -> Option<&P::Mutex> {
        match self {
            MutexHandle::Static(mutex) => Some(&**mutex),
            MutexHandle::Slab(block) => Some(&**block),
            _ => None,
        }
    }

    pub fn atomic(&self) -> Option<&AtomicFlag> {
        match self {
            MutexHandle::Atomic(flag) => Some(flag),
            _ => None,
        }
    }

    /// Slab slot index, if the storage came from the slab
    pub fn slab_index(&self) -> Option<usize> {
        match self {
            MutexHandle::Slab(block) => Some(block.index()),
            _ => None,
        }
    }
}

impl<P: Platform> fmt::Debug for MutexHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutexHandle::Null => write!(f, "Null"),
            MutexHandle::Static(_) => write!(f, "Static"),
            MutexHandle::Slab(block) => write!(f, "Slab({})", block.index()),
            MutexHandle::Atomic(flag) => write!(f, "Atomic(locked={})", flag.is_locked()),
            MutexHandle::Peripheral => write!(f, "Peripheral"),
        }
    }
}

/// One platform mutex as seen by the crypto runtime
pub struct MutexRecord<P: Platform> {
    pub(crate) handle: MutexHandle<P>,
    pub(crate) state: MutexState,
}

impl<P: Platform> MutexRecord<P> {
    /// Record with no storage. `init` allocates a slab block for it.
    pub fn new() -> Self {
        Self {
            handle: MutexHandle::Null,
            state: MutexState::Invalid,
        }
    }

    /// Record with embedded kernel mutex storage, not yet constructed.
    pub fn with_storage() -> Self {
        Self {
            handle: MutexHandle::Static(Box::default()),
            state: MutexState::Invalid,
        }
    }

    /// Record with embedded kernel mutex storage, constructed and valid.
    pub fn native_static() -> Self {
        let mutex: Box<P::Mutex> = Box::default();
        mutex.init();
        Self {
            handle: MutexHandle::Static(mutex),
            state: MutexState::NativeValid { allocated: false },
        }
    }

    /// Record backed by an atomic flag
    pub fn atomic() -> Self {
        Self {
            handle: MutexHandle::Atomic(AtomicFlag::new()),
            state: MutexState::Atomic,
        }
    }

    /// Record backed by hardware mutex instance `id`
    pub fn hardware(id: HwMutexId) -> Self {
        Self {
            handle: MutexHandle::Peripheral,
            state: MutexState::HardwareMutex(id),
        }
    }

    pub fn state(&self) -> MutexState {
        self.state
    }

    pub fn handle(&self) -> &MutexHandle<P> {
        &self.handle
    }

    /// The runtime's flag word for this record
    pub fn flags(&self) -> u32 {
        self.state.flags()
    }

    pub fn is_valid(&self) -> bool {
        self.state.is_valid()
    }
}

impl<P: Platform> Default for MutexRecord<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Platform> fmt::Debug for MutexRecord<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexRecord")
            .field("state", &self.state)
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{FLAG_IS_ATOMIC, FLAG_IS_HW_MUTEX, FLAG_IS_VALID};
    use cc3xx_hal_mock::MockPlatform;

    type Record = MutexRecord<MockPlatform>;

    #[test]
    fn test_new_record_is_invalid() {
        let record = Record::new();
        assert_eq!(record.state(), MutexState::Invalid);
        assert!(record.handle().is_null());
        assert!(!record.is_valid());
        assert_eq!(record.flags(), 0);
    }

    #[test]
    fn test_with_storage_not_constructed() {
        let record = Record::with_storage();
        assert!(!record.is_valid());
        let mutex = record.handle().native().unwrap();
        assert!(!mutex.is_initialized());
    }

    #[test]
    fn test_native_static_is_constructed() {
        let record = Record::native_static();
        assert_eq!(record.flags(), FLAG_IS_VALID);
        assert!(record.handle().native().unwrap().is_initialized());
        assert_eq!(record.handle().slab_index(), None);
    }

    #[test]
    fn test_static_storage_survives_record_move() {
        let record = Record::native_static();
        let before = record.handle().native().unwrap() as *const _;

        let moved = [record];
        let after = moved[0].handle().native().unwrap() as *const _;
        assert_eq!(before, after);
    }

    #[test]
    fn test_fixed_backends() {
        let atomic = Record::atomic();
        assert_eq!(atomic.flags(), FLAG_IS_ATOMIC);
        assert!(atomic.handle().atomic().is_some());

        let hw = Record::hardware(HwMutexId::new(14));
        assert_eq!(hw.flags(), FLAG_IS_HW_MUTEX);
        assert_eq!(hw.state(), MutexState::HardwareMutex(HwMutexId::new(14)));
        assert!(hw.handle().native().is_none());
    }
}
