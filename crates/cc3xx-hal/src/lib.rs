//! Platform Abstraction Layer for the CC3xx platform mutex layer
//!
//! This crate defines the traits that let the mutex dispatcher run on
//! different kernels (Zephyr, a host test harness, bare metal) by
//! abstracting the primitives it locks with.
//!
//! # Platform Primitives
//!
//! - **Kernel mutex**: blocking, owner-tracked mutex living in caller storage
//! - **Kernel semaphore**: counting semaphore used to account for slab slots
//! - **Hardware mutex peripheral**: cross-core mutex acquired by numeric id
//! - **Abort hook**: non-returning fatal error handler supplied by the integrator

#![no_std]

use core::fmt;
use core::time::Duration;

/// How long a blocking primitive may wait before giving up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timeout {
    /// Return immediately if the primitive is not available
    NoWait,
    /// Wait at most this long
    After(Duration),
    /// Wait until the primitive becomes available
    Forever,
}

impl Timeout {
    /// Build a bounded timeout from milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        Timeout::After(Duration::from_millis(ms))
    }

    /// Whether this timeout can expire.
    pub const fn is_bounded(&self) -> bool {
        !matches!(self, Timeout::Forever)
    }
}

/// Kernel mutex primitive
///
/// The storage for one kernel mutex. `Default` produces the cleared
/// (all-zero, not yet constructed) state; `init` runs the kernel's mutex
/// constructor on that storage in place.
///
/// Implementations follow kernel mutex semantics: the mutex is owned by the
/// thread that locked it, and `lock` blocks the caller according to the
/// given timeout.
///
/// Implementations may rely on their address: once `init` has run, the
/// mutex layer never moves the storage. Embedded storage is boxed and slab
/// storage lives in a fixed pool.
pub trait KernelMutex: Default + Send + Sync + 'static {
    /// Return the storage to the cleared state.
    ///
    /// Any waiter or owner information is discarded. Callers guarantee no
    /// thread is using the mutex.
    fn clear(&self);

    /// (Re)construct the mutex in place. Running the constructor on an
    /// already constructed mutex is accepted and resets it to unlocked.
    fn init(&self);

    /// Acquire the mutex.
    ///
    /// # Returns
    /// * `Ok(())` - Mutex acquired
    /// * `Err(HalError::WouldBlock)` - `Timeout::NoWait` and the mutex is held
    /// * `Err(HalError::TimedOut)` - Bounded wait expired
    /// * `Err(HalError::NotInitialized)` - Storage was never constructed
    fn lock(&self, timeout: Timeout) -> Result<(), HalError>;

    /// Release the mutex.
    ///
    /// # Returns
    /// * `Ok(())` - Mutex released
    /// * `Err(HalError::NotOwner)` - Calling thread does not hold the mutex
    /// * `Err(HalError::NotLocked)` - Mutex is not held by anyone
    fn unlock(&self) -> Result<(), HalError>;
}

/// Kernel counting semaphore
pub trait KernelSemaphore: Send + Sync + 'static {
    /// Create a semaphore with `initial` permits, never exceeding `limit`.
    fn new(initial: usize, limit: usize) -> Self
    where
        Self: Sized;

    /// Take one permit, waiting according to `timeout`.
    fn take(&self, timeout: Timeout) -> Result<(), HalError>;

    /// Give one permit back. Giving past the limit is ignored.
    fn give(&self);

    /// Number of permits currently available.
    fn count(&self) -> usize;
}

/// Numeric id of one hardware mutex instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HwMutexId(pub u8);

impl HwMutexId {
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for HwMutexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hw-mutex#{}", self.0)
    }
}

/// Hardware mutex peripheral shared across cores
///
/// Only "acquire/release by id" is modelled. Acquisition is a single
/// attempt; the peripheral never queues waiters.
pub trait HwMutexPeripheral: Send + Sync + 'static {
    /// Number of mutex instances the peripheral provides.
    fn count(&self) -> u8;

    /// Try to acquire mutex `id`. Returns `true` if this caller now holds it.
    fn try_lock(&self, id: HwMutexId) -> bool;

    /// Release mutex `id`.
    fn unlock(&self, id: HwMutexId);
}

/// Placeholder peripheral for platforms without a hardware mutex
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHwMutex;

impl HwMutexPeripheral for NoHwMutex {
    fn count(&self) -> u8 {
        0
    }

    fn try_lock(&self, _id: HwMutexId) -> bool {
        false
    }

    fn unlock(&self, _id: HwMutexId) {}
}

/// Fatal error handler supplied by the integrator
///
/// Invoked for unrecoverable precondition violations (a null record handed
/// to `init`/`free`, a corrupted slab). Never returns.
pub trait AbortHook: Send + Sync + 'static {
    fn abort(&self, reason: &str) -> !;
}

/// Platform trait
///
/// Bundles the primitive types a platform provides.
///
/// # Associated Types
///
/// - `Mutex`: kernel mutex storage (e.g. `struct k_mutex` on Zephyr)
/// - `Semaphore`: counting semaphore used by the slab allocator
/// - `HwMutex`: hardware mutex peripheral; use [`NoHwMutex`] when absent
pub trait Platform: Send + Sync + 'static {
    type Mutex: KernelMutex;
    type Semaphore: KernelSemaphore;
    type HwMutex: HwMutexPeripheral;

    /// The hardware mutex peripheral, if this platform has one.
    fn hw_mutex(&self) -> Option<&Self::HwMutex>;

    /// Short platform name used in log output.
    fn name(&self) -> &'static str {
        "platform"
    }
}

/// Platform primitive errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HalError {
    /// Primitive storage was never constructed
    NotInitialized,
    /// Calling thread does not own the mutex
    NotOwner,
    /// Mutex is not locked
    NotLocked,
    /// Bounded wait expired
    TimedOut,
    /// `Timeout::NoWait` and the primitive is unavailable
    WouldBlock,
    /// Invalid argument
    InvalidArgument,
    /// Operation not supported on this platform
    NotSupported,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalError::NotInitialized => write!(f, "primitive not initialized"),
            HalError::NotOwner => write!(f, "caller does not own the mutex"),
            HalError::NotLocked => write!(f, "mutex is not locked"),
            HalError::TimedOut => write!(f, "wait timed out"),
            HalError::WouldBlock => write!(f, "operation would block"),
            HalError::InvalidArgument => write!(f, "invalid argument"),
            HalError::NotSupported => write!(f, "operation not supported"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_bounded() {
        assert!(Timeout::NoWait.is_bounded());
        assert!(Timeout::from_millis(10).is_bounded());
        assert!(!Timeout::Forever.is_bounded());
        assert_eq!(
            Timeout::from_millis(250),
            Timeout::After(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_no_hw_mutex_never_acquires() {
        let hw = NoHwMutex;
        assert_eq!(hw.count(), 0);
        assert!(!hw.try_lock(HwMutexId::new(0)));
        hw.unlock(HwMutexId::new(0));
        assert!(!hw.try_lock(HwMutexId::new(0)));
    }

    #[test]
    fn test_hw_mutex_id() {
        let id = HwMutexId::new(15);
        assert_eq!(id.id(), 15);
        assert!(HwMutexId::new(12) < id);
    }
}
