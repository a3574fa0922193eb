//! Mutex operation dispatcher
//!
//! [`MutexApi`] is the operation table installed into the crypto runtime:
//! `init`, `free`, `lock` and `unlock` on a [`MutexRecord`], dispatched on
//! the record's state.
//!
//! # Error Split
//!
//! - A missing record handed to `init`/`free`, or a slab that cannot hand
//!   out a block, is a programming error: the abort hook fires and the call
//!   never returns.
//! - A missing record handed to `lock`/`unlock` is reported as
//!   [`MutexError::ParamNull`].
//! - Contention is reported, never retried. Atomic and hardware mutex
//!   records make a single attempt; native records block on the kernel
//!   mutex.
//!
//! Records are passed as `Option` so a null record from the runtime can be
//! represented. Lifecycle operations take `&mut`, lock operations take `&`.

use cc3xx_hal::{AbortHook, HalError, HwMutexPeripheral, KernelMutex, Platform, Timeout};
use log::{debug, error, trace};

use crate::record::{MutexHandle, MutexRecord};
use crate::slab::{Slab, SlabError};
use crate::status::{MutexError, MutexState};

/// Abort reason for a null record passed to `init`
pub const ABORT_INIT_NULL: &str = "mutex_init called with NULL parameter";
/// Abort reason for a null record passed to `free`
pub const ABORT_FREE_NULL: &str = "mutex_free called with NULL parameter";
/// Abort reason for a slab that could not provide storage
pub const ABORT_ALLOC_FAILED: &str = "Could not allocate mutex before initializing";

/// Backend-agnostic mutex operations
pub struct MutexApi<P: Platform, A: AbortHook> {
    platform: P,
    abort: A,
    slab: Slab<P>,
}

impl<P: Platform, A: AbortHook> MutexApi<P, A> {
    /// Create the dispatcher with a slab of `capacity` kernel mutexes.
    pub fn new(platform: P, abort: A, capacity: usize) -> Self {
        Self {
            platform,
            abort,
            slab: Slab::new(capacity),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Slab backing dynamically initialized records
    pub fn slab(&self) -> &Slab<P> {
        &self.slab
    }

    fn fatal(&self, reason: &str) -> ! {
        error!("[mutex] abort: {}", reason);
        self.abort.abort(reason)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Prepare a record for locking.
    ///
    /// A native record without storage draws a slab block, waiting for one
    /// if the slab is exhausted. Atomic and hardware mutex records are left
    /// untouched. Aborts on a null record.
    pub fn init(&self, record: Option<&mut MutexRecord<P>>) {
        let Some(record) = record else {
            self.fatal(ABORT_INIT_NULL)
        };

        if self.init_record(record, Timeout::Forever).is_err() {
            self.fatal(ABORT_ALLOC_FAILED)
        }
    }

    /// Like [`init`](Self::init), but waits for a slab block at most
    /// `timeout`.
    ///
    /// # Returns
    /// * `Ok(())` - Record is valid
    /// * `Err(MutexError::ResourceExhausted)` - No block became free in time
    pub fn try_init(
        &self,
        record: Option<&mut MutexRecord<P>>,
        timeout: Timeout,
    ) -> Result<(), MutexError> {
        let Some(record) = record else {
            self.fatal(ABORT_INIT_NULL)
        };

        match self.init_record(record, timeout) {
            Err(MutexError::ResourceExhausted) => Err(MutexError::ResourceExhausted),
            Err(_) => self.fatal(ABORT_ALLOC_FAILED),
            Ok(()) => Ok(()),
        }
    }

    fn init_record(&self, record: &mut MutexRecord<P>, timeout: Timeout) -> Result<(), MutexError> {
        if record.state.is_fixed_backend() {
            return Ok(());
        }

        let mut allocated_now = false;
        if record.state == MutexState::Invalid && record.handle.is_null() {
            let block = match self.slab.allocate_timeout(timeout) {
                Ok(block) => block,
                Err(SlabError::Exhausted) if timeout.is_bounded() => {
                    return Err(MutexError::ResourceExhausted)
                }
                Err(_) => return Err(MutexError::MutexFailed),
            };
            record.handle = MutexHandle::Slab(block);
            allocated_now = true;
        }

        let mutex = record.handle.native().ok_or(MutexError::MutexFailed)?;
        mutex.init();
        record.state = record.state.after_init(allocated_now);

        debug!("[mutex] init {:?}", record);
        Ok(())
    }

    /// Release a record's storage.
    ///
    /// A slab block goes back to the slab; embedded storage is cleared in
    /// place. Atomic, hardware mutex and invalid records are left
    /// untouched. Aborts on a null record.
    pub fn free(&self, record: Option<&mut MutexRecord<P>>) {
        let Some(record) = record else {
            self.fatal(ABORT_FREE_NULL)
        };

        match record.state {
            MutexState::Atomic | MutexState::HardwareMutex(_) | MutexState::Invalid => return,
            MutexState::NativeValid { allocated: true } => {
                // Dropping the block hands the slot back
                record.handle = MutexHandle::Null;
            }
            MutexState::NativeValid { allocated: false } => {
                if let Some(mutex) = record.handle.native() {
                    mutex.clear();
                }
            }
        }

        record.state = record.state.after_free();
        debug!("[mutex] free {:?}", record);
    }

    // ========================================================================
    // Locking
    // ========================================================================

    /// Acquire a record.
    ///
    /// Native records block until the kernel mutex is available. Atomic
    /// and hardware mutex records make one attempt and report
    /// [`MutexError::MutexFailed`] if it is already held.
    pub fn lock(&self, record: Option<&MutexRecord<P>>) -> Result<(), MutexError> {
        self.lock_timeout(record, Timeout::Forever)
    }

    /// Like [`lock`](Self::lock), but a native record waits at most
    /// `timeout` and reports [`MutexError::TimedOut`] when it expires.
    pub fn lock_timeout(
        &self,
        record: Option<&MutexRecord<P>>,
        timeout: Timeout,
    ) -> Result<(), MutexError> {
        let record = record.ok_or(MutexError::ParamNull)?;

        match record.state {
            MutexState::Atomic => {
                let flag = record.handle.atomic().ok_or(MutexError::MutexFailed)?;
                if flag.try_lock() {
                    Ok(())
                } else {
                    trace!("[mutex] atomic flag held");
                    Err(MutexError::MutexFailed)
                }
            }
            MutexState::HardwareMutex(id) => match self.platform.hw_mutex() {
                Some(hw) if hw.try_lock(id) => Ok(()),
                _ => {
                    trace!("[mutex] {} held", id);
                    Err(MutexError::MutexFailed)
                }
            },
            MutexState::Invalid => Err(MutexError::NotInitialized),
            MutexState::NativeValid { .. } => {
                let mutex = record.handle.native().ok_or(MutexError::MutexFailed)?;
                mutex.lock(timeout).map_err(|e| match e {
                    HalError::TimedOut | HalError::WouldBlock if timeout.is_bounded() => {
                        trace!("[mutex] kernel mutex wait expired");
                        MutexError::TimedOut
                    }
                    _ => MutexError::MutexFailed,
                })
            }
        }
    }

    /// Release a record.
    ///
    /// Hardware mutex release is unconditional. Atomic release fails if the
    /// flag was not held.
    pub fn unlock(&self, record: Option<&MutexRecord<P>>) -> Result<(), MutexError> {
        let record = record.ok_or(MutexError::ParamNull)?;

        match record.state {
            MutexState::Atomic => {
                let flag = record.handle.atomic().ok_or(MutexError::MutexFailed)?;
                if flag.try_unlock() {
                    Ok(())
                } else {
                    Err(MutexError::MutexFailed)
                }
            }
            MutexState::HardwareMutex(id) => {
                let hw = self.platform.hw_mutex().ok_or(MutexError::MutexFailed)?;
                hw.unlock(id);
                Ok(())
            }
            MutexState::Invalid => Err(MutexError::NotInitialized),
            MutexState::NativeValid { .. } => {
                let mutex = record.handle.native().ok_or(MutexError::MutexFailed)?;
                mutex.unlock().map_err(|_| MutexError::MutexFailed)
            }
        }
    }
}
