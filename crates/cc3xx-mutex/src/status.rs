//! Mutex record status and result codes
//!
//! [`MutexState`] is the tagged status of one mutex record. It replaces the
//! runtime's flag word (`IS_VALID`, `IS_ALLOCATED`, `IS_ATOMIC`,
//! `IS_HW_MUTEX`) with an enum, so illegal combinations such as an
//! "allocated atomic" mutex cannot be expressed.
//!
//! # State Machine
//!
//! ```text
//!            init (slab block)            free
//!  Invalid ─────────────────▶ NativeValid ─────▶ Invalid
//!     │     init (in place)       ▲  │
//!     └───────────────────────────┘  └─ init: idempotent
//!
//!  Atomic, HardwareMutex(id): set at construction, init/free are no-ops
//! ```
//!
//! [`MutexError`] carries the recoverable outcomes of `lock`/`unlock`.
//! Fatal misuse never reaches this type; it goes through the abort hook.

use cc3xx_hal::HwMutexId;
use core::fmt;

/// Flag word: record is not initialized
pub const FLAG_INVALID: u32 = 0;
/// Flag word: kernel mutex is constructed
pub const FLAG_IS_VALID: u32 = 1 << 0;
/// Flag word: storage came from the slab allocator
pub const FLAG_IS_ALLOCATED: u32 = 1 << 1;
/// Flag word: atomic flag backend
pub const FLAG_IS_ATOMIC: u32 = 1 << 2;
/// Flag word: hardware mutex backend
pub const FLAG_IS_HW_MUTEX: u32 = 1 << 3;

/// Status of one mutex record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutexState {
    /// Not initialized; lock/unlock report `NotInitialized`
    Invalid,
    /// Kernel mutex constructed. `allocated` is set when the storage is a
    /// slab block that `free` must hand back.
    NativeValid { allocated: bool },
    /// Atomic flag backend, fixed for the record's lifetime
    Atomic,
    /// Hardware mutex backend, fixed for the record's lifetime
    HardwareMutex(HwMutexId),
}

impl MutexState {
    /// Whether `lock`/`unlock` can act on this record
    pub const fn is_valid(&self) -> bool {
        !matches!(self, MutexState::Invalid)
    }

    /// Whether the backend storage is defined statically and never freed
    pub const fn is_fixed_backend(&self) -> bool {
        matches!(self, MutexState::Atomic | MutexState::HardwareMutex(_))
    }

    /// Whether the record uses the kernel mutex backend (valid or not)
    pub const fn is_native(&self) -> bool {
        matches!(self, MutexState::Invalid | MutexState::NativeValid { .. })
    }

    /// Whether the storage came from the slab allocator
    pub const fn is_allocated(&self) -> bool {
        matches!(self, MutexState::NativeValid { allocated: true })
    }

    /// State after a successful `init`.
    ///
    /// `allocated_now` is set when `init` just drew a slab block. An
    /// existing `allocated` mark survives re-initialization.
    pub const fn after_init(self, allocated_now: bool) -> Self {
        match self {
            MutexState::Atomic | MutexState::HardwareMutex(_) => self,
            MutexState::Invalid => MutexState::NativeValid {
                allocated: allocated_now,
            },
            MutexState::NativeValid { allocated } => MutexState::NativeValid {
                allocated: allocated || allocated_now,
            },
        }
    }

    /// State after `free`.
    pub const fn after_free(self) -> Self {
        match self {
            MutexState::Atomic | MutexState::HardwareMutex(_) => self,
            MutexState::Invalid | MutexState::NativeValid { .. } => MutexState::Invalid,
        }
    }

    /// The runtime's flag word for this state
    pub const fn flags(&self) -> u32 {
        match self {
            MutexState::Invalid => FLAG_INVALID,
            MutexState::NativeValid { allocated: false } => FLAG_IS_VALID,
            MutexState::NativeValid { allocated: true } => FLAG_IS_VALID | FLAG_IS_ALLOCATED,
            MutexState::Atomic => FLAG_IS_ATOMIC,
            MutexState::HardwareMutex(_) => FLAG_IS_HW_MUTEX,
        }
    }
}

/// Status code reported for a successful operation
pub const SUCCESS: i32 = 0;

/// Recoverable mutex operation errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutexError {
    /// No record was passed to lock/unlock
    ParamNull,
    /// Contention (atomic CAS lost, hardware mutex held) or a kernel
    /// primitive failure
    MutexFailed,
    /// Record is `Invalid`
    NotInitialized,
    /// Bounded lock wait expired
    TimedOut,
    /// Bounded slab wait expired
    ResourceExhausted,
}

impl MutexError {
    /// Numeric status code understood by the crypto runtime
    pub const fn code(self) -> i32 {
        match self {
            MutexError::ParamNull => -0x7001,
            MutexError::NotInitialized => -0x7016,
            MutexError::MutexFailed => -0x7017,
            MutexError::TimedOut => -0x7018,
            MutexError::ResourceExhausted => -0x7019,
        }
    }
}

impl fmt::Display for MutexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutexError::ParamNull => write!(f, "mutex parameter is null"),
            MutexError::MutexFailed => write!(f, "mutex operation failed"),
            MutexError::NotInitialized => write!(f, "mutex not initialized"),
            MutexError::TimedOut => write!(f, "mutex wait timed out"),
            MutexError::ResourceExhausted => write!(f, "no free mutex slots"),
        }
    }
}

/// Collapse an operation result into the runtime's numeric status code.
pub const fn status_code(result: Result<(), MutexError>) -> i32 {
    match result {
        Ok(()) => SUCCESS,
        Err(err) => err.code(),
    }
}

// ============================================================================
// Kani Proofs for State Machine Invariants
// ============================================================================

#[cfg(kani)]
mod proofs {
    use super::*;

    fn any_state() -> MutexState {
        let tag: u8 = kani::any();
        kani::assume(tag < 4);
        match tag {
            0 => MutexState::Invalid,
            1 => MutexState::NativeValid {
                allocated: kani::any(),
            },
            2 => MutexState::Atomic,
            _ => MutexState::HardwareMutex(HwMutexId::new(kani::any())),
        }
    }

    /// Proof: fixed backends never change kind or gain `allocated`
    #[kani::proof]
    fn fixed_backend_is_stable() {
        let state = any_state();
        kani::assume(state.is_fixed_backend());

        let allocated_now: bool = kani::any();
        kani::assert(state.after_init(allocated_now) == state, "init must not alter");
        kani::assert(state.after_free() == state, "free must not alter");
        kani::assert(!state.after_init(allocated_now).is_allocated(), "never allocated");
    }

    /// Proof: free always returns a native record to Invalid
    #[kani::proof]
    fn free_clears_native() {
        let state = any_state();
        kani::assume(state.is_native());

        let freed = state.after_free();
        kani::assert(freed == MutexState::Invalid, "free must reach Invalid");
        kani::assert(!freed.is_allocated(), "Invalid never allocated");
    }

    /// Proof: init always leaves a native record valid
    #[kani::proof]
    fn init_validates_native() {
        let state = any_state();
        kani::assume(state.is_native());

        let allocated_now: bool = kani::any();
        let next = state.after_init(allocated_now);
        kani::assert(next.is_valid(), "init must validate");
        if allocated_now {
            kani::assert(next.is_allocated(), "fresh slab block must be marked");
        }
    }
}
