//! CC3xx Platform Mutex Layer
//!
//! One mutex API for the CC3xx crypto runtime, backed by whichever locking
//! primitive the platform is configured for:
//!
//! - **Native**: the kernel's blocking mutex
//! - **Atomic**: a lock-free flag, single attempt
//! - **Hardware mutex**: a peripheral shared across cores, acquired by id
//!
//! # Module Organization
//!
//! - `config` - Backend selection and layer configuration
//! - `status` - Record state machine and result codes
//! - `atomic` - Atomic flag storage
//! - `slab` - Fixed-capacity pool of kernel mutex storage
//! - `record` - The mutex record held by the runtime
//! - `dispatch` - `init`/`free`/`lock`/`unlock` operation table
//! - `registry` - The five role records (sym, asym, rng, power, heap)
//! - `binding` - One-time installation into the runtime
//! - `loom_tests` - Concurrency tests using loom (with `loom` feature)
//!
//! # Usage
//!
//! ```ignore
//! let mut runtime = InstalledMutexes::new();
//! platform_mutex_init(platform, abort, &MutexConfig::default(), &mut runtime)?;
//!
//! let api = runtime.api().unwrap();
//! let sym = runtime.mutexes().unwrap().get(MutexRole::Sym);
//! api.lock(Some(sym))?;
//! // ... drive the symmetric engine ...
//! api.unlock(Some(sym))?;
//! ```

#![no_std]
extern crate alloc;

pub mod atomic;
pub mod binding;
pub mod config;
pub mod dispatch;
pub mod record;
pub mod registry;
pub mod slab;
pub mod status;

#[cfg(any(test, feature = "loom"))]
mod loom_tests;

pub use atomic::AtomicFlag;
pub use binding::{platform_mutex_init, CryptoRuntime, InstalledMutexes};
pub use config::{Backend, ConfigError, HwMutexIds, MutexConfig, NUM_MUTEXES};
pub use dispatch::{MutexApi, ABORT_ALLOC_FAILED, ABORT_FREE_NULL, ABORT_INIT_NULL};
pub use record::{MutexHandle, MutexRecord};
pub use registry::{MutexRegistry, MutexRole};
pub use slab::{Slab, SlabBlock, SlabError};
pub use status::{status_code, MutexError, MutexState, SUCCESS};

// Re-export HAL types
pub use cc3xx_hal::{AbortHook, HalError, HwMutexId, Platform, Timeout};
