//! Platform binding
//!
//! [`platform_mutex_init`] is the one-time entry point: it checks the
//! configuration against the platform, builds the dispatcher and the
//! registry, and hands both to the crypto runtime.

use alloc::sync::Arc;

use cc3xx_hal::{AbortHook, HwMutexPeripheral, Platform};
use log::{info, warn};

use crate::config::{ConfigError, MutexConfig};
use crate::dispatch::MutexApi;
use crate::registry::MutexRegistry;

/// Configuration slot of the crypto runtime
pub trait CryptoRuntime<P: Platform, A: AbortHook> {
    /// Take the operation table and the role records.
    fn set_mutexes(&mut self, api: Arc<MutexApi<P, A>>, mutexes: MutexRegistry<P>);
}

/// Runtime slot that just holds what was installed
pub struct InstalledMutexes<P: Platform, A: AbortHook> {
    api: Option<Arc<MutexApi<P, A>>>,
    mutexes: Option<MutexRegistry<P>>,
}

impl<P: Platform, A: AbortHook> InstalledMutexes<P, A> {
    pub fn new() -> Self {
        Self {
            api: None,
            mutexes: None,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.api.is_some()
    }

    pub fn api(&self) -> Option<&Arc<MutexApi<P, A>>> {
        self.api.as_ref()
    }

    pub fn mutexes(&self) -> Option<&MutexRegistry<P>> {
        self.mutexes.as_ref()
    }

    pub fn mutexes_mut(&mut self) -> Option<&mut MutexRegistry<P>> {
        self.mutexes.as_mut()
    }
}

impl<P: Platform, A: AbortHook> Default for InstalledMutexes<P, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Platform, A: AbortHook> CryptoRuntime<P, A> for InstalledMutexes<P, A> {
    fn set_mutexes(&mut self, api: Arc<MutexApi<P, A>>, mutexes: MutexRegistry<P>) {
        self.api = Some(api);
        self.mutexes = Some(mutexes);
    }
}

/// Install the mutex layer into `runtime`.
///
/// Call once at startup, before the runtime uses any mutex.
///
/// # Returns
/// * `Ok(())` - Dispatcher and registry installed
/// * `Err(ConfigError)` - Configuration rejected; nothing was installed
pub fn platform_mutex_init<P, A, R>(
    platform: P,
    abort: A,
    config: &MutexConfig,
    runtime: &mut R,
) -> Result<(), ConfigError>
where
    P: Platform,
    A: AbortHook,
    R: CryptoRuntime<P, A> + ?Sized,
{
    let hw_count = platform.hw_mutex().map(|hw| hw.count());
    if let Err(e) = config.validate(hw_count) {
        warn!("[platform] rejected mutex config: {}", e);
        return Err(e);
    }

    let name = platform.name();
    let api = Arc::new(MutexApi::new(platform, abort, config.num_mutexes));
    let mutexes = MutexRegistry::new(config);
    runtime.set_mutexes(api, mutexes);

    info!(
        "[platform] {} mutexes installed on {} ({} slab slots)",
        config.backend, name, config.num_mutexes
    );
    Ok(())
}
