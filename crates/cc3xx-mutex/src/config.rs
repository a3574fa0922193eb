//! Backend selection and layer configuration
//!
//! The backend is a configuration value chosen once at startup, so the same
//! build can run against all three locking strategies. Integrators that
//! still select the backend with build flags can map them through
//! [`Backend::from_flags`], which rejects zero or multiple selections.

use core::fmt;
use core::str::FromStr;

use cc3xx_hal::HwMutexId;

use crate::registry::MutexRole;

/// Default capacity of the slab allocator
pub const NUM_MUTEXES: usize = 64;

/// Locking strategy used by the static registry roles
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Backend {
    /// Kernel blocking mutex
    #[default]
    Native,
    /// Lock-free atomic flag, single attempt
    Atomic,
    /// Hardware mutex peripheral, single attempt
    #[cfg_attr(feature = "serde", serde(rename = "hw-mutex"))]
    HardwareMutex,
}

impl Backend {
    /// Map the three exclusive build flags to a backend.
    pub fn from_flags(native: bool, atomic: bool, hw_mutex: bool) -> Result<Self, ConfigError> {
        match (native, atomic, hw_mutex) {
            (true, false, false) => Ok(Backend::Native),
            (false, true, false) => Ok(Backend::Atomic),
            (false, false, true) => Ok(Backend::HardwareMutex),
            (false, false, false) => Err(ConfigError::NoBackendSelected),
            _ => Err(ConfigError::MultipleBackendsSelected),
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Backend::Native => "native",
            Backend::Atomic => "atomic",
            Backend::HardwareMutex => "hw-mutex",
        }
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(Backend::Native),
            "atomic" => Ok(Backend::Atomic),
            "hw-mutex" | "hardware-mutex" => Ok(Backend::HardwareMutex),
            _ => Err(ConfigError::UnknownBackend),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hardware mutex instance assigned to each role
///
/// The RNG role always uses a kernel mutex and has no id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HwMutexIds {
    pub sym: HwMutexId,
    pub asym: HwMutexId,
    pub power: HwMutexId,
    pub heap: HwMutexId,
}

impl HwMutexIds {
    /// Id for `role`, `None` for the RNG role
    pub const fn get(&self, role: MutexRole) -> Option<HwMutexId> {
        match role {
            MutexRole::Sym => Some(self.sym),
            MutexRole::Asym => Some(self.asym),
            MutexRole::Power => Some(self.power),
            MutexRole::Heap => Some(self.heap),
            MutexRole::Rng => None,
        }
    }

    fn all(&self) -> [HwMutexId; 4] {
        [self.sym, self.asym, self.power, self.heap]
    }
}

impl Default for HwMutexIds {
    fn default() -> Self {
        Self {
            sym: HwMutexId::new(15),
            asym: HwMutexId::new(14),
            power: HwMutexId::new(13),
            heap: HwMutexId::new(12),
        }
    }
}

/// Mutex layer configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MutexConfig {
    /// Backend for the sym/asym/power/heap roles
    pub backend: Backend,
    /// Slab capacity for dynamically allocated kernel mutexes
    pub num_mutexes: usize,
    /// Hardware mutex ids, used only by `Backend::HardwareMutex`
    pub hw_ids: HwMutexIds,
}

impl MutexConfig {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    pub fn with_num_mutexes(mut self, num_mutexes: usize) -> Self {
        self.num_mutexes = num_mutexes;
        self
    }

    pub fn with_hw_ids(mut self, hw_ids: HwMutexIds) -> Self {
        self.hw_ids = hw_ids;
        self
    }

    /// Check the configuration against the platform.
    ///
    /// # Arguments
    /// * `hw_mutex_count` - Instance count of the platform's hardware mutex
    ///   peripheral, `None` if the platform has none
    pub fn validate(&self, hw_mutex_count: Option<u8>) -> Result<(), ConfigError> {
        if self.num_mutexes == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        if self.backend != Backend::HardwareMutex {
            return Ok(());
        }

        let count = hw_mutex_count.ok_or(ConfigError::HwMutexUnavailable)?;
        let ids = self.hw_ids.all();
        for (i, id) in ids.iter().enumerate() {
            if id.id() >= count {
                return Err(ConfigError::HwMutexIdOutOfRange { id: *id, count });
            }
            if ids[..i].contains(id) {
                return Err(ConfigError::DuplicateHwMutexId(*id));
            }
        }
        Ok(())
    }
}

impl Default for MutexConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Native,
            num_mutexes: NUM_MUTEXES,
            hw_ids: HwMutexIds::default(),
        }
    }
}

/// Configuration errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// No backend flag set
    NoBackendSelected,
    /// More than one backend flag set
    MultipleBackendsSelected,
    /// Backend name not recognised
    UnknownBackend,
    /// Slab capacity of zero
    ZeroCapacity,
    /// Hardware mutex backend on a platform without the peripheral
    HwMutexUnavailable,
    /// Id beyond the peripheral's instance count
    HwMutexIdOutOfRange { id: HwMutexId, count: u8 },
    /// Two roles share one hardware mutex instance
    DuplicateHwMutexId(HwMutexId),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoBackendSelected => write!(f, "no mutex backend selected"),
            ConfigError::MultipleBackendsSelected => {
                write!(f, "more than one mutex backend selected")
            }
            ConfigError::UnknownBackend => write!(f, "unknown mutex backend"),
            ConfigError::ZeroCapacity => write!(f, "mutex slab capacity must be non-zero"),
            ConfigError::HwMutexUnavailable => {
                write!(f, "platform has no hardware mutex peripheral")
            }
            ConfigError::HwMutexIdOutOfRange { id, count } => {
                write!(f, "{} out of range (peripheral has {})", id, count)
            }
            ConfigError::DuplicateHwMutexId(id) => write!(f, "{} assigned to two roles", id),
        }
    }
}
