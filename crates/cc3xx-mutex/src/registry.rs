//! Static mutex registry
//!
//! The crypto runtime protects five shared resources, each with its own
//! record. The registry builds all five from the configured backend. The
//! RNG record is always a kernel mutex, whatever the backend.

use core::fmt;

use cc3xx_hal::Platform;
use log::debug;

use crate::config::{Backend, MutexConfig};
use crate::record::MutexRecord;

/// Shared resource guarded by a registry record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutexRole {
    /// Symmetric cipher engine
    Sym,
    /// Asymmetric (PKA) engine
    Asym,
    /// Random number generator
    Rng,
    /// Power management
    Power,
    /// Heap allocator
    Heap,
}

impl MutexRole {
    pub const ALL: [MutexRole; 5] = [
        MutexRole::Sym,
        MutexRole::Asym,
        MutexRole::Rng,
        MutexRole::Power,
        MutexRole::Heap,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            MutexRole::Sym => "sym",
            MutexRole::Asym => "asym",
            MutexRole::Rng => "rng",
            MutexRole::Power => "power",
            MutexRole::Heap => "heap",
        }
    }
}

impl fmt::Display for MutexRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The five role records
pub struct MutexRegistry<P: Platform> {
    sym: MutexRecord<P>,
    asym: MutexRecord<P>,
    rng: MutexRecord<P>,
    power: MutexRecord<P>,
    heap: MutexRecord<P>,
}

impl<P: Platform> MutexRegistry<P> {
    /// Build the records for `config.backend`.
    ///
    /// Kernel mutex records come back constructed and valid; atomic records
    /// come back unlocked.
    pub fn new(config: &MutexConfig) -> Self {
        let build = |role: MutexRole| -> MutexRecord<P> {
            match (config.backend, config.hw_ids.get(role)) {
                (Backend::Atomic, Some(_)) => MutexRecord::atomic(),
                (Backend::HardwareMutex, Some(id)) => MutexRecord::hardware(id),
                _ => MutexRecord::native_static(),
            }
        };

        let registry = Self {
            sym: build(MutexRole::Sym),
            asym: build(MutexRole::Asym),
            rng: build(MutexRole::Rng),
            power: build(MutexRole::Power),
            heap: build(MutexRole::Heap),
        };

        for (role, record) in registry.iter() {
            debug!("[registry] {} -> {:?}", role, record.state());
        }
        registry
    }

    pub fn get(&self, role: MutexRole) -> &MutexRecord<P> {
        match role {
            MutexRole::Sym => &self.sym,
            MutexRole::Asym => &self.asym,
            MutexRole::Rng => &self.rng,
            MutexRole::Power => &self.power,
            MutexRole::Heap => &self.heap,
        }
    }

    pub fn get_mut(&mut self, role: MutexRole) -> &mut MutexRecord<P> {
        match role {
            MutexRole::Sym => &mut self.sym,
            MutexRole::Asym => &mut self.asym,
            MutexRole::Rng => &mut self.rng,
            MutexRole::Power => &mut self.power,
            MutexRole::Heap => &mut self.heap,
        }
    }

    /// Records in role order
    pub fn iter(&self) -> impl Iterator<Item = (MutexRole, &MutexRecord<P>)> + '_ {
        MutexRole::ALL.into_iter().map(move |role| (role, self.get(role)))
    }
}

impl<P: Platform> fmt::Debug for MutexRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
