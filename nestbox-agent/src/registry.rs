//! In-memory registry of live microVM records.
//!
//! The single source of truth shared between unrelated requests. Readers
//! take the shared lock; insert and remove are the only writers. Per-record
//! mutation happens under each record's own lock, so a slow spawn never
//! blocks `list()`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use nestbox_core::VmId;

use crate::microvm::MicroVm;

/// Failures enforcing registry invariants.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// Another live record already uses this name.
    #[error("microVM with name '{0}' already exists")]
    NameTaken(String),

    /// The instance cap is reached.
    #[error("maximum microVM limit reached ({0})")]
    CapacityExceeded(usize),
}

/// Identifier-keyed map of live records plus the monotonic counter used for
/// id and default-name generation.
#[derive(Debug)]
pub struct Registry {
    vms: RwLock<HashMap<VmId, Arc<MicroVm>>>,
    counter: AtomicU64,
    cap: usize,
}

impl Registry {
    /// Empty registry with the given instance cap.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            vms: RwLock::new(HashMap::new()),
            counter: AtomicU64::new(0),
            cap,
        }
    }

    /// Next value of the monotonic counter.
    pub fn next_counter(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Snapshot of all live records, ordered by name. The ordering is a
    /// contract: clients rely on it for stable listings.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<MicroVm>> {
        let mut records: Vec<_> = self.read().values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Looks a record up by exact id, then exact name, then id prefix.
    ///
    /// With an ambiguous prefix the first record encountered wins; callers
    /// needing strictness pass full identifiers.
    #[must_use]
    pub fn resolve(&self, token: &str) -> Option<Arc<MicroVm>> {
        if token.is_empty() {
            return None;
        }
        let vms = self.read();
        if let Some(vm) = vms.get(&VmId::new(token)) {
            return Some(Arc::clone(vm));
        }
        vms.values()
            .find(|vm| vm.name == token)
            .or_else(|| vms.values().find(|vm| vm.id.as_str().starts_with(token)))
            .cloned()
    }

    /// Whether any live record already uses `name`.
    #[must_use]
    pub fn name_taken(&self, name: &str) -> bool {
        self.read().values().any(|vm| vm.name == name)
    }

    /// Whether a regular (non-legacy) insert would exceed the cap.
    #[must_use]
    pub fn at_capacity(&self) -> bool {
        Self::regular_count(&self.read()) >= self.cap
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Registers a record.
    ///
    /// Name uniqueness and the cap are checked under a single writer hold,
    /// making this the authoritative admission point. The legacy singleton
    /// (fixed id `legacy`) predates the cap and is exempt from it, but not
    /// from name uniqueness.
    ///
    /// # Errors
    /// [`RegistryError::NameTaken`] or [`RegistryError::CapacityExceeded`].
    pub fn insert(&self, vm: Arc<MicroVm>) -> Result<(), RegistryError> {
        let mut vms = self.write();
        if vms.values().any(|existing| existing.name == vm.name) {
            return Err(RegistryError::NameTaken(vm.name.clone()));
        }
        if vm.id != VmId::legacy() && Self::regular_count(&vms) >= self.cap {
            return Err(RegistryError::CapacityExceeded(self.cap));
        }
        vms.insert(vm.id.clone(), vm);
        Ok(())
    }

    /// Removes a record by id; idempotent.
    pub fn remove(&self, id: &VmId) -> Option<Arc<MicroVm>> {
        self.write().remove(id)
    }

    fn regular_count(vms: &HashMap<VmId, Arc<MicroVm>>) -> usize {
        vms.keys().filter(|id| **id != VmId::legacy()).count()
    }

    #[allow(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<VmId, Arc<MicroVm>>> {
        self.vms.read().expect("registry lock poisoned")
    }

    #[allow(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<VmId, Arc<MicroVm>>> {
        self.vms.write().expect("registry lock poisoned")
    }
}
