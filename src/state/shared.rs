//! Thread-safe shared store
//!
//! A [`MemoryStore`] behind a single coarse lock. Holding the lock for a whole
//! deploy or call makes every operation atomic with respect to every other.
//! The process-wide persistent store is one such instance, created lazily on
//! first use; independent instances can be built freely.

use crate::state::account::Account;
use crate::state::snapshot::Snapshot;
use crate::state::store::MemoryStore;
use crate::types::{Address, Word};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;

static PERSISTENT: Lazy<SharedStore> = Lazy::new(|| {
    log::debug!("creating process-wide persistent store");
    SharedStore::new()
});

/// A cloneable handle to a mutex-guarded store
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<MemoryStore>>,
}

impl SharedStore {
    /// Create an independent empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing store
    pub fn from_store(store: MemoryStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Build an independent store from a snapshot
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self::from_store(MemoryStore::from_snapshot(snapshot))
    }

    /// Handle to the process-wide persistent store
    pub fn persistent() -> Self {
        PERSISTENT.clone()
    }

    /// Run `f` with exclusive access to the store
    pub fn with<R>(&self, f: impl FnOnce(&mut MemoryStore) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    pub fn get(&self, address: &Address) -> Account {
        self.with(|store| store.get(address))
    }

    pub fn put(&self, address: Address, account: Account) {
        self.with(|store| store.put(address, account))
    }

    pub fn storage_get(&self, address: &Address, key: &Word) -> Word {
        self.with(|store| store.storage_get(address, key))
    }

    pub fn storage_set(&self, address: Address, key: Word, value: Word) {
        self.with(|store| store.storage_set(address, key, value))
    }

    /// Copy of the whole store, taken atomically
    pub fn snapshot(&self) -> Snapshot {
        self.with(|store| store.snapshot())
    }

    /// Whether two handles point at the same store
    pub fn same_store(&self, other: &SharedStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
