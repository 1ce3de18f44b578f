//! Store providers
//!
//! A provider hands the dispatcher exclusive access to a store for the length
//! of one operation. The shared provider locks a long-lived store; the
//! snapshot provider builds a throwaway store and drops it afterwards.

use crate::state::{MemoryStore, SharedStore, Snapshot};

/// Source of the store one deploy or call runs against
pub trait StoreProvider {
    /// Run `f` with exclusive access to the store for the whole operation
    fn with_store<R>(&self, f: impl FnOnce(&mut MemoryStore) -> R) -> R;
}

impl StoreProvider for SharedStore {
    fn with_store<R>(&self, f: impl FnOnce(&mut MemoryStore) -> R) -> R {
        self.with(f)
    }
}

/// Builds a fresh store from the same snapshot for every operation
#[derive(Debug, Clone)]
pub struct SnapshotProvider {
    snapshot: Snapshot,
}

impl SnapshotProvider {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

impl StoreProvider for SnapshotProvider {
    fn with_store<R>(&self, f: impl FnOnce(&mut MemoryStore) -> R) -> R {
        let mut store = MemoryStore::from_snapshot(&self.snapshot);
        log::trace!("built ephemeral store with {} accounts", store.len());
        f(&mut store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Account;
    use crate::types::Address;
    use primitive_types::U256;

    #[test]
    fn test_snapshot_provider_discards_writes() {
        let address = Address::repeat_byte(1);
        let snapshot = Snapshot::new().with_account(address, Account::with_balance(U256::one()));
        let provider = SnapshotProvider::new(snapshot);

        provider.with_store(|store| store.storage_set(address, U256::one(), U256::from(9)));
        let value = provider.with_store(|store| store.storage_get(&address, &U256::one()));
        assert_eq!(value, U256::zero());
        assert_eq!(provider.snapshot().len(), 1);
    }

    #[test]
    fn test_shared_provider_keeps_writes() {
        let address = Address::repeat_byte(1);
        let shared = SharedStore::new();
        shared.with_store(|store| store.storage_set(address, U256::one(), U256::from(9)));
        assert_eq!(shared.storage_get(&address, &U256::one()), U256::from(9));
    }
}
