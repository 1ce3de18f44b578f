//! In-memory account store
//!
//! The base database of accounts. Execution never writes here directly: it
//! runs against an [`Overlay`](crate::state::Overlay) and the resulting
//! [`ChangeSet`] is applied only when the outermost call succeeds.

use crate::state::account::{Account, AccountInfo};
use crate::state::overlay::ChangeSet;
use crate::state::snapshot::Snapshot;
use crate::types::{Address, Word};
use std::collections::BTreeMap;

/// A logical database of accounts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    accounts: BTreeMap<Address, Account>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an isolated store from a snapshot, applied in full
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut store = Self::new();
        for (address, account) in snapshot.accounts() {
            let mut account = account.clone();
            account.storage.retain(|_, value| !value.is_zero());
            store.put(*address, account);
        }
        store
    }

    /// Export every account
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for (address, account) in &self.accounts {
            snapshot.insert(*address, account.clone());
        }
        snapshot
    }

    /// Get an account, or the zero account if absent
    pub fn get(&self, address: &Address) -> Account {
        self.accounts.get(address).cloned().unwrap_or_default()
    }

    /// Borrow an account if present
    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Replace or insert an account
    pub fn put(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    /// Read a storage slot, absent accounts and keys read as zero
    pub fn storage_get(&self, address: &Address, key: &Word) -> Word {
        self.accounts
            .get(address)
            .map(|account| account.storage_value(key))
            .unwrap_or_default()
    }

    /// Write a storage slot, creating the account if needed
    pub fn storage_set(&mut self, address: Address, key: Word, value: Word) {
        if value.is_zero() && !self.accounts.contains_key(&address) {
            return;
        }
        self.accounts
            .entry(address)
            .or_default()
            .set_storage_value(key, value);
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    /// Number of accounts
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Iterate accounts in address order
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    /// Commit the writes of a finished execution
    pub fn apply(&mut self, changes: ChangeSet) {
        let ChangeSet {
            accounts, storage, ..
        } = changes;

        for (address, info) in accounts {
            self.apply_info(address, info);
        }
        for ((address, key), value) in storage {
            self.storage_set(address, key, value);
        }
    }

    fn apply_info(&mut self, address: Address, info: AccountInfo) {
        // An untouched empty account stays absent
        if info.is_empty() && !self.accounts.contains_key(&address) {
            return;
        }
        let account = self.accounts.entry(address).or_default();
        account.nonce = info.nonce;
        account.balance = info.balance;
        account.code = info.code;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::{H160, U256};

    fn addr(byte: u8) -> Address {
        H160::repeat_byte(byte)
    }

    #[test]
    fn test_get_absent_account_is_default() {
        let store = MemoryStore::new();
        let account = store.get(&addr(1));
        assert_eq!(account, Account::default());
        assert!(!store.contains(&addr(1)));
    }

    #[test]
    fn test_put_replaces_whole_account() {
        let mut store = MemoryStore::new();
        let mut first = Account::with_balance(U256::from(10));
        first.set_storage_value(U256::one(), U256::one());
        store.put(addr(1), first);

        store.put(addr(1), Account::with_balance(U256::from(3)));
        let account = store.get(&addr(1));
        assert_eq!(account.balance, U256::from(3));
        assert!(account.storage.is_empty());
    }

    #[test]
    fn test_storage_get_set() {
        let mut store = MemoryStore::new();
        assert_eq!(store.storage_get(&addr(1), &U256::from(9)), U256::zero());

        store.storage_set(addr(1), U256::from(9), U256::from(99));
        assert_eq!(store.storage_get(&addr(1), &U256::from(9)), U256::from(99));

        store.storage_set(addr(1), U256::from(9), U256::zero());
        assert_eq!(store.storage_get(&addr(1), &U256::from(9)), U256::zero());
        assert!(store.get(&addr(1)).storage.is_empty());
    }

    #[test]
    fn test_zero_write_does_not_create_account() {
        let mut store = MemoryStore::new();
        store.storage_set(addr(2), U256::one(), U256::zero());
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_accounts() {
        let mut store = MemoryStore::new();
        let mut account = Account::with_code(vec![0x60, 0x00]);
        account.nonce = 3;
        account.balance = U256::from(500);
        account.set_storage_value(U256::one(), U256::from(2));
        store.put(addr(7), account);

        let rebuilt = MemoryStore::from_snapshot(&store.snapshot());
        assert_eq!(rebuilt, store);
    }
}
