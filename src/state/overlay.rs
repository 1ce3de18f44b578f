//! Checkpointed execution overlay
//!
//! Writes made during execution land in a stack of layers above a read-only
//! base store. Every call frame opens a checkpoint; a successful frame merges
//! its layer into the parent, a reverted or faulted frame drops it. The root
//! layer is turned into a [`ChangeSet`] once the outermost call finishes.

use crate::state::account::{AccountInfo, Log};
use crate::state::store::MemoryStore;
use crate::types::{Address, Word};
use bytes::Bytes;
use std::collections::BTreeMap;
use thiserror::Error;

/// Overlay errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: Word, need: Word },
    #[error("Balance overflow")]
    BalanceOverflow,
}

/// Writes of one frame
#[derive(Debug, Default)]
struct Layer {
    accounts: BTreeMap<Address, AccountInfo>,
    storage: BTreeMap<(Address, Word), Word>,
    logs: Vec<Log>,
}

impl Layer {
    fn merge(&mut self, child: Layer) {
        self.accounts.extend(child.accounts);
        self.storage.extend(child.storage);
        self.logs.extend(child.logs);
    }
}

/// The net writes of a finished execution
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    /// Final nonce, balance and code of every written account
    pub accounts: BTreeMap<Address, AccountInfo>,
    /// Final value of every written storage slot
    pub storage: BTreeMap<(Address, Word), Word>,
    /// Logs of every frame that succeeded
    pub logs: Vec<Log>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.storage.is_empty() && self.logs.is_empty()
    }
}

/// Layered view over a base store
pub struct Overlay<'a> {
    base: &'a MemoryStore,
    layers: Vec<Layer>,
}

impl<'a> Overlay<'a> {
    pub fn new(base: &'a MemoryStore) -> Self {
        Self {
            base,
            layers: vec![Layer::default()],
        }
    }

    /// Number of open checkpoints
    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }

    /// Open a checkpoint
    pub fn checkpoint(&mut self) {
        self.layers.push(Layer::default());
    }

    /// Keep the writes made since the last checkpoint
    pub fn commit(&mut self) {
        if self.layers.len() < 2 {
            log::warn!("commit without an open checkpoint");
            return;
        }
        if let Some(child) = self.layers.pop() {
            if let Some(parent) = self.layers.last_mut() {
                parent.merge(child);
            }
        }
    }

    /// Discard the writes made since the last checkpoint
    pub fn revert(&mut self) {
        if self.layers.len() < 2 {
            log::warn!("revert without an open checkpoint");
            return;
        }
        self.layers.pop();
    }

    fn top(&mut self) -> &mut Layer {
        if self.layers.is_empty() {
            self.layers.push(Layer::default());
        }
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }

    /// Nonce, balance and code as seen by the current frame
    pub fn info(&self, address: &Address) -> AccountInfo {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.accounts.get(address))
            .cloned()
            .unwrap_or_else(|| {
                self.base
                    .account(address)
                    .map(|account| account.info())
                    .unwrap_or_default()
            })
    }

    pub fn set_info(&mut self, address: Address, info: AccountInfo) {
        self.top().accounts.insert(address, info);
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.info(address).nonce
    }

    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        let mut info = self.info(&address);
        info.nonce = nonce;
        self.set_info(address, info);
    }

    pub fn balance(&self, address: &Address) -> Word {
        self.info(address).balance
    }

    pub fn set_balance(&mut self, address: Address, balance: Word) {
        let mut info = self.info(&address);
        info.balance = balance;
        self.set_info(address, info);
    }

    pub fn code(&self, address: &Address) -> Bytes {
        self.info(address).code
    }

    pub fn set_code(&mut self, address: Address, code: Bytes) {
        let mut info = self.info(&address);
        info.code = code;
        self.set_info(address, info);
    }

    /// Whether the account has a nonce, balance or code
    pub fn exists(&self, address: &Address) -> bool {
        !self.info(address).is_empty()
    }

    /// Storage slot as seen by the current frame
    pub fn storage(&self, address: &Address, key: &Word) -> Word {
        let slot = (*address, *key);
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.storage.get(&slot))
            .copied()
            .unwrap_or_else(|| self.base.storage_get(address, key))
    }

    pub fn set_storage(&mut self, address: Address, key: Word, value: Word) {
        self.top().storage.insert((address, key), value);
    }

    pub fn push_log(&mut self, log: Log) {
        self.top().logs.push(log);
    }

    /// Move `value` between accounts
    ///
    /// Either both balances change or neither does.
    pub fn transfer(&mut self, from: Address, to: Address, value: Word) -> Result<(), StateError> {
        if value.is_zero() {
            return Ok(());
        }
        let have = self.balance(&from);
        if have < value {
            return Err(StateError::InsufficientBalance { have, need: value });
        }
        if from == to {
            return Ok(());
        }

        let credited = self
            .balance(&to)
            .checked_add(value)
            .ok_or(StateError::BalanceOverflow)?;
        self.set_balance(from, have - value);
        self.set_balance(to, credited);
        Ok(())
    }

    /// Fold every layer into the net writes
    pub fn into_changes(self) -> ChangeSet {
        if self.layers.len() > 1 {
            log::warn!(
                "finishing overlay with {} open checkpoints",
                self.layers.len() - 1
            );
        }
        let mut root = Layer::default();
        for layer in self.layers {
            root.merge(layer);
        }
        ChangeSet {
            accounts: root.accounts,
            storage: root.storage,
            logs: root.logs,
        }
    }
}
