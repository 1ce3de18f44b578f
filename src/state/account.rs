//! Account records
//!
//! An account is addressed by its key in the store; the record itself carries
//! the nonce, balance, immutable code and storage.

use crate::crypto::hash::{keccak256, KECCAK_EMPTY};
use crate::types::{Address, Word};
use bytes::Bytes;
use primitive_types::{H256, U256};
use std::collections::BTreeMap;

/// A full account record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    /// Number of creations performed by this account
    pub nonce: u64,
    /// Native balance
    pub balance: Word,
    /// Runtime code, empty for plain value-holding accounts
    pub code: Bytes,
    /// Persistent storage, zero values are never stored
    pub storage: BTreeMap<Word, Word>,
}

impl Account {
    /// Create an empty account
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a plain account holding `balance`
    pub fn with_balance(balance: Word) -> Self {
        Self {
            balance,
            ..Default::default()
        }
    }

    /// Create a contract account running `code`
    pub fn with_code(code: impl Into<Bytes>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    /// Read a storage slot, absent keys read as zero
    pub fn storage_value(&self, key: &Word) -> Word {
        self.storage.get(key).copied().unwrap_or_default()
    }

    /// Write a storage slot, writing zero removes the key
    pub fn set_storage_value(&mut self, key: Word, value: Word) {
        if value.is_zero() {
            self.storage.remove(&key);
        } else {
            self.storage.insert(key, value);
        }
    }

    /// The nonce, balance and code of this account
    pub fn info(&self) -> AccountInfo {
        AccountInfo {
            nonce: self.nonce,
            balance: self.balance,
            code: self.code.clone(),
        }
    }

    /// Whether this account is indistinguishable from an absent one
    pub fn is_empty(&self) -> bool {
        self.info().is_empty() && self.storage.is_empty()
    }
}

/// Account fields other than storage, as tracked by the execution overlay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountInfo {
    pub nonce: u64,
    pub balance: Word,
    pub code: Bytes,
}

impl AccountInfo {
    /// No nonce, no balance, no code
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance == U256::zero() && self.code.is_empty()
    }

    pub fn code_hash(&self) -> H256 {
        if self.code.is_empty() {
            KECCAK_EMPTY
        } else {
            keccak256(&self.code)
        }
    }
}

/// An event emitted by a LOG instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics (0 to 4)
    pub topics: Vec<H256>,
    /// Unindexed payload
    pub data: Vec<u8>,
}
