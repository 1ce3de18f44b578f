//! Initial-state snapshots
//!
//! JSON form, keyed by address hex:
//!
//! ```json
//! {
//!   "0xf000000000000000000000000000000000000000": {
//!     "nonce": "0x0",
//!     "balance": "0xe8d4a51000",
//!     "storage": {
//!       "0x00..01": "0x00..2a"
//!     },
//!     "code": [96, 0]
//!   }
//! }
//! ```
//!
//! Numbers are hex strings; storage keys and values are the canonical 32-byte
//! big-endian word encoding.

use crate::state::account::Account;
use crate::types::{parse_address, word_from_bytes, word_to_bytes, Address, AddressError, Word};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

/// Snapshot errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddressError),
    #[error("Invalid {field} for {address}: {value}")]
    InvalidNumber {
        address: String,
        field: &'static str,
        value: String,
    },
    #[error("Invalid storage word for {address}: {value} (expected 32 bytes of hex)")]
    InvalidStorageWord { address: String, value: String },
}

/// Account entry as written in JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AccountState {
    nonce: String,
    balance: String,
    #[serde(default)]
    storage: BTreeMap<String, String>,
    #[serde(default)]
    code: Vec<u8>,
}

/// A full set of initial account states
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    accounts: BTreeMap<Address, Account>,
}

impl Snapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an account
    pub fn insert(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    /// Builder form of [`Snapshot::insert`]
    pub fn with_account(mut self, address: Address, account: Account) -> Self {
        self.insert(address, account);
        self
    }

    pub fn get(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Parse the JSON form
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let raw: BTreeMap<String, AccountState> = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Render the JSON form
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(&self.to_raw())?)
    }

    /// Load the JSON form from a file
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let file = fs::File::open(path)?;
        let raw: BTreeMap<String, AccountState> = serde_json::from_reader(BufReader::new(file))?;
        Self::from_raw(raw)
    }

    /// Write the JSON form to a file
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.to_raw())?;
        Ok(())
    }

    fn from_raw(raw: BTreeMap<String, AccountState>) -> Result<Self, SnapshotError> {
        let mut snapshot = Self::new();
        for (key, state) in raw {
            let address = parse_address(&key)?;
            let nonce = parse_quantity(&state.nonce)
                .filter(|n| n.bits() <= 64)
                .ok_or_else(|| SnapshotError::InvalidNumber {
                    address: key.clone(),
                    field: "nonce",
                    value: state.nonce.clone(),
                })?;
            let balance =
                parse_quantity(&state.balance).ok_or_else(|| SnapshotError::InvalidNumber {
                    address: key.clone(),
                    field: "balance",
                    value: state.balance.clone(),
                })?;

            let mut account = Account {
                nonce: nonce.low_u64(),
                balance,
                code: state.code.into(),
                storage: BTreeMap::new(),
            };
            for (slot, value) in &state.storage {
                let slot = parse_storage_word(&key, slot)?;
                let value = parse_storage_word(&key, value)?;
                account.set_storage_value(slot, value);
            }
            snapshot.insert(address, account);
        }
        Ok(snapshot)
    }

    fn to_raw(&self) -> BTreeMap<String, AccountState> {
        self.accounts
            .iter()
            .map(|(address, account)| {
                let storage = account
                    .storage
                    .iter()
                    .map(|(slot, value)| (format_storage_word(slot), format_storage_word(value)))
                    .collect();
                let state = AccountState {
                    nonce: format!("0x{:x}", account.nonce),
                    balance: format!("0x{:x}", account.balance),
                    storage,
                    code: account.code.to_vec(),
                };
                (format!("0x{}", hex::encode(address.as_bytes())), state)
            })
            .collect()
    }
}

/// Hex quantity, `0x` optional, empty means zero
fn parse_quantity(input: &str) -> Option<U256> {
    let digits = input.trim();
    let digits = digits.strip_prefix("0x").unwrap_or(digits);
    if digits.is_empty() {
        return Some(U256::zero());
    }
    U256::from_str_radix(digits, 16).ok()
}

fn parse_storage_word(address: &str, input: &str) -> Result<Word, SnapshotError> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    let invalid = || SnapshotError::InvalidStorageWord {
        address: address.to_string(),
        value: input.to_string(),
    };
    let bytes = hex::decode(digits).map_err(|_| invalid())?;
    if bytes.len() != 32 {
        return Err(invalid());
    }
    Ok(word_from_bytes(&bytes))
}

fn format_storage_word(word: &Word) -> String {
    format!("0x{}", hex::encode(word_to_bytes(word)))
}
