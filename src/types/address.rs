//! 160-bit account addresses
//!
//! Contract addresses are derived from the creator. The derivation below is a
//! committed format: changing it moves every deployed contract.

use crate::crypto::hash::keccak256;
use crate::types::word::{word_from_bytes, word_to_bytes, Word};
use primitive_types::{H160, H256};
use rlp::RlpStream;
use thiserror::Error;

/// An account address
pub type Address = H160;

/// Size of the canonical address encoding
pub const ADDRESS_BYTES: usize = 20;

/// Address parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid hex in address: {0}")]
    InvalidHex(String),
    #[error("Invalid address length: {0} bytes (expected 20)")]
    InvalidLength(usize),
}

/// Parse a 40-digit hex address, with or without a `0x` prefix
pub fn parse_address(input: &str) -> Result<Address, AddressError> {
    let digits = input.trim();
    let digits = digits.strip_prefix("0x").unwrap_or(digits);
    let bytes = hex::decode(digits).map_err(|_| AddressError::InvalidHex(input.to_string()))?;
    if bytes.len() != ADDRESS_BYTES {
        return Err(AddressError::InvalidLength(bytes.len()));
    }
    Ok(H160::from_slice(&bytes))
}

/// Lowercase hex without prefix
pub fn address_to_hex(address: &Address) -> String {
    hex::encode(address.as_bytes())
}

/// Right-align an address in a word
pub fn address_to_word(address: &Address) -> Word {
    word_from_bytes(address.as_bytes())
}

/// Keep the low 160 bits of a word
pub fn word_to_address(word: &Word) -> Address {
    let bytes = word_to_bytes(word);
    H160::from_slice(&bytes[12..])
}

/// Address of a contract created by `creator` at `nonce`:
/// `keccak256(rlp([creator, nonce]))[12..]`
pub fn create_address(creator: &Address, nonce: u64) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(creator);
    stream.append(&nonce);
    let hash = keccak256(&stream.out());
    H160::from_slice(&hash.as_bytes()[12..])
}

/// Address of a contract created with a salt:
/// `keccak256(0xff ++ creator ++ salt ++ keccak256(init_code))[12..]`
pub fn create2_address(creator: &Address, salt: &H256, init_code: &[u8]) -> Address {
    let mut preimage = Vec::with_capacity(1 + ADDRESS_BYTES + 32 + 32);
    preimage.push(0xff);
    preimage.extend_from_slice(creator.as_bytes());
    preimage.extend_from_slice(salt.as_bytes());
    preimage.extend_from_slice(keccak256(init_code).as_bytes());
    let hash = keccak256(&preimage);
    H160::from_slice(&hash.as_bytes()[12..])
}
