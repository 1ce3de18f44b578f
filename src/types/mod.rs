//! Primitive VM types
//!
//! - 256-bit words with EVM arithmetic semantics
//! - 160-bit addresses and contract address derivation

pub mod address;
pub mod word;

pub use address::{
    address_to_hex, address_to_word, create2_address, create_address, parse_address,
    word_to_address, Address, AddressError, ADDRESS_BYTES,
};
pub use word::{word_from_bytes, word_to_bytes, Word, WORD_BYTES};
