//! Cryptographic utilities for the VM
//!
//! This module provides Keccak-256 hashing, used for contract addresses,
//! code hashes and the KECCAK256 instruction.

pub mod hash;

pub use hash::{keccak256, keccak256_hex, KECCAK_EMPTY};
