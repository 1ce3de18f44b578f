//! Foreign boundary
//!
//! This module provides:
//! - Hex and JSON marshaling around the dispatcher
//! - Revert reason decoding for consumers of revert payloads
//! - The exported C functions

pub mod adapter;
pub mod ffi;

pub use adapter::{
    call_json, call_with_state_json, deploy_hex, encode_call_result, error_json,
    parse_hex_bytes, revert_reason, BoundaryError, InputError, REVERT_HEADER_LEN,
    REVERT_SELECTOR,
};
