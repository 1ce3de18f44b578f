//! String marshaling
//!
//! Turns hex and JSON inputs into engine types and engine results back into
//! strings. Every input is validated before the dispatcher sees it, so a
//! malformed argument never reaches a store.

use crate::contract::vm::ExecutionOutcome;
use crate::dispatch::{call_with_snapshot, DispatchError, Dispatcher, StoreProvider};
use crate::state::{Snapshot, SnapshotError};
use crate::types::{address_to_hex, parse_address, Address, AddressError};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Selector of `Error(string)`, the conventional revert reason encoding
pub const REVERT_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Selector plus the offset and length words preceding the message bytes
pub const REVERT_HEADER_LEN: usize = 4 + 64;

/// Malformed caller input
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Invalid hex in {field}: {reason}")]
    InvalidHex { field: &'static str, reason: String },
    #[error("Invalid address in {field}: {source}")]
    InvalidAddress {
        field: &'static str,
        #[source]
        source: AddressError,
    },
    #[error("Invalid initial states: {0}")]
    InvalidSnapshot(#[from] SnapshotError),
}

/// Errors reported back across the boundary
#[derive(Error, Debug)]
pub enum BoundaryError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("Null pointer passed for {0}")]
    NullPointer(&'static str),
    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
    #[error("Engine panicked: {0}")]
    Panic(String),
}

/// Decode a hex byte string, `0x` optional
pub fn parse_hex_bytes(field: &'static str, input: &str) -> Result<Vec<u8>, InputError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits).map_err(|e| InputError::InvalidHex {
        field,
        reason: e.to_string(),
    })
}

fn parse_field_address(field: &'static str, input: &str) -> Result<Address, InputError> {
    parse_address(input).map_err(|source| InputError::InvalidAddress { field, source })
}

/// Deploy hex init code for a hex owner, returning the new address as hex
pub fn deploy_hex<P: StoreProvider>(
    dispatcher: &Dispatcher<P>,
    bytecode: &str,
    owner: &str,
) -> Result<String, BoundaryError> {
    let bytecode = parse_hex_bytes("bytecode", bytecode)?;
    let owner = parse_field_address("owner", owner)?;
    let address = dispatcher.deploy(&bytecode, owner)?;
    Ok(address_to_hex(&address))
}

/// Call with hex arguments, returning `[success, [bytes...]]`
pub fn call_json<P: StoreProvider>(
    dispatcher: &Dispatcher<P>,
    target: &str,
    caller: &str,
    calldata: &str,
) -> Result<String, BoundaryError> {
    let target = parse_field_address("target", target)?;
    let caller = parse_field_address("caller", caller)?;
    let calldata = parse_hex_bytes("calldata", calldata)?;
    let outcome = dispatcher.call(target, caller, &calldata);
    Ok(encode_call_result(&outcome))
}

/// Call against a throwaway store built from JSON initial states
pub fn call_with_state_json(
    initial_states: &str,
    target: &str,
    caller: &str,
    calldata: &str,
) -> Result<String, BoundaryError> {
    let snapshot = Snapshot::from_json(initial_states).map_err(InputError::from)?;
    let target = parse_field_address("target", target)?;
    let caller = parse_field_address("caller", caller)?;
    let calldata = parse_hex_bytes("calldata", calldata)?;
    let outcome = call_with_snapshot(snapshot, target, caller, &calldata);
    Ok(encode_call_result(&outcome))
}

/// `[success, return_data]` with the data as an array of byte values
///
/// A fault carries no data and renders as `[false, []]`.
pub fn encode_call_result(outcome: &ExecutionOutcome) -> String {
    json!([outcome.is_success(), outcome.return_data()]).to_string()
}

/// `{"error": "<message>"}`
pub fn error_json(error: &dyn fmt::Display) -> String {
    json!({ "error": error.to_string() }).to_string()
}

/// Message of an `Error(string)` revert payload
pub fn revert_reason(payload: &[u8]) -> Option<String> {
    if payload.len() < REVERT_HEADER_LEN || payload[..4] != REVERT_SELECTOR {
        return None;
    }
    let length_word = &payload[36..REVERT_HEADER_LEN];
    // Lengths that do not fit in the low eight bytes cannot be in the payload
    if length_word[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut length = [0u8; 8];
    length.copy_from_slice(&length_word[24..]);
    let length = usize::try_from(u64::from_be_bytes(length)).ok()?;

    let message = payload.get(REVERT_HEADER_LEN..REVERT_HEADER_LEN.checked_add(length)?)?;
    String::from_utf8(message.to_vec()).ok()
}
