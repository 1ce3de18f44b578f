//! Interpreter host interface
//!
//! The interpreter never touches a store directly. Everything outside the
//! current frame (accounts, storage, logs, nested calls and creations) goes
//! through a [`Host`], which is what lets one interpreter serve both the
//! persistent and the ephemeral store.

use crate::config::EngineConfig;
use crate::contract::vm::ExecutionResult;
use crate::state::Log;
use crate::types::{Address, Word};
use bytes::Bytes;
use primitive_types::{H256, U256};

/// The frame a piece of code runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Account that initiated this frame
    pub caller: Address,
    /// Account whose storage and balance this frame uses
    pub address: Address,
    /// Account whose code runs
    pub code_address: Address,
    /// Apparent value (CALLVALUE)
    pub value: Word,
    /// Input data (CALLDATA)
    pub data: Bytes,
    /// State modification is forbidden
    pub is_static: bool,
    /// Nesting level, zero for the top-level frame
    pub depth: usize,
    /// Top-level caller (ORIGIN)
    pub origin: Address,
}

impl CallContext {
    /// Top-level frame calling `target`
    pub fn new(caller: Address, target: Address, data: impl Into<Bytes>) -> Self {
        Self {
            caller,
            address: target,
            code_address: target,
            value: U256::zero(),
            data: data.into(),
            is_static: false,
            depth: 0,
            origin: caller,
        }
    }
}

/// Flavour of a nested call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
}

/// A nested call request
#[derive(Debug, Clone)]
pub struct Message {
    pub kind: CallKind,
    pub context: CallContext,
    /// Step budget handed to the callee
    pub step_limit: u64,
}

/// A nested creation request
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub creator: Address,
    pub value: Word,
    pub init_code: Bytes,
    /// CREATE2 salt, `None` for CREATE
    pub salt: Option<H256>,
    pub depth: usize,
    pub origin: Address,
    pub step_limit: u64,
}

/// Result of a creation
#[derive(Debug, Clone)]
pub struct CreateResult {
    /// Address of the new contract on success
    pub address: Option<Address>,
    pub result: ExecutionResult,
}

/// World access for the interpreter
pub trait Host {
    fn config(&self) -> &EngineConfig;

    fn balance(&self, address: &Address) -> Word;

    fn code(&self, address: &Address) -> Bytes;

    /// Hash of the account's code, zero for accounts that do not exist
    fn code_hash(&self, address: &Address) -> H256;

    fn sload(&self, address: &Address, key: &Word) -> Word;

    fn sstore(&mut self, address: Address, key: Word, value: Word);

    fn log(&mut self, log: Log);

    /// Run a nested call in its own checkpoint
    fn call(&mut self, message: Message) -> ExecutionResult;

    /// Run a nested creation in its own checkpoint
    fn create(&mut self, request: CreateRequest) -> CreateResult;

    /// Move the whole balance of `address` to `beneficiary`
    fn self_destruct(&mut self, address: Address, beneficiary: Address);
}
