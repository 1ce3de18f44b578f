//! Smart contract virtual machine
//!
//! A stack-based EVM interpreter for one call frame. The frame runs until it
//! returns, reverts, runs off the end of its code or faults, and produces
//! exactly one [`ExecutionOutcome`]. Nested calls and creations are handed to
//! the [`Host`], which runs them in frames of their own.
//!
//! Gas pricing is not modelled. Every instruction costs one step and a frame
//! faults once the step budget it was given is exhausted; nested frames draw
//! from the budget of their parent.

use crate::config::EngineConfig;
use crate::contract::host::{CallContext, CallKind, CreateRequest, Host, Message};
use crate::contract::memory::Memory;
use crate::contract::opcodes::OpCode;
use crate::crypto::hash::keccak256;
use crate::state::Log;
use crate::types::word::{self, bool_to_word};
use crate::types::{address_to_word, word_from_bytes, word_to_address, Word, WORD_BYTES};
use bytes::Bytes;
use primitive_types::{H256, U256};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Outcomes
// =============================================================================

/// Engine-detected invalid execution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("Stack overflow")]
    StackOverflow,
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Invalid opcode: 0x{0:02x}")]
    InvalidOpcode(u8),
    #[error("Step limit exceeded: {0}")]
    StepLimitExceeded(u64),
    #[error("Invalid jump destination: {0}")]
    InvalidJump(Word),
    #[error("Out of memory: {0} bytes (max: {1})")]
    MemoryLimitExceeded(usize, usize),
    #[error("Return data out of bounds")]
    ReturnDataOutOfBounds,
    #[error("State modification in static context")]
    StaticViolation,
    #[error("Call depth exceeded: {0} (max: {1})")]
    CallDepthExceeded(usize, usize),
    #[error("Insufficient balance for transfer")]
    InsufficientBalance,
    #[error("Contract address collision: {0:?}")]
    AddressCollision(crate::types::Address),
    #[error("Code size limit exceeded: {0} bytes (max: {1})")]
    CodeSizeLimit(usize, usize),
    #[error("Nonce overflow for {0:?}")]
    NonceOverflow(crate::types::Address),
    #[error("Execution thread unavailable: {0}")]
    ThreadUnavailable(String),
}

/// Terminal result of a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// RETURN, STOP or end of code
    Success { return_data: Vec<u8> },
    /// REVERT with a contract-supplied payload
    Revert { return_data: Vec<u8> },
    /// Invalid execution detected by the engine
    Fault { reason: VmError },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    /// Payload of a success or revert, empty for a fault
    pub fn return_data(&self) -> &[u8] {
        match self {
            ExecutionOutcome::Success { return_data }
            | ExecutionOutcome::Revert { return_data } => return_data,
            ExecutionOutcome::Fault { .. } => &[],
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionOutcome::Success { return_data } => {
                write!(f, "success ({} bytes)", return_data.len())
            }
            ExecutionOutcome::Revert { return_data } => {
                write!(f, "revert ({} bytes)", return_data.len())
            }
            ExecutionOutcome::Fault { reason } => write!(f, "fault: {}", reason),
        }
    }
}

/// Outcome of a frame and what it cost
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub outcome: ExecutionOutcome,
    /// Steps used, nested frames included
    pub steps_used: u64,
}

impl ExecutionResult {
    pub fn fault(reason: VmError) -> Self {
        Self {
            outcome: ExecutionOutcome::Fault { reason },
            steps_used: 0,
        }
    }
}

// =============================================================================
// Interpreter
// =============================================================================

/// Interpreter for one call frame
pub struct Interpreter {
    context: CallContext,
    code: Bytes,
    /// Valid jump destinations
    jumpdests: Vec<bool>,
    stack: Vec<Word>,
    stack_limit: usize,
    memory: Memory,
    pc: usize,
    step_limit: u64,
    steps_used: u64,
    /// Return data of the last nested call or creation
    return_data: Bytes,
}

impl Interpreter {
    /// Create an interpreter for `code` running in `context`
    pub fn new(context: CallContext, code: Bytes, step_limit: u64, config: &EngineConfig) -> Self {
        let jumpdests = analyze_jumpdests(&code);
        Self {
            context,
            code,
            jumpdests,
            stack: Vec::with_capacity(64),
            stack_limit: config.stack_limit,
            memory: Memory::new(config.memory_limit),
            pc: 0,
            step_limit,
            steps_used: 0,
            return_data: Bytes::new(),
        }
    }

    /// Execute the frame to completion
    pub fn run(mut self, host: &mut dyn Host) -> ExecutionResult {
        let outcome = loop {
            match self.step(host) {
                Ok(None) => continue,
                Ok(Some(outcome)) => break outcome,
                Err(reason) => {
                    log::trace!(
                        "frame {:?} faulted at pc={}: {}",
                        self.context.address,
                        self.pc,
                        reason
                    );
                    break ExecutionOutcome::Fault { reason };
                }
            }
        };
        ExecutionResult {
            outcome,
            steps_used: self.steps_used.min(self.step_limit),
        }
    }

    fn remaining_steps(&self) -> u64 {
        self.step_limit.saturating_sub(self.steps_used)
    }

    /// Execute a single instruction
    fn step(&mut self, host: &mut dyn Host) -> Result<Option<ExecutionOutcome>, VmError> {
        if self.pc >= self.code.len() {
            return Ok(Some(ExecutionOutcome::Success {
                return_data: Vec::new(),
            }));
        }

        self.steps_used += 1;
        if self.steps_used > self.step_limit {
            return Err(VmError::StepLimitExceeded(self.step_limit));
        }

        let opcode_byte = self.code[self.pc];
        let opcode = OpCode::from_byte(opcode_byte).ok_or(VmError::InvalidOpcode(opcode_byte))?;
        self.pc += 1;

        match opcode {
            OpCode::Stop => {
                return Ok(Some(ExecutionOutcome::Success {
                    return_data: Vec::new(),
                }))
            }

            // Arithmetic
            OpCode::Add => self.binary(|a, b| a.overflowing_add(b).0)?,
            OpCode::Mul => self.binary(|a, b| a.overflowing_mul(b).0)?,
            OpCode::Sub => self.binary(|a, b| a.overflowing_sub(b).0)?,
            OpCode::Div => self.binary(word::div)?,
            OpCode::SDiv => self.binary(word::sdiv)?,
            OpCode::Mod => self.binary(word::rem)?,
            OpCode::SMod => self.binary(word::smod)?,
            OpCode::AddMod => {
                let a = self.pop()?;
                let b = self.pop()?;
                let n = self.pop()?;
                self.push(word::addmod(a, b, n))?;
            }
            OpCode::MulMod => {
                let a = self.pop()?;
                let b = self.pop()?;
                let n = self.pop()?;
                self.push(word::mulmod(a, b, n))?;
            }
            OpCode::Exp => self.binary(word::exp)?,
            OpCode::SignExtend => self.binary(word::signextend)?,

            // Comparison and bitwise
            OpCode::Lt => self.binary(|a, b| bool_to_word(a < b))?,
            OpCode::Gt => self.binary(|a, b| bool_to_word(a > b))?,
            OpCode::SLt => self.binary(|a, b| bool_to_word(word::slt(a, b)))?,
            OpCode::SGt => self.binary(|a, b| bool_to_word(word::sgt(a, b)))?,
            OpCode::Eq => self.binary(|a, b| bool_to_word(a == b))?,
            OpCode::IsZero => {
                let a = self.pop()?;
                self.push(bool_to_word(a.is_zero()))?;
            }
            OpCode::And => self.binary(|a, b| a & b)?,
            OpCode::Or => self.binary(|a, b| a | b)?,
            OpCode::Xor => self.binary(|a, b| a ^ b)?,
            OpCode::Not => {
                let a = self.pop()?;
                self.push(!a)?;
            }
            OpCode::Byte => self.binary(word::byte)?,
            OpCode::Shl => self.binary(word::shl)?,
            OpCode::Shr => self.binary(word::shr)?,
            OpCode::Sar => self.binary(word::sar)?,

            OpCode::Keccak256 => {
                let offset = self.pop()?;
                let size = self.pop()?;
                let (offset, size) = self.memory_range(offset, size)?;
                let hash = keccak256(self.memory.slice(offset, size));
                self.push(word_from_bytes(hash.as_bytes()))?;
            }

            // Environment
            OpCode::Address => self.push(address_to_word(&self.context.address))?,
            OpCode::Balance => {
                let address = word_to_address(&self.pop()?);
                self.push(host.balance(&address))?;
            }
            OpCode::Origin => self.push(address_to_word(&self.context.origin))?,
            OpCode::Caller => self.push(address_to_word(&self.context.caller))?,
            OpCode::CallValue => self.push(self.context.value)?,
            OpCode::CallDataLoad => {
                let offset = saturating_usize(&self.pop()?);
                let mut buf = [0u8; WORD_BYTES];
                let data = &self.context.data;
                if offset < data.len() {
                    let available = (data.len() - offset).min(WORD_BYTES);
                    buf[..available].copy_from_slice(&data[offset..offset + available]);
                }
                self.push(word_from_bytes(&buf))?;
            }
            OpCode::CallDataSize => self.push(U256::from(self.context.data.len()))?,
            OpCode::CallDataCopy => {
                let data = self.context.data.clone();
                self.copy_to_memory(&data)?;
            }
            OpCode::CodeSize => self.push(U256::from(self.code.len()))?,
            OpCode::CodeCopy => {
                let code = self.code.clone();
                self.copy_to_memory(&code)?;
            }
            OpCode::GasPrice => self.push(host.config().block.gas_price)?,
            OpCode::ExtCodeSize => {
                let address = word_to_address(&self.pop()?);
                self.push(U256::from(host.code(&address).len()))?;
            }
            OpCode::ExtCodeCopy => {
                let address = word_to_address(&self.pop()?);
                let code = host.code(&address);
                self.copy_to_memory(&code)?;
            }
            OpCode::ReturnDataSize => self.push(U256::from(self.return_data.len()))?,
            OpCode::ReturnDataCopy => {
                let dest = self.pop()?;
                let offset = self.pop()?;
                let size = self.pop()?;
                let end = offset
                    .checked_add(size)
                    .ok_or(VmError::ReturnDataOutOfBounds)?;
                if end > U256::from(self.return_data.len()) {
                    return Err(VmError::ReturnDataOutOfBounds);
                }
                let (dest, size) = self.memory_range(dest, size)?;
                let return_data = self.return_data.clone();
                self.memory
                    .copy_padded(dest, &return_data, offset.low_u64() as usize, size)?;
            }
            OpCode::ExtCodeHash => {
                let address = word_to_address(&self.pop()?);
                self.push(word_from_bytes(host.code_hash(&address).as_bytes()))?;
            }

            // Block; no chain history is kept, so every block hash is zero
            OpCode::BlockHash => {
                self.pop()?;
                self.push(U256::zero())?;
            }
            OpCode::Coinbase => self.push(address_to_word(&host.config().block.coinbase))?,
            OpCode::Timestamp => self.push(U256::from(host.config().block.timestamp))?,
            OpCode::Number => self.push(U256::from(host.config().block.number))?,
            OpCode::PrevRandao => self.push(host.config().block.prev_randao)?,
            OpCode::GasLimit => self.push(host.config().block.gas_limit)?,
            OpCode::ChainId => self.push(host.config().block.chain_id)?,
            OpCode::SelfBalance => self.push(host.balance(&self.context.address))?,
            OpCode::BaseFee => self.push(host.config().block.base_fee)?,

            // Stack, memory, storage and flow
            OpCode::Pop => {
                self.pop()?;
            }
            OpCode::MLoad => {
                let offset = memory_offset(&self.pop()?, self.memory_limit())?;
                let value = self.memory.load_word(offset)?;
                self.push(value)?;
            }
            OpCode::MStore => {
                let offset = memory_offset(&self.pop()?, self.memory_limit())?;
                let value = self.pop()?;
                self.memory.store_word(offset, &value)?;
            }
            OpCode::MStore8 => {
                let offset = memory_offset(&self.pop()?, self.memory_limit())?;
                let value = self.pop()?;
                self.memory.store_byte(offset, value.byte(0))?;
            }
            OpCode::SLoad => {
                let key = self.pop()?;
                self.push(host.sload(&self.context.address, &key))?;
            }
            OpCode::SStore => {
                self.require_mutable()?;
                let key = self.pop()?;
                let value = self.pop()?;
                host.sstore(self.context.address, key, value);
            }
            OpCode::Jump => {
                let dest = self.pop()?;
                self.jump(dest)?;
            }
            OpCode::JumpI => {
                let dest = self.pop()?;
                let condition = self.pop()?;
                if !condition.is_zero() {
                    self.jump(dest)?;
                }
            }
            OpCode::Pc => self.push(U256::from(self.pc - 1))?,
            OpCode::MSize => self.push(U256::from(self.memory.len()))?,
            OpCode::Gas => self.push(U256::from(self.remaining_steps()))?,
            OpCode::JumpDest => {}
            OpCode::Push0 => self.push(U256::zero())?,
            OpCode::Push(n) => {
                let n = n as usize;
                let start = self.pc.min(self.code.len());
                let end = (self.pc + n).min(self.code.len());
                // Immediates cut off by the end of code read as zero-padded on the right
                let mut buf = [0u8; WORD_BYTES];
                buf[..end - start].copy_from_slice(&self.code[start..end]);
                self.push(word_from_bytes(&buf[..n]))?;
                self.pc += n;
            }
            OpCode::Dup(n) => {
                let n = n as usize;
                if self.stack.len() < n {
                    return Err(VmError::StackUnderflow);
                }
                let value = self.stack[self.stack.len() - n];
                self.push(value)?;
            }
            OpCode::Swap(n) => {
                let n = n as usize;
                let len = self.stack.len();
                if len <= n {
                    return Err(VmError::StackUnderflow);
                }
                self.stack.swap(len - 1, len - 1 - n);
            }
            OpCode::Log(topic_count) => {
                self.require_mutable()?;
                let offset = self.pop()?;
                let size = self.pop()?;
                let mut topics = Vec::with_capacity(topic_count as usize);
                for _ in 0..topic_count {
                    topics.push(H256::from(word::word_to_bytes(&self.pop()?)));
                }
                let (offset, size) = self.memory_range(offset, size)?;
                host.log(Log {
                    address: self.context.address,
                    topics,
                    data: self.memory.slice(offset, size).to_vec(),
                });
            }

            // System
            OpCode::Create => self.create(host, false)?,
            OpCode::Create2 => self.create(host, true)?,
            OpCode::Call => self.call(host, CallKind::Call)?,
            OpCode::CallCode => self.call(host, CallKind::CallCode)?,
            OpCode::DelegateCall => self.call(host, CallKind::DelegateCall)?,
            OpCode::StaticCall => self.call(host, CallKind::StaticCall)?,
            OpCode::Return => {
                let return_data = self.pop_memory_slice()?;
                return Ok(Some(ExecutionOutcome::Success { return_data }));
            }
            OpCode::Revert => {
                let return_data = self.pop_memory_slice()?;
                return Ok(Some(ExecutionOutcome::Revert { return_data }));
            }
            OpCode::Invalid => return Err(VmError::InvalidOpcode(opcode_byte)),
            OpCode::SelfDestruct => {
                self.require_mutable()?;
                let beneficiary = word_to_address(&self.pop()?);
                host.self_destruct(self.context.address, beneficiary);
                return Ok(Some(ExecutionOutcome::Success {
                    return_data: Vec::new(),
                }));
            }
        }

        Ok(None)
    }

    /// CALL, CALLCODE, DELEGATECALL and STATICCALL
    fn call(&mut self, host: &mut dyn Host, kind: CallKind) -> Result<(), VmError> {
        let gas = self.pop()?;
        let target = word_to_address(&self.pop()?);
        let value = match kind {
            CallKind::Call | CallKind::CallCode => self.pop()?,
            CallKind::DelegateCall | CallKind::StaticCall => U256::zero(),
        };
        let in_offset = self.pop()?;
        let in_size = self.pop()?;
        let out_offset = self.pop()?;
        let out_size = self.pop()?;

        if kind == CallKind::Call && !value.is_zero() {
            self.require_mutable()?;
        }

        let (in_offset, in_size) = self.memory_range(in_offset, in_size)?;
        let (out_offset, out_size) = self.memory_range(out_offset, out_size)?;
        let input = Bytes::copy_from_slice(self.memory.slice(in_offset, in_size));

        let parent = &self.context;
        let context = match kind {
            CallKind::Call => CallContext {
                caller: parent.address,
                address: target,
                code_address: target,
                value,
                data: input,
                is_static: parent.is_static,
                depth: parent.depth + 1,
                origin: parent.origin,
            },
            CallKind::CallCode => CallContext {
                caller: parent.address,
                address: parent.address,
                code_address: target,
                value,
                data: input,
                is_static: parent.is_static,
                depth: parent.depth + 1,
                origin: parent.origin,
            },
            CallKind::DelegateCall => CallContext {
                caller: parent.caller,
                address: parent.address,
                code_address: target,
                value: parent.value,
                data: input,
                is_static: parent.is_static,
                depth: parent.depth + 1,
                origin: parent.origin,
            },
            CallKind::StaticCall => CallContext {
                caller: parent.address,
                address: target,
                code_address: target,
                value: U256::zero(),
                data: input,
                is_static: true,
                depth: parent.depth + 1,
                origin: parent.origin,
            },
        };

        let step_limit = clamp_steps(gas, self.remaining_steps());
        let result = host.call(Message {
            kind,
            context,
            step_limit,
        });
        self.steps_used += result.steps_used;

        self.return_data = Bytes::copy_from_slice(result.outcome.return_data());
        let copied = out_size.min(self.return_data.len());
        self.memory
            .copy_padded(out_offset, &self.return_data[..copied], 0, copied)?;

        self.push(bool_to_word(result.outcome.is_success()))
    }

    /// CREATE and CREATE2
    fn create(&mut self, host: &mut dyn Host, salted: bool) -> Result<(), VmError> {
        self.require_mutable()?;
        let value = self.pop()?;
        let offset = self.pop()?;
        let size = self.pop()?;
        let salt = if salted {
            Some(H256::from(word::word_to_bytes(&self.pop()?)))
        } else {
            None
        };

        let (offset, size) = self.memory_range(offset, size)?;
        let init_code = Bytes::copy_from_slice(self.memory.slice(offset, size));

        let created = host.create(CreateRequest {
            creator: self.context.address,
            value,
            init_code,
            salt,
            depth: self.context.depth + 1,
            origin: self.context.origin,
            step_limit: self.remaining_steps(),
        });
        self.steps_used += created.result.steps_used;

        self.return_data = match &created.result.outcome {
            ExecutionOutcome::Revert { return_data } => Bytes::copy_from_slice(return_data),
            _ => Bytes::new(),
        };
        let address = created
            .address
            .map(|address| address_to_word(&address))
            .unwrap_or_default();
        self.push(address)
    }

    fn jump(&mut self, dest: Word) -> Result<(), VmError> {
        let target = saturating_usize(&dest);
        if !self.jumpdests.get(target).copied().unwrap_or(false) {
            return Err(VmError::InvalidJump(dest));
        }
        self.pc = target;
        Ok(())
    }

    fn require_mutable(&self) -> Result<(), VmError> {
        if self.context.is_static {
            return Err(VmError::StaticViolation);
        }
        Ok(())
    }

    fn memory_limit(&self) -> usize {
        self.memory.limit()
    }

    /// Convert an (offset, size) pair and make it addressable
    fn memory_range(&mut self, offset: Word, size: Word) -> Result<(usize, usize), VmError> {
        if size.is_zero() {
            return Ok((0, 0));
        }
        let limit = self.memory_limit();
        let offset = memory_offset(&offset, limit)?;
        let size = memory_offset(&size, limit)?;
        self.memory.resize(offset, size)?;
        Ok((offset, size))
    }

    /// Pop (dest, offset, size) and copy from `source` into memory
    fn copy_to_memory(&mut self, source: &[u8]) -> Result<(), VmError> {
        let dest = self.pop()?;
        let offset = saturating_usize(&self.pop()?);
        let size = self.pop()?;
        let (dest, size) = self.memory_range(dest, size)?;
        self.memory.copy_padded(dest, source, offset, size)
    }

    /// Pop (offset, size) and copy that memory out
    fn pop_memory_slice(&mut self) -> Result<Vec<u8>, VmError> {
        let offset = self.pop()?;
        let size = self.pop()?;
        let (offset, size) = self.memory_range(offset, size)?;
        Ok(self.memory.slice(offset, size).to_vec())
    }

    fn binary(&mut self, op: impl FnOnce(Word, Word) -> Word) -> Result<(), VmError> {
        let a = self.pop()?;
        let b = self.pop()?;
        self.push(op(a, b))
    }

    /// Push value onto stack
    fn push(&mut self, value: Word) -> Result<(), VmError> {
        if self.stack.len() >= self.stack_limit {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pop value from stack
    fn pop(&mut self) -> Result<Word, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }
}

/// Mark every JUMPDEST that is not inside PUSH data
fn analyze_jumpdests(code: &[u8]) -> Vec<bool> {
    let mut valid = vec![false; code.len()];
    let mut pc = 0;
    while pc < code.len() {
        match OpCode::from_byte(code[pc]) {
            Some(OpCode::JumpDest) => valid[pc] = true,
            Some(OpCode::Push(n)) => pc += n as usize,
            _ => {}
        }
        pc += 1;
    }
    valid
}

fn saturating_usize(word: &Word) -> usize {
    if word.bits() > 64 {
        usize::MAX
    } else {
        usize::try_from(word.low_u64()).unwrap_or(usize::MAX)
    }
}

/// Memory offsets and sizes must fit the memory limit
fn memory_offset(word: &Word, limit: usize) -> Result<usize, VmError> {
    let value = saturating_usize(word);
    if value == usize::MAX {
        return Err(VmError::MemoryLimitExceeded(value, limit));
    }
    Ok(value)
}

/// Step budget for a nested frame: the requested gas, capped by what is left
fn clamp_steps(requested: Word, remaining: u64) -> u64 {
    if requested.bits() > 64 {
        remaining
    } else {
        requested.low_u64().min(remaining)
    }
}
