//! Engine configuration
//!
//! Execution limits and the block environment visible to contracts. The
//! defaults describe an empty chain: every block field is zero.

use crate::types::{Address, Word};
use primitive_types::U256;

/// Default instruction budget for one top-level operation
pub const DEFAULT_STEP_LIMIT: u64 = 10_000_000;

/// Maximum call depth (EVM uses 1024)
pub const MAX_CALL_DEPTH: usize = 1024;

/// Maximum stack size
pub const MAX_STACK_SIZE: usize = 1024;

/// Maximum memory per frame in bytes
pub const DEFAULT_MEMORY_LIMIT: usize = 16 * 1024 * 1024;

/// Maximum deployed code size (EIP-170)
pub const MAX_CODE_SIZE: usize = 24_576;

/// Native stack reserved on the execution thread for each nested frame
pub const FRAME_STACK_BYTES: usize = 256 * 1024;

/// Native stack reserved on the execution thread outside the frames
pub const BASE_STACK_BYTES: usize = 2 * 1024 * 1024;

/// Block values exposed through the environment instructions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEnv {
    pub number: u64,
    pub timestamp: u64,
    pub coinbase: Address,
    pub gas_limit: Word,
    pub chain_id: Word,
    pub base_fee: Word,
    pub prev_randao: Word,
    pub gas_price: Word,
}

impl Default for BlockEnv {
    fn default() -> Self {
        Self {
            number: 0,
            timestamp: 0,
            coinbase: Address::zero(),
            gas_limit: U256::zero(),
            chain_id: U256::zero(),
            base_fee: U256::zero(),
            prev_randao: U256::zero(),
            gas_price: U256::zero(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Instructions one top-level operation may execute, nested frames included
    pub step_limit: u64,
    /// Deepest allowed nested call
    pub max_call_depth: usize,
    /// Operand stack capacity per frame
    pub stack_limit: usize,
    /// Memory capacity per frame in bytes
    pub memory_limit: usize,
    /// Largest runtime code a creation may install
    pub max_code_size: usize,
    pub block: BlockEnv,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_limit: DEFAULT_STEP_LIMIT,
            max_call_depth: MAX_CALL_DEPTH,
            stack_limit: MAX_STACK_SIZE,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            max_code_size: MAX_CODE_SIZE,
            block: BlockEnv::default(),
        }
    }
}

impl EngineConfig {
    /// Default configuration with a different step budget
    pub fn with_step_limit(step_limit: u64) -> Self {
        Self {
            step_limit,
            ..Default::default()
        }
    }

    /// Stack size of the thread a top-level operation runs on
    ///
    /// Every frame up to `max_call_depth` recurses on that stack, as does the
    /// one rejected for exceeding it.
    pub fn execution_stack_size(&self) -> usize {
        self.max_call_depth
            .saturating_add(2)
            .saturating_mul(FRAME_STACK_BYTES)
            .saturating_add(BASE_STACK_BYTES)
    }
}
