//! Frame executor
//!
//! Implements [`Host`] over a checkpointed [`Overlay`]. Every nested call or
//! creation opens a checkpoint, runs its own [`Interpreter`] and then commits
//! or reverts that checkpoint depending on the outcome, so a failed frame
//! never leaks writes into its caller.

use crate::config::EngineConfig;
use crate::contract::host::{CallContext, CallKind, CreateRequest, CreateResult, Host, Message};
use crate::contract::vm::{ExecutionOutcome, ExecutionResult, Interpreter, VmError};
use crate::state::{ChangeSet, Log, MemoryStore, Overlay};
use crate::types::{create2_address, create_address, Address, Word};
use bytes::Bytes;
use primitive_types::{H256, U256};
use std::panic;
use std::thread;

pub struct Executor<'a> {
    overlay: Overlay<'a>,
    config: &'a EngineConfig,
}

impl<'a> Executor<'a> {
    pub fn new(base: &'a MemoryStore, config: &'a EngineConfig) -> Self {
        Self {
            overlay: Overlay::new(base),
            config,
        }
    }

    /// Net writes of every frame that succeeded
    pub fn into_changes(self) -> ChangeSet {
        self.overlay.into_changes()
    }

    fn check_depth(&self, depth: usize) -> Result<(), VmError> {
        if depth > self.config.max_call_depth {
            return Err(VmError::CallDepthExceeded(depth, self.config.max_call_depth));
        }
        Ok(())
    }

    /// Close the frame checkpoint according to `result`
    fn finish(&mut self, result: &ExecutionResult) {
        if result.outcome.is_success() {
            self.overlay.commit();
        } else {
            self.overlay.revert();
        }
    }
}

impl Host for Executor<'_> {
    fn config(&self) -> &EngineConfig {
        self.config
    }

    fn balance(&self, address: &Address) -> Word {
        self.overlay.balance(address)
    }

    fn code(&self, address: &Address) -> Bytes {
        self.overlay.code(address)
    }

    fn code_hash(&self, address: &Address) -> H256 {
        let info = self.overlay.info(address);
        if info.is_empty() {
            H256::zero()
        } else {
            info.code_hash()
        }
    }

    fn sload(&self, address: &Address, key: &Word) -> Word {
        self.overlay.storage(address, key)
    }

    fn sstore(&mut self, address: Address, key: Word, value: Word) {
        self.overlay.set_storage(address, key, value);
    }

    fn log(&mut self, log: Log) {
        self.overlay.push_log(log);
    }

    fn call(&mut self, message: Message) -> ExecutionResult {
        let Message {
            kind,
            context,
            step_limit,
        } = message;
        if let Err(reason) = self.check_depth(context.depth) {
            return ExecutionResult::fault(reason);
        }

        self.overlay.checkpoint();
        let funded = match kind {
            CallKind::Call => self
                .overlay
                .transfer(context.caller, context.address, context.value)
                .is_ok(),
            // The value stays with the executing account, only the balance is checked
            CallKind::CallCode => self.overlay.balance(&context.caller) >= context.value,
            CallKind::DelegateCall | CallKind::StaticCall => true,
        };
        if !funded {
            self.overlay.revert();
            return ExecutionResult::fault(VmError::InsufficientBalance);
        }

        let code = self.overlay.code(&context.code_address);
        let result = if code.is_empty() {
            ExecutionResult {
                outcome: ExecutionOutcome::Success {
                    return_data: Vec::new(),
                },
                steps_used: 0,
            }
        } else {
            log::trace!(
                "call {:?} -> {:?} depth={} steps={}",
                context.caller,
                context.code_address,
                context.depth,
                step_limit
            );
            Interpreter::new(context, code, step_limit, self.config).run(self)
        };

        self.finish(&result);
        result
    }

    fn create(&mut self, request: CreateRequest) -> CreateResult {
        let failed = |reason| CreateResult {
            address: None,
            result: ExecutionResult::fault(reason),
        };
        if let Err(reason) = self.check_depth(request.depth) {
            return failed(reason);
        }

        let nonce = self.overlay.nonce(&request.creator);
        let Some(next_nonce) = nonce.checked_add(1) else {
            return failed(VmError::NonceOverflow(request.creator));
        };
        let address = match &request.salt {
            Some(salt) => create2_address(&request.creator, salt, &request.init_code),
            None => create_address(&request.creator, nonce),
        };
        self.overlay.set_nonce(request.creator, next_nonce);

        let existing = self.overlay.info(&address);
        if existing.nonce != 0 || !existing.code.is_empty() {
            return failed(VmError::AddressCollision(address));
        }

        self.overlay.checkpoint();
        if self
            .overlay
            .transfer(request.creator, address, request.value)
            .is_err()
        {
            self.overlay.revert();
            return failed(VmError::InsufficientBalance);
        }

        let context = CallContext {
            caller: request.creator,
            address,
            code_address: address,
            value: request.value,
            data: Bytes::new(),
            is_static: false,
            depth: request.depth,
            origin: request.origin,
        };
        let mut result =
            Interpreter::new(context, request.init_code, request.step_limit, self.config).run(self);

        let max_code_size = self.config.max_code_size;
        result.outcome = match result.outcome {
            ExecutionOutcome::Success { return_data } if return_data.len() > max_code_size => {
                ExecutionOutcome::Fault {
                    reason: VmError::CodeSizeLimit(return_data.len(), max_code_size),
                }
            }
            ExecutionOutcome::Success { return_data } => {
                self.overlay.set_code(address, Bytes::from(return_data));
                ExecutionOutcome::Success {
                    return_data: Vec::new(),
                }
            }
            other => other,
        };

        self.finish(&result);
        CreateResult {
            address: result.outcome.is_success().then_some(address),
            result,
        }
    }

    fn self_destruct(&mut self, address: Address, beneficiary: Address) {
        let balance = self.overlay.balance(&address);
        if let Err(e) = self.overlay.transfer(address, beneficiary, balance) {
            log::warn!("self-destruct of {:?} could not move balance: {}", address, e);
        }
    }
}

/// Run `operation` on a thread whose stack holds `config.max_call_depth`
/// nested frames
///
/// Nested frames recurse on the native stack, so a top-level operation never
/// runs on the caller's thread. A panic on the execution thread resumes on the
/// calling thread.
pub fn on_execution_stack<R: Send>(
    config: &EngineConfig,
    operation: impl FnOnce() -> R + Send,
) -> Result<R, VmError> {
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("tinyevm-exec".to_string())
            .stack_size(config.execution_stack_size())
            .spawn_scoped(scope, operation)
            .map_err(|e| VmError::ThreadUnavailable(e.to_string()))?;
        match handle.join() {
            Ok(result) => Ok(result),
            Err(payload) => panic::resume_unwind(payload),
        }
    })
}

/// Top-level call message
pub fn top_level_message(
    caller: Address,
    target: Address,
    data: impl Into<Bytes>,
    value: Word,
    step_limit: u64,
) -> Message {
    let mut context = CallContext::new(caller, target, data);
    context.value = value;
    Message {
        kind: CallKind::Call,
        context,
        step_limit,
    }
}

/// Top-level creation request
pub fn top_level_create(creator: Address, init_code: Bytes, step_limit: u64) -> CreateRequest {
    CreateRequest {
        creator,
        value: U256::zero(),
        init_code,
        salt: None,
        depth: 0,
        origin: creator,
        step_limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::compiler::{wrap_init_code, Compiler};
    use crate::state::Account;
    use crate::types::word_from_bytes;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn asm(source: &str) -> Vec<u8> {
        Compiler::new().compile(source).unwrap()
    }

    fn run_call(store: &MemoryStore, target: Address, data: &[u8]) -> (ExecutionResult, ChangeSet) {
        let config = EngineConfig::default();
        let mut executor = Executor::new(store, &config);
        let result = executor.call(top_level_message(
            addr(0xee),
            target,
            data.to_vec(),
            U256::zero(),
            config.step_limit,
        ));
        (result, executor.into_changes())
    }

    #[test]
    fn test_call_to_empty_account_succeeds() {
        let store = MemoryStore::new();
        let (result, changes) = run_call(&store, addr(1), &[1, 2, 3]);
        assert!(result.outcome.is_success());
        assert_eq!(result.steps_used, 0);
        assert!(changes.storage.is_empty());
    }

    #[test]
    fn test_nested_revert_is_isolated() {
        let mut store = MemoryStore::new();
        // Callee writes slot 1 and reverts
        store.put(
            addr(2),
            Account::with_code(asm("PUSH 7 \n PUSH 1 \n SSTORE \n PUSH 0 \n DUP1 \n REVERT")),
        );
        // Caller writes slot 1, calls the callee and stores the call status in slot 2
        let caller = asm(
            "
            PUSH 5
            PUSH 1
            SSTORE
            PUSH 0
            DUP1
            DUP1
            DUP1
            DUP1
            PUSH20 0x0202020202020202020202020202020202020202
            GAS
            CALL
            PUSH 2
            SSTORE
            ",
        );
        store.put(addr(1), Account::with_code(caller));

        let (result, changes) = run_call(&store, addr(1), &[]);
        assert!(result.outcome.is_success());
        assert_eq!(changes.storage.get(&(addr(1), U256::one())), Some(&U256::from(5)));
        assert_eq!(changes.storage.get(&(addr(1), U256::from(2))), Some(&U256::zero()));
        assert!(!changes.storage.contains_key(&(addr(2), U256::one())));
    }

    #[test]
    fn test_create_from_contract() {
        let mut store = MemoryStore::new();
        // Factory deploys a contract whose runtime is the single byte 0x00
        let init = wrap_init_code(&[], &[0x00]).unwrap();
        let mut padded = [0u8; 32];
        padded[..init.len()].copy_from_slice(&init);
        let factory = asm(&format!(
            "
            PUSH32 0x{}
            PUSH 0
            MSTORE
            PUSH {}
            PUSH 0
            PUSH 0
            CREATE
            PUSH 0
            MSTORE
            PUSH 32
            PUSH 0
            RETURN
            ",
            hex::encode(padded),
            init.len()
        ));
        store.put(addr(1), Account::with_code(factory));

        let (result, changes) = run_call(&store, addr(1), &[]);
        let created = crate::types::word_to_address(&word_from_bytes(result.outcome.return_data()));
        assert_eq!(created, create_address(&addr(1), 0));
        assert_eq!(changes.accounts[&addr(1)].nonce, 1);
        assert_eq!(&changes.accounts[&created].code[..], &[0x00]);
        assert_eq!(changes.accounts[&created].nonce, 0);
    }

    #[test]
    fn test_call_transfers_value() {
        let mut store = MemoryStore::new();
        store.put(addr(0xee), Account::with_balance(U256::from(10)));
        let config = EngineConfig::default();

        let mut executor = Executor::new(&store, &config);
        let message = top_level_message(addr(0xee), addr(3), Vec::new(), U256::from(4), 100);
        let result = executor.call(message);
        assert!(result.outcome.is_success());
        assert_eq!(executor.balance(&addr(3)), U256::from(4));
        assert_eq!(executor.balance(&addr(0xee)), U256::from(6));

        let message = top_level_message(addr(0xee), addr(3), Vec::new(), U256::from(7), 100);
        let result = executor.call(message);
        assert_eq!(
            result.outcome,
            ExecutionOutcome::Fault {
                reason: VmError::InsufficientBalance
            }
        );
        assert_eq!(executor.balance(&addr(0xee)), U256::from(6));
    }

    #[test]
    fn test_depth_limit() {
        let mut store = MemoryStore::new();
        // Calls itself forever and records the status of its nested call
        let recursive = asm(
            "
            PUSH 0
            DUP1
            DUP1
            DUP1
            DUP1
            ADDRESS
            GAS
            CALL
            PUSH 0
            SSTORE
            ",
        );
        store.put(addr(1), Account::with_code(recursive));

        let mut config = EngineConfig::default();
        config.max_call_depth = 8;
        let mut executor = Executor::new(&store, &config);
        let message = top_level_message(addr(0xee), addr(1), Vec::new(), U256::zero(), 10_000);
        let result = executor.call(message);
        assert!(result.outcome.is_success());
        // Every frame but the innermost saw its nested call succeed
        assert_eq!(executor.sload(&addr(1), &U256::zero()), U256::one());
    }

    #[test]
    fn test_self_destruct_keeps_balance_when_credit_overflows() {
        let mut store = MemoryStore::new();
        let mut doomed = Account::with_code(asm(
            "PUSH20 0x0303030303030303030303030303030303030303 \n SELFDESTRUCT",
        ));
        doomed.balance = U256::from(5);
        store.put(addr(1), doomed);
        store.put(addr(3), Account::with_balance(U256::MAX));

        let (result, changes) = run_call(&store, addr(1), &[]);
        assert!(result.outcome.is_success());
        assert!(!changes.accounts.contains_key(&addr(1)));
        assert!(!changes.accounts.contains_key(&addr(3)));
    }

    #[test]
    fn test_self_destruct_moves_balance() {
        let mut store = MemoryStore::new();
        let mut doomed = Account::with_code(asm(
            "PUSH20 0x0303030303030303030303030303030303030303 \n SELFDESTRUCT",
        ));
        doomed.balance = U256::from(5);
        store.put(addr(1), doomed);

        let (result, changes) = run_call(&store, addr(1), &[]);
        assert!(result.outcome.is_success());
        assert_eq!(changes.accounts[&addr(1)].balance, U256::zero());
        assert_eq!(changes.accounts[&addr(3)].balance, U256::from(5));
    }

    #[test]
    fn test_execution_stack_propagates_panics() {
        let config = EngineConfig::default();
        assert_eq!(on_execution_stack(&config, || 7), Ok(7));

        let caught = std::panic::catch_unwind(|| {
            on_execution_stack(&config, || -> u8 { panic!("boom") })
        });
        assert!(caught.is_err());
    }

    #[test]
    fn test_code_hash() {
        let mut store = MemoryStore::new();
        store.put(addr(1), Account::with_balance(U256::one()));
        let config = EngineConfig::default();
        let executor = Executor::new(&store, &config);
        assert_eq!(executor.code_hash(&addr(1)), crate::crypto::hash::KECCAK_EMPTY);
        assert_eq!(executor.code_hash(&addr(2)), H256::zero());
    }
}
