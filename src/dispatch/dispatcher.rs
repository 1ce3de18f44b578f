//! Deploy and call dispatch
//!
//! Orchestrates top-level operations against whatever store a
//! [`StoreProvider`] hands out. Each operation runs on a fresh overlay over
//! the provider's store and the overlay's changes are applied only when the
//! operation succeeds, so a revert or fault leaves the store untouched.

use crate::config::EngineConfig;
use crate::contract::host::Host;
use crate::contract::vm::ExecutionOutcome;
use crate::dispatch::executor::{on_execution_stack, top_level_create, top_level_message, Executor};
use crate::dispatch::provider::{SnapshotProvider, StoreProvider};
use crate::state::{Account, Log, MemoryStore, SharedStore, Snapshot};
use crate::types::{Address, Word};
use bytes::Bytes;
use primitive_types::U256;
use thiserror::Error;

/// Dispatch errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Empty init code")]
    EmptyInitCode,
    #[error("Deployment failed: {0}")]
    DeploymentFailed(ExecutionOutcome),
}

impl DispatchError {
    /// The construction outcome of a failed deployment
    pub fn outcome(&self) -> Option<&ExecutionOutcome> {
        match self {
            DispatchError::EmptyInitCode => None,
            DispatchError::DeploymentFailed(outcome) => Some(outcome),
        }
    }
}

/// A top-level call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub caller: Address,
    pub target: Address,
    pub data: Vec<u8>,
    /// Native value moved from caller to target
    pub value: Word,
}

impl CallRequest {
    pub fn new(caller: Address, target: Address, data: impl Into<Vec<u8>>) -> Self {
        Self {
            caller,
            target,
            data: data.into(),
            value: U256::zero(),
        }
    }

    pub fn with_value(mut self, value: Word) -> Self {
        self.value = value;
        self
    }
}

/// Result of a top-level call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub outcome: ExecutionOutcome,
    /// Logs of every frame that succeeded, empty unless the call succeeded
    pub logs: Vec<Log>,
    pub steps_used: u64,
}

/// Dispatches deploys and calls against a store provider
#[derive(Debug, Clone)]
pub struct Dispatcher<P> {
    provider: P,
    config: EngineConfig,
}

impl Dispatcher<SharedStore> {
    /// Dispatcher over the process-wide persistent store
    pub fn persistent() -> Self {
        Self::new(SharedStore::persistent())
    }
}

impl Dispatcher<SnapshotProvider> {
    /// Dispatcher whose every operation runs on a fresh store built from
    /// `snapshot` and discarded afterwards
    pub fn ephemeral(snapshot: Snapshot) -> Self {
        Self::new(SnapshotProvider::new(snapshot))
    }
}

impl<P: StoreProvider> Dispatcher<P> {
    /// Create a dispatcher with the default configuration
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, EngineConfig::default())
    }

    pub fn with_config(provider: P, config: EngineConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Run `init_code` as construction code on behalf of `owner` and install
    /// what it returns under a fresh address
    ///
    /// The address is derived from the owner and its current nonce, and the
    /// nonce is bumped. Nothing is written if construction reverts or faults.
    pub fn deploy(&self, init_code: &[u8], owner: Address) -> Result<Address, DispatchError> {
        if init_code.is_empty() {
            return Err(DispatchError::EmptyInitCode);
        }

        let config = &self.config;
        self.provider.with_store(|store| {
            let base: &MemoryStore = store;
            let executed = on_execution_stack(config, || {
                let mut executor = Executor::new(base, config);
                let created = executor.create(top_level_create(
                    owner,
                    Bytes::copy_from_slice(init_code),
                    config.step_limit,
                ));
                (created, executor.into_changes())
            });
            let (created, changes) = match executed {
                Ok(executed) => executed,
                Err(reason) => {
                    log::warn!("Deployment by {:?} could not start: {}", owner, reason);
                    return Err(DispatchError::DeploymentFailed(ExecutionOutcome::Fault {
                        reason,
                    }));
                }
            };

            match created.address {
                Some(address) => {
                    store.apply(changes);
                    log::info!(
                        "Contract deployed at {:?} by {:?} ({} steps)",
                        address,
                        owner,
                        created.result.steps_used
                    );
                    Ok(address)
                }
                None => {
                    log::warn!("Deployment by {:?} failed: {}", owner, created.result.outcome);
                    Err(DispatchError::DeploymentFailed(created.result.outcome))
                }
            }
        })
    }

    /// Call `target` with `data` and return the outcome
    pub fn call(&self, target: Address, caller: Address, data: &[u8]) -> ExecutionOutcome {
        self.transact(CallRequest::new(caller, target, data)).outcome
    }

    /// Run a top-level call, applying its changes only if it succeeds
    pub fn transact(&self, request: CallRequest) -> Receipt {
        let config = &self.config;
        let CallRequest {
            caller,
            target,
            data,
            value,
        } = request;
        self.provider.with_store(|store| {
            let base: &MemoryStore = store;
            let executed = on_execution_stack(config, || {
                let mut executor = Executor::new(base, config);
                let result = executor.call(top_level_message(
                    caller,
                    target,
                    data,
                    value,
                    config.step_limit,
                ));
                (result, executor.into_changes())
            });
            let (result, mut changes) = match executed {
                Ok(executed) => executed,
                Err(reason) => {
                    log::warn!("Call to {:?} could not start: {}", target, reason);
                    return Receipt {
                        outcome: ExecutionOutcome::Fault { reason },
                        logs: Vec::new(),
                        steps_used: 0,
                    };
                }
            };

            let logs = match &result.outcome {
                ExecutionOutcome::Success { .. } => {
                    let logs = std::mem::take(&mut changes.logs);
                    store.apply(changes);
                    logs
                }
                ExecutionOutcome::Revert { return_data } => {
                    log::debug!(
                        "Call to {:?} reverted with {} bytes",
                        target,
                        return_data.len()
                    );
                    Vec::new()
                }
                ExecutionOutcome::Fault { reason } => {
                    log::warn!("Call to {:?} faulted: {}", target, reason);
                    Vec::new()
                }
            };

            log::debug!(
                "Call {:?} -> {:?}: {} ({} steps)",
                caller,
                target,
                result.outcome,
                result.steps_used
            );
            Receipt {
                outcome: result.outcome,
                logs,
                steps_used: result.steps_used,
            }
        })
    }

    /// Read an account as the next operation would see it
    pub fn account(&self, address: &Address) -> Account {
        self.provider.with_store(|store| store.get(address))
    }

    pub fn storage_get(&self, address: &Address, key: &Word) -> Word {
        self.provider.with_store(|store| store.storage_get(address, key))
    }

    /// Export the store as the next operation would see it
    pub fn snapshot(&self) -> Snapshot {
        self.provider.with_store(|store| store.snapshot())
    }
}

/// Convenience for a single ephemeral call
pub fn call_with_snapshot(
    snapshot: Snapshot,
    target: Address,
    caller: Address,
    data: &[u8],
) -> ExecutionOutcome {
    Dispatcher::ephemeral(snapshot).call(target, caller, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::adapter::revert_reason;
    use crate::contract::compiler::Compiler;
    use crate::contract::vm::VmError;
    use crate::crypto::hash::keccak256;
    use crate::state::MemoryStore;
    use crate::testing::*;
    use crate::types::{create_address, word_from_bytes};
    use std::thread;

    fn asm(source: &str) -> Vec<u8> {
        Compiler::new().compile(source).unwrap()
    }

    fn returned_word(outcome: &ExecutionOutcome) -> Word {
        assert!(outcome.is_success(), "{}", outcome);
        word_from_bytes(outcome.return_data())
    }

    fn fresh() -> Dispatcher<SharedStore> {
        Dispatcher::new(SharedStore::from_snapshot(&owner_snapshot()))
    }

    fn with_token() -> (Dispatcher<SharedStore>, Address) {
        let dispatcher = fresh();
        let token = dispatcher
            .deploy(&erc20_init_code(token_supply()), owner())
            .unwrap();
        (dispatcher, token)
    }

    #[test]
    fn test_deploy_is_deterministic() {
        let a = fresh().deploy(&erc20_init_code(token_supply()), owner()).unwrap();
        let b = fresh().deploy(&erc20_init_code(token_supply()), owner()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, create_address(&owner(), 0));
    }

    #[test]
    fn test_deploy_with_exhausted_nonce_fails() {
        let mut exhausted = Account::with_balance(U256::one());
        exhausted.nonce = u64::MAX;
        let snapshot = Snapshot::new().with_account(owner(), exhausted);
        let dispatcher = Dispatcher::new(SharedStore::from_snapshot(&snapshot));

        let err = dispatcher.deploy(&[0x00], owner()).unwrap_err();
        assert_eq!(
            err.outcome(),
            Some(&ExecutionOutcome::Fault {
                reason: VmError::NonceOverflow(owner())
            })
        );
        assert_eq!(dispatcher.account(&owner()).nonce, u64::MAX);
        assert_eq!(dispatcher.snapshot(), snapshot);
    }

    #[test]
    fn test_deep_recursion_with_default_depth() {
        let dispatcher = fresh();
        // Calls itself until the depth limit rejects the innermost call
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
        let target = Address::repeat_byte(0x0d);
        dispatcher.provider().put(target, Account::with_code(recursive));
        assert_eq!(dispatcher.config().max_call_depth, crate::config::MAX_CALL_DEPTH);

        let outcome = dispatcher.call(target, owner(), &[]);
        assert!(outcome.is_success(), "{}", outcome);
        assert_eq!(dispatcher.storage_get(&target, &U256::zero()), U256::one());
    }

    #[test]
    fn test_successive_deploys_bump_nonce() {
        let dispatcher = fresh();
        let init = erc20_init_code(token_supply());

        let first = dispatcher.deploy(&init, owner()).unwrap();
        assert_eq!(dispatcher.account(&owner()).nonce, 1);
        let second = dispatcher.deploy(&init, owner()).unwrap();
        assert_eq!(dispatcher.account(&owner()).nonce, 2);

        assert_ne!(first, second);
        assert_eq!(dispatcher.account(&first).nonce, 0);
        assert_eq!(&dispatcher.account(&first).code[..], erc20_runtime().as_slice());
    }

    #[test]
    fn test_failed_deploy_keeps_nonce() {
        let dispatcher = fresh();
        let before = dispatcher.snapshot();

        let reverting = asm("PUSH 0 \n DUP1 \n REVERT");
        let err = dispatcher.deploy(&reverting, owner()).unwrap_err();
        assert!(matches!(
            err.outcome(),
            Some(ExecutionOutcome::Revert { .. })
        ));

        let faulting = asm("ADD");
        let err = dispatcher.deploy(&faulting, owner()).unwrap_err();
        assert_eq!(
            err,
            DispatchError::DeploymentFailed(ExecutionOutcome::Fault {
                reason: VmError::StackUnderflow
            })
        );

        assert_eq!(dispatcher.deploy(&[], owner()), Err(DispatchError::EmptyInitCode));
        assert_eq!(dispatcher.snapshot(), before);
        assert_eq!(dispatcher.account(&owner()).nonce, 0);
    }

    #[test]
    fn test_deploy_materializes_owner() {
        let dispatcher = Dispatcher::new(SharedStore::new());
        let stranger = Address::repeat_byte(0x42);
        dispatcher.deploy(&asm("STOP"), stranger).unwrap();
        assert_eq!(dispatcher.account(&stranger).nonce, 1);
    }

    #[test]
    fn test_erc20_scenario() {
        let (dispatcher, token) = with_token();

        let supply =
            returned_word(&dispatcher.call(token, owner(), &balance_of_calldata(&owner())));
        assert_eq!(supply, token_supply());
        let total = returned_word(&dispatcher.call(token, owner(), &total_supply_calldata()));
        assert_eq!(total, token_supply());

        let amount = U256::from(1_000);
        let ok = dispatcher.call(token, owner(), &transfer_calldata(&recipient(), amount));
        assert_eq!(returned_word(&ok), U256::one());

        let owner_balance =
            returned_word(&dispatcher.call(token, owner(), &balance_of_calldata(&owner())));
        assert_eq!(owner_balance, token_supply() - amount);
        let recipient_balance =
            returned_word(&dispatcher.call(token, owner(), &balance_of_calldata(&recipient())));
        assert_eq!(recipient_balance, amount);

        let too_much = owner_balance + U256::one();
        let failed = dispatcher.call(token, owner(), &transfer_calldata(&recipient(), too_much));
        match &failed {
            ExecutionOutcome::Revert { return_data } => {
                assert_eq!(return_data.len(), 100);
                assert_eq!(
                    revert_reason(return_data).as_deref(),
                    Some(INSUFFICIENT_BALANCE)
                );
            }
            other => panic!("expected revert, got {}", other),
        }

        let after = returned_word(&dispatcher.call(token, owner(), &balance_of_calldata(&owner())));
        assert_eq!(after, owner_balance);
    }

    #[test]
    fn test_unknown_selector_reverts() {
        let (dispatcher, token) = with_token();
        let outcome = dispatcher.call(token, owner(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(
            outcome,
            ExecutionOutcome::Revert {
                return_data: Vec::new()
            }
        );
    }

    #[test]
    fn test_revert_rolls_back_everything() {
        let dispatcher = fresh();
        // Writes storage, moves value onward, logs and then reverts
        let code = asm(
            "
            PUSH 1
            PUSH 1
            SSTORE
            PUSH 0
            DUP1
            DUP1
            DUP1
            PUSH 5
            PUSH20 0x00000000000000000000000000000000000000aa
            GAS
            CALL
            PUSH 0
            DUP1
            LOG0
            PUSH 0
            DUP1
            REVERT
            ",
        );
        let target = Address::repeat_byte(0x77);
        dispatcher.provider().put(target, Account::with_code(code));
        let before = dispatcher.snapshot();

        let request = CallRequest::new(owner(), target, Vec::new()).with_value(U256::from(10));
        let receipt = dispatcher.transact(request);
        assert_eq!(
            receipt.outcome,
            ExecutionOutcome::Revert {
                return_data: Vec::new()
            }
        );
        assert!(receipt.logs.is_empty());
        assert_eq!(dispatcher.snapshot(), before);
    }

    #[test]
    fn test_fault_rolls_back_everything() {
        let dispatcher = fresh();
        let target = Address::repeat_byte(0x77);
        // Writes storage, then jumps nowhere
        let code = asm("PUSH 1 \n PUSH 1 \n SSTORE \n PUSH 0x40 \n JUMP");
        dispatcher.provider().put(target, Account::with_code(code));
        let before = dispatcher.snapshot();

        let outcome = dispatcher.call(target, owner(), &[]);
        assert_eq!(
            outcome,
            ExecutionOutcome::Fault {
                reason: VmError::InvalidJump(U256::from(0x40))
            }
        );
        assert_eq!(dispatcher.snapshot(), before);
    }

    #[test]
    fn test_step_limit_faults() {
        let store = SharedStore::from_snapshot(&owner_snapshot());
        let dispatcher = Dispatcher::with_config(store, EngineConfig::with_step_limit(1_000));
        let target = Address::repeat_byte(0x77);
        dispatcher
            .provider()
            .put(target, Account::with_code(asm(":top \n PUSH 1 \n PUSH 1 \n SSTORE \n JUMP top")));

        let receipt = dispatcher.transact(CallRequest::new(owner(), target, Vec::new()));
        assert_eq!(
            receipt.outcome,
            ExecutionOutcome::Fault {
                reason: VmError::StepLimitExceeded(1_000)
            }
        );
        assert_eq!(receipt.steps_used, 1_000);
        assert_eq!(dispatcher.storage_get(&target, &U256::one()), U256::zero());
    }

    #[test]
    fn test_success_keeps_logs_and_value() {
        let dispatcher = fresh();
        let target = Address::repeat_byte(0x77);
        // LOG1 with topic 0x2a and one byte of data
        let code = asm("PUSH 0xff \n PUSH 0 \n MSTORE8 \n PUSH 0x2a \n PUSH 1 \n PUSH 0 \n LOG1");
        dispatcher.provider().put(target, Account::with_code(code));

        let request = CallRequest::new(owner(), target, Vec::new()).with_value(U256::from(3));
        let receipt = dispatcher.transact(request);
        assert!(receipt.outcome.is_success());
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.logs[0].data, vec![0xff]);
        assert_eq!(receipt.logs[0].topics[0].to_low_u64_be(), 0x2a);
        assert_eq!(dispatcher.account(&target).balance, U256::from(3));
    }

    #[test]
    fn test_unset_storage_reads_zero() {
        let (dispatcher, token) = with_token();
        assert_eq!(dispatcher.storage_get(&token, &U256::from(12345)), U256::zero());
        assert_eq!(
            dispatcher.storage_get(&Address::repeat_byte(9), &U256::zero()),
            U256::zero()
        );
    }

    #[test]
    fn test_ephemeral_calls_are_isolated() {
        let (persistent, token) = with_token();
        let persistent_before = persistent.snapshot();

        let mut rich = persistent.snapshot();
        let mut poor = persistent.snapshot();
        // Give the recipient a balance in only one of the snapshots
        let mut account = rich.get(&token).cloned().unwrap();
        let mut preimage = [0u8; 64];
        preimage[12..32].copy_from_slice(recipient().as_bytes());
        let slot = keccak256(&preimage);
        account.set_storage_value(word_from_bytes(slot.as_bytes()), U256::from(77));
        rich.insert(token, account);
        poor.insert(recipient(), Account::with_balance(U256::one()));

        let handles: Vec<_> = [(rich, U256::from(77)), (poor, U256::zero())]
            .into_iter()
            .map(|(snapshot, expected)| {
                thread::spawn(move || {
                    let dispatcher = Dispatcher::ephemeral(snapshot);
                    for _ in 0..20 {
                        let transfer = transfer_calldata(&owner(), U256::one());
                        let outcome = dispatcher.call(token, recipient(), &transfer);
                        assert_eq!(outcome.is_success(), !expected.is_zero());
                        let balance = returned_word(&dispatcher.call(
                            token,
                            owner(),
                            &balance_of_calldata(&recipient()),
                        ));
                        // Every call starts again from the snapshot
                        assert_eq!(balance, expected);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(persistent.snapshot(), persistent_before);
    }

    #[test]
    fn test_ephemeral_deploy_is_discarded() {
        let dispatcher = Dispatcher::ephemeral(owner_snapshot());
        let token = dispatcher.deploy(&erc20_init_code(token_supply()), owner()).unwrap();
        assert!(dispatcher.account(&token).code.is_empty());
        assert_eq!(dispatcher.account(&owner()).nonce, 0);

        let query = balance_of_calldata(&owner());
        let outcome = call_with_snapshot(owner_snapshot(), token, owner(), &query);
        assert_eq!(
            outcome,
            ExecutionOutcome::Success {
                return_data: Vec::new()
            }
        );
    }

    #[test]
    fn test_concurrent_transfers_on_shared_store() {
        let (dispatcher, token) = with_token();
        let threads = 8;
        let per_thread = 25;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        let outcome = dispatcher.call(
                            token,
                            owner(),
                            &transfer_calldata(&recipient(), U256::from(2)),
                        );
                        assert!(outcome.is_success());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let moved = U256::from(2 * threads * per_thread);
        let recipient_balance =
            returned_word(&dispatcher.call(token, owner(), &balance_of_calldata(&recipient())));
        let owner_balance =
            returned_word(&dispatcher.call(token, owner(), &balance_of_calldata(&owner())));
        assert_eq!(recipient_balance, moved);
        assert_eq!(owner_balance, token_supply() - moved);
    }

    #[test]
    fn test_persistent_dispatchers_share_state() {
        let a = Dispatcher::persistent();
        let b = Dispatcher::persistent();
        assert!(a.provider().same_store(b.provider()));

        // Addresses private to this test keep it independent of other users
        let deployer = Address::repeat_byte(0xd1);
        let token = a.deploy(&erc20_init_code(token_supply()), deployer).unwrap();
        let balance = returned_word(&b.call(token, deployer, &balance_of_calldata(&deployer)));
        assert_eq!(balance, token_supply());

        let isolated = Dispatcher::new(SharedStore::from_store(MemoryStore::new()));
        assert!(isolated.account(&token).code.is_empty());
    }
}
