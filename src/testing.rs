//! Test fixtures
//!
//! A minimal ERC20-like token written in assembly. Balances live at
//! `keccak256(pad32(holder) ++ pad32(0))`, the total supply at slot 2.

use crate::contract::compiler::{wrap_init_code, Compiler};
use crate::state::{Account, Snapshot};
use crate::types::{parse_address, word_to_bytes, Address, Word};
use primitive_types::U256;

pub const OWNER: &str = "0xf000000000000000000000000000000000000000";

pub const INSUFFICIENT_BALANCE: &str = "ERC20: insufficient balance";

pub const BALANCE_OF: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
pub const TRANSFER: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
pub const TOTAL_SUPPLY: [u8; 4] = [0x18, 0x16, 0x0d, 0xdd];

const RUNTIME: &str = "
    PUSH 0
    CALLDATALOAD
    PUSH 0xe0
    SHR
    DUP1
    PUSH4 0x70a08231
    EQ
    JUMPI balance_of
    DUP1
    PUSH4 0xa9059cbb
    EQ
    JUMPI transfer
    DUP1
    PUSH4 0x18160ddd
    EQ
    JUMPI total_supply
    PUSH 0
    DUP1
    REVERT

:balance_of
    PUSH 4
    CALLDATALOAD
    PUSH 0
    MSTORE
    PUSH 0
    PUSH 0x20
    MSTORE
    PUSH 0x40
    PUSH 0
    KECCAK256
    SLOAD
    PUSH 0
    MSTORE
    PUSH 0x20
    PUSH 0
    RETURN

:total_supply
    PUSH 2
    SLOAD
    PUSH 0
    MSTORE
    PUSH 0x20
    PUSH 0
    RETURN

:transfer
    CALLER
    PUSH 0
    MSTORE
    PUSH 0
    PUSH 0x20
    MSTORE
    PUSH 0x40
    PUSH 0
    KECCAK256           ; from_slot
    DUP1
    SLOAD               ; from_slot from_balance
    PUSH 0x24
    CALLDATALOAD        ; from_slot from_balance amount
    DUP1
    DUP3
    LT
    JUMPI insufficient
    SWAP1
    DUP2
    SWAP1
    SUB                 ; from_slot amount (from_balance - amount)
    DUP3
    SSTORE              ; from_slot amount
    PUSH 4
    CALLDATALOAD
    PUSH 0
    MSTORE
    PUSH 0
    PUSH 0x20
    MSTORE
    PUSH 0x40
    PUSH 0
    KECCAK256           ; from_slot amount to_slot
    DUP1
    SLOAD
    DUP3
    ADD
    SWAP1
    SSTORE
    PUSH 1
    PUSH 0
    MSTORE
    PUSH 0x20
    PUSH 0
    RETURN

:insufficient
    PUSH4 0x08c379a0
    PUSH 0xe0
    SHL
    PUSH 0
    MSTORE
    PUSH 0x20
    PUSH 4
    MSTORE
    PUSH {len}
    PUSH 0x24
    MSTORE
    PUSH32 0x{message}
    PUSH 0x44
    MSTORE
    PUSH 0x64
    PUSH 0
    REVERT
";

const CONSTRUCTOR: &str = "
    PUSH {supply}
    DUP1
    PUSH 2
    SSTORE
    CALLER
    PUSH 0
    MSTORE
    PUSH 0
    PUSH 0x20
    MSTORE
    PUSH 0x40
    PUSH 0
    KECCAK256
    SSTORE
";

pub fn owner() -> Address {
    parse_address(OWNER).unwrap()
}

pub fn recipient() -> Address {
    Address::repeat_byte(0xbe)
}

/// 10,000 tokens with 18 decimals
pub fn token_supply() -> Word {
    U256::exp10(22)
}

/// The owner funded with native balance, nothing else
pub fn owner_snapshot() -> Snapshot {
    Snapshot::new().with_account(owner(), Account::with_balance(U256::from(1_000_000_000_000u64)))
}

pub fn erc20_runtime() -> Vec<u8> {
    let mut message = INSUFFICIENT_BALANCE.as_bytes().to_vec();
    let len = message.len();
    message.resize(32, 0);
    let source = RUNTIME
        .replace("{len}", &len.to_string())
        .replace("{message}", &hex::encode(message));
    Compiler::new().compile(&source).unwrap()
}

/// Init code that credits `supply` to the deployer
pub fn erc20_init_code(supply: Word) -> Vec<u8> {
    let constructor = Compiler::new()
        .compile(&CONSTRUCTOR.replace("{supply}", &supply.to_string()))
        .unwrap();
    wrap_init_code(&constructor, &erc20_runtime()).unwrap()
}

fn pad_address(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

pub fn balance_of_calldata(holder: &Address) -> Vec<u8> {
    let mut data = BALANCE_OF.to_vec();
    data.extend_from_slice(&pad_address(holder));
    data
}

pub fn transfer_calldata(to: &Address, amount: Word) -> Vec<u8> {
    let mut data = TRANSFER.to_vec();
    data.extend_from_slice(&pad_address(to));
    data.extend_from_slice(&word_to_bytes(&amount));
    data
}

pub fn total_supply_calldata() -> Vec<u8> {
    TOTAL_SUPPLY.to_vec()
}
