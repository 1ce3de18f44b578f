//! tinyevm: a small EVM-compatible bytecode engine
//!
//! This crate provides:
//! - 256-bit words and 160-bit addresses with EVM semantics
//! - An account store, either process-wide and persistent or built from a
//!   snapshot for a single operation
//! - A bytecode interpreter with nested calls, contract creation and logs
//! - A dispatcher that deploys and calls contracts, discarding every change
//!   of an operation that reverts or faults
//! - A hex/JSON adapter and a C ABI for foreign callers
//! - An assembler and disassembler for writing test contracts
//!
//! # Example
//!
//! ```rust
//! use tinyevm::contract::{wrap_init_code, Compiler};
//! use tinyevm::dispatch::Dispatcher;
//! use tinyevm::state::SharedStore;
//! use tinyevm::types::{parse_address, word_from_bytes, Word};
//!
//! // Runtime code that returns 42
//! let runtime = Compiler::new()
//!     .compile("PUSH 42\nPUSH 0\nMSTORE\nPUSH 32\nPUSH 0\nRETURN")
//!     .unwrap();
//!
//! let dispatcher = Dispatcher::new(SharedStore::new());
//! let owner = parse_address("0xf000000000000000000000000000000000000000").unwrap();
//! let address = dispatcher
//!     .deploy(&wrap_init_code(&[], &runtime).unwrap(), owner)
//!     .unwrap();
//!
//! let outcome = dispatcher.call(address, owner, &[]);
//! assert!(outcome.is_success());
//! assert_eq!(word_from_bytes(outcome.return_data()), Word::from(42));
//! ```

pub mod boundary;
pub mod cli;
pub mod config;
pub mod contract;
pub mod crypto;
pub mod dispatch;
pub mod state;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::EngineConfig;
pub use contract::{Compiler, ExecutionOutcome, Interpreter, OpCode, VmError};
pub use dispatch::{CallRequest, DispatchError, Dispatcher, Receipt};
pub use state::{Account, SharedStore, Snapshot};
pub use types::{Address, Word};
