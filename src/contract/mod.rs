//! Contract execution
//!
//! Provides the EVM interpreter and its tooling.
//!
//! # Overview
//!
//! This module implements:
//! - A stack-based interpreter for one call frame
//! - The host interface frames use to reach accounts and nested calls
//! - An assembler and disassembler for EVM bytecode
//!
//! # Example
//!
//! ```rust
//! use tinyevm::contract::{disassemble, Compiler};
//!
//! let mut compiler = Compiler::new();
//! let bytecode = compiler.compile("
//!     PUSH 42
//!     STOP
//! ").unwrap();
//!
//! assert_eq!(bytecode, vec![0x60, 0x2a, 0x00]);
//! assert_eq!(disassemble(&bytecode), "0000: PUSH1 0x2a\n0002: STOP\n");
//! ```

pub mod compiler;
pub mod host;
pub mod memory;
pub mod opcodes;
pub mod vm;

pub use compiler::{disassemble, wrap_init_code, Compiler, CompilerError};
pub use host::{CallContext, CallKind, CreateRequest, CreateResult, Host, Message};
pub use memory::Memory;
pub use opcodes::OpCode;
pub use vm::{ExecutionOutcome, ExecutionResult, Interpreter, VmError};
