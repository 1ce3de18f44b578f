//! CLI commands for the engine
//!
//! Implements all command handlers for the CLI interface.

use crate::boundary::{parse_hex_bytes, revert_reason};
use crate::config::EngineConfig;
use crate::contract::{disassemble, wrap_init_code, Compiler, ExecutionOutcome};
use crate::dispatch::{CallRequest, Dispatcher};
use crate::state::{SharedStore, Snapshot};
use crate::types::{address_to_hex, parse_address, Word};
use primitive_types::U256;
use std::fs;
use std::path::{Path, PathBuf};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub dispatcher: Dispatcher<SharedStore>,
    /// Initial-states file read at startup and rewritten after every change
    pub state_file: Option<PathBuf>,
}

impl AppState {
    /// Initialize application state
    pub fn new(state_file: Option<PathBuf>, config: EngineConfig) -> CliResult<Self> {
        let snapshot = match &state_file {
            Some(path) if path.exists() => {
                println!("📂 Loading state from {:?}...", path);
                Snapshot::load(path)?
            }
            _ => Snapshot::new(),
        };
        let store = SharedStore::from_snapshot(&snapshot);

        Ok(Self {
            dispatcher: Dispatcher::with_config(store, config),
            state_file,
        })
    }

    /// Save the current state
    pub fn save(&self) -> CliResult<()> {
        match &self.state_file {
            Some(path) => {
                self.dispatcher.snapshot().save(path)?;
                println!("💾 State written to {:?}", path);
            }
            None => println!("ℹ️  No --state file given, changes are discarded"),
        }
        Ok(())
    }
}

/// Read bytecode from an `.asm` source file or a hex string
pub fn load_code(input: &str) -> CliResult<Vec<u8>> {
    let path = Path::new(input);
    if path.extension().is_some_and(|ext| ext == "asm") {
        let source = fs::read_to_string(path)?;
        let bytecode = Compiler::new().compile(&source)?;
        return Ok(bytecode);
    }
    Ok(parse_hex_bytes("code", input)?)
}

/// Parse a decimal or `0x` hex amount
pub fn parse_value(input: &str) -> CliResult<Word> {
    let value = match input.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16)?,
        None => U256::from_dec_str(input)?,
    };
    Ok(value)
}

/// Assemble a source file and print the bytecode as hex
pub fn cmd_asm(file: &Path, deployable: bool) -> CliResult<String> {
    let source = fs::read_to_string(file)?;
    let mut compiler = Compiler::new();
    let mut bytecode = compiler.compile(&source)?;
    if deployable {
        bytecode = wrap_init_code(&[], &bytecode)?;
    }

    let encoded = hex::encode(&bytecode);
    println!("{}", encoded);
    log::debug!("Assembled {} bytes from {:?}", bytecode.len(), file);
    Ok(encoded)
}

/// Print the disassembly of hex or `.asm` code
pub fn cmd_disasm(code: &str) -> CliResult<()> {
    let bytecode = load_code(code)?;
    print!("{}", disassemble(&bytecode));
    Ok(())
}

/// Deploy init code and persist the resulting state
pub fn cmd_deploy(state: &AppState, code: &str, owner: &str) -> CliResult<String> {
    let owner = parse_address(owner)?;
    let bytecode = load_code(code)?;
    println!("📜 Deploying {} bytes of init code...", bytecode.len());

    let address = state.dispatcher.deploy(&bytecode, owner)?;
    let account = state.dispatcher.account(&address);

    println!("✅ Contract deployed!");
    println!("   Address: 0x{}", address_to_hex(&address));
    println!("   Code size: {} bytes", account.code.len());
    println!("   Owner nonce: {}", state.dispatcher.account(&owner).nonce);

    state.save()?;
    Ok(address_to_hex(&address))
}

/// Call a contract and print its outcome
pub fn cmd_call(
    state: &AppState,
    target: &str,
    caller: &str,
    data: &str,
    value: &str,
) -> CliResult<ExecutionOutcome> {
    let target = parse_address(target)?;
    let caller = parse_address(caller)?;
    let data = parse_hex_bytes("data", data)?;
    let value = parse_value(value)?;

    println!("📞 Calling contract 0x{}...", address_to_hex(&target));
    let receipt = state
        .dispatcher
        .transact(CallRequest::new(caller, target, data).with_value(value));

    match &receipt.outcome {
        ExecutionOutcome::Success { return_data } => {
            println!("✅ Execution complete!");
            println!("   Return data: 0x{}", hex::encode(return_data));
        }
        ExecutionOutcome::Revert { return_data } => {
            println!("↩️  Execution reverted");
            println!("   Return data: 0x{}", hex::encode(return_data));
            if let Some(reason) = revert_reason(return_data) {
                println!("   Reason: {}", reason);
            }
        }
        ExecutionOutcome::Fault { reason } => {
            println!("❌ Execution faulted: {}", reason);
        }
    }
    println!("   Steps used: {}", receipt.steps_used);
    for log in &receipt.logs {
        println!(
            "   Log from 0x{}: {} topics, {} bytes",
            address_to_hex(&log.address),
            log.topics.len(),
            log.data.len()
        );
    }

    if receipt.outcome.is_success() {
        state.save()?;
    }
    Ok(receipt.outcome)
}

/// Show one account
pub fn cmd_account(state: &AppState, address: &str) -> CliResult<()> {
    let address = parse_address(address)?;
    let account = state.dispatcher.account(&address);

    println!("👤 Account: 0x{}", address_to_hex(&address));
    println!("   Nonce: {}", account.nonce);
    println!("   Balance: {}", account.balance);
    println!("   Code size: {} bytes", account.code.len());
    println!("   Storage entries: {}", account.storage.len());
    for (key, value) in account.storage.iter().take(20) {
        println!("   [{:#x}] = {:#x}", key, value);
    }
    if account.storage.len() > 20 {
        println!("   ... ({} more entries)", account.storage.len() - 20);
    }

    if !account.code.is_empty() {
        println!("\n   Bytecode:");
        let disasm = disassemble(&account.code);
        for line in disasm.lines().take(20) {
            println!("   {}", line);
        }
        if disasm.lines().count() > 20 {
            println!("   ... ({} more lines)", disasm.lines().count() - 20);
        }
    }
    Ok(())
}

/// Print the whole state in initial-states form
pub fn cmd_state(state: &AppState) -> CliResult<()> {
    println!("{}", state.dispatcher.snapshot().to_json()?);
    Ok(())
}
