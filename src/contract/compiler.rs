//! Bytecode assembler
//!
//! Compiles EVM mnemonics to bytecode.
//!
//! ```text
//! ; comments start with ';' or '#'
//! PUSH 0x2a        ; smallest PUSHn that fits
//! PUSH4 7          ; explicit width
//! JUMPI done       ; PUSH2 <done> JUMPI
//! PUSH @done       ; PUSH2 <done>
//! :done            ; JUMPDEST
//! ```

use crate::contract::opcodes::OpCode;
use crate::types::{word_to_bytes, Word, WORD_BYTES};
use primitive_types::U256;
use std::collections::HashMap;
use thiserror::Error;

/// Width of a resolved label reference
const LABEL_BYTES: usize = 2;

/// Compiler errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompilerError {
    #[error("Unknown instruction: {0}")]
    UnknownInstruction(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Undefined label: {0}")]
    UndefinedLabel(String),
    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),
    #[error("Label out of range: {0} at offset {1}")]
    LabelOutOfRange(String, usize),
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("Value {0} does not fit in {1} bytes")]
    ValueTooWide(String, usize),
    #[error("Code too large for the init loader: {0} bytes")]
    CodeTooLarge(usize),
}

/// Assembler for EVM bytecode
pub struct Compiler {
    /// Output bytecode
    code: Vec<u8>,
    /// Label positions
    labels: HashMap<String, usize>,
    /// Pending label references (position, label_name)
    label_refs: Vec<(usize, String)>,
}

impl Compiler {
    /// Create a new compiler
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            labels: HashMap::new(),
            label_refs: Vec::new(),
        }
    }

    /// Compile source code to bytecode
    pub fn compile(&mut self, source: &str) -> Result<Vec<u8>, CompilerError> {
        self.code.clear();
        self.labels.clear();
        self.label_refs.clear();

        // First pass: emit code, recording labels and placeholders
        for line in source.lines() {
            let line = strip_comment(line).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(label) = line.strip_prefix(':') {
                self.define_label(label.trim())?;
                continue;
            }

            self.compile_instruction(line)?;
        }

        // Second pass: resolve label references
        for (pos, label) in &self.label_refs {
            let addr = *self
                .labels
                .get(label)
                .ok_or_else(|| CompilerError::UndefinedLabel(label.clone()))?;
            let addr = u16::try_from(addr)
                .map_err(|_| CompilerError::LabelOutOfRange(label.clone(), addr))?;
            self.code[*pos..*pos + LABEL_BYTES].copy_from_slice(&addr.to_be_bytes());
        }

        Ok(std::mem::take(&mut self.code))
    }

    fn define_label(&mut self, label: &str) -> Result<(), CompilerError> {
        if label.is_empty() || label.contains(char::is_whitespace) {
            return Err(CompilerError::InvalidArgument(format!(":{}", label)));
        }
        if self.labels.insert(label.to_string(), self.code.len()).is_some() {
            return Err(CompilerError::DuplicateLabel(label.to_string()));
        }
        self.emit(OpCode::JumpDest);
        Ok(())
    }

    /// Compile a single instruction
    fn compile_instruction(&mut self, line: &str) -> Result<(), CompilerError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let instruction = parts[0].to_uppercase();
        let argument = parts.get(1).copied();
        if parts.len() > 2 {
            return Err(CompilerError::InvalidArgument(line.to_string()));
        }

        match (instruction.as_str(), argument) {
            ("PUSH", Some(arg)) => match arg.strip_prefix('@') {
                Some(label) => self.push_label(label),
                None => {
                    let value = parse_number(arg)?;
                    let width = minimal_width(&value);
                    self.push_value(&value, width);
                }
            },
            ("PUSH", None) => {
                return Err(CompilerError::InvalidArgument(
                    "PUSH requires a value".to_string(),
                ))
            }
            ("JUMP" | "JUMPI", Some(label)) => {
                self.push_label(label.trim_start_matches('@'));
                let op = if instruction == "JUMP" {
                    OpCode::Jump
                } else {
                    OpCode::JumpI
                };
                self.emit(op);
            }
            _ => {
                let op = OpCode::from_name(&instruction)
                    .ok_or_else(|| CompilerError::UnknownInstruction(instruction.clone()))?;
                match (op, argument) {
                    (OpCode::Push(width), Some(arg)) => {
                        let width = width as usize;
                        match arg.strip_prefix('@') {
                            Some(label) if width == LABEL_BYTES => self.push_label(label),
                            Some(_) => {
                                return Err(CompilerError::InvalidArgument(line.to_string()))
                            }
                            None => {
                                let value = parse_number(arg)?;
                                if minimal_width(&value) > width {
                                    return Err(CompilerError::ValueTooWide(arg.to_string(), width));
                                }
                                self.push_value(&value, width);
                            }
                        }
                    }
                    (OpCode::Push(_), None) => {
                        return Err(CompilerError::InvalidArgument(format!(
                            "{} requires a value",
                            instruction
                        )))
                    }
                    (_, Some(_)) => return Err(CompilerError::InvalidArgument(line.to_string())),
                    (op, None) => self.emit(op),
                }
            }
        }

        Ok(())
    }

    fn emit(&mut self, op: OpCode) {
        self.code.push(op.to_byte());
    }

    /// PUSHn with the low `width` bytes of `value`
    fn push_value(&mut self, value: &Word, width: usize) {
        self.emit(OpCode::Push(width as u8));
        let bytes = word_to_bytes(value);
        self.code.extend_from_slice(&bytes[WORD_BYTES - width..]);
    }

    fn push_label(&mut self, label: &str) {
        self.emit(OpCode::Push(LABEL_BYTES as u8));
        self.label_refs.push((self.code.len(), label.to_string()));
        self.code.extend_from_slice(&[0; LABEL_BYTES]); // Placeholder
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find([';', '#']) {
        Some(index) => &line[..index],
        None => line,
    }
}

/// Parse a number (decimal or hex)
fn parse_number(s: &str) -> Result<Word, CompilerError> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => U256::from_str_radix(hex, 16).ok(),
        None => U256::from_dec_str(s).ok(),
    };
    parsed.ok_or_else(|| CompilerError::InvalidNumber(s.to_string()))
}

/// Bytes needed to hold `value`, at least one
fn minimal_width(value: &Word) -> usize {
    value.bits().div_ceil(8).max(1)
}

/// Build init code that runs `constructor` and then deploys `runtime`
///
/// The appended loader copies `runtime` from the end of the init code into
/// memory and returns it: `PUSH2 len DUP1 PUSH2 offset PUSH1 0 CODECOPY
/// PUSH1 0 RETURN`. `constructor` must fall through to the loader and leave
/// the stack as it found it. Both the runtime length and its offset must fit
/// in the loader's 2-byte immediates.
pub fn wrap_init_code(constructor: &[u8], runtime: &[u8]) -> Result<Vec<u8>, CompilerError> {
    const LOADER_LEN: usize = 13;
    let offset = constructor.len() + LOADER_LEN;
    let len =
        u16::try_from(runtime.len()).map_err(|_| CompilerError::CodeTooLarge(runtime.len()))?;
    let offset = u16::try_from(offset).map_err(|_| CompilerError::CodeTooLarge(offset))?;

    let mut code = Vec::with_capacity(usize::from(offset) + runtime.len());
    code.extend_from_slice(constructor);
    code.push(OpCode::Push(2).to_byte());
    code.extend_from_slice(&len.to_be_bytes());
    code.push(OpCode::Dup(1).to_byte());
    code.push(OpCode::Push(2).to_byte());
    code.extend_from_slice(&offset.to_be_bytes());
    code.extend_from_slice(&[OpCode::Push(1).to_byte(), 0x00]);
    code.push(OpCode::CodeCopy.to_byte());
    code.extend_from_slice(&[OpCode::Push(1).to_byte(), 0x00]);
    code.push(OpCode::Return.to_byte());
    code.extend_from_slice(runtime);
    Ok(code)
}

/// Disassemble bytecode to readable format
pub fn disassemble(code: &[u8]) -> String {
    let mut output = String::new();
    let mut pc = 0;

    while pc < code.len() {
        let opcode_byte = code[pc];
        match OpCode::from_byte(opcode_byte) {
            Some(opcode) => {
                output.push_str(&format!("{:04x}: {}", pc, opcode));
                pc += 1;

                let width = opcode.arg_bytes();
                if width > 0 {
                    let end = (pc + width).min(code.len());
                    output.push_str(&format!(" 0x{}", hex::encode(&code[pc..end])));
                    if end - pc < width {
                        output.push_str(" (truncated)");
                    }
                    pc = end;
                }
                output.push('\n');
            }
            None => {
                output.push_str(&format!("{:04x}: UNKNOWN 0x{:02x}\n", pc, opcode_byte));
                pc += 1;
            }
        }
    }

    output
}
