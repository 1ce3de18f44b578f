//! Smart contract opcodes
//!
//! Defines the EVM instruction set understood by the interpreter.

use std::fmt;

/// Opcodes for the contract virtual machine
///
/// Families that differ only by an operand width or index (`PUSHn`, `DUPn`,
/// `SWAPn`, `LOGn`) are carried as a single variant with that number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    // Stop and arithmetic (0x00 - 0x0B)
    Stop,
    Add,
    Mul,
    Sub,
    Div,
    SDiv,
    Mod,
    SMod,
    AddMod,
    MulMod,
    Exp,
    SignExtend,

    // Comparison and bitwise (0x10 - 0x1D)
    Lt,
    Gt,
    SLt,
    SGt,
    Eq,
    IsZero,
    And,
    Or,
    Xor,
    Not,
    Byte,
    Shl,
    Shr,
    Sar,

    // Hashing (0x20)
    Keccak256,

    // Environment (0x30 - 0x3F)
    Address,
    Balance,
    Origin,
    Caller,
    CallValue,
    CallDataLoad,
    CallDataSize,
    CallDataCopy,
    CodeSize,
    CodeCopy,
    GasPrice,
    ExtCodeSize,
    ExtCodeCopy,
    ReturnDataSize,
    ReturnDataCopy,
    ExtCodeHash,

    // Block (0x40 - 0x48)
    BlockHash,
    Coinbase,
    Timestamp,
    Number,
    PrevRandao,
    GasLimit,
    ChainId,
    SelfBalance,
    BaseFee,

    // Stack, memory, storage and flow (0x50 - 0x5F)
    Pop,
    MLoad,
    MStore,
    MStore8,
    SLoad,
    SStore,
    Jump,
    JumpI,
    Pc,
    MSize,
    Gas,
    JumpDest,
    Push0,

    /// PUSH1 - PUSH32, carrying the immediate width
    Push(u8),
    /// DUP1 - DUP16
    Dup(u8),
    /// SWAP1 - SWAP16
    Swap(u8),
    /// LOG0 - LOG4, carrying the topic count
    Log(u8),

    // System (0xF0 - 0xFF)
    Create,
    Call,
    CallCode,
    Return,
    DelegateCall,
    Create2,
    StaticCall,
    Revert,
    Invalid,
    SelfDestruct,
}

/// Opcodes without an operand, in byte order
const FIXED: &[(u8, OpCode, &str)] = &[
    (0x00, OpCode::Stop, "STOP"),
    (0x01, OpCode::Add, "ADD"),
    (0x02, OpCode::Mul, "MUL"),
    (0x03, OpCode::Sub, "SUB"),
    (0x04, OpCode::Div, "DIV"),
    (0x05, OpCode::SDiv, "SDIV"),
    (0x06, OpCode::Mod, "MOD"),
    (0x07, OpCode::SMod, "SMOD"),
    (0x08, OpCode::AddMod, "ADDMOD"),
    (0x09, OpCode::MulMod, "MULMOD"),
    (0x0a, OpCode::Exp, "EXP"),
    (0x0b, OpCode::SignExtend, "SIGNEXTEND"),
    (0x10, OpCode::Lt, "LT"),
    (0x11, OpCode::Gt, "GT"),
    (0x12, OpCode::SLt, "SLT"),
    (0x13, OpCode::SGt, "SGT"),
    (0x14, OpCode::Eq, "EQ"),
    (0x15, OpCode::IsZero, "ISZERO"),
    (0x16, OpCode::And, "AND"),
    (0x17, OpCode::Or, "OR"),
    (0x18, OpCode::Xor, "XOR"),
    (0x19, OpCode::Not, "NOT"),
    (0x1a, OpCode::Byte, "BYTE"),
    (0x1b, OpCode::Shl, "SHL"),
    (0x1c, OpCode::Shr, "SHR"),
    (0x1d, OpCode::Sar, "SAR"),
    (0x20, OpCode::Keccak256, "KECCAK256"),
    (0x30, OpCode::Address, "ADDRESS"),
    (0x31, OpCode::Balance, "BALANCE"),
    (0x32, OpCode::Origin, "ORIGIN"),
    (0x33, OpCode::Caller, "CALLER"),
    (0x34, OpCode::CallValue, "CALLVALUE"),
    (0x35, OpCode::CallDataLoad, "CALLDATALOAD"),
    (0x36, OpCode::CallDataSize, "CALLDATASIZE"),
    (0x37, OpCode::CallDataCopy, "CALLDATACOPY"),
    (0x38, OpCode::CodeSize, "CODESIZE"),
    (0x39, OpCode::CodeCopy, "CODECOPY"),
    (0x3a, OpCode::GasPrice, "GASPRICE"),
    (0x3b, OpCode::ExtCodeSize, "EXTCODESIZE"),
    (0x3c, OpCode::ExtCodeCopy, "EXTCODECOPY"),
    (0x3d, OpCode::ReturnDataSize, "RETURNDATASIZE"),
    (0x3e, OpCode::ReturnDataCopy, "RETURNDATACOPY"),
    (0x3f, OpCode::ExtCodeHash, "EXTCODEHASH"),
    (0x40, OpCode::BlockHash, "BLOCKHASH"),
    (0x41, OpCode::Coinbase, "COINBASE"),
    (0x42, OpCode::Timestamp, "TIMESTAMP"),
    (0x43, OpCode::Number, "NUMBER"),
    (0x44, OpCode::PrevRandao, "PREVRANDAO"),
    (0x45, OpCode::GasLimit, "GASLIMIT"),
    (0x46, OpCode::ChainId, "CHAINID"),
    (0x47, OpCode::SelfBalance, "SELFBALANCE"),
    (0x48, OpCode::BaseFee, "BASEFEE"),
    (0x50, OpCode::Pop, "POP"),
    (0x51, OpCode::MLoad, "MLOAD"),
    (0x52, OpCode::MStore, "MSTORE"),
    (0x53, OpCode::MStore8, "MSTORE8"),
    (0x54, OpCode::SLoad, "SLOAD"),
    (0x55, OpCode::SStore, "SSTORE"),
    (0x56, OpCode::Jump, "JUMP"),
    (0x57, OpCode::JumpI, "JUMPI"),
    (0x58, OpCode::Pc, "PC"),
    (0x59, OpCode::MSize, "MSIZE"),
    (0x5a, OpCode::Gas, "GAS"),
    (0x5b, OpCode::JumpDest, "JUMPDEST"),
    (0x5f, OpCode::Push0, "PUSH0"),
    (0xf0, OpCode::Create, "CREATE"),
    (0xf1, OpCode::Call, "CALL"),
    (0xf2, OpCode::CallCode, "CALLCODE"),
    (0xf3, OpCode::Return, "RETURN"),
    (0xf4, OpCode::DelegateCall, "DELEGATECALL"),
    (0xf5, OpCode::Create2, "CREATE2"),
    (0xfa, OpCode::StaticCall, "STATICCALL"),
    (0xfd, OpCode::Revert, "REVERT"),
    (0xfe, OpCode::Invalid, "INVALID"),
    (0xff, OpCode::SelfDestruct, "SELFDESTRUCT"),
];

const PUSH1: u8 = 0x60;
const DUP1: u8 = 0x80;
const SWAP1: u8 = 0x90;
const LOG0: u8 = 0xa0;

impl OpCode {
    /// Convert byte to opcode
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x60..=0x7f => Some(OpCode::Push(byte - PUSH1 + 1)),
            0x80..=0x8f => Some(OpCode::Dup(byte - DUP1 + 1)),
            0x90..=0x9f => Some(OpCode::Swap(byte - SWAP1 + 1)),
            0xa0..=0xa4 => Some(OpCode::Log(byte - LOG0)),
            _ => FIXED
                .iter()
                .find(|(code, _, _)| *code == byte)
                .map(|(_, op, _)| *op),
        }
    }

    /// Convert opcode to byte
    pub fn to_byte(&self) -> u8 {
        match self {
            OpCode::Push(n) => PUSH1 + n - 1,
            OpCode::Dup(n) => DUP1 + n - 1,
            OpCode::Swap(n) => SWAP1 + n - 1,
            OpCode::Log(n) => LOG0 + n,
            op => FIXED
                .iter()
                .find(|(_, fixed, _)| fixed == op)
                .map(|(code, _, _)| *code)
                .unwrap_or(0xfe),
        }
    }

    /// Parse a mnemonic such as `ADD`, `PUSH4` or `SWAP2` (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        let numbered = |prefix: &str, min: u8, max: u8| -> Option<u8> {
            let n: u8 = upper.strip_prefix(prefix)?.parse().ok()?;
            (min..=max).contains(&n).then_some(n)
        };

        if let Some(n) = numbered("PUSH", 1, 32) {
            return Some(OpCode::Push(n));
        }
        if let Some(n) = numbered("DUP", 1, 16) {
            return Some(OpCode::Dup(n));
        }
        if let Some(n) = numbered("SWAP", 1, 16) {
            return Some(OpCode::Swap(n));
        }
        if let Some(n) = numbered("LOG", 0, 4) {
            return Some(OpCode::Log(n));
        }
        match upper.as_str() {
            "SHA3" => Some(OpCode::Keccak256),
            "DIFFICULTY" => Some(OpCode::PrevRandao),
            _ => FIXED
                .iter()
                .find(|(_, _, mnemonic)| *mnemonic == upper)
                .map(|(_, op, _)| *op),
        }
    }

    /// Get the number of bytes this opcode consumes after itself
    pub fn arg_bytes(&self) -> usize {
        match self {
            OpCode::Push(n) => *n as usize,
            _ => 0,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpCode::Push(n) => write!(f, "PUSH{}", n),
            OpCode::Dup(n) => write!(f, "DUP{}", n),
            OpCode::Swap(n) => write!(f, "SWAP{}", n),
            OpCode::Log(n) => write!(f, "LOG{}", n),
            op => {
                let name = FIXED
                    .iter()
                    .find(|(_, fixed, _)| fixed == op)
                    .map(|(_, _, mnemonic)| *mnemonic)
                    .unwrap_or("INVALID");
                f.write_str(name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0..=u8::MAX {
            if let Some(op) = OpCode::from_byte(byte) {
                assert_eq!(op.to_byte(), byte, "{}", op);
                assert_eq!(OpCode::from_name(&op.to_string()), Some(op));
            }
        }
    }

    #[test]
    fn test_families() {
        assert_eq!(OpCode::from_byte(0x60), Some(OpCode::Push(1)));
        assert_eq!(OpCode::from_byte(0x7f), Some(OpCode::Push(32)));
        assert_eq!(OpCode::from_byte(0x8f), Some(OpCode::Dup(16)));
        assert_eq!(OpCode::from_byte(0x91), Some(OpCode::Swap(2)));
        assert_eq!(OpCode::from_byte(0xa4), Some(OpCode::Log(4)));
        assert_eq!(OpCode::from_byte(0xa5), None);
        assert_eq!(OpCode::from_byte(0x0c), None);
        assert_eq!(OpCode::Push(20).arg_bytes(), 20);
    }

    #[test]
    fn test_names() {
        assert_eq!(OpCode::from_name("sha3"), Some(OpCode::Keccak256));
        assert_eq!(OpCode::from_name("push33"), None);
        assert_eq!(OpCode::from_name("dup0"), None);
        assert_eq!(OpCode::Swap(3).to_string(), "SWAP3");
        assert_eq!(OpCode::CallDataLoad.to_string(), "CALLDATALOAD");
    }
}
