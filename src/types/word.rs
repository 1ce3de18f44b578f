//! 256-bit machine words
//!
//! The native arithmetic unit of the VM. Plain unsigned arithmetic comes straight
//! from `U256` (wrapping variants only); the helpers here cover the operations
//! whose semantics differ from integer arithmetic: zero divisors, two's complement
//! reinterpretation, modular arithmetic through a 512-bit intermediate, and the
//! canonical 32-byte big-endian encoding.

use primitive_types::{U256, U512};

/// A VM word
pub type Word = U256;

/// Size of the canonical word encoding
pub const WORD_BYTES: usize = 32;

/// Smallest signed value, `-2^255`
fn signed_min() -> Word {
    U256::one() << 255
}

/// Encode a word as 32 big-endian bytes
pub fn word_to_bytes(word: &Word) -> [u8; WORD_BYTES] {
    let mut bytes = [0u8; WORD_BYTES];
    word.to_big_endian(&mut bytes);
    bytes
}

/// Decode a big-endian byte string of at most 32 bytes (left-padded)
pub fn word_from_bytes(bytes: &[u8]) -> Word {
    U256::from_big_endian(bytes)
}

/// Lower 256 bits of a 512-bit value
fn truncate_u512(value: U512) -> Word {
    let mut bytes = [0u8; 64];
    value.to_big_endian(&mut bytes);
    U256::from_big_endian(&bytes[32..])
}

pub fn bool_to_word(value: bool) -> Word {
    if value {
        U256::one()
    } else {
        U256::zero()
    }
}

/// Whether the sign bit is set
pub fn is_negative(word: &Word) -> bool {
    word.bit(255)
}

/// Two's complement negation
pub fn negate(word: Word) -> Word {
    (!word).overflowing_add(U256::one()).0
}

fn abs(word: Word) -> Word {
    if is_negative(&word) {
        negate(word)
    } else {
        word
    }
}

/// Unsigned division; a zero divisor yields zero
pub fn div(a: Word, b: Word) -> Word {
    if b.is_zero() {
        U256::zero()
    } else {
        a / b
    }
}

/// Unsigned remainder; a zero divisor yields zero
pub fn rem(a: Word, b: Word) -> Word {
    if b.is_zero() {
        U256::zero()
    } else {
        a % b
    }
}

/// Signed division truncating toward zero
pub fn sdiv(a: Word, b: Word) -> Word {
    if b.is_zero() {
        return U256::zero();
    }
    // -2^255 / -1 overflows back to -2^255
    if a == signed_min() && b == U256::MAX {
        return a;
    }
    let quotient = abs(a) / abs(b);
    if is_negative(&a) ^ is_negative(&b) {
        negate(quotient)
    } else {
        quotient
    }
}

/// Signed remainder; the result takes the sign of the dividend
pub fn smod(a: Word, b: Word) -> Word {
    if b.is_zero() {
        return U256::zero();
    }
    let remainder = abs(a) % abs(b);
    if is_negative(&a) {
        negate(remainder)
    } else {
        remainder
    }
}

/// `(a + b) % n` without intermediate overflow
pub fn addmod(a: Word, b: Word, n: Word) -> Word {
    if n.is_zero() {
        return U256::zero();
    }
    truncate_u512((U512::from(a) + U512::from(b)) % U512::from(n))
}

/// `(a * b) % n` without intermediate overflow
pub fn mulmod(a: Word, b: Word, n: Word) -> Word {
    if n.is_zero() {
        return U256::zero();
    }
    truncate_u512(a.full_mul(b) % U512::from(n))
}

pub fn exp(base: Word, exponent: Word) -> Word {
    base.overflowing_pow(exponent).0
}

/// Sign-extend `value` from byte `index` (counted from the least significant byte)
pub fn signextend(index: Word, value: Word) -> Word {
    if index >= U256::from(31) {
        return value;
    }
    let sign_bit = index.low_u64() as usize * 8 + 7;
    let mask = (U256::one() << (sign_bit + 1)) - U256::one();
    if value.bit(sign_bit) {
        value | !mask
    } else {
        value & mask
    }
}

pub fn slt(a: Word, b: Word) -> bool {
    match (is_negative(&a), is_negative(&b)) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    }
}

pub fn sgt(a: Word, b: Word) -> bool {
    slt(b, a)
}

/// Byte `index` of `value`, counted from the most significant byte
pub fn byte(index: Word, value: Word) -> Word {
    if index >= U256::from(WORD_BYTES) {
        return U256::zero();
    }
    U256::from(value.byte(31 - index.low_u64() as usize))
}

pub fn shl(shift: Word, value: Word) -> Word {
    if shift >= U256::from(256) {
        U256::zero()
    } else {
        value << shift.low_u64() as usize
    }
}

pub fn shr(shift: Word, value: Word) -> Word {
    if shift >= U256::from(256) {
        U256::zero()
    } else {
        value >> shift.low_u64() as usize
    }
}

/// Arithmetic shift right, filling with the sign bit
pub fn sar(shift: Word, value: Word) -> Word {
    let negative = is_negative(&value);
    if shift >= U256::from(256) {
        return if negative { U256::MAX } else { U256::zero() };
    }
    let shift = shift.low_u64() as usize;
    if negative {
        !((!value) >> shift)
    } else {
        value >> shift
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neg(value: u64) -> Word {
        negate(U256::from(value))
    }

    #[test]
    fn test_wrapping_arithmetic() {
        assert_eq!(U256::MAX.overflowing_add(U256::one()).0, U256::zero());
        assert_eq!(U256::zero().overflowing_sub(U256::one()).0, U256::MAX);
        assert_eq!(exp(U256::from(2), U256::from(256)), U256::zero());
        assert_eq!(exp(U256::from(3), U256::from(4)), U256::from(81));
    }

    #[test]
    fn test_division_by_zero_is_zero() {
        assert_eq!(div(U256::from(7), U256::zero()), U256::zero());
        assert_eq!(rem(U256::from(7), U256::zero()), U256::zero());
        assert_eq!(sdiv(neg(7), U256::zero()), U256::zero());
        assert_eq!(smod(neg(7), U256::zero()), U256::zero());
        assert_eq!(addmod(U256::one(), U256::one(), U256::zero()), U256::zero());
        assert_eq!(mulmod(U256::one(), U256::one(), U256::zero()), U256::zero());
    }

    #[test]
    fn test_signed_division() {
        assert_eq!(sdiv(neg(10), U256::from(3)), neg(3));
        assert_eq!(sdiv(neg(10), neg(3)), U256::from(3));
        assert_eq!(smod(neg(10), U256::from(3)), neg(1));
        assert_eq!(smod(U256::from(10), neg(3)), U256::from(1));
        assert_eq!(sdiv(signed_min(), U256::MAX), signed_min());
    }

    #[test]
    fn test_modular_arithmetic_uses_wide_intermediate() {
        assert_eq!(addmod(U256::MAX, U256::from(2), U256::from(10)), U256::from(7));
        // (2^256 - 1)^2 mod 12 == 9
        assert_eq!(mulmod(U256::MAX, U256::MAX, U256::from(12)), U256::from(9));
    }

    #[test]
    fn test_signed_comparison() {
        assert!(slt(neg(1), U256::zero()));
        assert!(!slt(U256::zero(), neg(1)));
        assert!(sgt(U256::from(5), neg(5)));
        assert!(slt(neg(5), neg(4)));
    }

    #[test]
    fn test_shifts() {
        assert_eq!(shl(U256::from(4), U256::one()), U256::from(16));
        assert_eq!(shr(U256::from(4), U256::from(16)), U256::one());
        assert_eq!(shl(U256::from(256), U256::one()), U256::zero());
        assert_eq!(sar(U256::from(4), neg(16)), neg(1));
        assert_eq!(sar(U256::from(300), neg(16)), U256::MAX);
        assert_eq!(sar(U256::from(1), U256::from(16)), U256::from(8));
    }

    #[test]
    fn test_signextend_and_byte() {
        assert_eq!(signextend(U256::zero(), U256::from(0xff)), U256::MAX);
        assert_eq!(signextend(U256::zero(), U256::from(0x7f)), U256::from(0x7f));
        assert_eq!(signextend(U256::from(40), U256::from(0xff)), U256::from(0xff));
        assert_eq!(byte(U256::from(31), U256::from(0xabcd)), U256::from(0xcd));
        assert_eq!(byte(U256::from(30), U256::from(0xabcd)), U256::from(0xab));
        assert_eq!(byte(U256::from(32), U256::from(0xabcd)), U256::zero());
    }

    #[test]
    fn test_word_encoding_is_big_endian() {
        let bytes = word_to_bytes(&U256::from(0x0102));
        assert_eq!(bytes[30], 0x01);
        assert_eq!(bytes[31], 0x02);
        assert_eq!(word_from_bytes(&bytes), U256::from(0x0102));
        assert_eq!(word_from_bytes(&[0x01, 0x00]), U256::from(256));
    }
}
