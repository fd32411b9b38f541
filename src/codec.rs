//! Fixed-width integer helpers shared by the executor and the loader.
//!
//! Operands and immediates live in memory as little-endian words. The big-endian pair only exists
//! for loaders that stage a byte stream as 32-bit words: writing such a word big-endian puts its
//! first logical byte first in memory.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

pub fn encode_le(x: u32) -> [u8; 4] {
    let mut buf = [0; 4];
    LittleEndian::write_u32(&mut buf, x);
    buf
}

pub fn decode_le(bytes: [u8; 4]) -> u32 {
    LittleEndian::read_u32(&bytes)
}

pub fn encode_be(x: u32) -> [u8; 4] {
    let mut buf = [0; 4];
    BigEndian::write_u32(&mut buf, x);
    buf
}

pub fn decode_be(bytes: [u8; 4]) -> u32 {
    BigEndian::read_u32(&bytes)
}

/// Bit 31, i.e. whether `x` is negative when read as an `i32`
#[inline]
pub fn sign_bit(x: u32) -> bool {
    (x >> 31) & 1 == 1
}
