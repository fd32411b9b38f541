//! Instruction classes, the high nibble of the opcode byte

pub const HALT: u8 = 0x0;
pub const NOP: u8 = 0x1;
/// `rrmovl` and the conditional moves
pub const RRMOVL: u8 = 0x2;
pub const IRMOVL: u8 = 0x3;
pub const RMMOVL: u8 = 0x4;
pub const MRMOVL: u8 = 0x5;
pub const OPL: u8 = 0x6;
pub const JXX: u8 = 0x7;
pub const CALL: u8 = 0x8;
pub const RET: u8 = 0x9;
pub const PUSHL: u8 = 0xA;
pub const POPL: u8 = 0xB;
pub const IOPL: u8 = 0xC;
