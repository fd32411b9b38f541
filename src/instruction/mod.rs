//!
//! Binary encoding of the instruction set.
//!
//! Byte 0 of every instruction is `(class << 4) | function`. Most instructions follow it with a
//! register byte `(rA << 4) | rB`, where `0xF` means "no register", and some end with a 4-byte
//! little-endian immediate or displacement. Jumps and calls have no register byte: their 4-byte
//! absolute target starts right after the opcode.
//!
//! Decoding happens in two steps. [`Fetch`] splits a fixed 6-byte window into every field any
//! instruction could use, without knowing the instruction's length yet. Then
//! [`Instruction::decode`] validates the fields the class actually uses.
//!

use crate::codec;
use crate::simulator::register_names::{Register, REGISTER_NONE};
use crate::simulator::{memory::FETCH_WINDOW, ConditionCodes};
use std::fmt;
use thiserror::Error;

pub mod opcodes;

/// Branch and conditional move predicates, selected by the function code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Condition {
    Always = 0,
    Le,
    Lt,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl Condition {
    pub const ALL: [Condition; 7] = [
        Condition::Always,
        Condition::Le,
        Condition::Lt,
        Condition::Eq,
        Condition::Ne,
        Condition::Ge,
        Condition::Gt,
    ];

    pub fn from_code(ifun: u8) -> Option<Self> {
        Self::ALL.get(ifun as usize).copied()
    }

    pub fn holds(self, cc: ConditionCodes) -> bool {
        let ConditionCodes { zf, sf, of } = cc;
        match self {
            Condition::Always => true,
            Condition::Le => zf || (sf != of),
            Condition::Lt => sf != of,
            Condition::Eq => zf,
            Condition::Ne => !zf,
            Condition::Ge => zf || (sf == of),
            Condition::Gt => !zf && (sf == of),
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Condition::Always => "",
            Condition::Le => "le",
            Condition::Lt => "l",
            Condition::Eq => "e",
            Condition::Ne => "ne",
            Condition::Ge => "ge",
            Condition::Gt => "g",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AluOp {
    Add = 0,
    Sub,
    And,
    Xor,
}

impl AluOp {
    pub fn from_code(ifun: u8) -> Option<Self> {
        match ifun {
            0 => Some(AluOp::Add),
            1 => Some(AluOp::Sub),
            2 => Some(AluOp::And),
            3 => Some(AluOp::Xor),
            _ => None,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::And => "and",
            AluOp::Xor => "xor",
        }
    }
}

/// Every field of the 6-byte window at the program counter, read before the instruction's
/// length is known. Fields the instruction doesn't use are simply ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fetch {
    pub icode: u8,
    pub ifun: u8,
    pub ra: u8,
    pub rb: u8,
    /// Little-endian word at `pc + 1`, the target of jumps and calls
    pub dest: u32,
    /// Little-endian word at `pc + 2`, an immediate or displacement
    pub val: u32,
}

impl Fetch {
    pub fn from_window(w: &[u8; FETCH_WINDOW]) -> Self {
        Self {
            icode: w[0] >> 4,
            ifun: w[0] & 0xF,
            ra: w[1] >> 4,
            rb: w[1] & 0xF,
            dest: codec::decode_le([w[1], w[2], w[3], w[4]]),
            val: codec::decode_le([w[2], w[3], w[4], w[5]]),
        }
    }

    fn reg(r: u8) -> Result<Register, DecodeError> {
        Register::from_index(r).ok_or(DecodeError::InvalidRegister(r))
    }

    fn none(r: u8) -> Result<(), DecodeError> {
        if r == REGISTER_NONE {
            Ok(())
        } else {
            Err(DecodeError::ExpectedNone(r))
        }
    }

    fn no_function(&self) -> Result<(), DecodeError> {
        if self.ifun == 0 {
            Ok(())
        } else {
            Err(self.unknown_function())
        }
    }

    fn unknown_function(&self) -> DecodeError {
        DecodeError::UnknownFunction {
            icode: self.icode,
            ifun: self.ifun,
        }
    }

    fn condition(&self) -> Result<Condition, DecodeError> {
        Condition::from_code(self.ifun).ok_or_else(|| self.unknown_function())
    }

    fn alu_op(&self) -> Result<AluOp, DecodeError> {
        AluOp::from_code(self.ifun).ok_or_else(|| self.unknown_function())
    }
}

/// Why a fetch window doesn't hold a valid instruction. Every variant ends a run with
/// [`Status::InvalidInstruction`](crate::simulator::Status::InvalidInstruction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown instruction class {0:#x}")]
    UnknownClass(u8),
    #[error("unknown function code {ifun:#x} for instruction class {icode:#x}")]
    UnknownFunction { icode: u8, ifun: u8 },
    #[error("register field {0:#x} does not name a register")]
    InvalidRegister(u8),
    #[error("register field {0:#x} should be empty (0xf)")]
    ExpectedNone(u8),
}

/// A decoded instruction and its operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Halt,
    Nop,
    /// `rrmovl`/`cmovXX`: cond, rA (source), rB (destination)
    Move(Condition, Register, Register),
    /// rB, immediate
    Irmovl(Register, u32),
    /// rA (source), rB (base), displacement
    Rmmovl(Register, Register, u32),
    /// rA (destination), rB (base), displacement
    Mrmovl(Register, Register, u32),
    /// `rB = rB op rA`
    Op(AluOp, Register, Register),
    /// cond, absolute target
    Jump(Condition, u32),
    Call(u32),
    Ret,
    Push(Register),
    Pop(Register),
    /// `rB = rB op immediate`
    IOp(AluOp, Register, u32),
}

impl Instruction {
    pub fn decode(f: &Fetch) -> Result<Self, DecodeError> {
        use opcodes::*;
        use Instruction::*;

        let reg = Fetch::reg;
        let none = Fetch::none;

        let instr = match f.icode {
            HALT => {
                f.no_function()?;
                Halt
            }
            NOP => {
                f.no_function()?;
                Nop
            }
            RRMOVL => {
                let (ra, rb) = (reg(f.ra)?, reg(f.rb)?);
                Move(f.condition()?, ra, rb)
            }
            IRMOVL => {
                f.no_function()?;
                none(f.ra)?;
                Irmovl(reg(f.rb)?, f.val)
            }
            RMMOVL => {
                f.no_function()?;
                Rmmovl(reg(f.ra)?, reg(f.rb)?, f.val)
            }
            MRMOVL => {
                f.no_function()?;
                Mrmovl(reg(f.ra)?, reg(f.rb)?, f.val)
            }
            OPL => {
                let (ra, rb) = (reg(f.ra)?, reg(f.rb)?);
                Op(f.alu_op()?, ra, rb)
            }
            JXX => Jump(f.condition()?, f.dest),
            CALL => {
                f.no_function()?;
                Call(f.dest)
            }
            RET => {
                f.no_function()?;
                Ret
            }
            PUSHL => {
                f.no_function()?;
                let ra = reg(f.ra)?;
                none(f.rb)?;
                Push(ra)
            }
            POPL => {
                f.no_function()?;
                let ra = reg(f.ra)?;
                none(f.rb)?;
                Pop(ra)
            }
            IOPL => {
                none(f.ra)?;
                let rb = reg(f.rb)?;
                IOp(f.alu_op()?, rb, f.val)
            }
            icode => return Err(DecodeError::UnknownClass(icode)),
        };

        Ok(instr)
    }

    /// Size of the encoded instruction in bytes
    pub fn len(&self) -> usize {
        use Instruction::*;
        match self {
            Halt | Nop | Ret => 1,
            Move(..) | Op(..) | Push(_) | Pop(_) => 2,
            Jump(..) | Call(_) => 5,
            Irmovl(..) | Rmmovl(..) | Mrmovl(..) | IOp(..) => 6,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        use opcodes::*;
        use Instruction::*;

        fn byte(icode: u8, ifun: u8) -> u8 {
            (icode << 4) | ifun
        }
        fn regs(ra: u8, rb: u8) -> u8 {
            (ra << 4) | rb
        }

        let mut buf = Vec::with_capacity(self.len());
        match *self {
            Halt => buf.push(byte(HALT, 0)),
            Nop => buf.push(byte(NOP, 0)),
            Move(cond, ra, rb) => {
                buf.extend([byte(RRMOVL, cond as u8), regs(ra as u8, rb as u8)]);
            }
            Irmovl(rb, imm) => {
                buf.extend([byte(IRMOVL, 0), regs(REGISTER_NONE, rb as u8)]);
                buf.extend(codec::encode_le(imm));
            }
            Rmmovl(ra, rb, disp) => {
                buf.extend([byte(RMMOVL, 0), regs(ra as u8, rb as u8)]);
                buf.extend(codec::encode_le(disp));
            }
            Mrmovl(ra, rb, disp) => {
                buf.extend([byte(MRMOVL, 0), regs(ra as u8, rb as u8)]);
                buf.extend(codec::encode_le(disp));
            }
            Op(op, ra, rb) => buf.extend([byte(OPL, op as u8), regs(ra as u8, rb as u8)]),
            Jump(cond, dest) => {
                buf.push(byte(JXX, cond as u8));
                buf.extend(codec::encode_le(dest));
            }
            Call(dest) => {
                buf.push(byte(CALL, 0));
                buf.extend(codec::encode_le(dest));
            }
            Ret => buf.push(byte(RET, 0)),
            Push(ra) => buf.extend([byte(PUSHL, 0), regs(ra as u8, REGISTER_NONE)]),
            Pop(ra) => buf.extend([byte(POPL, 0), regs(ra as u8, REGISTER_NONE)]),
            IOp(op, rb, imm) => {
                buf.extend([byte(IOPL, op as u8), regs(REGISTER_NONE, rb as u8)]);
                buf.extend(codec::encode_le(imm));
            }
        }
        buf
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        match *self {
            Halt => write!(f, "halt"),
            Nop => write!(f, "nop"),
            Move(Condition::Always, ra, rb) => write!(f, "rrmovl {ra}, {rb}"),
            Move(cond, ra, rb) => write!(f, "cmov{} {ra}, {rb}", cond.suffix()),
            Irmovl(rb, imm) => write!(f, "irmovl ${}, {rb}", imm as i32),
            Rmmovl(ra, rb, disp) => write!(f, "rmmovl {ra}, {}({rb})", disp as i32),
            Mrmovl(ra, rb, disp) => write!(f, "mrmovl {}({rb}), {ra}", disp as i32),
            Op(op, ra, rb) => write!(f, "{}l {ra}, {rb}", op.mnemonic()),
            Jump(Condition::Always, dest) => write!(f, "jmp {dest:#x}"),
            Jump(cond, dest) => write!(f, "j{} {dest:#x}", cond.suffix()),
            Call(dest) => write!(f, "call {dest:#x}"),
            Ret => write!(f, "ret"),
            Push(ra) => write!(f, "pushl {ra}"),
            Pop(ra) => write!(f, "popl {ra}"),
            IOp(op, rb, imm) => write!(f, "i{}l ${}, {rb}", op.mnemonic(), imm as i32),
        }
    }
}

/// Decodes `bytes` linearly, as if they were loaded at `base`, until the bytes run out or
/// something that isn't an instruction shows up. Trailing bytes are padded with zeros so the
/// last instruction can still be read through a full window.
pub fn disassemble(base: usize, bytes: &[u8]) -> Vec<(usize, Instruction)> {
    let mut listing = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let mut window = [0; FETCH_WINDOW];
        let available = (bytes.len() - offset).min(FETCH_WINDOW);
        window[..available].copy_from_slice(&bytes[offset..offset + available]);

        let Ok(instr) = Instruction::decode(&Fetch::from_window(&window)) else {
            break;
        };
        if instr.len() > available {
            break;
        }

        listing.push((base + offset, instr));
        offset += instr.len();
    }

    listing
}

#[cfg(test)]
mod tests {
    use super::*;
    use Register::*;

    fn decode(bytes: &[u8]) -> Result<Instruction, DecodeError> {
        let mut window = [0; FETCH_WINDOW];
        window[..bytes.len()].copy_from_slice(bytes);
        Instruction::decode(&Fetch::from_window(&window))
    }

    #[test]
    fn test_fetch_fields() {
        let f = Fetch::from_window(&[0x45, 0x12, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!((f.icode, f.ifun, f.ra, f.rb), (4, 5, 1, 2));
        assert_eq!(f.dest, 0x34567812);
        assert_eq!(f.val, 0x12345678);
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode(&[0x00]), Ok(Instruction::Halt));
        assert_eq!(decode(&[0x10]), Ok(Instruction::Nop));
        assert_eq!(decode(&[0x20, 0x01]), Ok(Instruction::Move(Condition::Always, Eax, Ecx)));
        assert_eq!(decode(&[0x26, 0x67]), Ok(Instruction::Move(Condition::Gt, Esp, Ebp)));
        assert_eq!(
            decode(&[0x30, 0xF0, 0x05, 0, 0, 0]),
            Ok(Instruction::Irmovl(Eax, 5))
        );
        assert_eq!(
            decode(&[0x40, 0x13, 0xfc, 0xff, 0xff, 0xff]),
            Ok(Instruction::Rmmovl(Ecx, Ebx, -4i32 as u32))
        );
        assert_eq!(decode(&[0x61, 0x01]), Ok(Instruction::Op(AluOp::Sub, Eax, Ecx)));
        assert_eq!(decode(&[0x73, 0x20, 0, 0, 0]), Ok(Instruction::Jump(Condition::Eq, 0x20)));
        assert_eq!(decode(&[0x80, 0x40, 0, 0, 0]), Ok(Instruction::Call(0x40)));
        assert_eq!(decode(&[0x90]), Ok(Instruction::Ret));
        assert_eq!(decode(&[0xa0, 0x6F]), Ok(Instruction::Push(Esp)));
        assert_eq!(decode(&[0xb0, 0x2F]), Ok(Instruction::Pop(Edx)));
        assert_eq!(
            decode(&[0xc3, 0xF7, 1, 0, 0, 0]),
            Ok(Instruction::IOp(AluOp::Xor, Ebp, 1))
        );
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode(&[0xd0]), Err(DecodeError::UnknownClass(0xd)));
        assert_eq!(decode(&[0xf0]), Err(DecodeError::UnknownClass(0xf)));
        assert_eq!(
            decode(&[0x01]),
            Err(DecodeError::UnknownFunction { icode: 0, ifun: 1 })
        );
        assert_eq!(
            decode(&[0x27, 0x01]),
            Err(DecodeError::UnknownFunction { icode: 2, ifun: 7 })
        );
        assert_eq!(
            decode(&[0x64, 0x01]),
            Err(DecodeError::UnknownFunction { icode: 6, ifun: 4 })
        );
        assert_eq!(
            decode(&[0x77, 0, 0, 0, 0]),
            Err(DecodeError::UnknownFunction { icode: 7, ifun: 7 })
        );
        assert_eq!(decode(&[0x20, 0x8F]), Err(DecodeError::InvalidRegister(8)));
        assert_eq!(decode(&[0x30, 0x00]), Err(DecodeError::ExpectedNone(0)));
        assert_eq!(decode(&[0x30, 0xFF]), Err(DecodeError::InvalidRegister(0xF)));
        assert_eq!(decode(&[0xa0, 0x01]), Err(DecodeError::ExpectedNone(1)));
        assert_eq!(decode(&[0xb0, 0xFF]), Err(DecodeError::InvalidRegister(0xF)));
        assert_eq!(decode(&[0xc0, 0x0F]), Err(DecodeError::ExpectedNone(0)));
    }

    #[test]
    fn test_condition_table() {
        // (zf, sf, of) -> expected result for each condition, in `Condition::ALL` order
        for bits in 0..8u8 {
            let cc = ConditionCodes {
                zf: bits & 1 != 0,
                sf: bits & 2 != 0,
                of: bits & 4 != 0,
            };
            let (zf, sf, of) = (cc.zf, cc.sf, cc.of);
            let expected = [
                true,
                zf || sf != of,
                sf != of,
                zf,
                !zf,
                zf || sf == of,
                !zf && sf == of,
            ];
            for (cond, expected) in Condition::ALL.into_iter().zip(expected) {
                assert_eq!(cond.holds(cc), expected, "{cond:?} with {cc:?}");
            }
        }
        assert_eq!(Condition::from_code(7), None);
    }

    #[test]
    fn test_encode_decodes_back() {
        let program = [
            Instruction::Halt,
            Instruction::Move(Condition::Ne, Esi, Edi),
            Instruction::Irmovl(Esp, 0x100),
            Instruction::Mrmovl(Eax, Ebp, 8),
            Instruction::Jump(Condition::Always, 0x1234),
            Instruction::Pop(Ebx),
            Instruction::IOp(AluOp::And, Edx, 0xff),
        ];
        for instr in program {
            let bytes = instr.encode();
            assert_eq!(bytes.len(), instr.len());
            assert_eq!(decode(&bytes), Ok(instr));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::Irmovl(Eax, 5).to_string(), "irmovl $5, %eax");
        assert_eq!(Instruction::Op(AluOp::Add, Eax, Ecx).to_string(), "addl %eax, %ecx");
        assert_eq!(
            Instruction::Mrmovl(Eax, Esp, -8i32 as u32).to_string(),
            "mrmovl -8(%esp), %eax"
        );
        assert_eq!(Instruction::Jump(Condition::Le, 0x20).to_string(), "jle 0x20");
        assert_eq!(Instruction::Move(Condition::Lt, Eax, Ebx).to_string(), "cmovl %eax, %ebx");
        assert_eq!(Instruction::IOp(AluOp::Sub, Esp, 4).to_string(), "isubl $4, %esp");
    }

    #[test]
    fn test_disassemble() {
        let bytes = [0x30, 0xF0, 0x05, 0, 0, 0, 0x60, 0x01, 0x00];
        let listing = disassemble(0x10, &bytes);
        assert_eq!(
            listing,
            vec![
                (0x10, Instruction::Irmovl(Eax, 5)),
                (0x16, Instruction::Op(AluOp::Add, Eax, Ecx)),
                (0x18, Instruction::Halt),
            ]
        );

        // stops at garbage and at truncated instructions
        assert_eq!(disassemble(0, &[0x10, 0xd0, 0x00]).len(), 1);
        assert_eq!(disassemble(0, &[0x30, 0xF0, 0x05]).len(), 0);
    }
}
