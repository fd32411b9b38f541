//!
//! Architectural state of the machine and the executor that runs programs on it.
//!
//! A [`State`] is created with [`State::new`], given memory with [`State::allocate`], filled by a
//! [loader](crate::loader) and then ran with [`State::run`]. The executor is the only thing that
//! mutates registers and flags; everything else only gets read access.
//!

use crate::error::Error;
use crate::loader::Image;
use tracing::debug;

pub mod memory;
use memory::Memory;

pub mod register_names;
use register_names::{Register, REGISTER_COUNT};

mod status;
pub use status::Status;

mod executor;
pub use executor::RunOutcome;

mod snapshot;
pub use snapshot::{Diff, RegisterChange, WordChange};

/// Zero, sign and overflow flags. Set by every arithmetic instruction, untouched by the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConditionCodes {
    pub zf: bool,
    pub sf: bool,
    pub of: bool,
}

/// Registers, flags, program counter, status and memory of one machine
#[derive(Debug, Default)]
pub struct State {
    registers: [i32; REGISTER_COUNT],
    codes: ConditionCodes,
    status: Status,
    pc: i32,
    steps: u64,
    memory: Memory,
}

impl State {
    /// Zeroed registers and flags, status `AOK` and no memory
    pub fn new() -> Self {
        Self::default()
    }

    /// Same as a fresh state, but keeps the memory contents
    pub fn reset(&mut self) {
        self.registers = [0; REGISTER_COUNT];
        self.codes = ConditionCodes::default();
        self.status = Status::Running;
        self.pc = 0;
        self.steps = 0;
    }

    /// Replaces the memory by `size` zeroed bytes
    pub fn allocate(&mut self, size: usize) -> Result<(), Error> {
        self.memory = Memory::new(size)?;
        debug!(size, "allocated memory");
        Ok(())
    }

    /// Drops the memory, if there is any
    pub fn free(&mut self) {
        self.memory = Memory::default();
    }

    /// Deep copy of the whole state, used to keep a "before" picture around for [`Diff`]
    pub fn snapshot(&self) -> Result<Self, Error> {
        Ok(Self {
            registers: self.registers,
            codes: self.codes,
            status: self.status,
            pc: self.pc,
            steps: self.steps,
            memory: self.memory.try_clone()?,
        })
    }

    /// Writes a program image into memory. Nothing is written if any part of it doesn't fit.
    pub fn load(&mut self, image: &Image) -> Result<(), Error> {
        for segment in image.segments() {
            let end = segment.address.saturating_add(segment.bytes.len());
            if end > self.memory.len() {
                return Err(Error::ProgramTooLarge {
                    address: self.memory.len().max(segment.address),
                    memory_size: self.memory.len(),
                });
            }
        }

        for segment in image.segments() {
            self.memory.write(segment.address, &segment.bytes)?;
        }

        debug!(bytes = image.len(), "loaded program");
        Ok(())
    }

    pub fn registers(&self) -> &[i32; REGISTER_COUNT] {
        &self.registers
    }

    pub fn register(&self, reg: Register) -> i32 {
        self.registers[reg.index()]
    }

    pub fn register_by_index(&self, i: usize) -> Option<i32> {
        self.registers.get(i).copied()
    }

    pub fn register_by_name(&self, name: &str) -> Option<i32> {
        Register::from_name(name).map(|reg| self.register(reg))
    }

    pub fn codes(&self) -> ConditionCodes {
        self.codes
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn pc(&self) -> i32 {
        self.pc
    }

    /// Fetch cycles attempted in the current run
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_size(&self) -> usize {
        self.memory.len()
    }

    pub fn memory_byte(&self, i: usize) -> Option<u8> {
        self.memory.get_byte(i)
    }

    fn set_reg(&mut self, reg: Register, x: i32) {
        self.registers[reg.index()] = x;
    }
}
