//!
//! y86sim simulates a small, Y86-like load/store architecture: eight 32-bit registers, three
//! condition flags, a flat byte-addressable memory and a fetch-decode-execute loop over a compact
//! binary encoding. It's meant as the execution engine of a teaching assembler/emulator toolchain.
//!
//! A program runs until it halts or faults, and the outcome is always one of four statuses:
//! `AOK` while running, `HLT` after `halt`, `ADR` after any out of bounds access and `INS` after
//! anything that doesn't decode. Faults never panic, and a faulting instruction leaves the state
//! exactly as the previous instruction left it.
//!
//! ```
//! use y86sim::loader::{demo, Image};
//! use y86sim::simulator::{register_names::Register, RunOutcome, State, Status};
//!
//! let mut state = State::new();
//! state.allocate(1024)?;
//! state.load(&Image::from_bytes(demo::ARITHMETIC))?;
//!
//! assert_eq!(state.run(None), RunOutcome::Finished(Status::Halted));
//! assert_eq!(state.register(Register::Ecx), 8);
//! # Ok::<(), y86sim::Error>(())
//! ```
//!

pub mod codec;
pub mod config;
pub mod error;
pub mod instruction;
pub mod int_literal;
pub mod loader;
pub mod report;
pub mod simulator;

pub use error::Error;
