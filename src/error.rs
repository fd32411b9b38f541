use owo_colors::OwoColorize;
use std::{collections::TryReserveError, io};
use thiserror::Error;

/// Everything that can go wrong outside of a program's own execution. Faults raised by the
/// program itself are reported through [`Status`](crate::simulator::Status) instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Not the simulator's fault, some std::io went wrong
    #[error("I/O Error: {0}")]
    IO(#[from] io::Error),

    #[error("Memory size must be at least 1 byte, but {} was requested", .0.bright_yellow())]
    InvalidMemorySize(usize),

    #[error("Failed to allocate {} bytes of memory: {1}", .0.bright_yellow())]
    Allocation(usize, TryReserveError),

    #[error("Program byte at address {address:#x} does not fit in {memory_size} bytes of memory")]
    ProgramTooLarge { address: usize, memory_size: usize },

    #[error("Invalid hex on line {line}: '{}'", .text.bright_yellow())]
    InvalidHex { line: usize, text: String },

    #[error("'{}' is not a valid integer", .0.bright_yellow())]
    InvalidInteger(String),

    #[error("Failed to parse config file: {0}")]
    Config(#[from] toml::de::Error),

    #[error("No program file specified")]
    MissingFile,
}
