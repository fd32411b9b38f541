use crate::error::Error;
use crate::int_literal;
use crate::loader::Format;
use clap::Parser;
use owo_colors::OwoColorize;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

pub const DEFAULT_MEMORY_SIZE: usize = 1024;

/// Name of the optional config file read from the working directory
pub const CONFIG_FILE: &str = "y86sim.toml";

#[derive(Parser, Deserialize, Debug, Default)]
#[command(author, version, about)]
#[clap(disable_help_flag = true)]
#[serde(default)]
pub struct OptionalConfig {
    #[clap(long, action = clap::ArgAction::HelpLong)]
    #[serde(skip)]
    help: Option<bool>,

    /// Stops the program after this many instructions, even if it didn't halt
    #[arg(long)]
    pub max_steps: Option<u64>,

    /// Format of the program file. Defaults to `hex` for .hex, .yo and .txt files, `raw` otherwise
    #[arg(short, long, value_enum)]
    pub format: Option<Format>,

    /// Prints the disassembled program before running it
    #[arg(long)]
    pub print_instructions: bool,

    /// Doesn't print the registers and memory words changed by the program
    #[arg(long)]
    pub no_diff: bool,

    /// Logs every executed instruction
    #[arg(long)]
    pub trace: bool,

    /// The program to execute
    pub file: Option<String>,

    /// Memory size in bytes, a positive multiple of 4. Accepts 0x (hex), 0h (octal) and 0b
    /// (binary) prefixes. Defaults to 1024
    pub memory_size: Option<String>,
}

impl OptionalConfig {
    pub fn get_args() -> Self {
        Self::parse()
    }

    pub fn get_toml() -> Result<Self, Error> {
        match std::fs::read_to_string(CONFIG_FILE) {
            Ok(config) => Ok(toml::from_str(&config)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn merge(self, rhs: Self) -> Self {
        Self {
            help: self.help.or(rhs.help),
            max_steps: self.max_steps.or(rhs.max_steps),
            format: self.format.or(rhs.format),
            print_instructions: self.print_instructions || rhs.print_instructions,
            no_diff: self.no_diff || rhs.no_diff,
            trace: self.trace || rhs.trace,
            file: self.file.or(rhs.file),
            memory_size: self.memory_size.or(rhs.memory_size),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub file: String,
    pub format: Format,
    pub memory_size: usize,
    pub max_steps: Option<u64>,
    pub print_instructions: bool,
    pub no_diff: bool,
    pub trace: bool,
    /// What became of the memory size argument, if one was given
    pub memory_size_notice: Option<MemorySizeNotice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemorySizeNotice {
    Set(usize),
    /// The argument that was rejected. The default size is used instead
    Invalid(String),
}

impl fmt::Display for MemorySizeNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set(size) => write!(f, "{} Setting memory size to: {}", "[-]".bright_blue(), size),
            Self::Invalid(arg) => write!(
                f,
                "{} Invalid memory size: '{}', using memory size of: {}",
                "[!]".bright_red(),
                arg.bright_yellow(),
                DEFAULT_MEMORY_SIZE
            ),
        }
    }
}

/// A memory size the machine can use: a positive multiple of 4
pub fn parse_memory_size(s: &str) -> Option<usize> {
    let size = int_literal::parse_int(s).ok()?;
    let size = usize::try_from(size).ok()?;
    (size >= 1 && size % 4 == 0).then_some(size)
}

fn resolve_memory_size(arg: Option<&str>) -> (usize, Option<MemorySizeNotice>) {
    let Some(arg) = arg else {
        return (DEFAULT_MEMORY_SIZE, None);
    };

    match parse_memory_size(arg) {
        Some(size) => (size, Some(MemorySizeNotice::Set(size))),
        None => (
            DEFAULT_MEMORY_SIZE,
            Some(MemorySizeNotice::Invalid(arg.to_owned())),
        ),
    }
}

impl TryFrom<OptionalConfig> for Config {
    type Error = Error;

    fn try_from(config: OptionalConfig) -> Result<Self, Error> {
        let file = config.file.ok_or(Error::MissingFile)?;
        let format = config
            .format
            .unwrap_or_else(|| Format::infer(Path::new(&file)));
        let (memory_size, memory_size_notice) =
            resolve_memory_size(config.memory_size.as_deref());

        Ok(Self {
            format,
            memory_size,
            memory_size_notice,
            max_steps: config.max_steps,
            print_instructions: config.print_instructions,
            no_diff: config.no_diff,
            trace: config.trace,
            file,
        })
    }
}

impl Config {
    /// Command line arguments take precedence over the config file
    pub fn get() -> Result<Self, Error> {
        OptionalConfig::get_args()
            .merge(OptionalConfig::get_toml()?)
            .try_into()
    }
}
