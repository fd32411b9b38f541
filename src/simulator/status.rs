use std::fmt;

/// Program status. Everything but `Running` is terminal: once reached, the executor stops and
/// leaves the state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Status {
    /// Normal operation (AOK)
    #[default]
    Running = 1,
    /// `halt` was executed (HLT)
    Halted,
    /// Out of bounds fetch, load, store, stack access or jump target (ADR)
    AddressError,
    /// Unknown class or function code, or a malformed register field (INS)
    InvalidInstruction,
}

impl Status {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Status::Running),
            2 => Some(Status::Halted),
            3 => Some(Status::AddressError),
            4 => Some(Status::InvalidInstruction),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Status::Running => "AOK",
            Status::Halted => "HLT",
            Status::AddressError => "ADR",
            Status::InvalidInstruction => "INS",
        }
    }

    /// Like [`Status::name`], but for a raw status code, which may be out of range
    pub fn name_of_code(code: u8) -> &'static str {
        Self::from_code(code).map_or("???", Self::name)
    }

    pub fn is_terminal(self) -> bool {
        self != Status::Running
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
