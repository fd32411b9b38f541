use hashbrown::HashMap;
use lazy_static::lazy_static;
use std::fmt;

pub const REGISTER_COUNT: usize = 8;

/// Register field value meaning "this instruction has no register here"
pub const REGISTER_NONE: u8 = 0xF;

pub const REGVEC: [&str; REGISTER_COUNT] = ["eax", "ecx", "edx", "ebx", "esi", "edi", "esp", "ebp"];

/// One of the eight general purpose registers. The discriminant is the register's index in the
/// register file and in instruction encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Register {
    Eax = 0,
    Ecx,
    Edx,
    Ebx,
    Esi,
    Edi,
    /// Stack pointer, used implicitly by `pushl`, `popl`, `call` and `ret`
    Esp,
    Ebp,
}

impl Register {
    pub const ALL: [Register; REGISTER_COUNT] = [
        Register::Eax,
        Register::Ecx,
        Register::Edx,
        Register::Ebx,
        Register::Esi,
        Register::Edi,
        Register::Esp,
        Register::Ebp,
    ];

    pub fn from_index(i: u8) -> Option<Self> {
        Self::ALL.get(i as usize).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        REGVEC[self.index()]
    }

    /// Looks up a register by name, with or without the `%` prefix
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix('%').unwrap_or(name);
        REGS.get(name).copied()
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.name())
    }
}

pub type RegMap = HashMap<String, Register>;

lazy_static! {
    static ref REGS: RegMap = regs();
}

fn regs() -> RegMap {
    let mut map = RegMap::with_capacity(2 * REGISTER_COUNT);

    // Insert r-prefixed registers
    for (i, reg) in Register::ALL.into_iter().enumerate() {
        map.insert(format!("r{}", i), reg);
    }

    // Insert named registers
    for reg in Register::ALL {
        map.insert(reg.name().to_string(), reg);
    }

    map
}
