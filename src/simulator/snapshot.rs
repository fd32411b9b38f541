//! Before/after comparison of two states

use super::register_names::Register;
use super::State;
use crate::codec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterChange {
    pub register: Register,
    pub before: i32,
    pub after: i32,
}

/// A 4-byte aligned memory word that differs in at least one byte. Values are read
/// little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordChange {
    pub address: usize,
    pub before: u32,
    pub after: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Diff {
    pub registers: Vec<RegisterChange>,
    pub memory: Vec<WordChange>,
}

impl Diff {
    /// Registers and memory words that changed from `before` to `after`. If the memories have
    /// different sizes, bytes past the end of the smaller one count as zero.
    pub fn between(before: &State, after: &State) -> Self {
        let registers = Register::ALL
            .into_iter()
            .filter_map(|register| {
                let (b, a) = (before.register(register), after.register(register));
                (b != a).then_some(RegisterChange {
                    register,
                    before: b,
                    after: a,
                })
            })
            .collect();

        let len = before.memory_size().max(after.memory_size());
        let memory = (0..len)
            .step_by(4)
            .filter_map(|address| {
                let (b, a) = (word_at(before, address), word_at(after, address));
                (b != a).then_some(WordChange {
                    address,
                    before: codec::decode_le(b),
                    after: codec::decode_le(a),
                })
            })
            .collect();

        Self { registers, memory }
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty() && self.memory.is_empty()
    }
}

fn word_at(state: &State, address: usize) -> [u8; 4] {
    let mut word = [0; 4];
    for (i, byte) in word.iter_mut().enumerate() {
        *byte = state.memory_byte(address + i).unwrap_or(0);
    }
    word
}
