use crate::codec;
use crate::error::Error;

/// Bytes read by a single fetch: opcode, register byte and a 4-byte immediate
pub const FETCH_WINDOW: usize = 6;

/// Flat, zero-initialized, byte-addressable memory. Every access is bounds checked before
/// anything is read or written; out of bounds accesses return `None` and touch nothing.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Allocates `size` zeroed bytes. Fails if `size` is zero or the allocation itself fails.
    pub fn new(size: usize) -> Result<Self, Error> {
        if size < 1 {
            return Err(Error::InvalidMemorySize(size));
        }

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|e| Error::Allocation(size, e))?;
        data.resize(size, 0);
        Ok(Self { data })
    }

    /// Copies the memory into a new, independent buffer
    pub fn try_clone(&self) -> Result<Self, Error> {
        let mut data = Vec::new();
        data.try_reserve_exact(self.data.len())
            .map_err(|e| Error::Allocation(self.data.len(), e))?;
        data.extend_from_slice(&self.data);
        Ok(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn get_byte(&self, i: usize) -> Option<u8> {
        self.data.get(i).copied()
    }

    /// Range of `N` bytes starting at `i`, if it's entirely inside the memory
    fn range<const N: usize>(&self, i: i64) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(i).ok()?;
        let end = start.checked_add(N)?;
        (end <= self.data.len()).then_some(start..end)
    }

    /// Reads `N` bytes starting at `i` and passes them to `read`
    fn get_with<const N: usize, T, F>(&self, i: i64, read: F) -> Option<T>
    where
        F: FnOnce([u8; N]) -> T,
    {
        let range = self.range::<N>(i)?;
        let bytes: [u8; N] = self.data[range].try_into().ok()?;
        Some(read(bytes))
    }

    fn set_with<const N: usize>(&mut self, i: i64, bytes: [u8; N]) -> Option<()> {
        let range = self.range::<N>(i)?;
        self.data[range].copy_from_slice(&bytes);
        Some(())
    }

    /// Whether an instruction can be fetched at `pc`. Always leaves room for the longest
    /// instruction, so this is `0 <= pc <= len - 6`.
    pub fn can_fetch(&self, pc: i64) -> bool {
        self.range::<FETCH_WINDOW>(pc).is_some()
    }

    /// The 6 bytes at `pc`, regardless of how long the instruction there actually is
    pub fn fetch(&self, pc: i64) -> Option<[u8; FETCH_WINDOW]> {
        self.get_with(pc, |window| window)
    }

    /// Little-endian word at `i`, valid for `0 <= i <= len - 4`
    pub fn get_word(&self, i: i64) -> Option<u32> {
        self.get_with(i, codec::decode_le)
    }

    pub fn set_word(&mut self, i: i64, x: u32) -> Option<()> {
        self.set_with(i, codec::encode_le(x))
    }

    /// Copies `bytes` to `memory[start..]`, failing without writing anything if they don't fit
    pub fn write(&mut self, start: usize, bytes: &[u8]) -> Result<(), Error> {
        let end = start.saturating_add(bytes.len());
        if end > self.data.len() {
            return Err(Error::ProgramTooLarge {
                address: self.data.len().max(start),
                memory_size: self.data.len(),
            });
        }
        self.data[start..end].copy_from_slice(bytes);
        Ok(())
    }
}
