//!
//! Program images: the bytes an assembler produced, and where in memory they go.
//!
//! Images can be read from raw binaries or from hex text in the layout Y86 assemblers print:
//!
//! ```text
//! 0x000: 30f00500 0000 | irmovl $5, %eax
//! 0x006: 6001          | addl %eax, %ecx
//! ```
//!
//! Each line may start with an `address:` prefix, continues with hex digit pairs (spaces between
//! them are optional) and may end with a comment starting at `|` or `#`.
//!

use crate::codec;
use crate::error::Error;
use clap::ValueEnum;
use serde::Deserialize;
use std::path::Path;

/// Test fixtures
pub mod demo {
    /// `irmovl $5, %eax; irmovl $3, %ecx; addl %eax, %ecx; halt`
    pub const ARITHMETIC: &[u8] = &[
        0x30, 0xF0, 0x05, 0x00, 0x00, 0x00, // irmovl $5, %eax
        0x30, 0xF1, 0x03, 0x00, 0x00, 0x00, // irmovl $3, %ecx
        0x60, 0x01, // addl %eax, %ecx
        0x00, // halt
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Bytes are copied to memory as they are
    Raw,
    /// Hex digit pairs with optional `address:` prefixes and comments
    Hex,
}

impl Format {
    /// Guesses the format from the file extension
    pub fn infer(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("hex" | "yo" | "txt") => Format::Hex,
            _ => Format::Raw,
        }
    }
}

/// Contiguous bytes that go to `memory[address..]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub address: usize,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    segments: Vec<Segment>,
}

impl Image {
    /// Bytes to be loaded at address 0
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut segments = Vec::new();
        if !bytes.is_empty() {
            segments.push(Segment {
                address: 0,
                bytes: bytes.to_vec(),
            });
        }
        Self { segments }
    }

    /// Words staged so that their first logical byte lands first in memory, i.e. each word is
    /// stored big-endian
    pub fn from_words_be(words: &[u32]) -> Self {
        let bytes: Vec<u8> = words.iter().copied().flat_map(codec::encode_be).collect();
        Self::from_bytes(&bytes)
    }

    pub fn from_hex(text: &str) -> Result<Self, Error> {
        let mut image = Self::default();
        let mut cursor = 0;

        for (i, line) in text.lines().enumerate() {
            let invalid = || Error::InvalidHex {
                line: i + 1,
                text: line.trim().to_owned(),
            };

            let code = line.split(['|', '#']).next().unwrap_or("");
            let code = match code.split_once(':') {
                Some((address, rest)) => {
                    cursor = parse_address(address).ok_or_else(invalid)?;
                    rest
                }
                None => code,
            };

            let mut bytes = Vec::new();
            for token in code.split_whitespace() {
                if token.len() % 2 != 0 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(invalid());
                }
                for i in (0..token.len()).step_by(2) {
                    bytes.push(u8::from_str_radix(&token[i..i + 2], 16).map_err(|_| invalid())?);
                }
            }

            cursor = image.push(cursor, &bytes).ok_or_else(invalid)?;
        }

        Ok(image)
    }

    pub fn read_file(path: impl AsRef<Path>, format: Format) -> Result<Self, Error> {
        let bytes = std::fs::read(path)?;
        match format {
            Format::Raw => Ok(Self::from_bytes(&bytes)),
            Format::Hex => Self::from_hex(&String::from_utf8_lossy(&bytes)),
        }
    }

    /// Appends `bytes` at `address`, merging with the previous segment when they touch.
    /// Returns the address right after the new bytes, or `None` if that isn't addressable
    fn push(&mut self, address: usize, bytes: &[u8]) -> Option<usize> {
        let end = address.checked_add(bytes.len())?;
        if bytes.is_empty() {
            return Some(end);
        }

        match self.segments.last_mut() {
            Some(last) if last.address.checked_add(last.bytes.len()) == Some(address) => {
                last.bytes.extend_from_slice(bytes)
            }
            _ => self.segments.push(Segment {
                address,
                bytes: bytes.to_vec(),
            }),
        }
        Some(end)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Total number of bytes in the image
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.bytes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

fn parse_address(s: &str) -> Option<usize> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    usize::from_str_radix(digits, 16).ok()
}
