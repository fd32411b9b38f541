//! Integer literals as accepted on the command line: an optional sign, then an optional `0b`
//! (binary), `0h` (octal) or `0x` (hex) prefix, then digits.

use crate::error::Error;

/// Parses a decimal-by-default integer literal
pub fn parse_int(s: &str) -> Result<i32, Error> {
    parse_int_base(s, 10)
}

/// Parses an integer literal whose digits are in `base` unless a prefix says otherwise.
/// Digits wrap around like 32-bit arithmetic would.
pub fn parse_int_base(s: &str, mut base: u32) -> Result<i32, Error> {
    let invalid = || Error::InvalidInteger(s.to_owned());

    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut chars = digits.chars();
    let first = chars.next().ok_or_else(invalid)?;
    let mut value = digit_value(first, base).ok_or_else(invalid)? as i32;

    let mut rest = chars.as_str();
    if first == '0' {
        let modifier = match rest.chars().next() {
            Some('b' | 'B') => Some(2),
            Some('h' | 'H') => Some(8),
            Some('x' | 'X') => Some(16),
            _ => None,
        };
        if let Some(b) = modifier {
            base = b;
            rest = &rest[1..];
        }
    }

    for c in rest.chars() {
        let digit = digit_value(c, base).ok_or_else(invalid)?;
        value = value.wrapping_mul(base as i32).wrapping_add(digit as i32);
    }

    Ok(if negative { value.wrapping_neg() } else { value })
}

fn digit_value(c: char, base: u32) -> Option<u32> {
    let digit = match c {
        '0'..='9' => c as u32 - '0' as u32,
        'a'..='z' => c as u32 - 'a' as u32 + 10,
        'A'..='Z' => c as u32 - 'A' as u32 + 10,
        _ => return None,
    };
    (digit < base).then_some(digit)
}
