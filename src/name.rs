//! File name codec.
//!
//! A file name is `basename '.' extension`. The basename is one to eight
//! characters drawn from `A-Z a-z 0-9 - _`; the extension selects a type
//! id from the configured [`EXTENSIONS`](crate::EXTENSIONS) table. On
//! flash only the basename is kept, packed eight characters into six bytes
//! at six bits per character; the extension survives as the type id byte
//! inside the slot's type/length word.

#[cfg(test)]
mod proptest;

use crate::{EXTENSIONS, Error};

/// Length of the packed basename as stored in a namemap slot.
pub const ENCODED_LEN: usize = 6;

/// Length of the unpacked basename field. Shorter basenames are right
/// justified and left padded with `_`.
pub const BASENAME_LEN: usize = 8;

/// Type id for extensions not present in the table.
pub const TYPE_UNKNOWN: u8 = 0;

/// A packed 6-byte basename.
pub type EncodedName = [u8; ENCODED_LEN];

/// The 64-symbol alphabet, indexed by 6-bit code.
const SYMBOLS: &[u8; 64] = b"_-abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// 6-bit code of a basename character. Anything outside the alphabet
/// collapses to `_`.
fn symbol(c: u8) -> u8 {
    match c {
        b'a'..=b'z' => 2 + (c - b'a'),
        b'A'..=b'Z' => 2 + 26 + (c - b'A'),
        b'0'..=b'9' => 2 + 2 * 26 + (c - b'0'),
        b'-' => 1,
        _ => 0,
    }
}

/// Map an extension to its type id by scanning the sorted extension
/// table. Only the first three characters take part in the comparison;
/// no match yields [`TYPE_UNKNOWN`].
pub fn extension_type(ext: &str) -> u8 {
    let e = ext.as_bytes();
    for (i, candidate) in EXTENSIONS.iter().enumerate() {
        let c = candidate.as_bytes();
        if c[0] > e.first().copied().unwrap_or(0) {
            break;
        }
        if e.len() >= 3 && c[..3] == e[..3] {
            return (i + 1) as u8;
        }
    }
    TYPE_UNKNOWN
}

/// Encode `name` into its packed basename and type id.
///
/// Fails with [`Error::InvalidName`] if `name` contains no `.` or the
/// basename is longer than eight characters.
pub fn encode(name: &str) -> Result<(EncodedName, u8), Error> {
    let bytes = name.as_bytes();
    let dot = bytes
        .iter()
        .position(|&b| b == b'.')
        .ok_or(Error::InvalidName)?;
    if dot > BASENAME_LEN {
        return Err(Error::InvalidName);
    }
    let ty = extension_type(&name[dot + 1..]);

    let mut field = [b'_'; BASENAME_LEN];
    field[BASENAME_LEN - dot..].copy_from_slice(&bytes[..dot]);

    let mut encoded = [0u8; ENCODED_LEN];
    for half in 0..2 {
        let n = &field[half * 4..half * 4 + 4];
        // the 4th character rides in the top two bits of the other three
        let x = symbol(n[3]);
        encoded[half * 3] = symbol(n[0]) | ((x & 0x30) << 2);
        encoded[half * 3 + 1] = symbol(n[1]) | ((x & 0x0C) << 4);
        encoded[half * 3 + 2] = symbol(n[2]) | ((x & 0x03) << 6);
    }
    Ok((encoded, ty))
}

/// Decode a packed basename back into its eight `_`-padded characters.
#[must_use]
pub fn decode(encoded: &EncodedName) -> [u8; BASENAME_LEN] {
    let mut out = [0u8; BASENAME_LEN];
    for half in 0..2 {
        let e = &encoded[half * 3..half * 3 + 3];
        out[half * 4] = SYMBOLS[(e[0] & 0x3F) as usize];
        out[half * 4 + 1] = SYMBOLS[(e[1] & 0x3F) as usize];
        out[half * 4 + 2] = SYMBOLS[(e[2] & 0x3F) as usize];
        let x = ((e[0] & 0xC0) >> 2) | ((e[1] & 0xC0) >> 4) | ((e[2] & 0xC0) >> 6);
        out[half * 4 + 3] = SYMBOLS[x as usize];
    }
    out
}
