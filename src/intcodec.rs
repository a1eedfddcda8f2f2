//! Minimal-length big-endian encoding of a 64-bit sequence number.
//!
//! This is the "Partial IV" wire representation used throughout OSCORE: a
//! sequence number shrunk to the fewest bytes that represent it, matching
//! `u64tob`/`btou64` in the original `oscore.c`.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{OscoreError, Result};

/// A minimal big-endian encoding of a `u64`, inline so nothing heap-allocates.
/// Holds at most 8 significant bytes, left-padded away (`len` tracks how
/// many of `bytes` are in use, right-aligned).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinBe {
    bytes: [u8; 8],
    len: u8,
}

impl MinBe {
    /// The significant bytes, most-significant first.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[8 - self.len as usize..]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Encodes `v` as the fewest big-endian bytes that represent it. `v == 0`
/// encodes as a single `0x00` byte, never as zero bytes.
pub fn u64_to_min_be(v: u64) -> MinBe {
    let mut full = [0u8; 8];
    BigEndian::write_u64(&mut full, v);
    let significant = full.iter().position(|&b| b != 0).map_or(8, |i| 8 - i);
    let len = significant.max(1);
    MinBe {
        bytes: full,
        len: len as u8,
    }
}

/// Decodes a minimal big-endian sequence number back into a `u64`.
/// Left-pads to 8 bytes before interpreting. Fails if `bytes` is longer
/// than 8 bytes (cannot fit in a `u64`).
pub fn min_be_to_u64(bytes: &[u8]) -> Result<u64> {
    if bytes.len() > 8 {
        return Err(OscoreError::BufferTooSmall);
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(BigEndian::read_u64(&buf))
}
