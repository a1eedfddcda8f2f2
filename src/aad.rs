//! Builds the COSE `Encrypt0` Additional Authenticated Data (spec.md §4.3),
//! byte-exact with RFC 8613 §5.4 and RFC 8152 §4.3.
//!
//! Grounded on `oscore_prepare_aad` in `original_source/.../oscore.c`, which
//! builds the same two nested CBOR structures with `nanocbor`. This crate
//! hand-rolls the handful of CBOR primitives the fixed 5-field / 3-field
//! structures need (array header, unsigned int, byte string, text string)
//! into fixed-capacity buffers rather than pulling in a general CBOR crate
//! — see DESIGN.md for why (the `DurandA-oscore-rust` example in the
//! retrieval pack makes the same call with its own small `cbor` helper).

use crate::error::{OscoreError, Result};

/// Maximum size of the external AAD (spec.md §5: ≤ 25 bytes).
pub const MAX_EXTERNAL_AAD_LEN: usize = 25;
/// Maximum size of the full AAD (spec.md §5: ≤ 35 bytes).
pub const MAX_AAD_LEN: usize = 35;

/// Minimal fixed-capacity CBOR writer: just enough of the major types the
/// AAD structures need, written directly into a caller-owned buffer.
struct CborWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> CborWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        CborWriter { buf, pos: 0 }
    }

    fn push(&mut self, byte: u8) -> Result<()> {
        if self.pos >= self.buf.len() {
            return Err(OscoreError::BufferTooSmall);
        }
        self.buf[self.pos] = byte;
        self.pos += 1;
        Ok(())
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.pos + bytes.len() > self.buf.len() {
            return Err(OscoreError::BufferTooSmall);
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Writes a CBOR head (major type in top 3 bits, argument in the rest),
    /// using the shortest encoding for `arg` that fits this structure's
    /// needs (only small arguments ever occur here: array lengths, the
    /// protocol version, the algorithm id).
    fn head(&mut self, major: u8, arg: u64) -> Result<()> {
        let major = major << 5;
        if arg < 24 {
            self.push(major | arg as u8)
        } else if arg <= 0xFF {
            self.push(major | 24)?;
            self.push(arg as u8)
        } else if arg <= 0xFFFF {
            self.push(major | 25)?;
            self.push_bytes(&(arg as u16).to_be_bytes())
        } else {
            self.push(major | 26)?;
            self.push_bytes(&(arg as u32).to_be_bytes())
        }
    }

    fn array(&mut self, len: u64) -> Result<()> {
        self.head(4, len)
    }

    fn uint(&mut self, v: u64) -> Result<()> {
        self.head(0, v)
    }

    fn bstr(&mut self, bytes: &[u8]) -> Result<()> {
        self.head(2, bytes.len() as u64)?;
        self.push_bytes(bytes)
    }

    fn tstr(&mut self, s: &str) -> Result<()> {
        self.head(3, s.len() as u64)?;
        self.push_bytes(s.as_bytes())
    }

    fn len(&self) -> usize {
        self.pos
    }
}

/// Inputs to the external AAD, per spec.md §4.3. `request_key_id` and
/// `request_partial_iv` are always from the *originating request*
/// regardless of direction — the caller (cose.rs / pipeline.rs) is
/// responsible for picking the right id per the §4.8 table.
pub struct AadInputs<'a> {
    pub algorithm_id: i32,
    pub request_key_id: &'a [u8],
    pub request_partial_iv: &'a [u8],
}

/// Fixed-capacity output buffer for `build_aad`.
pub struct AadBuffer {
    bytes: [u8; MAX_AAD_LEN],
    len: usize,
}

impl AadBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Builds the AAD fed to the AEAD's associated-data input (spec.md §4.3):
/// the external AAD (5-element array) nested inside the 3-element
/// `Encrypt0` AAD structure.
pub fn build_aad(inputs: &AadInputs) -> Result<AadBuffer> {
    let mut external_buf = [0u8; MAX_EXTERNAL_AAD_LEN];
    let mut ext = CborWriter::new(&mut external_buf);
    ext.array(5)?;
    ext.uint(1)?; // oscore_version
    ext.array(1)?;
    ext.uint(inputs.algorithm_id as u64)?;
    ext.bstr(inputs.request_key_id)?;
    ext.bstr(inputs.request_partial_iv)?;
    ext.bstr(&[])?; // integrity-protected options: currently always empty
    let external_len = ext.len();

    let mut out = AadBuffer {
        bytes: [0u8; MAX_AAD_LEN],
        len: 0,
    };
    let mut w = CborWriter::new(&mut out.bytes);
    w.array(3)?;
    w.tstr("Encrypt0")?;
    w.bstr(&[])?; // protected header: always empty for Encrypt0
    w.bstr(&external_buf[..external_len])?;
    out.len = w.len();
    Ok(out)
}
