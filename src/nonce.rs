//! Derives the per-message AEAD nonce (spec.md §4.4), byte-exact with
//! RFC 8613 §5.2.
//!
//! Grounded on `oscore_generate_nonce` in `original_source/.../oscore.c`;
//! the zero-buffer/place-two-inputs/XOR shape also mirrors the teacher's
//! `aead::mix_nonce` (same idea, different offsets and two inputs instead
//! of one).

use crate::context::{COMMON_IV_LEN, MAX_ID_LEN, NONCE_LEN};
use crate::error::{OscoreError, Result};

/// Builds the AEAD nonce from `key_id` (≤ `MAX_ID_LEN` bytes), `partial_iv`
/// (≤ 5 bytes on the wire, ≤ 8 internally — this builder accepts whatever
/// fits the nonce's tail), and the context's `common_iv`.
///
/// Layout (spec.md §4.4): byte 0 is `key_id.len()`, `key_id` is
/// right-aligned in `buffer[1..NONCE_LEN-5]`, `partial_iv` is right-aligned
/// in the final bytes, then `common_iv` is XORed in byte-by-byte. A
/// one-bit deviation here desynchronizes the channel permanently, so every
/// offset matches the original bit-for-bit.
pub fn build_nonce(
    key_id: &[u8],
    partial_iv: &[u8],
    common_iv: &[u8; COMMON_IV_LEN],
) -> Result<[u8; NONCE_LEN]> {
    if key_id.len() > MAX_ID_LEN {
        return Err(OscoreError::KeyIdTooLong);
    }
    if partial_iv.len() > NONCE_LEN {
        return Err(OscoreError::PartialIvTooLong);
    }

    let mut buffer = [0u8; NONCE_LEN];
    buffer[0] = key_id.len() as u8;

    let key_id_start = NONCE_LEN - 5 - key_id.len();
    buffer[key_id_start..NONCE_LEN - 5].copy_from_slice(key_id);

    let iv_start = NONCE_LEN - partial_iv.len();
    buffer[iv_start..].copy_from_slice(partial_iv);

    for (b, iv_byte) in buffer.iter_mut().zip(common_iv.iter()) {
        *b ^= iv_byte;
    }

    log::trace!(
        "nonce: key_id={:02x?} partial_iv={:02x?} common_iv={:02x?} -> {:02x?}",
        key_id,
        partial_iv,
        common_iv,
        buffer
    );

    Ok(buffer)
}
