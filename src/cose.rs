//! The COSE `Encrypt0` state object (spec.md §3, §4) and the AEAD
//! collaborator boundary it's built around (spec.md §6).
//!
//! The struct layout is grounded on `cose_encrypt0_t` in
//! `original_source/.../cose.h`/`cose.c`; the trait-boundary shape around
//! the underlying AEAD (an associated type behind a small trait, rather
//! than a `dyn` object per message) is grounded on the teacher's `Aead`
//! trait in `aead.rs`.

use aead::{AeadInPlace, KeyInit};
use ccm::consts::{U13, U8};
use ccm::Ccm;

use crate::aad::{build_aad, AadBuffer, AadInputs};
use crate::context::{COMMON_IV_LEN, KEY_LEN, MAX_ID_LEN, NONCE_LEN, TAG_LEN};
use crate::error::{OscoreError, Result};
use crate::nonce::build_nonce;

/// The AEAD collaborator interface (spec.md §6): `encrypt`/`decrypt` over a
/// fixed algorithm, key, nonce, and AAD. Spec.md treats this primitive as
/// external; it's modeled as a trait so the pipeline is generic over it
/// rather than hard-wired to one implementation.
pub trait AeadPrimitive {
    /// Encrypts `plaintext` in place, appending the authentication tag.
    /// `buf` must have at least `TAG_LEN` bytes of trailing capacity beyond
    /// `plaintext.len()`. Returns the total ciphertext length
    /// (`plaintext.len() + TAG_LEN`).
    fn encrypt(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        aad: &[u8],
        buf: &mut [u8],
        plaintext_len: usize,
    ) -> Result<usize>;

    /// Decrypts `ciphertext` (plaintext followed by the tag) in place.
    /// Returns the plaintext length on success.
    fn decrypt(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        aad: &[u8],
        buf: &mut [u8],
        ciphertext_len: usize,
    ) -> Result<usize>;
}

type CcmAes128 = Ccm<aes::Aes128, U8, U13>;

/// The fixed algorithm spec.md §3 mandates: AES-CCM-16-64-128 (16-byte key,
/// 13-byte nonce, 8-byte tag). Provided as the default, concrete
/// `AeadPrimitive` so the crate is exercisable end-to-end without a second
/// crate; any other implementation of the trait works equally well with
/// the rest of the pipeline.
#[derive(Default, Clone, Copy)]
pub struct AesCcm16_64_128;

impl AeadPrimitive for AesCcm16_64_128 {
    fn encrypt(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        aad: &[u8],
        buf: &mut [u8],
        plaintext_len: usize,
    ) -> Result<usize> {
        if buf.len() < plaintext_len + TAG_LEN {
            return Err(OscoreError::BufferTooSmall);
        }
        let cipher = CcmAes128::new(key.into());
        let tag = cipher
            .encrypt_in_place_detached(nonce.into(), aad, &mut buf[..plaintext_len])
            .map_err(|_| OscoreError::DecryptionFailure)?;
        buf[plaintext_len..plaintext_len + TAG_LEN].copy_from_slice(&tag);
        Ok(plaintext_len + TAG_LEN)
    }

    fn decrypt(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        aad: &[u8],
        buf: &mut [u8],
        ciphertext_len: usize,
    ) -> Result<usize> {
        if ciphertext_len < TAG_LEN {
            return Err(OscoreError::DecryptionFailure);
        }
        let plaintext_len = ciphertext_len - TAG_LEN;
        let cipher = CcmAes128::new(key.into());
        let tag = *aead::Tag::<CcmAes128>::from_slice(&buf[plaintext_len..ciphertext_len]);
        cipher
            .decrypt_in_place_detached(nonce.into(), aad, &mut buf[..plaintext_len], &tag)
            .map_err(|_| OscoreError::DecryptionFailure)?;
        Ok(plaintext_len)
    }
}

/// The transient COSE `Encrypt0` state object (spec.md §3): one per
/// message, never retained past the call that builds it. Holds non-owning
/// references into the caller's buffers, per spec.md §9's "Ownership of
/// borrowed slices" design note.
pub struct CoseEncrypt0<'a> {
    pub algorithm_id: i32,
    key: Option<&'a [u8; KEY_LEN]>,
    nonce: Option<[u8; NONCE_LEN]>,
    aad: Option<&'a [u8]>,
    content: Option<&'a mut [u8]>,
    content_len: usize,
    partial_iv: [u8; 8],
    partial_iv_len: u8,
    key_id: Option<&'a [u8]>,
    kid_context: Option<&'a [u8]>,
}

impl<'a> CoseEncrypt0<'a> {
    pub fn new(algorithm_id: i32) -> Self {
        CoseEncrypt0 {
            algorithm_id,
            key: None,
            nonce: None,
            aad: None,
            content: None,
            content_len: 0,
            partial_iv: [0u8; 8],
            partial_iv_len: 0,
            key_id: None,
            kid_context: None,
        }
    }

    pub fn set_key(&mut self, key: &'a [u8; KEY_LEN]) {
        self.key = Some(key);
    }

    pub fn set_nonce(&mut self, nonce: [u8; NONCE_LEN]) {
        self.nonce = Some(nonce);
    }

    pub fn set_aad(&mut self, aad: &'a [u8]) {
        self.aad = Some(aad);
    }

    pub fn set_content(&mut self, content: &'a mut [u8], len: usize) {
        self.content_len = len;
        self.content = Some(content);
    }

    /// Sets the partial IV (spec.md §3: ≤ 8 bytes internally, ≤ 5 on the
    /// wire — this accessor enforces only the internal bound; the option
    /// codec enforces the wire bound on encode).
    pub fn set_partial_iv(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > 8 {
            return Err(OscoreError::PartialIvTooLong);
        }
        self.partial_iv = [0u8; 8];
        self.partial_iv[..bytes.len()].copy_from_slice(bytes);
        self.partial_iv_len = bytes.len() as u8;
        Ok(())
    }

    pub fn partial_iv(&self) -> &[u8] {
        &self.partial_iv[..self.partial_iv_len as usize]
    }

    pub fn partial_iv_len(&self) -> usize {
        self.partial_iv_len as usize
    }

    /// Sets the key id. Per spec.md §9's Open Question resolution, this is
    /// where the AES-CCM-specific bound (`nonce_len - 6`, i.e. 7 bytes) is
    /// enforced — the option codec itself stays permissive about longer
    /// key ids since it's algorithm-agnostic.
    pub fn set_key_id(&mut self, key_id: &'a [u8]) -> Result<()> {
        if key_id.len() > MAX_ID_LEN {
            return Err(OscoreError::KeyIdTooLong);
        }
        self.key_id = Some(key_id);
        Ok(())
    }

    pub fn key_id(&self) -> Option<&[u8]> {
        self.key_id
    }

    pub fn set_kid_context(&mut self, kid_context: &'a [u8]) -> Result<()> {
        if kid_context.len() > 255 {
            return Err(OscoreError::KidContextTooLong);
        }
        self.kid_context = Some(kid_context);
        Ok(())
    }

    pub fn kid_context(&self) -> Option<&[u8]> {
        self.kid_context
    }

    /// Derives the AEAD nonce (spec.md §4.4) from this object's own
    /// `key_id`/`partial_iv` fields and the context's `common_iv`. Call
    /// after `set_key_id`/`set_partial_iv`, before `set_nonce`.
    pub fn derive_nonce(&self, common_iv: &[u8; COMMON_IV_LEN]) -> Result<[u8; NONCE_LEN]> {
        let key_id = self.key_id.unwrap_or(&[]);
        build_nonce(key_id, self.partial_iv(), common_iv)
    }

    /// Builds the AAD (spec.md §4.3) from this object's own `algorithm_id`,
    /// `key_id`, and `partial_iv` fields. Call after `set_key_id`/
    /// `set_partial_iv`, before `set_aad`.
    pub fn build_aad(&self) -> Result<AadBuffer> {
        let key_id = self.key_id.unwrap_or(&[]);
        build_aad(&AadInputs {
            algorithm_id: self.algorithm_id,
            request_key_id: key_id,
            request_partial_iv: self.partial_iv(),
        })
    }

    /// Runs the configured AEAD in the encrypt direction over `content`,
    /// using `aad` and `nonce`. All four must have been set. Returns the
    /// ciphertext length.
    pub fn encrypt<A: AeadPrimitive>(&mut self, aead: &A) -> Result<usize> {
        let key = self.key.ok_or(OscoreError::ContextInvalid)?;
        let nonce = self.nonce.ok_or(OscoreError::ContextInvalid)?;
        let aad = self.aad.ok_or(OscoreError::ContextInvalid)?;
        let content = self.content.as_deref_mut().ok_or(OscoreError::ContextInvalid)?;
        let len = aead.encrypt(key, &nonce, aad, content, self.content_len)?;
        self.content_len = len;
        Ok(len)
    }

    /// Runs the configured AEAD in the decrypt direction. Returns the
    /// plaintext length, or `OscoreError::DecryptionFailure` on an
    /// authentication failure.
    pub fn decrypt<A: AeadPrimitive>(&mut self, aead: &A) -> Result<usize> {
        let key = self.key.ok_or(OscoreError::ContextInvalid)?;
        let nonce = self.nonce.ok_or(OscoreError::ContextInvalid)?;
        let aad = self.aad.ok_or(OscoreError::ContextInvalid)?;
        let content = self.content.as_deref_mut().ok_or(OscoreError::ContextInvalid)?;
        let len = aead.decrypt(key, &nonce, aad, content, self.content_len)?;
        self.content_len = len;
        Ok(len)
    }

    pub fn content(&self) -> &[u8] {
        match &self.content {
            Some(c) => &c[..self.content_len],
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_roundtrip() {
        let aead = AesCcm16_64_128;
        let key = [0x42u8; KEY_LEN];
        let nonce = [0x01u8; NONCE_LEN];
        let aad = b"some aad";

        let mut buf = [0u8; 64];
        let plaintext = b"hello oscore";
        buf[..plaintext.len()].copy_from_slice(plaintext);

        let mut cose = CoseEncrypt0::new(10);
        cose.set_key(&key);
        cose.set_nonce(nonce);
        cose.set_aad(aad);
        cose.set_content(&mut buf, plaintext.len());
        let ciphertext_len = cose.encrypt(&aead).unwrap();
        assert_eq!(ciphertext_len, plaintext.len() + TAG_LEN);
        assert_ne!(&cose.content()[..plaintext.len()], plaintext);

        let mut cose2 = CoseEncrypt0::new(10);
        cose2.set_key(&key);
        cose2.set_nonce(nonce);
        cose2.set_aad(aad);
        cose2.set_content(&mut buf, ciphertext_len);
        let plaintext_len = cose2.decrypt(&aead).unwrap();
        assert_eq!(&cose2.content()[..plaintext_len], plaintext);
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let aead = AesCcm16_64_128;
        let key = [0x42u8; KEY_LEN];
        let nonce = [0x01u8; NONCE_LEN];
        let aad = b"aad";

        let mut buf = [0u8; 64];
        let plaintext = b"tamper me";
        buf[..plaintext.len()].copy_from_slice(plaintext);

        let mut cose = CoseEncrypt0::new(10);
        cose.set_key(&key);
        cose.set_nonce(nonce);
        cose.set_aad(aad);
        cose.set_content(&mut buf, plaintext.len());
        let ciphertext_len = cose.encrypt(&aead).unwrap();

        buf[0] ^= 0x01;

        let mut cose2 = CoseEncrypt0::new(10);
        cose2.set_key(&key);
        cose2.set_nonce(nonce);
        cose2.set_aad(aad);
        cose2.set_content(&mut buf, ciphertext_len);
        assert_eq!(cose2.decrypt(&aead), Err(OscoreError::DecryptionFailure));
    }

    #[test]
    fn key_id_rejects_oversize() {
        let mut cose = CoseEncrypt0::new(10);
        let oversize = [0u8; MAX_ID_LEN + 1];
        assert_eq!(cose.set_key_id(&oversize), Err(OscoreError::KeyIdTooLong));
    }
}
