//! Error taxonomy for the OSCORE processor, and the mapping from an internal
//! failure to the CoAP status code a caller should surface (spec.md §7).

use thiserror::Error;

/// Everything that can go wrong while protecting or unprotecting a message.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OscoreError {
    /// The OSCORE option value was malformed on the wire.
    #[error("malformed OSCORE option value")]
    BadOption,
    /// No security context matched the key id carried on an incoming request.
    #[error("no security context for the given key id")]
    MissingContext,
    /// The sliding window rejected an incoming sequence number as a replay.
    #[error("replayed or too-old sequence number")]
    Replay,
    /// An incoming response's token has no outstanding exchange entry.
    #[error("no outstanding exchange for this token")]
    ExchangeMissing,
    /// AEAD authentication failed.
    #[error("AEAD decryption failed")]
    DecryptionFailure,
    /// The inner plaintext didn't fit the serializer's scratch buffer.
    #[error("plaintext exceeds the maximum chunk size")]
    PlaintextTooLarge,
    /// The exchange table had no room for a new entry.
    #[error("exchange table is full")]
    ExchangeTableFull,
    /// A request token already has an outstanding exchange entry.
    #[error("an exchange is already outstanding for this token")]
    ExchangeCollision,
    /// The sender's sequence counter has reached `OSCORE_SEQ_MAX`; the
    /// context can no longer be used to send.
    #[error("sender sequence number exhausted")]
    SeqExhausted,
    /// A context was provisioned with a field outside the bounds spec.md §3
    /// requires (key/IV lengths, id lengths).
    #[error("security context field out of bounds")]
    ContextInvalid,
    /// `partial_iv_len` exceeds the OSCORE option wire limit (5 bytes).
    #[error("partial IV longer than 5 bytes")]
    PartialIvTooLong,
    /// A key id is longer than AES-CCM-16-64-128's nonce construction allows
    /// (`nonce_len - 6`, i.e. 7 bytes).
    #[error("key id too long for the nonce construction")]
    KeyIdTooLong,
    /// `kid_context` exceeds the 255-byte wire limit.
    #[error("kid context longer than 255 bytes")]
    KidContextTooLong,
    /// A fixed-capacity scratch buffer (AAD, option value, nonce, ...) was
    /// too small for the data being written into it.
    #[error("fixed-capacity buffer too small")]
    BufferTooSmall,
}

/// The CoAP status an `OscoreError` should be surfaced as, per spec.md §7.
///
/// `Internal` covers cases spec.md marks as "message dropped" rather than a
/// specific status: the caller should not reply at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoapStatus {
    /// 4.00 Bad Request
    BadRequest,
    /// 4.01 Unauthorized
    Unauthorized,
    /// 4.02 Bad Option
    BadOption,
    /// Decryption failed while unprotecting a response; no CoAP status is
    /// sent back over the wire, this is a local error for the requester.
    ResponseDecryptionError,
    /// No reply should be sent; the message is simply dropped.
    Internal,
}

impl OscoreError {
    /// Maps this error to the CoAP status the engine should respond with,
    /// per the table in spec.md §7. `is_request` disambiguates
    /// `DecryptionFailure`, which surfaces differently on each side.
    pub fn to_coap_status(self, is_request: bool) -> CoapStatus {
        match self {
            OscoreError::BadOption => CoapStatus::BadOption,
            OscoreError::MissingContext
            | OscoreError::Replay
            | OscoreError::ExchangeMissing => CoapStatus::Unauthorized,
            OscoreError::DecryptionFailure if is_request => CoapStatus::BadRequest,
            OscoreError::DecryptionFailure => CoapStatus::ResponseDecryptionError,
            OscoreError::PlaintextTooLarge
            | OscoreError::ExchangeTableFull
            | OscoreError::ExchangeCollision
            | OscoreError::SeqExhausted
            | OscoreError::ContextInvalid
            | OscoreError::PartialIvTooLong
            | OscoreError::KeyIdTooLong
            | OscoreError::KidContextTooLong
            | OscoreError::BufferTooSmall => CoapStatus::Internal,
        }
    }
}

pub type Result<T> = core::result::Result<T, OscoreError>;
