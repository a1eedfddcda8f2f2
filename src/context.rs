//! The security context: the one piece of state that outlives a single
//! message, provisioned externally (spec.md §1, §3) but validated here.

use crate::error::{OscoreError, Result};
use crate::window::SlidingWindow;

/// `AES-CCM-16-64-128`'s fixed sizes (spec.md §3). This crate fixes the
/// algorithm; group ciphersuite agility is out of scope (spec.md §1).
pub const KEY_LEN: usize = 16;
pub const NONCE_LEN: usize = 13;
pub const TAG_LEN: usize = 8;
pub const COMMON_IV_LEN: usize = NONCE_LEN;

/// Maximum length of a sender/recipient id (AES-CCM nonce construction
/// limit, spec.md §3 and §9's Open Question resolution).
pub const MAX_ID_LEN: usize = NONCE_LEN - 6;

/// `OSCORE_SEQ_MAX` (spec.md §3): once `sender.seq` reaches this, the
/// context is exhausted and must not be used to send again.
pub const OSCORE_SEQ_MAX: u64 = (1u64 << 40) - 1;

/// The algorithm identifier for AES-CCM-16-64-128 (COSE algorithm registry).
pub const ALG_AES_CCM_16_64_128: i32 = 10;

/// The largest CoAP payload this crate will (de)protect in one call
/// (spec.md §5's working-buffer budget). Chosen to comfortably cover a
/// single unfragmented CoAP datagram over UDP; larger payloads are out of
/// scope (spec.md §1: no Block-wise awareness beyond duplicating the
/// relevant options, per §4.9).
pub const MAX_PLAINTEXT_LEN: usize = 1024;

/// Largest ciphertext this crate will handle: plaintext plus the AEAD tag.
pub const MAX_CONTENT_LEN: usize = MAX_PLAINTEXT_LEN + TAG_LEN;

/// Opaque handle identifying a `SecurityContext` within whatever table a
/// `ContextStore` implementation keeps (spec.md §9: "model this as a
/// context handle/index into a context table, not a raw pointer"). The
/// exchange table (`exchange.rs`) stores this alongside a token's sequence
/// number instead of a context reference, so it never borrows or owns a
/// context itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ContextHandle(pub u32);

/// A short identifier (sender id on the wire, recipient id once resolved),
/// inline so contexts never heap-allocate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ShortId {
    bytes: [u8; MAX_ID_LEN],
    len: u8,
}

impl ShortId {
    pub fn new(id: &[u8]) -> Result<Self> {
        if id.len() > MAX_ID_LEN {
            return Err(OscoreError::ContextInvalid);
        }
        let mut bytes = [0u8; MAX_ID_LEN];
        bytes[..id.len()].copy_from_slice(id);
        Ok(ShortId {
            bytes,
            len: id.len() as u8,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// The sender's half of a security context (spec.md §3).
#[derive(Clone, Debug)]
pub struct SenderContext {
    pub sender_id: ShortId,
    sender_key: [u8; KEY_LEN],
    /// Monotonically increasing; mutated only on the send path
    /// (spec.md §5).
    pub(crate) seq: u64,
}

impl SenderContext {
    pub fn new(sender_id: &[u8], sender_key: [u8; KEY_LEN]) -> Result<Self> {
        Ok(SenderContext {
            sender_id: ShortId::new(sender_id)?,
            sender_key,
            seq: 0,
        })
    }

    pub fn sender_key(&self) -> &[u8; KEY_LEN] {
        &self.sender_key
    }

    /// The sequence number that will be used for the *next* send.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Whether this context has been exhausted (spec.md §3's
    /// `sender.seq < OSCORE_SEQ_MAX` invariant has been violated).
    pub fn is_exhausted(&self) -> bool {
        self.seq >= OSCORE_SEQ_MAX
    }

    /// Commits the increment of `seq` after a successful send. Per
    /// spec.md §5, this must happen before the ciphertext leaves the
    /// device; callers embedding durable storage should persist `seq`
    /// (via whatever hook their storage collaborator exposes) before
    /// calling this, not after.
    pub(crate) fn increment_seq(&mut self) {
        self.seq += 1;
    }
}

/// The recipient's half of a security context (spec.md §3).
#[derive(Clone, Debug)]
pub struct RecipientContext {
    pub recipient_id: ShortId,
    recipient_key: [u8; KEY_LEN],
    pub sliding_window: SlidingWindow,
}

impl RecipientContext {
    pub fn new(recipient_id: &[u8], recipient_key: [u8; KEY_LEN]) -> Result<Self> {
        Ok(RecipientContext {
            recipient_id: ShortId::new(recipient_id)?,
            recipient_key,
            sliding_window: SlidingWindow::new(),
        })
    }

    pub fn recipient_key(&self) -> &[u8; KEY_LEN] {
        &self.recipient_key
    }
}

/// A full security context for one peer pair (spec.md §3). Created at
/// provisioning, mutated only by sequence increment / sliding-window
/// update, destroyed at teardown.
#[derive(Clone, Debug)]
pub struct SecurityContext {
    pub algorithm_id: i32,
    pub common_iv: [u8; COMMON_IV_LEN],
    pub sender: SenderContext,
    pub recipient: RecipientContext,
}

impl SecurityContext {
    pub fn new(
        common_iv: [u8; COMMON_IV_LEN],
        sender: SenderContext,
        recipient: RecipientContext,
    ) -> Self {
        SecurityContext {
            algorithm_id: ALG_AES_CCM_16_64_128,
            common_iv,
            sender,
            recipient,
        }
    }
}
