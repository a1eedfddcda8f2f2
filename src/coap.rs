//! The CoAP-side collaborator seams (spec.md §6): message field access,
//! serialization/parsing, and context lookup. None of these are
//! implemented against a concrete CoAP stack here — the pipeline is
//! generic over them, the same way the teacher is generic over its `Aead`/
//! `Kdf`/`Kem` traits rather than hard-wiring one backend.

use crate::context::{ContextHandle, SecurityContext};
use crate::error::Result;

/// Which class of options a serialize/parse call should produce or expect
/// (spec.md §6: `role ∈ { COAP, CONFIDENTIAL }`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The outer, on-the-wire message: class-U and class-I options only.
    Coap,
    /// The inner plaintext message: class-E and class-I options.
    Confidential,
}

/// A single CoAP option number this crate needs to reason about (spec.md
/// §4.9's option-clearing policy). Only the options named there are
/// enumerated; anything else is opaque to this crate and left to the
/// CoAP engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionNumber {
    IfMatch,
    ETag,
    IfNoneMatch,
    Observe,
    LocationPath,
    UriHost,
    UriPath,
    ContentFormat,
    MaxAge,
    UriQuery,
    Accept,
    LocationQuery,
    Block2,
    Block1,
    Size2,
    ProxyUri,
    ProxyScheme,
    Size1,
    Oscore,
}

/// Class-E options (spec.md §4.9): encrypted, carried only in the inner
/// message, and MUST NOT appear in the outer message built during protect.
pub const CLASS_E_OPTIONS: &[OptionNumber] = &[
    OptionNumber::IfMatch,
    OptionNumber::ETag,
    OptionNumber::IfNoneMatch,
    OptionNumber::LocationPath,
    OptionNumber::UriPath,
    OptionNumber::ContentFormat,
    OptionNumber::UriQuery,
    OptionNumber::Accept,
    OptionNumber::LocationQuery,
];

/// Class-U options (spec.md §4.9): preserved unencrypted in the outer
/// message as-is.
pub const CLASS_U_OPTIONS: &[OptionNumber] =
    &[OptionNumber::UriHost, OptionNumber::ProxyUri, OptionNumber::ProxyScheme];

/// Class-I options (spec.md §4.9): integrity-protected by the inner copy,
/// but duplicated into the outer message as well.
pub const CLASS_I_OPTIONS: &[OptionNumber] = &[
    OptionNumber::Observe,
    OptionNumber::MaxAge,
    OptionNumber::Block1,
    OptionNumber::Block2,
    OptionNumber::Size1,
    OptionNumber::Size2,
];

/// The CoAP request/response code this crate cares about setting (spec.md
/// §4.7 step 7). Anything beyond POST/Changed is the caller's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OuterCode {
    /// `0.02 POST`, used for every protected request.
    Post,
    /// `2.04 Changed`, used for every protected response.
    Changed,
}

/// Borrowed field-level access to one CoAP message (spec.md §6: "option
/// accessors"). No parsing or serialization lives on this trait — just
/// the surface `pipeline.rs` needs to read and rewrite a message in
/// place.
pub trait CoapMessage {
    fn code(&self) -> u8;
    fn set_code(&mut self, code: OuterCode);

    fn token(&self) -> &[u8];

    fn payload(&self) -> &[u8];
    fn set_payload(&mut self, payload: &[u8]) -> Result<()>;

    /// The raw OSCORE option value, if present on this message.
    fn oscore_option(&self) -> Option<&[u8]>;
    fn set_oscore_option(&mut self, value: &[u8]) -> Result<()>;

    fn is_option_set(&self, option: OptionNumber) -> bool;
    fn clear_option(&mut self, option: OptionNumber);

    /// Raw value of `option`, if set.
    fn option_value(&self, option: OptionNumber) -> Option<&[u8]>;
    /// Sets `option`'s raw value, replacing any prior value.
    fn set_option_value(&mut self, option: OptionNumber, value: &[u8]) -> Result<()>;
}

/// Whether a message is the outer (`Coap`) or inner (`Confidential`) half
/// of a pipeline step — needed to pick which set of options
/// `serialize`/`parse` should honor.
pub trait CoapSerializer {
    fn serialize(&self, message: &dyn CoapMessage, out: &mut [u8], role: Role) -> Result<usize>;
}

pub trait CoapParser {
    fn parse(&self, bytes: &[u8], message: &mut dyn CoapMessage, role: Role) -> Result<()>;
}

/// Context provisioning/lookup (spec.md §6): `find_by_recipient_id`. The
/// store owns its contexts; the pipeline only ever borrows one for the
/// duration of processing a single message.
pub trait ContextStore {
    fn find_by_recipient_id(&self, recipient_id: &[u8]) -> Option<&SecurityContext>;
    fn find_by_recipient_id_mut(&mut self, recipient_id: &[u8]) -> Option<&mut SecurityContext>;

    /// Resolves a context by the opaque handle an exchange entry carries
    /// (spec.md §4.6/§9), rather than by its recipient id — used on the
    /// response path, where the exchange table is the only thing that
    /// still remembers which context a given token belongs to.
    fn find_by_handle(&self, handle: ContextHandle) -> Option<&SecurityContext>;
}

/// Returns whether a decoded outer CoAP message carries the OSCORE option
/// at all (original C: `oscore_is_request_protected` / the option-present
/// check in `coap_receive`). A thin routing predicate, not new protocol
/// logic — lets a caller decide whether to route a message through
/// `unprotect` in the first place.
pub fn is_oscore_message(message: &dyn CoapMessage) -> bool {
    message.oscore_option().is_some()
}

/// Applies the option-clearing policy (spec.md §4.9) while building the
/// outer message from the inner one during protect: clears every class-E
/// option on `outer` (they must never appear there) and duplicates every
/// class-I option from `inner` into `outer`. Class-U options are assumed
/// already present on `outer` (they were never moved to the inner message
/// in the first place) and are left untouched.
pub fn apply_option_policy(inner: &dyn CoapMessage, outer: &mut dyn CoapMessage) {
    for &option in CLASS_E_OPTIONS {
        outer.clear_option(option);
    }
    for &option in CLASS_I_OPTIONS {
        if let Some(value) = inner.option_value(option) {
            let _ = outer.set_option_value(option, value);
        }
    }
}
