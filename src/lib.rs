//! An implementation of Object Security for Constrained RESTful
//! Environments ([RFC 8613](https://www.rfc-editor.org/rfc/rfc8613)) in
//! pure Rust.
//!
//! This crate covers the four hard parts of an OSCORE processor: the COSE
//! `Encrypt0` state object, the packed OSCORE option codec, the AAD/nonce
//! construction, and the sliding-window/exchange-table replay discipline —
//! tied together by [`pipeline::protect_request`]/[`pipeline::protect_response`]
//! and [`pipeline::unprotect_request`]/[`pipeline::unprotect_response`].
//!
//! It does not parse or serialize CoAP messages, perform the AEAD itself
//! (beyond a default [`cose::AesCcm16_64_128`] implementation), or store
//! security contexts — those are external collaborators, modeled as the
//! traits in [`coap`] and [`cose::AeadPrimitive`], so this crate can sit in
//! front of whatever CoAP stack a host already uses.
//!
//! Group OSCORE, HKDF-based key derivation from a master secret, context
//! rotation, and full Observe/Block-wise proxy replay semantics are out of
//! scope; see the module docs for what each piece does cover.
#![cfg_attr(not(feature = "std"), no_std)]

pub mod aad;
pub mod coap;
pub mod context;
pub mod cose;
pub mod error;
pub mod exchange;
pub mod intcodec;
pub mod nonce;
pub mod option;
pub mod pipeline;
pub mod window;

pub use error::{CoapStatus, OscoreError, Result};
