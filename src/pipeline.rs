//! Protect/unprotect orchestration (spec.md §4.7, §4.10): the component
//! that ties the option codec, AAD builder, nonce builder, sliding window,
//! and exchange table together into the two message-processing entry
//! points a CoAP engine actually calls.

use crate::coap::{
    apply_option_policy, CoapMessage, CoapParser, CoapSerializer, ContextStore, OuterCode, Role,
};
use crate::context::{ContextHandle, SecurityContext, MAX_PLAINTEXT_LEN, TAG_LEN};
use crate::cose::{AeadPrimitive, CoseEncrypt0};
use crate::error::{OscoreError, Result};
use crate::exchange::{ExchangeTable, Token};
use crate::intcodec::{min_be_to_u64, u64_to_min_be};
use crate::option::{decode_option, encode_option, OptionFields};
use crate::window::Verdict;

pub use crate::coap::is_oscore_message;
pub use crate::context::MAX_CONTENT_LEN;

/// Scratch working buffer for a message's inner plaintext / ciphertext
/// (spec.md §5: `COAP_MAX_CHUNK_SIZE + 8`).
type ScratchBuffer = [u8; MAX_CONTENT_LEN];

fn new_scratch() -> ScratchBuffer {
    [0u8; MAX_CONTENT_LEN]
}

/// Protects an outgoing request (spec.md §4.7, request branch of §4.8).
///
/// `ctx_handle` is the caller's own handle for `ctx` within its
/// `ContextStore`, stamped onto the exchange entry so `unprotect_response`
/// can later recover `ctx` from the entry alone (spec.md §4.6/§4.10 step 3).
///
/// On success, `ctx.sender.seq` has been incremented and an exchange entry
/// for `outer.token()` has been inserted into `exchanges`. On any failure
/// no context or exchange-table state is changed.
pub fn protect_request<S, A, const N: usize>(
    inner: &dyn CoapMessage,
    outer: &mut dyn CoapMessage,
    ctx: &mut SecurityContext,
    ctx_handle: ContextHandle,
    serializer: &S,
    aead: &A,
    exchanges: &mut ExchangeTable<ContextHandle, N>,
) -> Result<usize>
where
    S: CoapSerializer,
    A: AeadPrimitive,
{
    if ctx.sender.is_exhausted() {
        return Err(OscoreError::SeqExhausted);
    }

    let mut scratch = new_scratch();
    let plaintext_len = serializer.serialize(inner, &mut scratch, Role::Confidential)?;
    if plaintext_len > MAX_PLAINTEXT_LEN {
        return Err(OscoreError::PlaintextTooLarge);
    }

    let token = Token::new(outer.token())?;
    let seq = ctx.sender.seq();
    let partial_iv = u64_to_min_be(seq);
    let key_id = ctx.sender.sender_id.as_slice();

    let mut cose = CoseEncrypt0::new(ctx.algorithm_id);
    cose.set_key(ctx.sender.sender_key());
    cose.set_key_id(key_id)?;
    cose.set_partial_iv(partial_iv.as_slice())?;
    let nonce = cose.derive_nonce(&ctx.common_iv)?;
    cose.set_nonce(nonce);
    let aad = cose.build_aad()?;
    cose.set_aad(aad.as_slice());
    cose.set_content(&mut scratch, plaintext_len);

    exchanges.insert(token, seq, ctx_handle)?;

    let ciphertext_len = match cose.encrypt(aead) {
        Ok(len) => len,
        Err(e) => {
            exchanges.remove(&token);
            return Err(e);
        }
    };

    ctx.sender.increment_seq();

    let mut option_buf = [0u8; 15];
    let fields = OptionFields {
        partial_iv: Some(partial_iv.as_slice()),
        kid_context: None,
        key_id: Some(key_id),
    };
    let option_len = encode_option(&fields, true, &mut option_buf)?;

    apply_option_policy(inner, outer);
    outer.set_code(OuterCode::Post);
    outer.set_payload(&scratch[..ciphertext_len])?;
    outer.set_oscore_option(&option_buf[..option_len])?;

    let mut out = [0u8; MAX_CONTENT_LEN];
    serializer.serialize(outer, &mut out, Role::Coap)
}

/// Protects an outgoing response (spec.md §4.7, response branch of §4.8).
/// The response never inserts or touches the exchange table; the client
/// side owns that via the original request's entry.
pub fn protect_response<S, A>(
    inner: &dyn CoapMessage,
    outer: &mut dyn CoapMessage,
    ctx: &SecurityContext,
    serializer: &S,
    aead: &A,
) -> Result<usize>
where
    S: CoapSerializer,
    A: AeadPrimitive,
{
    let mut scratch = new_scratch();
    let plaintext_len = serializer.serialize(inner, &mut scratch, Role::Confidential)?;
    if plaintext_len > MAX_PLAINTEXT_LEN {
        return Err(OscoreError::PlaintextTooLarge);
    }

    let recent_seq = ctx
        .recipient
        .sliding_window
        .recent_seq()
        .ok_or(OscoreError::ContextInvalid)?;
    let partial_iv = u64_to_min_be(recent_seq);
    let key_id = ctx.recipient.recipient_id.as_slice();

    let mut cose = CoseEncrypt0::new(ctx.algorithm_id);
    cose.set_key(ctx.sender.sender_key());
    cose.set_key_id(key_id)?;
    cose.set_partial_iv(partial_iv.as_slice())?;
    let nonce = cose.derive_nonce(&ctx.common_iv)?;
    cose.set_nonce(nonce);
    let aad = cose.build_aad()?;
    cose.set_aad(aad.as_slice());
    cose.set_content(&mut scratch, plaintext_len);
    let ciphertext_len = cose.encrypt(aead)?;

    // Responses omit the partial IV on the wire (spec.md §4.7 step 6); the
    // peer recovers it from the exchange table instead.
    let fields = OptionFields {
        partial_iv: None,
        kid_context: None,
        key_id: None,
    };
    let mut option_buf = [0u8; 15];
    let option_len = encode_option(&fields, false, &mut option_buf)?;

    apply_option_policy(inner, outer);
    outer.set_code(OuterCode::Changed);
    outer.set_payload(&scratch[..ciphertext_len])?;
    outer.set_oscore_option(&option_buf[..option_len])?;

    let mut out = [0u8; MAX_CONTENT_LEN];
    serializer.serialize(outer, &mut out, Role::Coap)
}

/// Unprotects an incoming request (spec.md §4.10, request branches of
/// §4.8). Resolves the context by the key id carried on the option, as
/// spec.md §4.10 step 2 requires. On AEAD failure the sliding window is
/// rolled back before the error is returned, so a forged packet never
/// advances it.
pub fn unprotect_request<P, A>(
    outer: &dyn CoapMessage,
    inner: &mut dyn CoapMessage,
    store: &mut dyn ContextStore,
    parser: &P,
    aead: &A,
) -> Result<()>
where
    P: CoapParser,
    A: AeadPrimitive,
{
    let option_value = outer.oscore_option().ok_or(OscoreError::BadOption)?;
    let fields = decode_option(option_value)?;

    let key_id = fields.key_id.ok_or(OscoreError::MissingContext)?;
    let partial_iv = fields.partial_iv.ok_or(OscoreError::BadOption)?;
    let ctx = store
        .find_by_recipient_id_mut(key_id)
        .ok_or(OscoreError::MissingContext)?;

    let seq = min_be_to_u64(partial_iv)?;
    if ctx.recipient.sliding_window.validate(seq) == Verdict::Reject {
        return Err(OscoreError::Replay);
    }

    let mut cose = CoseEncrypt0::new(ctx.algorithm_id);
    cose.set_key(ctx.recipient.recipient_key());
    cose.set_key_id(key_id)?;
    cose.set_partial_iv(partial_iv)?;
    if let Some(kid_context) = fields.kid_context {
        cose.set_kid_context(kid_context)?;
    }

    let nonce = match cose.derive_nonce(&ctx.common_iv) {
        Ok(n) => n,
        Err(e) => {
            ctx.recipient.sliding_window.rollback();
            return Err(e);
        }
    };
    cose.set_nonce(nonce);

    let aad = match cose.build_aad() {
        Ok(a) => a,
        Err(e) => {
            ctx.recipient.sliding_window.rollback();
            return Err(e);
        }
    };
    cose.set_aad(aad.as_slice());

    let mut scratch = new_scratch();
    let ciphertext = outer.payload();
    if ciphertext.len() > scratch.len() {
        ctx.recipient.sliding_window.rollback();
        return Err(OscoreError::BufferTooSmall);
    }
    scratch[..ciphertext.len()].copy_from_slice(ciphertext);
    cose.set_content(&mut scratch, ciphertext.len());
    let plaintext_len = match cose.decrypt(aead) {
        Ok(len) => len,
        Err(_) => {
            ctx.recipient.sliding_window.rollback();
            return Err(OscoreError::DecryptionFailure);
        }
    };

    parser.parse(&scratch[..plaintext_len], inner, Role::Confidential)
}

/// Unprotects an incoming response (spec.md §4.10, response branches of
/// §4.8). Removes the exchange entry for `outer.token()` on success or on
/// a decode/decrypt failure alike — a response either completes or
/// forfeits the exchange, per spec.md §3's "removed on matching response
/// receipt" lifecycle.
///
/// The context is recovered from the exchange entry's handle via `store`
/// (spec.md §4.10 step 3: "recover the originating seq and context"),
/// rather than supplied separately by the caller — the exchange table is
/// the only thing that still associates this token with a peer.
pub fn unprotect_response<P, A, const N: usize>(
    outer: &dyn CoapMessage,
    inner: &mut dyn CoapMessage,
    store: &dyn ContextStore,
    parser: &P,
    aead: &A,
    exchanges: &mut ExchangeTable<ContextHandle, N>,
) -> Result<()>
where
    P: CoapParser,
    A: AeadPrimitive,
{
    let token = Token::new(outer.token())?;
    let entry = exchanges.remove(&token).ok_or(OscoreError::ExchangeMissing)?;
    let ctx = store
        .find_by_handle(entry.ctx_id)
        .ok_or(OscoreError::MissingContext)?;

    let option_value = outer.oscore_option().ok_or(OscoreError::BadOption)?;
    let fields = decode_option(option_value)?;

    // The response's own partial IV if present, else synthesized from the
    // stored exchange sequence (spec.md §4.10 step 3, scenario 5 of §8).
    let mut synthesized = [0u8; 8];
    let partial_iv: &[u8] = match fields.partial_iv {
        Some(iv) => iv,
        None => {
            let synth = u64_to_min_be(entry.seq);
            let len = synth.len();
            synthesized[..len].copy_from_slice(synth.as_slice());
            &synthesized[..len]
        }
    };

    let key_id = ctx.sender.sender_id.as_slice();

    let mut cose = CoseEncrypt0::new(ctx.algorithm_id);
    cose.set_key(ctx.recipient.recipient_key());
    cose.set_key_id(key_id)?;
    cose.set_partial_iv(partial_iv)?;
    if let Some(kid_context) = fields.kid_context {
        cose.set_kid_context(kid_context)?;
    }
    let nonce = cose.derive_nonce(&ctx.common_iv)?;
    cose.set_nonce(nonce);
    let aad = cose.build_aad()?;
    cose.set_aad(aad.as_slice());

    let mut scratch = new_scratch();
    let ciphertext = outer.payload();
    if ciphertext.len() > scratch.len() {
        return Err(OscoreError::BufferTooSmall);
    }
    scratch[..ciphertext.len()].copy_from_slice(ciphertext);
    cose.set_content(&mut scratch, ciphertext.len());
    let plaintext_len = cose.decrypt(aead).map_err(|_| OscoreError::DecryptionFailure)?;

    parser.parse(&scratch[..plaintext_len], inner, Role::Confidential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coap::test_support::MockMessage;
    use crate::coap::OptionNumber;
    use crate::context::{RecipientContext, SenderContext, KEY_LEN};
    use crate::cose::AesCcm16_64_128;

    /// The handle these tests stamp onto every exchange entry — there's
    /// only ever one peer context in play, so a fixed handle is enough.
    const HANDLE: ContextHandle = ContextHandle(1);

    /// A one-context `ContextStore` for tests: looks itself up regardless
    /// of the requested id or handle, since these tests only ever
    /// provision a single peer pair.
    struct SingleContextStore(SecurityContext);

    impl ContextStore for SingleContextStore {
        fn find_by_recipient_id(&self, _recipient_id: &[u8]) -> Option<&SecurityContext> {
            Some(&self.0)
        }

        fn find_by_recipient_id_mut(&mut self, _recipient_id: &[u8]) -> Option<&mut SecurityContext> {
            Some(&mut self.0)
        }

        fn find_by_handle(&self, _handle: ContextHandle) -> Option<&SecurityContext> {
            Some(&self.0)
        }
    }

    struct PassthroughCodec;

    impl CoapSerializer for PassthroughCodec {
        fn serialize(&self, message: &dyn CoapMessage, out: &mut [u8], role: Role) -> Result<usize> {
            let payload = message.payload();
            match role {
                Role::Confidential => {
                    out[..payload.len()].copy_from_slice(payload);
                    Ok(payload.len())
                }
                Role::Coap => {
                    out[..payload.len()].copy_from_slice(payload);
                    Ok(payload.len())
                }
            }
        }
    }

    impl CoapParser for PassthroughCodec {
        fn parse(&self, bytes: &[u8], message: &mut dyn CoapMessage, _role: Role) -> Result<()> {
            message.set_payload(bytes)
        }
    }

    fn paired_contexts() -> (SecurityContext, SecurityContext) {
        let common_iv = [0x2Bu8; 13];
        let sender_key = [0xAAu8; KEY_LEN];
        let recipient_key = [0xBBu8; KEY_LEN];

        let client_ctx = SecurityContext::new(
            common_iv,
            SenderContext::new(&[0x00], sender_key).unwrap(),
            RecipientContext::new(&[0x01], recipient_key).unwrap(),
        );
        let server_ctx = SecurityContext::new(
            common_iv,
            SenderContext::new(&[0x01], recipient_key).unwrap(),
            RecipientContext::new(&[0x00], sender_key).unwrap(),
        );
        (client_ctx, server_ctx)
    }

    #[test]
    fn protect_then_unprotect_request_roundtrip() {
        let (mut client_ctx, server_ctx) = paired_contexts();
        let mut server_store = SingleContextStore(server_ctx);
        let codec = PassthroughCodec;
        let aead = AesCcm16_64_128;
        let mut exchanges: ExchangeTable<ContextHandle> = ExchangeTable::new();

        let mut inner = MockMessage::new(0x01, &[0xA1]); // GET
        inner.set_payload(b"").unwrap();
        let mut outer = MockMessage::new(0x01, &[0xA1]);

        protect_request(&inner, &mut outer, &mut client_ctx, HANDLE, &codec, &aead, &mut exchanges).unwrap();
        assert_eq!(client_ctx.sender.seq(), 1);
        assert_eq!(exchanges.len(), 1);

        let mut unprotected_inner = MockMessage::new(0, &[]);
        unprotect_request(&outer, &mut unprotected_inner, &mut server_store, &codec, &aead).unwrap();
        assert_eq!(unprotected_inner.payload(), b"");
        assert_eq!(server_store.0.recipient.sliding_window.recent_seq(), Some(0));
    }

    #[test]
    fn replayed_request_is_rejected() {
        let (mut client_ctx, server_ctx) = paired_contexts();
        let mut server_store = SingleContextStore(server_ctx);
        let codec = PassthroughCodec;
        let aead = AesCcm16_64_128;
        let mut exchanges: ExchangeTable<ContextHandle> = ExchangeTable::new();

        let mut inner = MockMessage::new(0x01, &[0xA1]);
        inner.set_payload(b"").unwrap();
        let mut outer = MockMessage::new(0x01, &[0xA1]);
        protect_request(&inner, &mut outer, &mut client_ctx, HANDLE, &codec, &aead, &mut exchanges).unwrap();

        let mut first = MockMessage::new(0, &[]);
        unprotect_request(&outer, &mut first, &mut server_store, &codec, &aead).unwrap();

        let mut second = MockMessage::new(0, &[]);
        let err = unprotect_request(&outer, &mut second, &mut server_store, &codec, &aead).unwrap_err();
        assert_eq!(err, OscoreError::Replay);
    }

    #[test]
    fn out_of_order_within_window_then_replay_rejected() {
        // spec.md §8 scenario 4: accept seq 5, then accept seq 3 delivered
        // late, then reject a second delivery of seq 3.
        let (mut client_ctx, server_ctx) = paired_contexts();
        let mut server_store = SingleContextStore(server_ctx);
        let codec = PassthroughCodec;
        let aead = AesCcm16_64_128;

        let mut send = |client_ctx: &mut SecurityContext, exchanges: &mut ExchangeTable<ContextHandle>| {
            let mut inner = MockMessage::new(0x01, &[0xA1]);
            inner.set_payload(b"").unwrap();
            let mut outer = MockMessage::new(0x01, &[0xA1]);
            protect_request(&inner, &mut outer, client_ctx, HANDLE, &codec, &aead, exchanges).unwrap();
            outer
        };

        let mut exchanges: ExchangeTable<ContextHandle> = ExchangeTable::new();
        // Advance the client's sender seq to 5, 4 (so the out-of-order
        // delivery below is "seq 3" relative to the server's window after
        // seq 5 has already been accepted).
        let mut outers = Vec::new();
        for _ in 0..6 {
            outers.push(send(&mut client_ctx, &mut exchanges));
        }

        let mut discard = MockMessage::new(0, &[]);
        unprotect_request(&outers[5], &mut discard, &mut server_store, &codec, &aead).unwrap();
        assert_eq!(server_store.0.recipient.sliding_window.recent_seq(), Some(5));

        let mut discard2 = MockMessage::new(0, &[]);
        unprotect_request(&outers[3], &mut discard2, &mut server_store, &codec, &aead).unwrap();

        let mut discard3 = MockMessage::new(0, &[]);
        let err = unprotect_request(&outers[3], &mut discard3, &mut server_store, &codec, &aead).unwrap_err();
        assert_eq!(err, OscoreError::Replay);
    }

    #[test]
    fn tampered_ciphertext_rolls_back_window() {
        let (mut client_ctx, server_ctx) = paired_contexts();
        let mut server_store = SingleContextStore(server_ctx);
        let codec = PassthroughCodec;
        let aead = AesCcm16_64_128;
        let mut exchanges: ExchangeTable<ContextHandle> = ExchangeTable::new();

        let mut inner = MockMessage::new(0x01, &[0xA1]);
        inner.set_payload(b"hello").unwrap();
        let mut outer = MockMessage::new(0x01, &[0xA1]);
        protect_request(&inner, &mut outer, &mut client_ctx, HANDLE, &codec, &aead, &mut exchanges).unwrap();

        let mut tampered_payload = outer.payload().to_vec();
        tampered_payload[0] ^= 0x01;
        outer.set_payload(&tampered_payload).unwrap();

        let mut out_inner = MockMessage::new(0, &[]);
        let err = unprotect_request(&outer, &mut out_inner, &mut server_store, &codec, &aead).unwrap_err();
        assert_eq!(err, OscoreError::DecryptionFailure);
        assert_eq!(server_store.0.recipient.sliding_window.recent_seq(), None);
    }

    #[test]
    fn response_without_partial_iv_uses_exchange_seq() {
        let (mut client_ctx, server_ctx) = paired_contexts();
        let mut server_store = SingleContextStore(server_ctx);
        let codec = PassthroughCodec;
        let aead = AesCcm16_64_128;
        let mut client_exchanges: ExchangeTable<ContextHandle> = ExchangeTable::new();

        // Client sends a request, server accepts it and advances its window.
        let mut req_inner = MockMessage::new(0x01, &[0xA1]);
        req_inner.set_payload(b"").unwrap();
        let mut req_outer = MockMessage::new(0x01, &[0xA1]);
        protect_request(
            &req_inner,
            &mut req_outer,
            &mut client_ctx,
            HANDLE,
            &codec,
            &aead,
            &mut client_exchanges,
        )
        .unwrap();
        let mut server_inner = MockMessage::new(0, &[]);
        unprotect_request(&req_outer, &mut server_inner, &mut server_store, &codec, &aead).unwrap();

        // Server protects a response; it omits the partial IV on the wire.
        let mut resp_inner = MockMessage::new(0x44, &[0xA1]);
        resp_inner.set_payload(b"2.05 body").unwrap();
        let mut resp_outer = MockMessage::new(0x44, &[0xA1]);
        protect_response(&resp_inner, &mut resp_outer, &server_store.0, &codec, &aead).unwrap();
        assert!(resp_outer.oscore_option().unwrap().is_empty());

        // Client recovers the response from the exchange table alone — no
        // context is passed in directly, only the store it's registered in.
        let client_store = SingleContextStore(client_ctx);
        let mut client_inner = MockMessage::new(0, &[]);
        unprotect_response(
            &resp_outer,
            &mut client_inner,
            &client_store,
            &codec,
            &aead,
            &mut client_exchanges,
        )
        .unwrap();
        assert_eq!(client_inner.payload(), b"2.05 body");
        assert!(client_exchanges.is_empty());
    }

    #[test]
    fn option_policy_applied_during_protect() {
        let (mut client_ctx, _server_ctx) = paired_contexts();
        let codec = PassthroughCodec;
        let aead = AesCcm16_64_128;
        let mut exchanges: ExchangeTable<ContextHandle> = ExchangeTable::new();

        let mut inner = MockMessage::new(0x01, &[0xA1]);
        inner.set_payload(b"").unwrap();
        inner.set_option_value(OptionNumber::UriPath, b"temp").unwrap();

        let mut outer = MockMessage::new(0x01, &[0xA1]);
        outer.set_option_value(OptionNumber::UriPath, b"temp").unwrap();
        outer.set_option_value(OptionNumber::UriHost, b"host").unwrap();

        protect_request(&inner, &mut outer, &mut client_ctx, HANDLE, &codec, &aead, &mut exchanges).unwrap();

        assert!(!outer.is_option_set(OptionNumber::UriPath));
        assert!(outer.is_option_set(OptionNumber::UriHost));
    }
}
