//! Bearer credential transport.
//!
//! Browsers cannot attach an `Authorization` header to a WebSocket upgrade,
//! so the credential may instead ride in `Sec-WebSocket-Protocol` as
//! `bearer-b64, <base64url(token)>` (or `bearer, <token>` for header-safe
//! tokens). The server echoes the protocol name back on the 101 response.

use base64::{
    Engine as _,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, general_purpose},
};

/// Subprotocol name for a base64url-encoded token
pub const BEARER_B64_PROTOCOL: &str = "bearer-b64";
/// Subprotocol name for a raw token
pub const BEARER_PROTOCOL: &str = "bearer";

/// URL-safe engine that encodes without padding and decodes either form.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    general_purpose::NO_PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A credential recovered from the subprotocol list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolCredential {
    pub token: String,
    /// Protocol name to echo on the upgrade response
    pub protocol: &'static str,
}

/// Encode a token as unpadded base64url.
pub fn encode_token(token: &str) -> String {
    URL_SAFE_LENIENT.encode(token.as_bytes())
}

/// Decode a base64url token; padding is optional.
pub fn decode_token(encoded: &str) -> Option<String> {
    let bytes = URL_SAFE_LENIENT.decode(encoded.trim()).ok()?;
    String::from_utf8(bytes).ok()
}

/// Value for the `Sec-WebSocket-Protocol` request header carrying `token`.
pub fn subprotocol_header(token: &str) -> String {
    format!("{}, {}", BEARER_B64_PROTOCOL, encode_token(token))
}

/// Extract a token from an `Authorization` header value.
///
/// The `Bearer ` prefix is optional; blank values yield `None`.
pub fn parse_bearer_header(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let token = match trimmed.strip_prefix("Bearer") {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
        _ => trimmed,
    };
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Extract a token from a `Sec-WebSocket-Protocol` header value.
pub fn parse_protocol_header(value: &str) -> Option<ProtocolCredential> {
    let parts: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    let [name, payload, ..] = parts.as_slice() else {
        return None;
    };

    if name.eq_ignore_ascii_case(BEARER_PROTOCOL) {
        return Some(ProtocolCredential {
            token: (*payload).to_string(),
            protocol: BEARER_PROTOCOL,
        });
    }
    if name.eq_ignore_ascii_case(BEARER_B64_PROTOCOL) {
        let token = decode_token(payload).filter(|token| !token.is_empty())?;
        return Some(ProtocolCredential {
            token,
            protocol: BEARER_B64_PROTOCOL,
        });
    }
    None
}
