//! Webhook signature verification using HMAC-SHA256.
//!
//! Linear signs webhook payloads using HMAC-SHA256 with a shared secret.
//! The signature is provided in the `X-Signature` header as bare hex (no
//! algorithm prefix).
//!
//! Signature verification is the first step in webhook processing; invalid
//! signatures are rejected before parsing. When no secret is configured,
//! verification is skipped entirely and every request passes — that is
//! "verification disabled", not a security guarantee, and is intended only
//! for local development.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the HMAC-SHA256 signature of a payload using the given secret.
///
/// This is useful for testing purposes (generating expected signatures).
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a signature as a header value (bare hex, no prefix).
pub fn format_signature_header(signature: &[u8]) -> String {
    hex::encode(signature)
}

/// Verifies a webhook signature against the payload and secret.
///
/// The header value is bare hex. Returns `true` if the signature is valid,
/// `false` otherwise. Uses constant-time comparison (via the HMAC library's
/// `verify_slice`) to prevent timing attacks.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let expected_signature = match hex::decode(signature_header) {
        Ok(sig) => sig,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);

    // Constant-time comparison via the HMAC library
    mac.verify_slice(&expected_signature).is_ok()
}

/// Verifies an inbound request, honoring the "no secret configured" mode.
///
/// - `secret` is `None`: verification is disabled; always succeeds.
/// - `secret` is `Some` but the header is absent or empty: fails.
/// - Otherwise: constant-time HMAC-SHA256 comparison as in
///   [`verify_signature`].
///
/// The boolean is the only signal; the caller maps `false` to 401.
pub fn verify_request(secret: Option<&[u8]>, signature_header: Option<&str>, payload: &[u8]) -> bool {
    let Some(secret) = secret else {
        return true;
    };

    match signature_header {
        None | Some("") => false,
        Some(header) => verify_signature(payload, header, secret),
    }
}
