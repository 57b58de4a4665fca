//! HMAC-SHA256 webhook signature verification.
//!
//! Uses [`hmac::Mac::verify_slice`] rather than a manual byte comparison:
//! it rejects a length mismatch outright and compares equal-length buffers
//! in constant time, which is exactly what a strict signature check needs.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// Recognized signature headers, in lookup order. Callers are expected to
/// have lowercased header names already.
const SIGNATURE_HEADERS: &[&str] = &["x-hub-signature", "x-atlassian-webhook-signature"];

/// Find a signature header in a lowercased header map.
#[must_use]
pub fn find_header(headers: &HashMap<String, String>) -> Option<&str> {
    SIGNATURE_HEADERS.iter().find_map(|name| headers.get(*name)).map(String::as_str)
}

/// Verify `raw_body` against `header_value` under `secret`.
///
/// `header_value` may carry a `sha256=` prefix or be bare hex; both forms
/// are accepted. Returns `false` for a malformed (non-hex) value rather
/// than erroring, since an unparseable signature is just a failed check.
#[must_use]
pub fn verify(secret: &[u8], raw_body: &[u8], header_value: &str) -> bool {
    let hex_sig = header_value.strip_prefix("sha256=").unwrap_or(header_value);
    let Ok(expected) = hex::decode(hex_sig.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}
