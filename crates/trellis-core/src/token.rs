//! Random URL-safe tokens for invitation codes and session IDs.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;

static HYPHENATED_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("token pattern is valid"));

/// A random string of exactly `len` characters from `[A-Za-z0-9_-]`.
pub fn random_url_safe(len: usize) -> String {
    // 3 bytes encode to 4 characters
    let mut bytes = vec![0u8; len.div_ceil(4) * 3];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut encoded = URL_SAFE_NO_PAD.encode(&bytes);
    encoded.truncate(len);
    encoded
}

/// True if `value` is non-empty and only uses letters, digits, `-` and `_`.
pub fn is_hyphenated_alphanumeric(value: &str) -> bool {
    HYPHENATED_ALPHANUMERIC.is_match(value)
}
