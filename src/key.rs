//! Client key sanitization and length capping.
//!
//! Rate-limit keys are derived from attacker-controlled input (header
//! values, forwarded addresses, API keys), so every key is normalized
//! before it touches a registry: non-printable and non-ASCII code points
//! are replaced with `_` and the result is truncated to a configured
//! maximum. This neutralizes log injection via control characters and
//! memory exhaustion via oversized header values.

/// Default maximum length of a sanitized rate-limit key.
pub const DEFAULT_MAX_KEY_LENGTH: usize = 256;

/// Placeholder key used when key extraction produces an empty string.
///
/// All callers without a usable identity share this single bucket, so
/// anonymous traffic is collectively limited to one key's capacity
/// rather than each request minting a fresh entry.
pub const UNKNOWN_CLIENT_KEY: &str = "unknown";

/// Normalizes a raw key: every code point outside printable ASCII
/// (`0x20..=0x7E`) becomes `_`, and the result is truncated to
/// `max_len` characters.
///
/// A `max_len` of zero is corrected to [`DEFAULT_MAX_KEY_LENGTH`]
/// rather than producing unusable empty keys. The function is
/// idempotent: sanitizing an already-sanitized key returns it
/// unchanged.
pub fn sanitize(raw: &str, max_len: usize) -> String {
    let max_len = if max_len == 0 {
        DEFAULT_MAX_KEY_LENGTH
    } else {
        max_len
    };

    raw.chars()
        .take(max_len)
        .map(|c| if matches!(c, ' '..='~') { c } else { '_' })
        .collect()
}
