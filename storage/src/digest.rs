//! Content digests.

use sha2::{Digest as _, Sha256};

/// The algorithm prefix used for all digests computed by the proxy.
pub const SHA256_PREFIX: &str = "sha256:";

/// Compute the `sha256:<hex>` digest of `data`.
pub fn sha256_digest(data: &[u8]) -> String {
    format!("{SHA256_PREFIX}{}", hex::encode(Sha256::digest(data)))
}

/// Whether `value` is a well formed `sha256:` digest with 64 lowercase hex digits.
pub fn is_sha256_digest(value: &str) -> bool {
    value.strip_prefix(SHA256_PREFIX).is_some_and(|hex| {
        hex.len() == 64 && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    })
}
