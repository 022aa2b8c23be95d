//! Content fingerprints
//!
//! A fingerprint is the lowercase hex SHA-256 of a content blob. It keys the
//! result cache, the import map cache and the content-addressed cells of a
//! session store.

use sha2::{Digest, Sha256};

/// Length of a fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 64;

/// Compute the fingerprint of `content`
pub fn fingerprint(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Whether `s` is usable as a fingerprint in a URL and as a directory name.
///
/// Clients may supply their own fingerprint (the editor usually has one
/// already), so only the character set is checked, not the length.
pub fn is_valid_fingerprint(s: &str) -> bool {
    !s.is_empty() && s.len() <= 128 && s.bytes().all(|b| b.is_ascii_alphanumeric())
}
