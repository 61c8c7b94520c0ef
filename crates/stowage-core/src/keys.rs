//! Cache key helpers: content digests and filesystem-safe identifiers.

use sha2::{Digest, Sha256};

/// Sentinel substituted for characters that are not filesystem-safe.
pub const ID_SENTINEL: char = '#';

/// Lowercase SHA-256 hex digest of a string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Make an identifier filesystem-safe.
///
/// Whitelist approach: alphanumerics and hyphens pass through, everything
/// else becomes [`ID_SENTINEL`]. `"CVE-2022-40304"` survives unchanged.
pub fn sanitize_id(identifier: &str) -> String {
    identifier
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' {
                c
            } else {
                ID_SENTINEL
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_hex_is_deterministic() {
        assert_eq!(sha256_hex("hello"), sha256_hex("hello"));
        assert_ne!(sha256_hex("hello"), sha256_hex("hello "));
    }

    #[test]
    fn sanitize_keeps_identifiers_intact() {
        assert_eq!(sanitize_id("CVE-2022-40304"), "CVE-2022-40304");
    }

    #[test]
    fn sanitize_replaces_unsafe_chars() {
        assert_eq!(sanitize_id("a/b c.d"), "a#b#c#d");
        assert_eq!(sanitize_id("../../etc"), "######etc");
    }
}
