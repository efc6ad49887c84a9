//! Canonical content-hash handling.
//!
//! Every hash stored in the catalog or compared during validation uses the
//! canonical form `sha256:` + 64 lowercase hex characters. Inputs may arrive
//! as bare hex or with the prefix in either case; both normalize to the
//! canonical form before storage or comparison.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const PREFIX: &str = "sha256:";
const HEX_LEN: usize = 64;

/// A canonical `sha256:<64 lowercase hex>` content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Compute the hash of a byte slice.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(format!("{PREFIX}{}", hex::encode(digest)))
    }

    /// Parse and normalize a declared hash (bare hex or `sha256:`-prefixed,
    /// any hex case).
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let hex_part = trimmed
            .strip_prefix(PREFIX)
            .or_else(|| trimmed.strip_prefix("SHA256:"))
            .unwrap_or(trimmed);

        if hex_part.len() != HEX_LEN || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidHash(format!(
                "expected 64 hex characters, got {:?}",
                &trimmed[..trimmed.len().min(80)]
            )));
        }

        Ok(Self(format!("{PREFIX}{}", hex_part.to_ascii_lowercase())))
    }

    /// The canonical string, including the `sha256:` prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 64-char lowercase hex digest without the prefix.
    ///
    /// Used as the blob filename.
    pub fn hex(&self) -> &str {
        &self.0[PREFIX.len()..]
    }

    /// Stable digest of a `path -> hash` map: hash the `path\thash\n` lines
    /// in ascending path order. Used for style-bundle row hashes and the
    /// promotion result digest.
    pub fn of_sorted_map<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a ContentHash)>,
    {
        let mut sorted: Vec<(&str, &ContentHash)> = entries.into_iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut hasher = Sha256::new();
        for (path, hash) in sorted {
            hasher.update(path.as_bytes());
            hasher.update(b"\t");
            hasher.update(hash.as_str().as_bytes());
            hasher.update(b"\n");
        }
        Self(format!("{PREFIX}{}", hex::encode(hasher.finalize())))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn of_bytes_is_canonical() {
        let h = ContentHash::of_bytes(b"hello");
        assert!(h.as_str().starts_with("sha256:"));
        assert_eq!(h.hex().len(), 64);
        assert_eq!(
            h.as_str(),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn parse_accepts_bare_hex() {
        let bare = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        let h = ContentHash::parse(bare).unwrap();
        assert_eq!(h, ContentHash::of_bytes(b"hello"));
    }

    #[test]
    fn parse_normalizes_case() {
        let upper = "sha256:2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824";
        let h = ContentHash::parse(upper).unwrap();
        assert_eq!(h, ContentHash::of_bytes(b"hello"));
    }

    #[test]
    fn parse_rejects_short_input() {
        assert!(ContentHash::parse("abc123").is_err());
        assert!(ContentHash::parse("sha256:xyz").is_err());
    }

    #[test]
    fn sorted_map_digest_is_order_independent() {
        let a = ContentHash::of_bytes(b"a");
        let b = ContentHash::of_bytes(b"b");
        let d1 = ContentHash::of_sorted_map([("x", &a), ("y", &b)]);
        let d2 = ContentHash::of_sorted_map([("y", &b), ("x", &a)]);
        assert_eq!(d1, d2);

        let d3 = ContentHash::of_sorted_map([("x", &b), ("y", &a)]);
        assert_ne!(d1, d3);
    }
}
