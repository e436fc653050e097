//! Deterministic content hashes.
//!
//! [`ContentHash`] identifies a piece of source text by its bytes, so a
//! project can tell whether a fragment changed since the last compile
//! without keeping old text around.
//!
//! ```
//! use shaderweave_core::ContentHash;
//!
//! let a = ContentHash::of("struct A {}");
//! assert_eq!(a, ContentHash::of("struct A {}"));
//! assert_ne!(a, ContentHash::of("struct B {}"));
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Seed for source-text hashes.
const SOURCE_SEED: u64 = 0x2fac10b63a6cc57c;

/// Mixing constant used when folding hashes together.
const COMBINE: u64 = 0x9e3779b97f4a7c15;

/// A 64-bit hash of source content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentHash(pub u64);

impl ContentHash {
    /// Hash a string.
    #[inline]
    pub fn of(text: &str) -> Self {
        ContentHash(xxh64(text.as_bytes(), SOURCE_SEED))
    }

    /// Hash raw bytes.
    #[inline]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        ContentHash(xxh64(bytes, SOURCE_SEED))
    }

    /// Fold another hash into this one. Order matters.
    #[inline]
    pub fn combine(self, other: ContentHash) -> Self {
        let mixed = self.0.rotate_left(5) ^ other.0.wrapping_mul(COMBINE);
        ContentHash(mixed)
    }

    /// Fold a sequence of hashes, starting from zero.
    pub fn combine_all(hashes: impl IntoIterator<Item = ContentHash>) -> Self {
        hashes
            .into_iter()
            .fold(ContentHash(0), |acc, h| acc.combine(h))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:#018x})", self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(ContentHash::of("abc"), ContentHash::of("abc"));
        assert_eq!(ContentHash::of("abc"), ContentHash::of_bytes(b"abc"));
    }

    #[test]
    fn combine_is_order_sensitive() {
        let a = ContentHash::of("a");
        let b = ContentHash::of("b");
        assert_ne!(a.combine(b), b.combine(a));
        assert_eq!(
            ContentHash::combine_all([a, b]),
            ContentHash(0).combine(a).combine(b)
        );
    }
}
