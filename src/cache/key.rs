// src/cache/key.rs

use serde::{Deserialize, Serialize};

/// Composite cache key.
///
/// Only the input is hashed. Provider and variant stay separate fields
/// compared by equality, so the same text with another voice is a different
/// key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// blake3 hex digest of the exact input bytes.
    pub digest: String,
    pub provider: String,
    pub variant: String,
}

impl CacheKey {
    pub fn new(digest: impl Into<String>, provider: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            provider: provider.into(),
            variant: variant.into(),
        }
    }

    /// Key for synthesizing `text` with `provider` / `variant`.
    pub fn for_text(text: &str, provider: &str, variant: &str) -> Self {
        Self::new(content_digest(text.as_bytes()), provider, variant)
    }
}

/// Hex digest used as the content address.
pub fn content_digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
