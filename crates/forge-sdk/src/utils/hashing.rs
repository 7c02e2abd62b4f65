//! Hashing Utilities

use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of content and return as hex string
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// First 12 hex chars of the content hash, used in pattern ids
pub fn short_hash(content: &str) -> String {
    let mut hash = content_hash(content);
    hash.truncate(12);
    hash
}
