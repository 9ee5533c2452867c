//! Content hashing for pattern deduplication.

use sha2::{Digest, Sha256};

/// Length of a content hash in hex characters.
pub const HASH_LEN: usize = 64;

/// Lowercase hex SHA-256 of normalized chart bytes.
pub fn content_hash(canonical: &[u8]) -> String {
    hex::encode(Sha256::digest(canonical))
}
