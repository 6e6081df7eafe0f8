//! Content change detection over raw page bytes

use sha2::{Digest, Sha256};

/// SHA-256 page digests
#[derive(Debug, Default, Clone, Copy)]
pub struct DeltaChecker;

impl DeltaChecker {
    /// Hex digest of `content`
    pub fn hash(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hex::encode(hasher.finalize())
    }

    /// True if there is no previous digest or `content` hashes differently
    pub fn changed(content: &[u8], previous: Option<&str>) -> bool {
        match previous {
            Some(digest) => Self::hash(content) != digest,
            None => true,
        }
    }
}
