//! Key fingerprints.

use sha2::{Digest, Sha256};

use super::QueryKey;

/// Compute a stable SHA-256 fingerprint for a query key.
///
/// Segments are hashed in their JSON form so `7` and `"7"` differ.
pub fn fingerprint(key: &QueryKey) -> String {
    let mut hasher = Sha256::new();
    for segment in key.segments() {
        hasher.update(serde_json::to_string(segment).unwrap_or_default().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
