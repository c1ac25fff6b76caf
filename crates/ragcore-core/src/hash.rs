//! Content hashing helpers shared by ingestion idempotency (spec §4.7.1) and
//! deterministic Knowledge Object IDs (spec §4.10, testable property 9).

use sha2::{Digest, Sha256};

pub fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    let digest = hasher.finalize();
    hex_encode(&digest)
}

/// `SHA-256(namespace || "|" || external_id)`, stable across processes
/// (spec §4.10, §8 property 9). Exposed here so both the plugin host and
/// its tests can compute it without duplicating the delimiter convention.
pub fn deterministic_id(namespace: &str, external_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b"|");
    hasher.update(external_id.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}
