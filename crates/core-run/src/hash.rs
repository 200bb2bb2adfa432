//! Content hashing for snapshots, manifests, and write-back verification.

use sha2::{Digest, Sha256};

pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
