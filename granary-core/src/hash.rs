//! Content hashing helpers.

use sha2::{Digest, Sha256};

/// SHA-256 of `data`, hex-encoded lowercase.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}
