//! Cryptographic hashing utilities
//!
//! Block hashes are SHA-512 digests rendered as lowercase hex.

use sha2::{Digest, Sha512};

/// Computes the SHA-512 hash of `parts` as if they were concatenated, and
/// returns it as a hex string
pub fn sha512_hex_parts<I, T>(parts: I) -> String
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part.as_ref());
    }
    hex::encode(hasher.finalize())
}
