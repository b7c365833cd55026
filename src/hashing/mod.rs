//! Centralized module for cryptographic hashing algorithms.

use sha2::{Digest, Sha256, Sha512};

/// Computes the MD5 digest of the given data and returns it as a hex string.
pub fn md5_digest(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Computes the SHA-256 digest of the given data and returns it as a hex string.
pub fn sha256_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Computes the SHA-512 digest of the given data and returns it as a hex string.
pub fn sha512_digest(data: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Computes the BLAKE3 digest of the given data and returns it as a hex string.
/// BLAKE3 is a high-performance cryptographic hash function.
pub fn blake3_digest(data: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(data);
    hasher.finalize().to_hex().to_string()
}

/// Whole-file digests shown by the hash dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHashes {
    pub md5: String,
    pub sha256: String,
    pub sha512: String,
    pub blake3: String,
}

impl FileHashes {
    pub fn compute(data: &[u8]) -> Self {
        Self {
            md5: md5_digest(data),
            sha256: sha256_digest(data),
            sha512: sha512_digest(data),
            blake3: blake3_digest(data),
        }
    }

    /// Label/digest pairs in display order.
    pub fn entries(&self) -> [(&'static str, &str); 4] {
        [
            ("MD5", self.md5.as_str()),
            ("SHA-256", self.sha256.as_str()),
            ("SHA-512", self.sha512.as_str()),
            ("BLAKE3", self.blake3.as_str()),
        ]
    }
}
