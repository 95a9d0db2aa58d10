//! # SHA-256 Hashing
//!
//! One-shot and streaming SHA-256, used for chain event ids, scheduler
//! tie-breaks, and idempotency keys.

use sha2::{Digest, Sha256};

/// SHA-256 hash output (256-bit).
pub type Hash = [u8; 32];

/// Hash data with SHA-256 (one-shot).
pub fn sha256(data: &[u8]) -> Hash {
    let digest = Sha256::digest(data);
    digest.into()
}

/// Hash multiple inputs as one stream.
pub fn sha256_many(inputs: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for input in inputs {
        hasher.update(input);
    }
    hasher.finalize().into()
}

/// One-shot hash, hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let h1 = sha256(b"test");
        let h2 = sha256(b"test");
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_different_inputs() {
        let h1 = sha256(b"input1");
        let h2 = sha256(b"input2");
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_many_matches_concat() {
        let joined = sha256(b"hello world");
        let streamed = sha256_many(&[b"hello ", b"world"]);
        assert_eq!(joined, streamed);
    }

    #[test]
    fn test_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
