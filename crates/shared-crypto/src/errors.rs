//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Signature verification failed
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// Invalid signature format
    #[error("Invalid signature format")]
    InvalidSignatureFormat,

    /// Invalid public key
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Invalid base64 encoding
    #[error("Invalid base64: {0}")]
    InvalidBase64(String),

    /// Input could not be canonicalized
    #[error("Canonicalization failed: {0}")]
    CanonicalizationFailed(String),
}
