//! # Shared Crypto
//!
//! Cryptographic helpers for GridMarket.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `signatures` | Ed25519 | Heartbeat and usage-record signing |
//! | `hashing` | SHA-256 | Event ids, tie-breaks |
//! | `canonical` | Canonical JSON | Deterministic signing bytes |
//! | `idempotency` | SHA-256 / UUIDv5 | Idempotency keys, usage ids |
//!
//! ## Security Properties
//!
//! - **Ed25519**: deterministic nonces, no RNG dependency at signing time
//! - **Canonical JSON**: sorted keys, no insignificant whitespace, so
//!   encode-decode-encode is byte-identical and signatures stay valid

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod errors;
pub mod hashing;
pub mod idempotency;
pub mod signatures;

// Re-exports
pub use canonical::{to_canonical_bytes, to_canonical_string};
pub use errors::CryptoError;
pub use hashing::{sha256, sha256_hex, sha256_many};
pub use idempotency::{hourly_idempotency_key, idempotency_key, usage_id};
pub use signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
