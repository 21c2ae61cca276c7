//! # Cryptographic Primitives for Covault
//!
//! Every commitment, every id, and every attestation flows through here.
//!
//! - **SHA-256** for digests other parties must reproduce (vault ids,
//!   commitments, input digests, proposal ids).
//! - **BLAKE3** for the attestation transcript, domain-separated.
//! - **Ed25519** for attestation keys and member approvals.
//!
//! Everything here is a thin, type-safe wrapper around audited crates.
//! We don't roll our own.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{domain_separated_hash_multi, sha256, sha256_multi, truncated_hex, Digest};
pub use keys::{CovaultKeypair, CovaultPublicKey, CovaultSignature, KeyError};
pub use signatures::{sign, verify, Ed25519Verifier, SignatureVerifier};
