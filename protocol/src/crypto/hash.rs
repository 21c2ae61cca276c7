//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **SHA-256**: for everything that leaves the process and has to be
//!   recomputed by somebody else: vault ids, commitments, the public and
//!   private input digests, proposal ids. A Bitcoin-side script or a
//!   cross-chain verifier can reproduce these byte-for-byte.
//!
//! - **BLAKE3** (`derive_key` mode): for the attestation statement. That
//!   digest only ever meets our own `ProofSystem`, so we take the faster
//!   hash and get domain separation for free.
//!
//! Multi-part helpers feed slices sequentially into the hasher instead of
//! concatenating into a temporary buffer first.

use sha2::{Digest as _, Sha256};

/// A 32-byte digest. Commitments, vault ids, and input digests are all this.
pub type Digest = [u8; 32];

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use covault_protocol::crypto::sha256;
///
/// let hash = sha256(b"covault");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 over several byte slices, as if they were concatenated.
pub fn sha256_multi(parts: &[&[u8]]) -> Digest {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Domain-separated BLAKE3 over several byte slices.
///
/// Uses BLAKE3's `derive_key` mode: the context string selects a different
/// IV, so two contexts can never collide even on identical input. Don't
/// prepend a tag by hand when you can use this.
pub fn domain_separated_hash_multi(context: &str, parts: &[&[u8]]) -> Digest {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Hex-encode a digest and keep the first `len` characters.
///
/// Used for short human-facing identifiers (proposal ids, receipt ids).
/// `len` is clamped to the full hex length.
pub fn truncated_hex(digest: &Digest, len: usize) -> String {
    let mut encoded = hex::encode(digest);
    encoded.truncate(len.min(encoded.len()));
    encoded
}
