//! The signing seam consumed by the audit engine.
//!
//! The engine signs through this trait rather than a concrete key type so
//! that fault paths (a failing entropy source, a broken encoder) can be
//! exercised in tests with substitute implementations.

use crate::error::CryptoResult;
use crate::keypair::{KeyPair, PublicKey};

/// Produces chain signatures over event digests.
///
/// Implementations must return the ASN.1 DER encoding of the ECDSA
/// `(r, s)` pair. The error variant distinguishes the signing stage
/// ([`CryptoError::SigningFailed`](crate::CryptoError::SigningFailed)) from
/// the encoding stage
/// ([`CryptoError::SignatureEncoding`](crate::CryptoError::SignatureEncoding));
/// the engine reports the two stages differently in its error events.
pub trait ChainSigner: Send + Sync {
    /// Sign a prehashed 32-byte digest, returning the DER signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the curve operation or the DER encoding fails.
    fn sign_digest(&self, digest: &[u8; 32]) -> CryptoResult<Vec<u8>>;

    /// The public half the produced signatures verify against.
    fn public_key(&self) -> PublicKey;
}

impl ChainSigner for KeyPair {
    fn sign_digest(&self, digest: &[u8; 32]) -> CryptoResult<Vec<u8>> {
        KeyPair::sign_digest(self, digest)
    }

    fn public_key(&self) -> PublicKey {
        KeyPair::public_key(self)
    }
}
