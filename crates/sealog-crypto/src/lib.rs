//! Sealog Crypto - cryptographic primitives for the audit chain.
//!
//! This crate provides:
//! - ECDSA P-256 key pairs with secure memory handling
//! - ASN.1 DER signatures over prehashed SHA-256 digests
//! - SubjectPublicKeyInfo export with `EC PUBLIC KEY` PEM armour
//! - The [`ChainSigner`] seam the audit engine signs through
//!
//! # Example
//!
//! ```
//! use sealog_crypto::KeyPair;
//!
//! let keypair = KeyPair::generate();
//!
//! let digest = [0u8; 32];
//! let signature = keypair.sign_digest(&digest).unwrap();
//!
//! assert!(keypair.public_key().verify_digest(&digest, &signature));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod keypair;
mod signer;

pub use error::{CryptoError, CryptoResult};
pub use keypair::{KeyPair, PublicKey};
pub use signer::ChainSigner;
