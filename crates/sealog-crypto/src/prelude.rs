//! Prelude module - commonly used types for convenient import.
//!
//! Use `use sealog_crypto::prelude::*;` to import all essential types.

// Errors
pub use crate::{CryptoError, CryptoResult};

// Key types
pub use crate::{KeyPair, PublicKey};

// Signing seam
pub use crate::ChainSigner;
