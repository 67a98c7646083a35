//! Cryptographic error types.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The curve signing operation failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// A produced signature could not be encoded to ASN.1 DER.
    #[error("signature encoding failed: {0}")]
    SignatureEncoding(String),

    /// The public key could not be decoded.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The secret key material could not be decoded.
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    /// The public key could not be encoded for export.
    #[error("public key encoding failed: {0}")]
    KeyEncoding(String),

    /// A PEM block carried an unexpected label.
    #[error("unexpected PEM label {found:?}, expected \"EC PUBLIC KEY\"")]
    ArmourLabel {
        /// The label found in the armour block.
        found: String,
    },

    /// The PEM armour was structurally malformed.
    #[error("malformed PEM armour")]
    MalformedArmour,

    /// Invalid base64 encoding.
    #[error("invalid base64 encoding")]
    InvalidBase64Encoding,

    /// I/O error (e.g. reading/writing key files).
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
