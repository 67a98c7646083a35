//! Engine error types.

use thiserror::Error;

use sealog_crypto::CryptoError;
use sealog_storage::StoreError;

/// Errors that can occur in the audit engine.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// Chain verification failed: the event at this serial did not verify
    /// against its predecessor's signature.
    #[error("audit chain verification failed at serial {serial}")]
    BrokenChain {
        /// The offending serial.
        serial: u64,
    },

    /// The store reported a failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A cryptographic operation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A certification document could not be encoded.
    #[error("certification encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The engine has been stopped or never started.
    #[error("audit logger is not running")]
    NotRunning,

    /// The worker task could not be spawned.
    #[error("failed to spawn audit worker: {0}")]
    Worker(String),
}
