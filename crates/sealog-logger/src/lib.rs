//! Sealog Logger - the single-writer audit engine.
//!
//! Producers submit events concurrently; the engine serialises every
//! submission through a bounded intake queue onto one worker, which
//! assigns dense serials, signs each event against the previous event's
//! signature and commits it transactionally. On construction the engine
//! re-verifies the entire stored chain and refuses to start over a
//! tampered store.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sealog_crypto::KeyPair;
//! use sealog_logger::{AuditLogger, LoggerOptions};
//! use sealog_storage::SqliteStore;
//!
//! # async fn demo() -> Result<(), sealog_logger::LoggerError> {
//! let store = SqliteStore::open("audit.db")?;
//! let key = Arc::new(KeyPair::load_or_generate("audit.key")?);
//!
//! let logger = AuditLogger::open(Box::new(store), key, LoggerOptions::with_standard_sinks())?;
//! logger.start()?;
//!
//! logger.info_sync("session", "login", Vec::new()).await;
//!
//! let certification = logger.certify(0, 0).await?;
//! logger.stop().await;
//! # drop(certification);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod chain;
mod engine;
mod error;

pub use chain::verify_chain;
pub use engine::{AuditLogger, LoggerOptions, Sink};
pub use error::LoggerError;
