//! Sealog Core - the audit event model and certification format.
//!
//! Events form a chain of tamper-evident records: the ECDSA signature on
//! each event is computed over the SHA-256 digest of the event's fields
//! *and* the previous event's signature, so no committed event can be
//! altered, reordered or removed without breaking every signature after it.
//!
//! This crate defines the records themselves, their canonical digest, and
//! the exportable [`Certification`] document together with its independent
//! verifier. It performs no I/O; persistence and serialisation of live
//! chains belong to the store and engine crates.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod certification;
mod event;

pub use certification::{verify_certification, Certification};
pub use event::{Attribute, ErrorEvent, Event, Level};
