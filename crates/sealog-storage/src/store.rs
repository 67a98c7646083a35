//! The durable store contract.

use sealog_core::{ErrorEvent, Event};

use crate::error::StoreResult;

/// Durable persistence for the audit chain.
///
/// Implementations must make every multi-row operation atomic: either the
/// event and all of its attribute rows commit together, or none do. The
/// store never retries a failed operation; retrying (or treating the
/// failure as fatal) is the engine's decision.
///
/// Mutating operations take `&mut self`: the engine funnels all writes
/// through a single worker, and the contract leans on that.
pub trait EventStore: Send {
    /// Number of committed events.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn count(&self) -> StoreResult<u64>;

    /// Atomically persist an event and its attribute rows, preserving
    /// attribute order.
    ///
    /// # Errors
    ///
    /// Returns an error if any row fails; no partial state remains.
    fn insert(&mut self, event: &Event) -> StoreResult<()>;

    /// Atomically persist an error event: the skeletal event, its
    /// attributes, and the failure message. Error events have independent
    /// identifiers and never occupy a serial in the main chain.
    ///
    /// # Errors
    ///
    /// Returns an error if any row fails; no partial state remains.
    fn insert_error(&mut self, error: &ErrorEvent) -> StoreResult<()>;

    /// Load a single event with its attributes in stored order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// serial has not been committed.
    fn load_event(&self, serial: u64) -> StoreResult<Event>;

    /// Load the events with serials in `[start, end]`, ascending, inclusive
    /// on both ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn load_range(&self, start: u64, end: u64) -> StoreResult<Vec<Event>>;

    /// Load only the signature column for a serial (the chain-verification
    /// fast path).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// serial has not been committed.
    fn signature_at(&self, serial: u64) -> StoreResult<Vec<u8>>;

    /// Load the error events whose reserved serial falls in `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn load_errors_in_range(&self, start: u64, end: u64) -> StoreResult<Vec<ErrorEvent>>;
}
