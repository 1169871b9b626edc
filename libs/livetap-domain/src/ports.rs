//! Ports (trait definitions) for external dependencies
//!
//! The ingestion loop owns none of its collaborators' concerns: the upstream
//! client handles pagination, authentication and rate limits, the broker
//! client handles batching and network I/O, the cursor store handles
//! persistence. This module defines what the loop needs from each of them.
//!
//! ## Static Dispatch
//!
//! We use native Rust async traits with `impl Future` return types instead of
//! `async_trait` to ensure zero-cost abstractions and static dispatch.

use std::future::Future;
use std::time::Duration;

use crate::ingestion::{
    Cursor, DeliveryError, OutcomeCallback, Page, PublishTask, StoreError, StreamRecord,
    UpstreamError,
};

/// Port for the paginated upstream listing
pub trait StreamSource: Send + Sync {
    /// Record type produced by this source
    type Record: StreamRecord;

    /// Fetch the page that starts at `cursor`
    ///
    /// A `None` next cursor in the returned page means the listing is caught
    /// up for now; it does not mean the listing is finished.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` for network, auth, rate-limit or decoding
    /// failures. The loop retries them with backoff.
    fn fetch_page(
        &self,
        cursor: &Cursor,
    ) -> impl Future<Output = Result<Page<Self::Record>, UpstreamError>> + Send;
}

/// Port for the message-broker publishing endpoint
pub trait Sink: Send + Sync {
    /// Enqueue a task for delivery without waiting for it
    ///
    /// Implementations must invoke `on_outcome` exactly once, from any
    /// thread, once the broker has accepted or refused the message.
    fn submit(&self, task: PublishTask, on_outcome: OutcomeCallback);

    /// Wait until every submitted task has reached an outcome
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::DrainTimeout` if tasks are still pending when
    /// `timeout` elapses.
    fn drain(&self, timeout: Duration) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Port for cursor persistence
///
/// Only called at page boundaries.
pub trait CursorStore: Send + Sync {
    /// Load the last persisted cursor, `Cursor::Beginning` if none was saved
    fn load(&self) -> impl Future<Output = Result<Cursor, StoreError>> + Send;

    /// Persist `cursor` as the new resume position
    fn save(&self, cursor: &Cursor) -> impl Future<Output = Result<(), StoreError>> + Send;
}
