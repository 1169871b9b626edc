//! Domain errors for ingestion operations
//!
//! Errors are split by how far they are allowed to travel:
//! - `TransformError` is record-local and never leaves the page loop
//! - `UpstreamError`, `DeliveryError` and `StoreError` are retried
//! - `FatalError` is what remains once retries are exhausted
//!
//! These are domain-level errors; adapters convert their infrastructure
//! errors (HTTP, filesystem) into them.

use thiserror::Error;

use crate::ingestion::cursor::Cursor;

/// Failure fetching a page from the upstream listing
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// The request could not be sent or the connection failed
    #[error("Upstream request failed: {0}")]
    Request(String),

    /// The upstream answered with a non-success status (auth, rate limit, ...)
    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded into a page
    #[error("Failed to decode upstream response: {0}")]
    Decode(String),

    /// The fetch did not complete in time
    #[error("Upstream fetch timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

impl UpstreamError {
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }
}

/// A single record could not be turned into a `PublishTask`
#[derive(Error, Debug)]
pub enum TransformError {
    /// The record has no usable identifier
    #[error("Record has no id")]
    MissingId,

    /// The record could not be serialized
    #[error("Failed to serialize record {record_id}: {reason}")]
    Serialization { record_id: String, reason: String },
}

/// Failure delivering submitted tasks to the sink
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Not every submitted task reached an outcome in time
    #[error("Drain timed out after {duration_ms}ms with {pending} task(s) pending")]
    DrainTimeout { pending: usize, duration_ms: u64 },

    /// The broker refused the message
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// The broker could not be reached
    #[error("Sink transport failed: {0}")]
    Transport(String),
}

impl DeliveryError {
    pub fn drain_timeout(pending: usize, duration_ms: u64) -> Self {
        Self::DrainTimeout {
            pending,
            duration_ms,
        }
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Failure loading or saving the cursor
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cursor store I/O failed: {0}")]
    Io(String),

    /// The persisted cursor could not be parsed
    #[error("Persisted cursor is corrupt: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }
}

/// No further progress is possible without operator intervention
///
/// Every variant carries the last successfully-advanced cursor so the loop
/// can be restarted by hand from a known position.
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("Upstream failed after {attempts} attempt(s), last cursor {last_cursor}: {source}")]
    UpstreamExhausted {
        last_cursor: Cursor,
        attempts: u32,
        #[source]
        source: UpstreamError,
    },

    #[error(
        "Delivery failed after {attempts} attempt(s), last cursor {last_cursor}, failing records {failed_ids:?}"
    )]
    DeliveryExhausted {
        last_cursor: Cursor,
        attempts: u32,
        failed_ids: Vec<String>,
    },

    #[error("Cursor store failed, last cursor {last_cursor}: {source}")]
    StoreExhausted {
        last_cursor: Cursor,
        #[source]
        source: StoreError,
    },
}

impl FatalError {
    /// Last cursor that was successfully persisted before the failure
    pub fn last_cursor(&self) -> &Cursor {
        match self {
            Self::UpstreamExhausted { last_cursor, .. }
            | Self::DeliveryExhausted { last_cursor, .. }
            | Self::StoreExhausted { last_cursor, .. } => last_cursor,
        }
    }

    /// Records that could not be delivered, empty for non-delivery failures
    pub fn failed_ids(&self) -> &[String] {
        match self {
            Self::DeliveryExhausted { failed_ids, .. } => failed_ids,
            _ => &[],
        }
    }
}

/// Result type alias for the ingestion loop
pub type Result<T> = std::result::Result<T, FatalError>;
