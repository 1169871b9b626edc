//! Domain entities for poll-and-publish ingestion
//!
//! This module defines what flows through the ingestion loop: records fetched
//! from upstream, the broker messages derived from them, the pages that group
//! them and the outcomes the sink reports back.

use bytes::Bytes;
use serde::Serialize;
use std::fmt;

use crate::ingestion::{cursor::Cursor, error::TransformError};

/// A record fetched from the upstream listing
///
/// Records are opaque to the loop. They must expose a stable unique
/// identifier and be serializable; they are never mutated after fetch.
pub trait StreamRecord: Serialize + Send + Sync + 'static {
    /// Stable unique identifier, used as the message key
    fn id(&self) -> &str;
}

/// Schemaless records carry their identifier in a top-level `"id"` string.
impl StreamRecord for serde_json::Value {
    fn id(&self) -> &str {
        self.get("id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }
}

/// A message ready to be handed to the sink
///
/// Derived deterministically from exactly one `StreamRecord`:
/// - `key` is the record id as UTF-8 bytes
/// - `value` is the JSON encoding of the record
///
/// # Example
///
/// ```rust
/// use livetap_domain::ingestion::PublishTask;
///
/// let record = serde_json::json!({ "id": "40952121085", "viewer_count": 78365 });
/// let task = PublishTask::from_record(&record).unwrap();
/// assert_eq!(task.key(), b"40952121085".as_slice());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTask {
    key: Bytes,
    value: Bytes,
}

impl PublishTask {
    /// Transform a record into a publishable message
    ///
    /// This is a pure function: calling it twice on the same record yields
    /// byte-identical output.
    ///
    /// # Errors
    ///
    /// - `TransformError::MissingId` if the record id is empty
    /// - `TransformError::Serialization` if the record cannot be encoded
    pub fn from_record<R: StreamRecord + ?Sized>(record: &R) -> Result<Self, TransformError> {
        let id = record.id();
        if id.is_empty() {
            return Err(TransformError::MissingId);
        }

        let value = serde_json::to_vec(record).map_err(|err| TransformError::Serialization {
            record_id: id.to_string(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            key: Bytes::copy_from_slice(id.as_bytes()),
            value: Bytes::from(value),
        })
    }

    /// Create a task from explicit parts (used by adapters and tests)
    pub fn from_parts(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Key rendered as text for logs and error reports
    pub fn key_str(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }
}

/// One page of the upstream listing
#[derive(Debug, Clone)]
pub struct Page<R> {
    /// Records in upstream order
    pub records: Vec<R>,
    /// Where the next fetch continues; `None` means caught up, not exhausted
    pub next_cursor: Option<Cursor>,
}

impl<R> Page<R> {
    pub fn new(records: Vec<R>, next_cursor: Option<Cursor>) -> Self {
        Self {
            records,
            next_cursor,
        }
    }

    /// A caught-up page with nothing in it
    pub fn empty() -> Self {
        Self::new(Vec::new(), None)
    }

    pub fn is_caught_up(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Terminal result of one submitted `PublishTask`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acknowledged,
    Failed(String),
}

impl DeliveryOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged)
    }
}

/// Callback the sink invokes exactly once per submitted task
pub type OutcomeCallback = Box<dyn FnOnce(DeliveryOutcome) + Send + 'static>;

/// Observable state of the ingestion loop
///
/// `Fatal` is the only terminal state; every other state eventually leads
/// back to `Fetching`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Fetching,
    Transforming,
    Publishing,
    Draining,
    Advancing,
    Retrying,
    Fatal,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Transforming => "transforming",
            Self::Publishing => "publishing",
            Self::Draining => "draining",
            Self::Advancing => "advancing",
            Self::Retrying => "retrying",
            Self::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Broadcast {
        id: String,
        title: String,
    }

    impl StreamRecord for Broadcast {
        fn id(&self) -> &str {
            &self.id
        }
    }

    #[test]
    fn test_key_is_record_id() {
        let record = Broadcast {
            id: "123".to_string(),
            title: "speedrun".to_string(),
        };
        let task = PublishTask::from_record(&record).unwrap();

        assert_eq!(task.key(), b"123");
        assert_eq!(task.key_str(), "123");
        assert_eq!(task.value(), br#"{"id":"123","title":"speedrun"}"#);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let record = json!({
            "id": "9",
            "viewer_count": 12,
            "user_login": "someone",
            "tags": ["English", "Chill"],
            "started_at": "2024-05-01T12:00:00Z"
        });

        let first = PublishTask::from_record(&record).unwrap();
        let second = PublishTask::from_record(&record).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let record = json!({ "title": "no id here" });
        let err = PublishTask::from_record(&record).unwrap_err();
        assert!(matches!(err, TransformError::MissingId));

        let record = json!({ "id": "" });
        assert!(PublishTask::from_record(&record).is_err());
    }

    #[test]
    fn test_non_string_id_is_rejected() {
        let record = json!({ "id": 42 });
        let err = PublishTask::from_record(&record).unwrap_err();
        assert!(matches!(err, TransformError::MissingId));
    }

    #[test]
    fn test_page_caught_up() {
        let page: Page<serde_json::Value> = Page::empty();
        assert!(page.is_caught_up());
        assert!(page.records.is_empty());

        let page = Page::new(vec![json!({"id": "1"})], Some(Cursor::at("next")));
        assert!(!page.is_caught_up());
    }

    #[test]
    fn test_delivery_outcome() {
        assert!(DeliveryOutcome::Acknowledged.is_acknowledged());
        assert!(!DeliveryOutcome::failed("broker down").is_acknowledged());
    }
}
