//! In-memory implementations of the ports used by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use livetap_domain::ingestion::{
    Cursor, DeliveryError, DeliveryOutcome, OutcomeCallback, Page, PublishTask, StoreError,
    UpstreamError,
};
use livetap_domain::ports::{CursorStore, Sink, StreamSource};
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Upstream serving fixed pages keyed by the cursor they start at
///
/// Unknown cursors answer with an empty caught-up page. Once `cancel_after`
/// fetches have been served the token is cancelled, which stops the loop at
/// the next page boundary.
#[derive(Clone)]
pub struct PagedSource {
    pages: Arc<HashMap<Cursor, Page<Value>>>,
    pub fetches: Arc<Mutex<Vec<Cursor>>>,
    failures_left: Arc<Mutex<u32>>,
    cancel_after: usize,
    cancel: CancellationToken,
}

impl PagedSource {
    pub fn new(pages: Vec<(Cursor, Page<Value>)>, cancel_after: usize, cancel: CancellationToken) -> Self {
        Self {
            pages: Arc::new(pages.into_iter().collect()),
            fetches: Arc::new(Mutex::new(Vec::new())),
            failures_left: Arc::new(Mutex::new(0)),
            cancel_after,
            cancel,
        }
    }

    /// Fail the next `count` fetches with a rate-limit error
    pub fn fail_next(self, count: u32) -> Self {
        *self.failures_left.lock().unwrap() = count;
        self
    }

    pub fn fetched(&self) -> Vec<Cursor> {
        self.fetches.lock().unwrap().clone()
    }
}

impl StreamSource for PagedSource {
    type Record = Value;

    fn fetch_page(
        &self,
        cursor: &Cursor,
    ) -> impl Future<Output = Result<Page<Value>, UpstreamError>> + Send {
        let result = {
            let mut failures = self.failures_left.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                Err(UpstreamError::Status {
                    status: 429,
                    body: "Too Many Requests".to_string(),
                })
            } else {
                let mut fetches = self.fetches.lock().unwrap();
                fetches.push(cursor.clone());
                if fetches.len() >= self.cancel_after {
                    self.cancel.cancel();
                }
                Ok(self.pages.get(cursor).cloned().unwrap_or_else(Page::empty))
            }
        };

        async move { result }
    }
}

/// Sink reporting outcomes from spawned tasks, failing selected keys a
/// number of times before acknowledging them
#[derive(Clone, Default)]
pub struct FlakySink {
    failures: Arc<Mutex<HashMap<String, u32>>>,
    pub submitted: Arc<Mutex<Vec<String>>>,
    pub acknowledged: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<Mutex<JoinSet<()>>>,
}

impl FlakySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(self, key: &str, times: u32) -> Self {
        self.failures.lock().unwrap().insert(key.to_string(), times);
        self
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    /// Acknowledged keys, sorted (outcomes arrive from spawned tasks)
    pub fn acknowledged(&self) -> Vec<String> {
        let mut keys = self.acknowledged.lock().unwrap().clone();
        keys.sort();
        keys
    }

    pub fn submissions_of(&self, key: &str) -> usize {
        self.submitted().iter().filter(|k| k.as_str() == key).count()
    }
}

impl Sink for FlakySink {
    fn submit(&self, task: PublishTask, on_outcome: OutcomeCallback) {
        let key = task.key_str();
        self.submitted.lock().unwrap().push(key.clone());

        let outcome = match self.failures.lock().unwrap().get_mut(&key) {
            Some(left) if *left > 0 => {
                *left -= 1;
                DeliveryOutcome::failed("broker unavailable")
            }
            _ => DeliveryOutcome::Acknowledged,
        };

        let acknowledged = self.acknowledged.clone();
        self.in_flight.lock().unwrap().spawn(async move {
            tokio::task::yield_now().await;
            if outcome.is_acknowledged() {
                acknowledged.lock().unwrap().push(key);
            }
            on_outcome(outcome);
        });
    }

    fn drain(&self, timeout: Duration) -> impl Future<Output = Result<(), DeliveryError>> + Send {
        let mut in_flight = std::mem::take(&mut *self.in_flight.lock().unwrap());
        async move {
            let drained =
                tokio::time::timeout(timeout, async { while in_flight.join_next().await.is_some() {} })
                    .await;
            drained.map_err(|_| {
                DeliveryError::drain_timeout(in_flight.len(), timeout.as_millis() as u64)
            })
        }
    }
}

/// Cursor store keeping every saved value
#[derive(Clone, Default)]
pub struct MemoryStore {
    current: Arc<Mutex<Option<Cursor>>>,
    pub saves: Arc<Mutex<Vec<Cursor>>>,
}

impl MemoryStore {
    pub fn starting_at(cursor: Cursor) -> Self {
        let store = Self::default();
        *store.current.lock().unwrap() = Some(cursor);
        store
    }

    pub fn current(&self) -> Option<Cursor> {
        self.current.lock().unwrap().clone()
    }

    pub fn saves(&self) -> Vec<Cursor> {
        self.saves.lock().unwrap().clone()
    }
}

impl CursorStore for MemoryStore {
    fn load(&self) -> impl Future<Output = Result<Cursor, StoreError>> + Send {
        let current = self.current().unwrap_or_default();
        async move { Ok(current) }
    }

    fn save(&self, cursor: &Cursor) -> impl Future<Output = Result<(), StoreError>> + Send {
        *self.current.lock().unwrap() = Some(cursor.clone());
        self.saves.lock().unwrap().push(cursor.clone());
        async move { Ok(()) }
    }
}

pub fn stream(id: &str) -> Value {
    json!({
        "id": id,
        "user_login": format!("streamer_{}", id),
        "type": "live",
        "viewer_count": 100,
        "started_at": "2024-05-01T12:00:00Z",
    })
}

pub fn page(ids: &[&str], next: Option<&str>) -> Page<Value> {
    Page::new(ids.iter().map(|id| stream(id)).collect(), next.map(Cursor::at))
}
