//! Kafka REST Proxy Sink Implementation
//!
//! This module implements the `Sink` trait by producing `PublishTask`s to a
//! Kafka topic through the REST Proxy v2 API. Submissions are buffered and
//! sent as one multi-record request per batch, on its own tokio task; each
//! task's callback receives the outcome reported for its record.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use livetap_domain::{
    ingestion::{DeliveryError, DeliveryOutcome, OutcomeCallback, PublishTask},
    ports::Sink,
};
use reqwest::{header, Client};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::produce::{ProduceRequest, ProduceResponse, ACCEPT, CONTENT_TYPE};

/// Connection settings for the REST Proxy
#[derive(Debug, Clone)]
pub struct KafkaRestConfig {
    /// REST Proxy root, e.g. `http://localhost:8082`
    pub base_url: String,
    /// Destination topic (default: `twitch-streams`)
    pub topic: String,
    /// Per-request HTTP timeout (default: 10s)
    pub request_timeout: Duration,
    /// Records per produce request (default: 100)
    pub batch_size: usize,
}

impl KafkaRestConfig {
    pub const DEFAULT_TOPIC: &'static str = "twitch-streams";

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            topic: Self::DEFAULT_TOPIC.to_string(),
            request_timeout: Duration::from_secs(10),
            batch_size: 100,
        }
    }
}

/// Count of sent records that have not reported an outcome yet
#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn pending(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            // Registered before the check so a concurrent completion is not missed
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Takes `records` off the in-flight count when the request task ends
struct InFlightGuard {
    in_flight: Arc<InFlight>,
    records: usize,
}

impl InFlightGuard {
    fn start(in_flight: &Arc<InFlight>, records: usize) -> Self {
        in_flight.count.fetch_add(records, Ordering::SeqCst);
        Self {
            in_flight: in_flight.clone(),
            records,
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(self.records, Ordering::SeqCst) == self.records {
            self.in_flight.idle.notify_waiters();
        }
    }
}

/// A submission waiting for its batch to be sent
struct Queued {
    task: PublishTask,
    on_outcome: OutcomeCallback,
}

/// REST Proxy-based implementation of the Sink port
///
/// `submit` and `drain` must be called from within a tokio runtime.
#[derive(Clone)]
pub struct KafkaRestSink {
    client: Client,
    topic: String,
    topic_url: String,
    batch_size: usize,
    queue: Arc<Mutex<Vec<Queued>>>,
    in_flight: Arc<InFlight>,
}

impl KafkaRestSink {
    /// Create a new sink with an existing HTTP client
    pub fn new(client: Client, config: KafkaRestConfig) -> Self {
        let topic_url = format!(
            "{}/topics/{}",
            config.base_url.trim_end_matches('/'),
            config.topic
        );
        let batch_size = config.batch_size.max(1);
        info!(topic = %config.topic, url = %topic_url, batch_size, "Initializing KafkaRestSink");

        Self {
            client,
            topic: config.topic,
            topic_url,
            batch_size,
            queue: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Create a new sink with its own HTTP client
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Transport` if the HTTP client cannot be built
    pub fn from_config(config: KafkaRestConfig) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| DeliveryError::transport(format!("Failed to build HTTP client: {}", err)))?;
        Ok(Self::new(client, config))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn topic_url(&self) -> &str {
        &self.topic_url
    }

    /// Submissions still waiting for an outcome, queued or sent
    pub fn pending(&self) -> usize {
        self.queued() + self.in_flight.pending()
    }

    fn queued(&self) -> usize {
        self.lock_queue().len()
    }

    fn lock_queue(&self) -> MutexGuard<'_, Vec<Queued>> {
        // the queue holds plain data, a panicking holder cannot leave it torn
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Send everything queued so far as one produce request
    fn flush(&self) {
        let batch = std::mem::take(&mut *self.lock_queue());
        if batch.is_empty() {
            return;
        }

        let body = match serde_json::to_vec(&ProduceRequest::batch(batch.iter().map(|queued| &queued.task))) {
            Ok(body) => body,
            Err(err) => {
                let reason = format!("failed to encode produce request: {}", err);
                for queued in batch {
                    (queued.on_outcome)(DeliveryOutcome::failed(reason.clone()));
                }
                return;
            }
        };

        let guard = InFlightGuard::start(&self.in_flight, batch.len());
        let client = self.client.clone();
        let url = self.topic_url.clone();
        let topic = self.topic.clone();

        tokio::spawn(async move {
            debug!(topic = %topic, records = batch.len(), size = body.len(), "Producing batch");

            let outcomes = produce(client, url, body, batch.len()).await;
            for (queued, outcome) in batch.into_iter().zip(outcomes) {
                let key = queued.task.key_str();
                match &outcome {
                    DeliveryOutcome::Acknowledged => {
                        info!(topic = %topic, key = %key, "Message produced");
                    }
                    DeliveryOutcome::Failed(reason) => {
                        warn!(topic = %topic, key = %key, reason = %reason, "Failed to deliver message");
                    }
                }
                (queued.on_outcome)(outcome);
            }
            drop(guard);
        });
    }
}

/// Produce one batch of `records` messages and map the answer to one
/// outcome per message
async fn produce(client: Client, url: String, body: Vec<u8>, records: usize) -> Vec<DeliveryOutcome> {
    let failed = |reason: String| vec![DeliveryOutcome::failed(reason); records];

    let response = match client
        .post(&url)
        .header(header::CONTENT_TYPE, CONTENT_TYPE)
        .header(header::ACCEPT, ACCEPT)
        .body(body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => return failed(DeliveryError::transport(err.to_string()).to_string()),
    };

    let status = response.status();
    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => return failed(DeliveryError::transport(err.to_string()).to_string()),
    };

    if !status.is_success() {
        let reason = format!("HTTP {}: {}", status.as_u16(), String::from_utf8_lossy(&bytes));
        return failed(DeliveryError::rejected(reason).to_string());
    }

    match serde_json::from_slice::<ProduceResponse>(&bytes) {
        Ok(produced) => produced.outcomes(records),
        Err(err) => failed(format!("undecodable produce response: {}", err)),
    }
}

impl Sink for KafkaRestSink {
    fn submit(&self, task: PublishTask, on_outcome: OutcomeCallback) {
        let full = {
            let mut queue = self.lock_queue();
            queue.push(Queued { task, on_outcome });
            queue.len() >= self.batch_size
        };
        if full {
            self.flush();
        }
    }

    fn drain(&self, timeout: Duration) -> impl std::future::Future<Output = Result<(), DeliveryError>> + Send {
        self.flush();
        let in_flight = self.in_flight.clone();

        async move {
            match tokio::time::timeout(timeout, in_flight.wait_idle()).await {
                Ok(()) => Ok(()),
                Err(_) => {
                    let pending = in_flight.pending();
                    warn!(pending, timeout_ms = timeout.as_millis() as u64, "Drain timed out");
                    Err(DeliveryError::drain_timeout(pending, timeout.as_millis() as u64))
                }
            }
        }
    }
}
