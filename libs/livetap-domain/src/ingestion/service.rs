//! Ingestion loop - Poll, publish, drain, advance
//!
//! This module drives records from the upstream listing to the sink and
//! decides when the cursor may move. The cursor only advances once every
//! message of a page has been acknowledged, which gives at-least-once
//! delivery across restarts.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    Backoff, Cursor, DeliveryError, DeliveryOutcome, FatalError, LoopState, Page, PublishTask,
    Result, StreamRecord, UpstreamError,
};
use crate::ports::{CursorStore, Sink, StreamSource};

/// What to do once the upstream reports it is caught up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaughtUpPolicy {
    /// Keep the current cursor and poll it again after the idle delay
    #[default]
    Hold,
    /// Persist `Cursor::Beginning` so the next poll starts a fresh pass
    Rewind,
}

/// Configuration for the ingestion loop
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Upper bound for a single upstream fetch (default: 10s)
    pub fetch_timeout: Duration,
    /// Upper bound for draining one page of submissions (default: 30s)
    pub drain_timeout: Duration,
    /// Wait before re-polling a caught-up listing (default: 5s)
    pub idle_delay: Duration,
    /// Retries of a failed fetch before giving up (default: 5)
    pub max_fetch_retries: u32,
    /// Resubmission rounds for failed deliveries before giving up (default: 5)
    pub max_delivery_retries: u32,
    /// Retries of a failed cursor load/save before giving up (default: 3)
    pub max_store_retries: u32,
    pub backoff: Backoff,
    pub caught_up: CaughtUpPolicy,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(30),
            idle_delay: Duration::from_secs(5),
            max_fetch_retries: 5,
            max_delivery_retries: 5,
            max_store_retries: 3,
            backoff: Backoff::default(),
            caught_up: CaughtUpPolicy::Hold,
        }
    }
}

/// Resumable poll-and-publish loop
///
/// The loop repeatedly:
/// 1. Fetches the page at the current cursor
/// 2. Transforms each record into a `PublishTask` and submits it
/// 3. Drains the sink, so at most one page is ever in flight
/// 4. Advances and persists the cursor if every task was acknowledged,
///    otherwise resubmits the failed subset with backoff
///
/// ## Static Dispatch
///
/// The loop is generic over its three ports; tests plug in-memory fakes in
/// the same slots as the production adapters.
pub struct IngestionLoop<S, K, C> {
    source: S,
    sink: K,
    store: C,
    config: IngestionConfig,
    state: watch::Sender<LoopState>,
}

impl<S, K, C> IngestionLoop<S, K, C>
where
    S: StreamSource,
    K: Sink,
    C: CursorStore,
{
    /// Create a new loop from its collaborators and configuration
    pub fn new(source: S, sink: K, store: C, config: IngestionConfig) -> Self {
        let (state, _) = watch::channel(LoopState::Idle);
        Self {
            source,
            sink,
            store,
            config,
            state,
        }
    }

    /// Create a new loop with default configuration
    pub fn with_defaults(source: S, sink: K, store: C) -> Self {
        Self::new(source, sink, store, IngestionConfig::default())
    }

    /// Get the loop configuration
    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Current state of the loop
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Watch state transitions as they happen
    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Load the persisted cursor and run from there
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run), plus `FatalError::StoreExhausted` if the
    /// cursor cannot be loaded.
    pub async fn resume(&mut self, cancel: CancellationToken) -> Result<Cursor> {
        let since = self.load_cursor().await?;
        self.run(since, cancel).await
    }

    /// Run the loop from `since` until cancelled or a fatal error occurs
    ///
    /// Cancellation is observed between pages: a page whose messages are in
    /// flight is always drained first. On cancellation the last persisted
    /// cursor is returned.
    ///
    /// # Errors
    ///
    /// - `FatalError::UpstreamExhausted` when fetch retries run out
    /// - `FatalError::DeliveryExhausted` when a page cannot be fully delivered
    /// - `FatalError::StoreExhausted` when the new cursor cannot be persisted
    pub async fn run(&mut self, since: Cursor, cancel: CancellationToken) -> Result<Cursor> {
        let mut cursor = since;
        info!(cursor = %cursor, "Starting ingestion loop");

        loop {
            if cancel.is_cancelled() {
                self.transition(LoopState::Idle);
                info!(cursor = %cursor, "Ingestion loop cancelled");
                return Ok(cursor);
            }

            let Some(page) = self.fetch_with_retry(&cursor, &cancel).await? else {
                self.transition(LoopState::Idle);
                info!(cursor = %cursor, "Ingestion loop cancelled while retrying fetch");
                return Ok(cursor);
            };

            let Page {
                records,
                next_cursor,
            } = page;
            let caught_up = next_cursor.is_none();

            let record_count = records.len();
            if record_count == 0 {
                debug!(cursor = %cursor, caught_up, "Upstream returned an empty page");
            } else {
                self.publish_page(&cursor, records).await?;
            }

            self.transition(LoopState::Advancing);
            let advanced = match next_cursor {
                Some(next) => next,
                None => match self.config.caught_up {
                    CaughtUpPolicy::Hold => cursor.clone(),
                    CaughtUpPolicy::Rewind => Cursor::Beginning,
                },
            };

            if advanced != cursor {
                self.persist_cursor(&cursor, &advanced).await?;
                info!(from = %cursor, to = %advanced, records = record_count, "Page delivered, cursor advanced");
                cursor = advanced;
            } else if record_count > 0 {
                info!(cursor = %cursor, records = record_count, "Page delivered");
            }

            if caught_up {
                self.idle(&cancel).await;
            }
        }
    }

    /// Fetch the page at `cursor`, retrying transient failures
    ///
    /// Returns `Ok(None)` if cancelled while waiting between attempts.
    async fn fetch_with_retry(
        &self,
        cursor: &Cursor,
        cancel: &CancellationToken,
    ) -> Result<Option<Page<S::Record>>> {
        let timeout_ms = self.config.fetch_timeout.as_millis() as u64;
        let mut attempt = 0u32;

        loop {
            self.transition(LoopState::Fetching);
            debug!(cursor = %cursor, attempt, "Fetching page");

            let fetched =
                match tokio::time::timeout(self.config.fetch_timeout, self.source.fetch_page(cursor))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(UpstreamError::timeout(timeout_ms)),
                };

            match fetched {
                Ok(page) => return Ok(Some(page)),
                Err(err) if attempt < self.config.max_fetch_retries => {
                    self.transition(LoopState::Retrying);
                    let delay = self.config.backoff.delay(attempt);
                    warn!(cursor = %cursor, attempt, delay_ms = delay.as_millis() as u64, error = %err, "Upstream fetch failed, retrying");
                    if !sleep_or_cancel(delay, cancel).await {
                        return Ok(None);
                    }
                    attempt += 1;
                }
                Err(err) => {
                    self.transition(LoopState::Fatal);
                    error!(cursor = %cursor, attempts = attempt + 1, error = %err, "Upstream fetch retries exhausted");
                    return Err(FatalError::UpstreamExhausted {
                        last_cursor: cursor.clone(),
                        attempts: attempt + 1,
                        source: err,
                    });
                }
            }
        }
    }

    /// Transform and deliver one page, resubmitting failures until every
    /// task is acknowledged or retries run out
    async fn publish_page(&self, cursor: &Cursor, records: Vec<S::Record>) -> Result<()> {
        self.transition(LoopState::Transforming);

        let mut pending = Vec::with_capacity(records.len());
        for record in &records {
            match PublishTask::from_record(record) {
                Ok(task) => pending.push(task),
                Err(err) => {
                    warn!(record_id = %record.id(), error = %err, "Skipping record that cannot be transformed");
                }
            }
        }
        drop(records);

        let mut attempt = 0u32;
        loop {
            let failed = self.deliver(pending).await;
            if failed.is_empty() {
                return Ok(());
            }

            let failed_ids: Vec<String> = failed.iter().map(|(task, _)| task.key_str()).collect();

            if attempt >= self.config.max_delivery_retries {
                self.transition(LoopState::Fatal);
                error!(cursor = %cursor, attempts = attempt + 1, failed = ?failed_ids, "Delivery retries exhausted");
                return Err(FatalError::DeliveryExhausted {
                    last_cursor: cursor.clone(),
                    attempts: attempt + 1,
                    failed_ids,
                });
            }

            self.transition(LoopState::Retrying);
            let delay = self.config.backoff.delay(attempt);
            for (task, reason) in &failed {
                warn!(record_id = %task.key_str(), attempt, reason = %reason, "Delivery failed");
            }
            warn!(cursor = %cursor, failed = failed.len(), delay_ms = delay.as_millis() as u64, "Resubmitting failed deliveries");
            tokio::time::sleep(delay).await;

            pending = failed.into_iter().map(|(task, _)| task).collect();
            attempt += 1;
        }
    }

    /// Submit `tasks`, drain the sink and return the ones that did not get
    /// acknowledged along with the reason
    async fn deliver(&self, tasks: Vec<PublishTask>) -> Vec<(PublishTask, String)> {
        if tasks.is_empty() {
            return Vec::new();
        }

        self.transition(LoopState::Publishing);

        // Fresh channel per round: outcomes reported after a drain timeout land
        // in a dropped receiver instead of the next round.
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, DeliveryOutcome)>();
        for (index, task) in tasks.iter().enumerate() {
            let tx = tx.clone();
            self.sink.submit(
                task.clone(),
                Box::new(move |outcome| {
                    let _ = tx.send((index, outcome));
                }),
            );
        }
        drop(tx);

        self.transition(LoopState::Draining);
        let drain_timeout = self.config.drain_timeout;
        let drained = tokio::time::timeout(drain_timeout, self.sink.drain(drain_timeout)).await;

        let mut outcomes: Vec<Option<DeliveryOutcome>> = vec![None; tasks.len()];
        while let Ok((index, outcome)) = rx.try_recv() {
            if let Some(slot) = outcomes.get_mut(index) {
                *slot = Some(outcome);
            }
        }

        let drained = match drained {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::drain_timeout(
                outcomes.iter().filter(|outcome| outcome.is_none()).count(),
                drain_timeout.as_millis() as u64,
            )),
        };

        let missing_reason = match &drained {
            Ok(()) => "no outcome reported".to_string(),
            Err(err) => {
                warn!(error = %err, "Drain did not complete");
                err.to_string()
            }
        };

        tasks
            .into_iter()
            .zip(outcomes)
            .filter_map(|(task, outcome)| match outcome {
                Some(DeliveryOutcome::Acknowledged) => None,
                Some(DeliveryOutcome::Failed(reason)) => Some((task, reason)),
                None => Some((task, missing_reason.clone())),
            })
            .collect()
    }

    async fn load_cursor(&self) -> Result<Cursor> {
        let mut attempt = 0u32;
        loop {
            match self.store.load().await {
                Ok(cursor) => {
                    info!(cursor = %cursor, "Loaded persisted cursor");
                    return Ok(cursor);
                }
                Err(err) if attempt < self.config.max_store_retries => {
                    let delay = self.config.backoff.delay(attempt);
                    warn!(attempt, error = %err, "Failed to load cursor, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.transition(LoopState::Fatal);
                    error!(error = %err, "Cursor load retries exhausted");
                    return Err(FatalError::StoreExhausted {
                        last_cursor: Cursor::Beginning,
                        source: err,
                    });
                }
            }
        }
    }

    async fn persist_cursor(&self, last: &Cursor, next: &Cursor) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            match self.store.save(next).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.config.max_store_retries => {
                    let delay = self.config.backoff.delay(attempt);
                    warn!(cursor = %next, attempt, error = %err, "Failed to persist cursor, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.transition(LoopState::Fatal);
                    error!(last_cursor = %last, cursor = %next, error = %err, "Cursor save retries exhausted");
                    return Err(FatalError::StoreExhausted {
                        last_cursor: last.clone(),
                        source: err,
                    });
                }
            }
        }
    }

    async fn idle(&self, cancel: &CancellationToken) {
        self.transition(LoopState::Idle);
        sleep_or_cancel(self.config.idle_delay, cancel).await;
    }

    fn transition(&self, next: LoopState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "State transition");
        }
    }
}

/// Sleep for `delay`; returns `false` if cancelled first
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
