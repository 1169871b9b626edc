//! TapRelay - Live Stream Relay Service
//!
//! Tails the Twitch Helix live-streams listing and republishes every stream
//! on a Kafka topic keyed by stream id. Progress is kept in a cursor store so
//! a restart resumes where the last fully delivered page ended.

mod config;

use anyhow::{Context, Result};
use livetap_domain::ingestion::{FatalError, IngestionLoop};
use livetap_domain::ports::CursorStore;
use livetap_helix::HelixStreamSource;
use livetap_kafka::KafkaRestSink;
use livetap_store::{FileCursorStore, MemoryCursorStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{CursorLocation, RelayConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing, LOG_FORMAT=json for structured output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting TapRelay");

    let config = RelayConfig::from_env().context("invalid relay configuration")?;

    let source = HelixStreamSource::from_config(config.helix.clone())
        .context("failed to initialize Helix source")?;
    let sink = KafkaRestSink::from_config(config.kafka.clone())
        .context("failed to initialize Kafka REST sink")?;

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    match config.cursor.clone() {
        CursorLocation::File(path) => {
            info!(path = %path.display(), "Using file cursor store");
            relay(source, sink, FileCursorStore::new(path), config, cancel).await
        }
        CursorLocation::Memory => {
            warn!("Using in-memory cursor store, progress will not survive a restart");
            relay(source, sink, MemoryCursorStore::new(), config, cancel).await
        }
    }
}

/// Run the ingestion loop until Ctrl-C or a fatal error
async fn relay<C: CursorStore>(
    source: HelixStreamSource,
    sink: KafkaRestSink,
    store: C,
    config: RelayConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let mut ingestion = IngestionLoop::new(source, sink, store, config.ingestion);

    match ingestion.resume(cancel).await {
        Ok(cursor) => {
            info!(cursor = %cursor, "TapRelay stopped");
            Ok(())
        }
        Err(fatal) => {
            report_fatal(&fatal);
            Err(fatal).context("ingestion stopped on a fatal error")
        }
    }
}

fn report_fatal(fatal: &FatalError) {
    error!(
        last_cursor = %fatal.last_cursor(),
        failed_ids = ?fatal.failed_ids(),
        error = %fatal,
        "Ingestion cannot make progress; restart from the last cursor once the cause is fixed"
    );
}

/// Cancel `token` on Ctrl-C; the loop stops after the current page drains
fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested, finishing current page");
                token.cancel();
            }
            Err(err) => {
                error!(error = ?err, "Failed to listen for Ctrl-C");
            }
        }
    });
}
