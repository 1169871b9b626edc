//! # LiveTap Domain Layer
//!
//! This crate contains the ingestion logic for LiveTap: a resumable
//! poll-and-publish loop that moves live-stream records from a paginated
//! upstream listing onto a message-broker topic with at-least-once delivery.
//!
//! - **Entities**: `PublishTask`, `Cursor`, `Page`, `DeliveryOutcome`
//! - **Ports**: `StreamSource`, `Sink`, `CursorStore`
//! - **Services**: `IngestionLoop`
//!
//! ## Architecture
//!
//! This layer has NO dependencies on infrastructure concerns (HTTP, Kafka,
//! filesystem). All external dependencies are expressed as traits (ports)
//! implemented by the adapter crates.
//!
//! ## Example
//!
//! ```rust,no_run
//! use livetap_domain::ingestion::{IngestionConfig, IngestionLoop};
//! use livetap_domain::ports::{CursorStore, Sink, StreamSource};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example<S: StreamSource, K: Sink, C: CursorStore>(source: S, sink: K, store: C) {
//!     let mut ingestion = IngestionLoop::new(source, sink, store, IngestionConfig::default());
//!     match ingestion.resume(CancellationToken::new()).await {
//!         Ok(cursor) => println!("stopped at {}", cursor),
//!         Err(fatal) => eprintln!("fatal: {}", fatal),
//!     }
//! }
//! ```

pub mod ingestion;
pub mod ports;
pub mod timestamp;

// Re-export commonly used types
pub use ingestion::{Cursor, IngestionConfig, IngestionLoop, Page, PublishTask, StreamRecord};
pub use ports::{CursorStore, Sink, StreamSource};
