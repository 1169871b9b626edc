//! Ingestion domain module
//!
//! This module contains the entities and the loop that moves records from the
//! upstream listing to the sink, and the rules deciding when progress is made.

pub mod backoff;
pub mod cursor;
pub mod entity;
pub mod error;
pub mod service;

pub use backoff::Backoff;
pub use cursor::Cursor;
pub use entity::{DeliveryOutcome, LoopState, OutcomeCallback, Page, PublishTask, StreamRecord};
pub use error::{DeliveryError, FatalError, Result, StoreError, TransformError, UpstreamError};
pub use service::{CaughtUpPolicy, IngestionConfig, IngestionLoop};
