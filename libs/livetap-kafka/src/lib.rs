//! Kafka adapter for LiveTap
//!
//! Implements the `Sink` port by producing to a topic through a Kafka REST
//! Proxy (v2 API), batching submissions into multi-record requests.

pub mod infrastructure;

pub use infrastructure::{KafkaRestConfig, KafkaRestSink};
