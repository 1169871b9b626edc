mod produce;
mod rest_sink;

pub use rest_sink::{KafkaRestConfig, KafkaRestSink};
