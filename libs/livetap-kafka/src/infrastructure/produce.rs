//! Kafka REST Proxy v2 produce payloads (binary embedded format)

use base64::{engine::general_purpose::STANDARD, Engine as _};
use livetap_domain::ingestion::{DeliveryOutcome, PublishTask};
use serde::{Deserialize, Serialize};

pub(crate) const CONTENT_TYPE: &str = "application/vnd.kafka.binary.v2+json";
pub(crate) const ACCEPT: &str = "application/vnd.kafka.v2+json";

#[derive(Debug, Serialize)]
pub(crate) struct ProduceRequest {
    pub records: Vec<ProduceRecord>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProduceRecord {
    pub key: String,
    pub value: String,
}

impl ProduceRequest {
    /// One record per task, in order; keys and values are base64 encoded
    pub fn batch<'a>(tasks: impl IntoIterator<Item = &'a PublishTask>) -> Self {
        Self {
            records: tasks
                .into_iter()
                .map(|task| ProduceRecord {
                    key: STANDARD.encode(task.key()),
                    value: STANDARD.encode(task.value()),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProduceResponse {
    #[serde(default)]
    pub offsets: Vec<PartitionOffset>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PartitionOffset {
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    pub error_code: Option<i64>,
    pub error: Option<String>,
}

impl ProduceResponse {
    /// Outcome of each of the `sent` records, matched to `offsets` by position
    pub fn outcomes(&self, sent: usize) -> Vec<DeliveryOutcome> {
        (0..sent)
            .map(|index| match self.offsets.get(index) {
                None => DeliveryOutcome::failed("produce response carried no offset for this record"),
                Some(offset) => offset.outcome(),
            })
            .collect()
    }
}

impl PartitionOffset {
    fn outcome(&self) -> DeliveryOutcome {
        match self.error_code {
            Some(code) => DeliveryOutcome::failed(format!(
                "broker error {}: {}",
                code,
                self.error.as_deref().unwrap_or("unknown")
            )),
            None => DeliveryOutcome::Acknowledged,
        }
    }
}
