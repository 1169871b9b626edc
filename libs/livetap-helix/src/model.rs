//! Helix "Get Streams" payloads

use chrono::{DateTime, Utc};
use livetap_domain::ingestion::{Cursor, Page};
use livetap_domain::StreamRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A live broadcast as listed by Helix
///
/// Serialized back out unchanged except for `started_at`, which always uses
/// the canonical RFC 3339 encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveStream {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub game_name: String,
    /// "live", or empty on error
    #[serde(rename = "type", default)]
    pub stream_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub viewer_count: u64,
    #[serde(with = "livetap_domain::timestamp")]
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_mature: bool,
}

impl StreamRecord for LiveStream {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Pagination {
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Body of `GET /helix/streams`
///
/// Entries stay raw until `into_page`, so one malformed stream does not
/// reject the whole page.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamsResponse {
    pub data: Vec<Value>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl StreamsResponse {
    /// Decode every entry, skipping the ones that are not valid streams
    ///
    /// An absent or empty pagination cursor means the listing is caught up.
    pub fn into_page(self) -> Page<LiveStream> {
        let next_cursor = self
            .pagination
            .cursor
            .filter(|cursor| !cursor.is_empty())
            .map(Cursor::At);

        let records = self
            .data
            .into_iter()
            .filter_map(|entry| {
                let record_id = entry
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                match serde_json::from_value::<LiveStream>(entry) {
                    Ok(stream) => Some(stream),
                    Err(err) => {
                        warn!(record_id = %record_id, error = %err, "Skipping malformed stream entry");
                        None
                    }
                }
            })
            .collect();

        Page::new(records, next_cursor)
    }
}
