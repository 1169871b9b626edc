//! Helix Stream Source Implementation
//!
//! This module implements the `StreamSource` trait on top of the Twitch Helix
//! `GET /streams` endpoint. It handles request building and response decoding
//! and converts HTTP failures to domain errors. The app access token is
//! expected to be issued beforehand.

use std::time::Duration;

use livetap_domain::{
    ingestion::{Cursor, Page, UpstreamError},
    ports::StreamSource,
};
use reqwest::Client;
use tracing::{debug, info, warn, Instrument};

use crate::model::{LiveStream, StreamsResponse};

/// Helix caps `first` at 100 entries per page
const MAX_PAGE_SIZE: u16 = 100;

/// Upper bound kept from an error body when reporting a failed request
const MAX_ERROR_BODY: usize = 512;

/// Connection settings for the Helix API
#[derive(Debug, Clone)]
pub struct HelixConfig {
    /// API root, e.g. `https://api.twitch.tv/helix`
    pub base_url: String,
    pub client_id: String,
    /// Pre-issued app access token
    pub access_token: String,
    /// Streams per page (default: 100)
    pub page_size: u16,
    /// Per-request HTTP timeout (default: 10s)
    pub request_timeout: Duration,
}

impl HelixConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.twitch.tv/helix";

    pub fn new(client_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            client_id: client_id.into(),
            access_token: access_token.into(),
            page_size: MAX_PAGE_SIZE,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Helix-based implementation of the StreamSource port
///
/// ## Error Handling
///
/// - transport failures become `UpstreamError::Request`
/// - non-2xx answers (401 bad token, 429 rate limited, ...) become
///   `UpstreamError::Status`
/// - undecodable bodies become `UpstreamError::Decode`
#[derive(Clone)]
pub struct HelixStreamSource {
    client: Client,
    streams_url: String,
    client_id: String,
    access_token: String,
    page_size: u16,
}

impl HelixStreamSource {
    /// Create a new Helix source with an existing HTTP client
    pub fn new(client: Client, config: HelixConfig) -> Self {
        let streams_url = format!("{}/streams", config.base_url.trim_end_matches('/'));
        let page_size = config.page_size.clamp(1, MAX_PAGE_SIZE);
        info!(url = %streams_url, page_size, "Initializing HelixStreamSource");

        Self {
            client,
            streams_url,
            client_id: config.client_id,
            access_token: config.access_token,
            page_size,
        }
    }

    /// Create a new Helix source with its own HTTP client
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Request` if the HTTP client cannot be built
    pub fn from_config(config: HelixConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| UpstreamError::request(format!("Failed to build HTTP client: {}", err)))?;
        Ok(Self::new(client, config))
    }

    /// Get the streams endpoint URL
    pub fn streams_url(&self) -> &str {
        &self.streams_url
    }

    pub fn page_size(&self) -> u16 {
        self.page_size
    }

    /// Query parameters for the page starting at `cursor`
    fn query_params(&self, cursor: &Cursor) -> Vec<(&'static str, String)> {
        let mut params = vec![("first", self.page_size.to_string())];
        if let Some(token) = cursor.token() {
            params.push(("after", token.to_string()));
        }
        params
    }
}

impl StreamSource for HelixStreamSource {
    type Record = LiveStream;

    fn fetch_page(
        &self,
        cursor: &Cursor,
    ) -> impl std::future::Future<Output = Result<Page<LiveStream>, UpstreamError>> + Send {
        let request = self
            .client
            .get(&self.streams_url)
            .query(&self.query_params(cursor))
            .header("Client-Id", &self.client_id)
            .bearer_auth(&self.access_token);
        let span = tracing::debug_span!("helix_fetch_page", cursor = %cursor);

        async move {
            debug!("Requesting streams page from Helix");

            let response = request.send().await.map_err(|err| {
                warn!(error = ?err, "Helix request failed");
                UpstreamError::request(format!("GET /streams failed: {}", err))
            })?;

            let status = response.status();
            if !status.is_success() {
                let reset = response
                    .headers()
                    .get("Ratelimit-Reset")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                let mut body = response.text().await.unwrap_or_default();
                body.truncate(floor_char_boundary(&body, MAX_ERROR_BODY));

                warn!(status = status.as_u16(), ratelimit_reset = ?reset, body = %body, "Helix returned an error status");
                return Err(UpstreamError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let bytes = response.bytes().await.map_err(|err| {
                UpstreamError::request(format!("Failed to read Helix response body: {}", err))
            })?;

            let decoded: StreamsResponse = serde_json::from_slice(&bytes).map_err(|err| {
                warn!(error = %err, size = bytes.len(), "Failed to decode Helix response");
                UpstreamError::decode(err.to_string())
            })?;

            let page = decoded.into_page();
            debug!(
                streams = page.records.len(),
                caught_up = page.is_caught_up(),
                "Received streams page from Helix"
            );
            Ok(page)
        }
        .instrument(span)
    }
}

/// Largest index `<= max` that falls on a char boundary of `text`
fn floor_char_boundary(text: &str, max: usize) -> usize {
    if max >= text.len() {
        return text.len();
    }
    (0..=max)
        .rev()
        .find(|index| text.is_char_boundary(*index))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(config: HelixConfig) -> HelixStreamSource {
        HelixStreamSource::new(Client::new(), config)
    }

    #[test]
    fn test_streams_url_trims_trailing_slash() {
        let mut config = HelixConfig::new("client", "token");
        config.base_url = "http://localhost:8080/mock/".to_string();

        assert_eq!(source(config).streams_url(), "http://localhost:8080/mock/streams");
    }

    #[test]
    fn test_first_page_has_no_after_param() {
        let source = source(HelixConfig::new("client", "token"));
        let params = source.query_params(&Cursor::Beginning);

        assert_eq!(params, vec![("first", "100".to_string())]);
    }

    #[test]
    fn test_next_page_carries_cursor() {
        let source = source(HelixConfig::new("client", "token"));
        let params = source.query_params(&Cursor::at("eyJiIjp7fX0="));

        assert_eq!(
            params,
            vec![
                ("first", "100".to_string()),
                ("after", "eyJiIjp7fX0=".to_string())
            ]
        );
    }

    #[test]
    fn test_page_size_is_clamped() {
        let mut config = HelixConfig::new("client", "token");
        config.page_size = 500;
        assert_eq!(source(config.clone()).page_size(), 100);

        config.page_size = 0;
        assert_eq!(source(config).page_size(), 1);
    }

    #[test]
    fn test_floor_char_boundary() {
        assert_eq!(floor_char_boundary("short", 512), 5);
        assert_eq!(floor_char_boundary("héllo", 2), 1);
        assert_eq!(floor_char_boundary("hello", 3), 3);
    }
}
