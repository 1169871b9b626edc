//! Relay configuration, read from environment variables

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use livetap_domain::ingestion::{CaughtUpPolicy, IngestionConfig};
use livetap_helix::HelixConfig;
use livetap_kafka::KafkaRestConfig;
use thiserror::Error;
use tracing::info;

/// Configuration errors
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Where the resume cursor lives
#[derive(Debug, Clone, PartialEq)]
pub enum CursorLocation {
    File(PathBuf),
    /// `CURSOR_PATH=memory`: nothing survives a restart
    Memory,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub helix: HelixConfig,
    pub kafka: KafkaRestConfig,
    pub cursor: CursorLocation,
    pub ingestion: IngestionConfig,
}

impl RelayConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to
    /// its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &'static str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));

        let mut helix = HelixConfig::new(required("HELIX_CLIENT_ID")?, required("HELIX_ACCESS_TOKEN")?);
        if let Some(base_url) = var("HELIX_BASE_URL") {
            helix.base_url = base_url;
        }
        if let Some(page_size) = var("HELIX_PAGE_SIZE") {
            helix.page_size = parse("HELIX_PAGE_SIZE", &page_size)?;
        }

        let kafka_url = var("KAFKA_REST_URL").unwrap_or_else(|| {
            info!("KAFKA_REST_URL not set, using default: http://localhost:8082");
            "http://localhost:8082".to_string()
        });
        let mut kafka = KafkaRestConfig::new(kafka_url);
        if let Some(topic) = var("KAFKA_TOPIC") {
            kafka.topic = topic;
        }
        if let Some(batch_size) = var("KAFKA_BATCH_SIZE") {
            kafka.batch_size = parse("KAFKA_BATCH_SIZE", &batch_size)?;
        }

        let cursor = match var("CURSOR_PATH") {
            Some(path) if path == "memory" => CursorLocation::Memory,
            Some(path) => CursorLocation::File(PathBuf::from(path)),
            None => CursorLocation::File(PathBuf::from("./livetap.cursor.json")),
        };

        let mut ingestion = IngestionConfig {
            caught_up: CaughtUpPolicy::Rewind,
            ..IngestionConfig::default()
        };
        if let Some(secs) = var("IDLE_DELAY_SECS") {
            ingestion.idle_delay = Duration::from_secs(parse("IDLE_DELAY_SECS", &secs)?);
        }
        if let Some(rewind) = var("REWIND_ON_CAUGHT_UP") {
            ingestion.caught_up = if parse_bool("REWIND_ON_CAUGHT_UP", &rewind)? {
                CaughtUpPolicy::Rewind
            } else {
                CaughtUpPolicy::Hold
            };
        }

        Ok(Self {
            helix,
            kafka,
            cursor,
            ingestion,
        })
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: err.to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        RelayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("HELIX_CLIENT_ID", "client"), ("HELIX_ACCESS_TOKEN", "token")]).unwrap();

        assert_eq!(config.helix.base_url, "https://api.twitch.tv/helix");
        assert_eq!(config.helix.page_size, 100);
        assert_eq!(config.kafka.base_url, "http://localhost:8082");
        assert_eq!(config.kafka.topic, "twitch-streams");
        assert_eq!(config.kafka.batch_size, 100);
        assert_eq!(
            config.cursor,
            CursorLocation::File(PathBuf::from("./livetap.cursor.json"))
        );
        assert_eq!(config.ingestion.idle_delay, Duration::from_secs(5));
        assert_eq!(config.ingestion.caught_up, CaughtUpPolicy::Rewind);
    }

    #[test]
    fn test_missing_credentials() {
        let err = config(&[("HELIX_CLIENT_ID", "client")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("HELIX_ACCESS_TOKEN"));

        let err = config(&[("HELIX_CLIENT_ID", "  "), ("HELIX_ACCESS_TOKEN", "token")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("HELIX_CLIENT_ID"));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("HELIX_CLIENT_ID", "client"),
            ("HELIX_ACCESS_TOKEN", "token"),
            ("HELIX_PAGE_SIZE", "20"),
            ("KAFKA_TOPIC", "live"),
            ("KAFKA_BATCH_SIZE", "25"),
            ("CURSOR_PATH", "memory"),
            ("IDLE_DELAY_SECS", "30"),
            ("REWIND_ON_CAUGHT_UP", "false"),
        ])
        .unwrap();

        assert_eq!(config.helix.page_size, 20);
        assert_eq!(config.kafka.topic, "live");
        assert_eq!(config.kafka.batch_size, 25);
        assert_eq!(config.cursor, CursorLocation::Memory);
        assert_eq!(config.ingestion.idle_delay, Duration::from_secs(30));
        assert_eq!(config.ingestion.caught_up, CaughtUpPolicy::Hold);
    }

    #[test]
    fn test_invalid_number() {
        let err = config(&[
            ("HELIX_CLIENT_ID", "client"),
            ("HELIX_ACCESS_TOKEN", "token"),
            ("IDLE_DELAY_SECS", "soon"),
        ])
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { key: "IDLE_DELAY_SECS", .. }));
    }
}
