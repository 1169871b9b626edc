//! Canonical timestamp encoding for published records
//!
//! Every date/time field that ends up in a message value is written as
//! RFC 3339 in UTC with a `Z` suffix and whole seconds, e.g.
//! `2024-05-01T12:00:00Z`. Use it with `#[serde(with = "livetap_domain::timestamp")]`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Render a timestamp in the canonical encoding
pub fn format(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(value))
}

/// Accepts any RFC 3339 offset and normalizes it to UTC
pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "crate::timestamp")]
        at: DateTime<Utc>,
    }

    #[test]
    fn test_fractional_seconds_are_dropped() {
        let stamped: Stamped = serde_json::from_str(r#"{"at":"2024-05-01T12:00:00.123456Z"}"#).unwrap();
        assert_eq!(
            serde_json::to_string(&stamped).unwrap(),
            r#"{"at":"2024-05-01T12:00:00Z"}"#
        );
    }

    #[test]
    fn test_offsets_are_normalized_to_utc() {
        let stamped: Stamped = serde_json::from_str(r#"{"at":"2024-05-01T14:00:00+02:00"}"#).unwrap();
        assert_eq!(format(&stamped.at), "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_invalid_timestamp_is_rejected() {
        let result: Result<Stamped, _> = serde_json::from_str(r#"{"at":"yesterday"}"#);
        assert!(result.is_err());
    }
}
