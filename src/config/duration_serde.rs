//! Common serde utilities for human-readable durations across configuration.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

/// Custom serde functions for Duration that support human-readable strings
pub mod duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration_str = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&duration_str)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str(
                    "a duration as seconds (number) or human-readable string (e.g., '30s', '5m', '1h30m')",
                )
            }

            fn visit_u64<E>(self, seconds: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Duration::from_secs(seconds))
            }

            // Environment overrides arrive as signed integers
            fn visit_i64<E>(self, seconds: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(seconds)
                    .map(Duration::from_secs)
                    .map_err(|_| de::Error::custom(format!("Negative duration: {seconds}")))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                humantime::parse_duration(value)
                    .map_err(|e| de::Error::custom(format!("Invalid duration '{value}': {e}")))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Timeouts {
        #[serde(with = "super::duration")]
        drain: Duration,
    }

    #[test]
    fn test_human_readable_string() {
        let parsed: Timeouts = toml::from_str("drain = \"1m30s\"").unwrap();
        assert_eq!(parsed.drain, Duration::from_secs(90));
    }

    #[test]
    fn test_plain_seconds() {
        let parsed: Timeouts = toml::from_str("drain = 45").unwrap();
        assert_eq!(parsed.drain, Duration::from_secs(45));
    }

    #[test]
    fn test_negative_seconds_rejected() {
        let parsed: Result<Timeouts, _> = toml::from_str("drain = -5");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_invalid_string_rejected() {
        let parsed: Result<Timeouts, _> = toml::from_str("drain = \"soon\"");
        let err = parsed.unwrap_err().to_string();
        assert!(err.contains("Invalid duration 'soon'"));
    }

    #[test]
    fn test_serializes_human_readable() {
        let rendered = toml::to_string(&Timeouts {
            drain: Duration::from_secs(30),
        })
        .unwrap();
        assert_eq!(rendered.trim(), "drain = \"30s\"");
    }
}
