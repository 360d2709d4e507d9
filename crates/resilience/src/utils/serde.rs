//! Serde helpers for configuration durations
//!
//! Configuration files express every delay, timeout and TTL as an integer
//! number of milliseconds.
//!
//! # Usage
//! ```rust
//! use std::time::Duration;
//!
//! use serde::{Deserialize, Serialize};
//! use walletscope_resilience::utils::serde::duration_millis;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Example {
//!     #[serde(with = "duration_millis")]
//!     cooldown: Duration,
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

fn to_millis(duration: &Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// `Duration` encoded as a millisecond count
pub mod duration_millis {
    use super::{to_millis, Deserialize, Deserializer, Duration, SerializeResult, Serializer};

    /// Serialize a `Duration` as whole milliseconds
    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        serializer.serialize_u64(to_millis(duration))
    }

    /// Deserialize whole milliseconds into a `Duration`
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// `Option<Duration>` encoded as an optional millisecond count
///
/// Pair with `#[serde(default)]` so the field may be omitted.
pub mod option_duration_millis {
    use super::{to_millis, Deserialize, Deserializer, Duration, SerializeResult, Serializer};

    /// Serialize `Some(duration)` as milliseconds and `None` as unit
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_some(&to_millis(duration)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize optional milliseconds into an optional `Duration`
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<u64>::deserialize(deserializer).map(|millis| millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Window {
        #[serde(with = "duration_millis")]
        interval: Duration,
        #[serde(default, with = "option_duration_millis")]
        ttl: Option<Duration>,
    }

    /// Validates millisecond encoding of required and optional durations.
    ///
    /// Assertions:
    /// - Confirms the JSON output uses integer milliseconds.
    /// - Confirms `None` is written as `null`.
    #[test]
    fn test_serialize_durations_as_millis() {
        let window = Window { interval: Duration::from_millis(1500), ttl: None };
        let json = serde_json::to_string(&window).expect("serialize");
        assert_eq!(json, r#"{"interval":1500,"ttl":null}"#);
    }

    /// Validates that an omitted optional duration deserializes to `None`.
    ///
    /// Assertions:
    /// - Confirms `interval` is parsed from milliseconds.
    /// - Confirms the missing `ttl` becomes `None`.
    #[test]
    fn test_deserialize_missing_optional_duration() {
        let window: Window = serde_json::from_str(r#"{"interval":250}"#).expect("deserialize");
        assert_eq!(window, Window { interval: Duration::from_millis(250), ttl: None });

        let window: Window =
            serde_json::from_str(r#"{"interval":250,"ttl":60000}"#).expect("deserialize");
        assert_eq!(window.ttl, Some(Duration::from_secs(60)));
    }
}
