//! Serde helpers for server timestamps.
//!
//! The server is not consistent about how it encodes time: RFC 3339 strings,
//! epoch seconds and epoch milliseconds (as numbers or numeric strings) all
//! show up. Everything is normalized to `DateTime<Utc>` and written back out
//! as RFC 3339.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serializer};
use std::fmt;

/// Epoch values above this are treated as milliseconds.
const MILLIS_THRESHOLD: u64 = 100_000_000_000;

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value.unsigned_abs() >= MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(value).single()
    } else {
        Utc.timestamp_opt(value, 0).single()
    }
}

pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(epoch) = raw.parse::<i64>() {
        return from_epoch(epoch);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

struct TimestampVisitor;

impl Visitor<'_> for TimestampVisitor {
    type Value = DateTime<Utc>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an RFC 3339 string or an epoch timestamp")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        from_epoch(v).ok_or_else(|| E::custom(format!("timestamp out of range: {v}")))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        let v = i64::try_from(v).map_err(|_| E::custom("timestamp out of range"))?;
        self.visit_i64(v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
        if !v.is_finite() || v < i64::MIN as f64 || v >= i64::MAX as f64 {
            return Err(E::custom(format!("timestamp out of range: {v}")));
        }
        self.visit_i64(v.trunc() as i64)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        parse(v).ok_or_else(|| E::custom(format!("invalid timestamp: {v}")))
    }
}

pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    deserializer.deserialize_any(TimestampVisitor)
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => super::serialize(v, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        #[derive(Deserialize)]
        struct Wrapper(#[serde(deserialize_with = "super::deserialize")] DateTime<Utc>);

        Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "super")]
        at: DateTime<Utc>,
        #[serde(default, with = "super::option")]
        read: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_accepts_all_server_encodings() {
        let expected = Utc.timestamp_opt(1_546_300_800, 0).unwrap();

        for raw in [
            r#"{"at":"2019-01-01T00:00:00Z"}"#,
            r#"{"at":1546300800}"#,
            r#"{"at":1546300800000}"#,
            r#"{"at":"1546300800000"}"#,
            r#"{"at":"1546300800"}"#,
        ] {
            let parsed: Stamped = serde_json::from_str(raw).unwrap();
            assert_eq!(parsed.at, expected, "input {raw}");
            assert!(parsed.read.is_none());
        }
    }

    #[test]
    fn test_optional_null_and_present() {
        let parsed: Stamped = serde_json::from_str(r#"{"at":0,"read":null}"#).unwrap();
        assert!(parsed.read.is_none());

        let parsed: Stamped = serde_json::from_str(r#"{"at":0,"read":"1546300800"}"#).unwrap();
        assert_eq!(parsed.read, Utc.timestamp_opt(1_546_300_800, 0).single());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(serde_json::from_str::<Stamped>(r#"{"at":"yesterday"}"#).is_err());
    }

    #[test]
    fn test_extreme_epochs_are_errors_not_panics() {
        assert_eq!(parse("-9223372036854775808"), None);
        assert_eq!(parse("9223372036854775807"), None);

        for raw in [
            r#"{"at":-1e19}"#,
            r#"{"at":1e19}"#,
            r#"{"at":-9223372036854775808}"#,
        ] {
            assert!(serde_json::from_str::<Stamped>(raw).is_err(), "input {raw}");
        }

        let parsed: Stamped = serde_json::from_str(r#"{"at":1546300800.5}"#).unwrap();
        assert_eq!(parsed.at, Utc.timestamp_opt(1_546_300_800, 0).unwrap());
    }
}
