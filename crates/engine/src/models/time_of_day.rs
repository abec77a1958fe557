//! Serde adapter for optional `HH:MM[:SS]` time-of-day fields.

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serializer};

const FORMATS: [&str; 3] = ["%H:%M:%S", "%H:%M", "%H:%M:%S%.f"];

pub fn parse(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(value, format).ok())
}

pub fn serialize<S>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(time) => serializer.serialize_str(&time.format("%H:%M:%S").to_string()),
        None => serializer.serialize_none(),
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse(text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid time of day: {text}"))),
    }
}
