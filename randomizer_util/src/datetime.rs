//! Serde helper for the booru timestamp format, e.g. `Sat Jan 14 04:45:08 -0600 2023`.
//! Unparseable or missing values become `None` instead of failing the whole post.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serializer};

pub const FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

pub fn serialize<S>(date: &Option<DateTime<FixedOffset>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match date {
        Some(date) => serializer.serialize_str(&date.format(FORMAT).to_string()),
        None => serializer.serialize_none(),
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    Ok(s.and_then(|s| DateTime::parse_from_str(&s, FORMAT).ok()))
}
