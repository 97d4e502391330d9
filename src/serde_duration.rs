//! Serde `with` modules for duration fields in documents.
//!
//! Strings use the same grammar as the converter (`90s`, `1h30m`, `2d`);
//! bare integers are seconds. Serializing writes the hour-based text form.
//!
//! ```ignore
//! #[serde(with = "layerfig::serde_duration")]
//! pub timeout: std::time::Duration,
//!
//! #[serde(with = "layerfig::serde_duration::signed")]
//! pub clock_skew: chrono::TimeDelta,
//! ```

use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Deserializer, Serializer};

use crate::units;

#[derive(Deserialize)]
#[serde(untagged)]
enum Raw {
    Seconds(i64),
    Text(String),
}

fn parse<'de, D>(deserializer: D) -> Result<TimeDelta, D::Error>
where
    D: Deserializer<'de>,
{
    match Raw::deserialize(deserializer)? {
        Raw::Seconds(seconds) => TimeDelta::try_seconds(seconds)
            .ok_or_else(|| serde::de::Error::custom("duration out of range")),
        Raw::Text(text) => units::parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let delta = TimeDelta::from_std(*duration).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&units::format_duration(delta))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    parse(deserializer)?
        .to_std()
        .map_err(|_| serde::de::Error::custom("negative durations are not allowed"))
}

/// The same for `chrono::TimeDelta`, which may be negative.
pub mod signed {
    use chrono::TimeDelta;
    use serde::{Deserializer, Serializer};

    use crate::units;

    pub fn serialize<S>(delta: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&units::format_duration(*delta))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<TimeDelta, D::Error>
    where
        D: Deserializer<'de>,
    {
        super::parse(deserializer)
    }
}
