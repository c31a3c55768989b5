//! Watermark types
//!
//! A [`Watermark`] is the newest event timestamp already accounted for an
//! entity. [`Watermarks`] is the whole document, keyed by entity id.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Text format every watermark is written with (millisecond precision)
pub const WATERMARK_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Formats accepted when reading, tried in order
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Values that mean "no timestamp" in legacy documents
const NULL_MARKERS: &[&str] = &["", "NaT", "nat", "null", "None", "NaN"];

/// Latest observed event time for one entity
///
/// The sentinel (`1970-01-01 00:00:00.000`) stands for "nothing observed
/// yet", so every comparison against a watermark is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Watermark(NaiveDateTime);

impl Watermark {
    /// The "never seen" value
    pub fn sentinel() -> Self {
        Self(NaiveDateTime::default())
    }

    /// Wrap a naive (UTC) timestamp
    pub fn new(ts: NaiveDateTime) -> Self {
        Self(ts)
    }

    /// Whether this is the sentinel value
    pub fn is_sentinel(&self) -> bool {
        *self == Self::sentinel()
    }

    /// The underlying timestamp
    pub fn timestamp(&self) -> NaiveDateTime {
        self.0
    }

    /// Parse a value that may be a legacy null marker
    ///
    /// Returns `None` for empty/`NaT`/`null` values.
    pub fn parse_optional(value: &str) -> Result<Option<Self>> {
        let trimmed = value.trim();
        if NULL_MARKERS.contains(&trimmed) {
            return Ok(None);
        }
        parse_timestamp(trimmed).map(|ts| Some(Self(ts)))
    }
}

impl From<NaiveDateTime> for Watermark {
    fn from(ts: NaiveDateTime) -> Self {
        Self(ts)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(WATERMARK_FORMAT))
    }
}

impl FromStr for Watermark {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_timestamp(s.trim()).map(Self)
    }
}

/// Parse an event timestamp
///
/// Accepts `YYYY-MM-DD HH:MM:SS[.fff]`, the same with a `T` separator,
/// RFC 3339 with an offset (normalized to UTC) and bare `YYYY-MM-DD`
/// dates (midnight).
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.naive_utc());
    }

    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight);
    }

    Err(Error::timestamp(
        value,
        "expected YYYY-MM-DD[ HH:MM:SS[.fff]] or RFC 3339",
    ))
}

/// Mapping of entity id to watermark
///
/// Reads never fail: an entity absent from the document resolves to the
/// sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Option<String>>",
    into = "BTreeMap<String, String>"
)]
pub struct Watermarks {
    entries: BTreeMap<String, Watermark>,
}

impl Watermarks {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Watermark for an entity, the sentinel if it was never recorded
    pub fn get(&self, entity: &str) -> Watermark {
        self.entries.get(entity).copied().unwrap_or_default()
    }

    /// Whether the entity has an entry in the document
    pub fn contains(&self, entity: &str) -> bool {
        self.entries.contains_key(entity)
    }

    /// Set the watermark for an entity
    pub fn set(&mut self, entity: impl Into<String>, watermark: Watermark) {
        self.entries.insert(entity.into(), watermark);
    }

    /// Reset an entity back to the sentinel
    pub fn reset(&mut self, entity: impl Into<String>) {
        self.set(entity, Watermark::sentinel());
    }

    /// Number of entities in the document
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the document has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in entity order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Watermark)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<S: Into<String>> FromIterator<(S, Watermark)> for Watermarks {
    fn from_iter<T: IntoIterator<Item = (S, Watermark)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl TryFrom<BTreeMap<String, Option<String>>> for Watermarks {
    type Error = Error;

    fn try_from(raw: BTreeMap<String, Option<String>>) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for (entity, value) in raw {
            let watermark = match value {
                Some(v) => Watermark::parse_optional(&v)?.unwrap_or_default(),
                None => Watermark::sentinel(),
            };
            entries.insert(entity, watermark);
        }
        Ok(Self { entries })
    }
}

impl From<Watermarks> for BTreeMap<String, String> {
    fn from(watermarks: Watermarks) -> Self {
        watermarks
            .entries
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect()
    }
}
