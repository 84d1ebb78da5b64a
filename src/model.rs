//! Model types - plain value structs for the consolidated store
//!
//! Every data row is identified by a [`LocalKey`]: the owning user plus the
//! identifier the row had in that user's source database. The store never
//! synthesizes a global identity for urls, visits or visit sources.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::transition::{Transition, VisitSourceKind};
use crate::{Error, Result};

/// Seconds between 1601-01-01T00:00:00Z and the Unix epoch
const WEBKIT_UNIX_OFFSET_SECS: i64 = 11_644_473_600;
const MICROS_PER_SEC: i64 = 1_000_000;

/// Compound identity of a row: `(user_id, local_id)`.
///
/// Textual form is `<user_id>/<local_id>`, e.g. `3/42`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalKey {
    pub user_id: i64,
    pub local_id: i64,
}

impl LocalKey {
    pub fn new(user_id: i64, local_id: i64) -> Self {
        Self { user_id, local_id }
    }

    /// Parse `<user_id>/<local_id>`
    pub fn parse(s: &str) -> Result<Self> {
        let (user, local) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::InvalidArgument(format!("key must be <user_id>/<local_id>: {}", s)))?;

        let user_id = user
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("invalid user id: {}", user)))?;
        let local_id = local
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("invalid local id: {}", local)))?;

        Ok(Self { user_id, local_id })
    }
}

impl fmt::Display for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.local_id)
    }
}

impl FromStr for LocalKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for LocalKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LocalKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        LocalKey::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Browser timestamp: microseconds since 1601-01-01T00:00:00Z
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebkitTime(pub i64);

impl WebkitTime {
    pub fn raw(&self) -> i64 {
        self.0
    }

    /// Calendar time, or `None` when out of chrono's range
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let unix_micros = self.0.checked_sub(WEBKIT_UNIX_OFFSET_SECS * MICROS_PER_SEC)?;
        let secs = unix_micros.div_euclid(MICROS_PER_SEC);
        let nanos = (unix_micros.rem_euclid(MICROS_PER_SEC) * 1_000) as u32;
        DateTime::from_timestamp(secs, nanos)
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let micros = (dt.timestamp() + WEBKIT_UNIX_OFFSET_SECS) * MICROS_PER_SEC
            + i64::from(dt.timestamp_subsec_micros());
        Self(micros)
    }
}

impl fmt::Display for WebkitTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Accepts a raw timestamp, an RFC 3339 date-time or a `YYYY-MM-DD` date (midnight UTC).
impl FromStr for WebkitTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(raw) = s.parse::<i64>() {
            return Ok(Self(raw));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::from_datetime(dt.with_timezone(&Utc)));
        }
        if let Some(dt) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return Ok(Self::from_datetime(dt.and_utc()));
        }
        Err(Error::InvalidArgument(format!("unrecognized time: {}", s)))
    }
}

/// A user whose history has been merged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    /// SHA-256 of the source file as last merged
    pub content_digest: String,
}

/// A url row of one user's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Url {
    pub user_id: i64,
    pub local_id: i64,
    pub address: String,
    pub title: String,
    pub visit_count: i64,
    pub typed_count: i64,
    pub last_visit_time: WebkitTime,
    pub hidden: bool,
    pub favicon_id: i64,
}

impl Url {
    pub fn key(&self) -> LocalKey {
        LocalKey::new(self.user_id, self.local_id)
    }
}

/// A single navigation event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub user_id: i64,
    pub local_id: i64,
    pub url_local_id: i64,
    pub visit_time: WebkitTime,
    /// Local id of the preceding visit, 0 when there is none
    pub from_visit_local_id: i64,
    pub transition: Transition,
    pub segment_id: i64,
    pub visit_duration: i64,
}

impl Visit {
    pub fn key(&self) -> LocalKey {
        LocalKey::new(self.user_id, self.local_id)
    }

    pub fn url_key(&self) -> LocalKey {
        LocalKey::new(self.user_id, self.url_local_id)
    }

    /// Key of the preceding visit in the same user namespace
    pub fn from_visit_key(&self) -> Option<LocalKey> {
        (self.from_visit_local_id != 0).then(|| LocalKey::new(self.user_id, self.from_visit_local_id))
    }
}

/// Provenance of a visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitSource {
    pub user_id: i64,
    pub local_id: i64,
    pub source: VisitSourceKind,
}

impl VisitSource {
    pub fn key(&self) -> LocalKey {
        LocalKey::new(self.user_id, self.local_id)
    }
}
