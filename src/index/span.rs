//! Contiguous spans of ids.
//!
//! A span is an inclusive `[start, end]` interval. Single ids are spans with
//! `start == end`. Spans print as `"12"` or `"10-19"` and are persisted in
//! that textual form.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{Error, Result};

fn range_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d+)\s*-\s*(\d+)\s*$").expect("range pattern is a valid regex")
    })
}

/// Inclusive interval of ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdSpan {
    start: u64,
    end: u64,
}

impl IdSpan {
    /// Create a span, rejecting `start > end`
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(Error::RangeStartAfterEnd { start, end });
        }
        Ok(Self { start, end })
    }

    /// A span covering exactly one id
    pub fn single(id: u64) -> Self {
        Self { start: id, end: id }
    }

    /// Parse the `"<start>-<end>"` form used by range claims
    pub fn parse_range(text: &str) -> Result<Self> {
        let caps = range_pattern()
            .captures(text)
            .ok_or_else(|| Error::InvalidRange(text.to_string()))?;
        let start = caps[1]
            .parse::<u64>()
            .map_err(|_| Error::InvalidRange(text.to_string()))?;
        let end = caps[2]
            .parse::<u64>()
            .map_err(|_| Error::InvalidRange(text.to_string()))?;
        Self::new(start, end)
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of ids in the span
    pub fn len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, id: u64) -> bool {
        self.start <= id && id <= self.end
    }

    pub fn contains_span(&self, other: &IdSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &IdSpan) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn ids(&self) -> RangeInclusive<u64> {
        self.start..=self.end
    }
}

impl fmt::Display for IdSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl FromStr for IdSpan {
    type Err = Error;

    /// Accepts both `"12"` and `"10-19"`
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().parse::<u64>() {
            Ok(id) => Ok(Self::single(id)),
            Err(_) => Self::parse_range(s),
        }
    }
}

impl Serialize for IdSpan {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IdSpan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
