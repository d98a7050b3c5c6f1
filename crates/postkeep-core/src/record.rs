//! Scraped post records.
//!
//! A [`RawRecord`] is what the producer hands over. A [`Record`] is the
//! persisted form: it carries a stable `record_id` taken from the post URL and
//! normalized metrics.

use crate::error::{PostkeepError, Result};
use crate::metrics::{self, Metrics, RawMetric};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Marker preceding the post identifier in a source URL.
pub const STATUS_MARKER: &str = "/status/";

/// Post author as shown on the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Handle without the leading `@`
    pub handle: String,
    #[serde(default)]
    pub display_name: String,
}

/// One candidate record yielded by the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source_url: String,
    #[serde(default)]
    pub author: Author,
    #[serde(default)]
    pub content: String,
    /// Source-supplied timestamp, kept verbatim
    #[serde(default)]
    pub posted_at: Option<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, RawMetric>,
}

/// One persisted post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_id: String,
    pub author: Author,
    pub content: String,
    pub posted_at: Option<String>,
    pub metrics: Metrics,
    pub source_url: String,
    pub saved_at: DateTime<Utc>,
}

impl Record {
    /// Builds a persistable record from producer output.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if no record id can be derived from `source_url`.
    pub fn from_raw(raw: &RawRecord, saved_at: DateTime<Utc>) -> Result<Self> {
        let record_id = derive_record_id(&raw.source_url).ok_or_else(|| {
            PostkeepError::malformed(format!("no record id in url '{}'", raw.source_url))
        })?;

        Ok(Self {
            record_id,
            author: raw.author.clone(),
            content: raw.content.clone(),
            posted_at: raw.posted_at.clone(),
            metrics: metrics::normalize_all(&raw.metrics),
            source_url: raw.source_url.clone(),
            saved_at,
        })
    }

    /// Applies the mutable part of a re-delivered record.
    ///
    /// Only metrics and the commit time change; everything else is fixed at first commit.
    pub fn refresh_from(&mut self, newer: &Record) {
        self.metrics = newer.metrics.clone();
        self.saved_at = newer.saved_at;
    }
}

/// Extracts the record id: the path segment that follows `/status/`.
///
/// The segment ends at the next `/`, `?` or `#`. Returns `None` when the marker is
/// missing or the segment is empty.
pub fn derive_record_id(source_url: &str) -> Option<String> {
    let start = source_url.find(STATUS_MARKER)? + STATUS_MARKER.len();
    let rest = &source_url[start..];
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let id = rest[..end].trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(url: &str) -> RawRecord {
        let mut metrics = BTreeMap::new();
        metrics.insert("views".to_string(), RawMetric::from("1.5K"));
        metrics.insert("replies".to_string(), RawMetric::Integer(7));
        RawRecord {
            source_url: url.to_string(),
            author: Author {
                handle: "alice".to_string(),
                display_name: "Alice".to_string(),
            },
            content: "hello".to_string(),
            posted_at: Some("2024-05-01T10:00:00Z".to_string()),
            metrics,
        }
    }

    #[test]
    fn test_derive_record_id() {
        assert_eq!(
            derive_record_id("https://x.com/alice/status/12345"),
            Some("12345".to_string())
        );
        assert_eq!(
            derive_record_id("https://x.com/alice/status/12345/photo/1"),
            Some("12345".to_string())
        );
        assert_eq!(
            derive_record_id("https://x.com/alice/status/999?s=20"),
            Some("999".to_string())
        );
        assert_eq!(derive_record_id("https://x.com/alice"), None);
        assert_eq!(derive_record_id("https://x.com/alice/status/"), None);
    }

    #[test]
    fn test_from_raw_normalizes_metrics() {
        let now = Utc::now();
        let record = Record::from_raw(&raw("https://x.com/alice/status/42"), now).unwrap();
        assert_eq!(record.record_id, "42");
        assert_eq!(record.metrics["views"], 1500);
        assert_eq!(record.metrics["replies"], 7);
        assert_eq!(record.saved_at, now);
    }

    #[test]
    fn test_from_raw_rejects_missing_marker() {
        let err = Record::from_raw(&raw("https://x.com/alice/likes"), Utc::now()).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_refresh_only_touches_metrics() {
        let mut first = Record::from_raw(&raw("https://x.com/alice/status/1"), Utc::now()).unwrap();
        let mut again = raw("https://x.com/alice/status/1");
        again.content = "edited".to_string();
        again
            .metrics
            .insert("views".to_string(), RawMetric::from("2K"));
        let second = Record::from_raw(&again, Utc::now()).unwrap();

        first.refresh_from(&second);
        assert_eq!(first.content, "hello");
        assert_eq!(first.metrics["views"], 2000);
    }
}
