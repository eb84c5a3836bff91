//! Data models for raw adapter output, canonical articles and run batches.
//!
//! - [`RawFields`]: what a source adapter extracts from one article page
//! - [`ArticleRecord`]: the normalized, validated record emitted to the feed
//! - [`ErrorEntry`]: one per-URL (or per-adapter) failure summary
//! - [`RunBatch`]: the sealed output of one ingestion cycle
//!
//! A [`RunBatch`] can only be produced by sealing a [`BatchBuilder`], and
//! exposes no mutators afterwards.

use crate::error::{FetchError, ParseError, ValidationError};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Fields extracted from a page by a source adapter, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFields {
    pub title: String,
    pub subtitle: Option<String>,
    /// Publication date exactly as the site renders it.
    pub published: Option<String>,
    pub body: String,
    /// Offset used to interpret dates that carry no zone information.
    pub utc_offset: FixedOffset,
}

/// The canonical unit of output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub body_text: String,
    pub url: String,
    pub source_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Set only when the site gave a date we could not parse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at_raw: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Fetch,
    Parse,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub source_name: String,
    pub url: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorEntry {
    pub fn new(
        source_name: impl Into<String>,
        url: Option<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            url,
            kind,
            message: message.into(),
        }
    }

    /// Fetch timeouts are reported as `timeout`, everything else as `fetch`.
    pub fn from_fetch(source_name: &str, url: Option<&Url>, err: &FetchError) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else {
            ErrorKind::Fetch
        };
        Self::new(source_name, url.map(Url::to_string), kind, err.to_string())
    }

    pub fn from_parse(source_name: &str, url: Option<&Url>, err: &ParseError) -> Self {
        Self::new(source_name, url.map(Url::to_string), ErrorKind::Parse, err.to_string())
    }

    /// Invalid records are reported under `parse` so that a source whose
    /// every page is unusable still shows up in the feed.
    pub fn from_validation(source_name: &str, url: &Url, err: &ValidationError) -> Self {
        Self::new(
            source_name,
            Some(url.to_string()),
            ErrorKind::Parse,
            format!("validation: {err}"),
        )
    }

    /// Work still in flight when the run deadline passed.
    pub fn run_timeout(source_name: &str, url: Option<&Url>) -> Self {
        Self::new(
            source_name,
            url.map(Url::to_string),
            ErrorKind::Timeout,
            "run timeout elapsed before completion",
        )
    }
}

/// Per-source counters, logged at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub articles: usize,
    pub errors: usize,
    pub suppressed: usize,
}

/// The sealed result of one ingestion cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunBatch {
    run_timestamp: DateTime<Utc>,
    articles: Vec<ArticleRecord>,
    errors: Vec<ErrorEntry>,
    #[serde(skip)]
    stats: BTreeMap<String, SourceStats>,
}

impl RunBatch {
    pub fn run_timestamp(&self) -> DateTime<Utc> {
        self.run_timestamp
    }

    pub fn articles(&self) -> &[ArticleRecord] {
        &self.articles
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    pub fn stats(&self) -> &BTreeMap<String, SourceStats> {
        &self.stats
    }
}

/// Accumulates records and errors while a run is in progress.
#[derive(Debug)]
pub struct BatchBuilder {
    run_timestamp: DateTime<Utc>,
    articles: Vec<ArticleRecord>,
    errors: Vec<ErrorEntry>,
    stats: BTreeMap<String, SourceStats>,
}

impl BatchBuilder {
    pub fn new(run_timestamp: DateTime<Utc>) -> Self {
        Self {
            run_timestamp,
            articles: Vec::new(),
            errors: Vec::new(),
            stats: BTreeMap::new(),
        }
    }

    pub fn push_article(&mut self, article: ArticleRecord) {
        self.stats
            .entry(article.source_name.clone())
            .or_default()
            .articles += 1;
        self.articles.push(article);
    }

    pub fn push_error(&mut self, entry: ErrorEntry) {
        self.stats
            .entry(entry.source_name.clone())
            .or_default()
            .errors += 1;
        self.errors.push(entry);
    }

    pub fn note_suppressed(&mut self, source_name: &str, count: usize) {
        self.stats
            .entry(source_name.to_string())
            .or_default()
            .suppressed += count;
    }

    pub fn seal(self) -> RunBatch {
        RunBatch {
            run_timestamp: self.run_timestamp,
            articles: self.articles,
            errors: self.errors,
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(source: &str, url: &str) -> ArticleRecord {
        ArticleRecord {
            title: "T1".to_string(),
            published_at: None,
            body_text: "B1".to_string(),
            url: url.to_string(),
            source_name: source.to_string(),
            subtitle: None,
            published_at_raw: None,
        }
    }

    #[test]
    fn test_batch_serializes_feed_shape() {
        let ts = Utc.with_ymd_and_hms(2025, 5, 6, 14, 0, 0).unwrap();
        let mut builder = BatchBuilder::new(ts);
        builder.push_article(article("A", "https://a.example/a1"));
        builder.push_error(ErrorEntry::new(
            "A",
            Some("https://a.example/a2".to_string()),
            ErrorKind::Timeout,
            "request timed out",
        ));
        let batch = builder.seal();

        let value = serde_json::to_value(&batch).unwrap();
        assert_eq!(value["run_timestamp"], "2025-05-06T14:00:00Z");
        assert_eq!(value["articles"][0]["title"], "T1");
        assert!(value["articles"][0]["published_at"].is_null());
        assert!(value["articles"][0].get("subtitle").is_none());
        assert!(value["articles"][0].get("published_at_raw").is_none());
        assert_eq!(value["errors"][0]["kind"], "timeout");
        assert_eq!(value["errors"][0]["url"], "https://a.example/a2");
        assert!(value.get("stats").is_none());
    }

    #[test]
    fn test_stats_track_per_source() {
        let mut builder = BatchBuilder::new(Utc::now());
        builder.push_article(article("A", "https://a.example/1"));
        builder.push_article(article("A", "https://a.example/2"));
        builder.push_error(ErrorEntry::new("B", None, ErrorKind::Fetch, "down"));
        builder.note_suppressed("A", 3);
        let batch = builder.seal();

        assert_eq!(
            batch.stats()["A"],
            SourceStats {
                articles: 2,
                errors: 0,
                suppressed: 3
            }
        );
        assert_eq!(batch.stats()["B"].errors, 1);
    }

    #[test]
    fn test_fetch_timeout_maps_to_timeout_kind() {
        let url = Url::parse("https://a.example/a2").unwrap();
        let entry = ErrorEntry::from_fetch(
            "A",
            Some(&url),
            &FetchError::Timeout(std::time::Duration::from_secs(20)),
        );
        assert_eq!(entry.kind, ErrorKind::Timeout);
        assert_eq!(entry.url.as_deref(), Some("https://a.example/a2"));

        let entry = ErrorEntry::from_fetch(
            "A",
            Some(&url),
            &FetchError::Status {
                status: 404,
                retry_after: None,
            },
        );
        assert_eq!(entry.kind, ErrorKind::Fetch);
        assert_eq!(entry.message, "HTTP status 404");
    }

    #[test]
    fn test_validation_maps_to_parse_kind() {
        let url = Url::parse("https://a.example/a3").unwrap();
        let entry = ErrorEntry::from_validation("A", &url, &ValidationError::EmptyBody);
        assert_eq!(entry.kind, ErrorKind::Parse);
        assert!(entry.message.starts_with("validation: "));
    }

    #[test]
    fn test_error_entry_with_null_url() {
        let entry = ErrorEntry::new("B", None, ErrorKind::Parse, "missing");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""url":null"#));
        assert!(json.contains(r#""kind":"parse""#));
    }
}
