//! Test doubles shared by the unit tests of several modules.

use crate::error::{Field, FetchError, ParseError, SinkError};
use crate::fetch::Fetch;
use crate::models::{RawFields, RunBatch};
use crate::outputs::Sink;
use crate::scrapers::{Listing, SourceAdapter, extract};
use async_trait::async_trait;
use chrono::FixedOffset;
use regex::Regex;
use scraper::Selector;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// Adapter for `{home}`: article links live under `{home}news/`, pages carry
/// an `h1` title, `p` body and an optional `time[datetime]`.
pub struct StubAdapter {
    name: String,
    listing: Listing,
    pattern: Regex,
}

impl StubAdapter {
    pub fn new(name: &str, home: &str) -> Self {
        let home = Url::parse(home).unwrap();
        let pattern = Regex::new(&format!("^{}news/", regex::escape(home.as_str()))).unwrap();
        Self {
            name: name.to_string(),
            listing: Listing::Seeds(vec![home]),
            pattern,
        }
    }

    pub fn with_listing(mut self, listing: Listing) -> Self {
        self.listing = listing;
        self
    }
}

impl SourceAdapter for StubAdapter {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn listing(&self) -> Listing {
        self.listing.clone()
    }

    fn link_pattern(&self) -> &Regex {
        &self.pattern
    }

    fn parse(&self, raw: &[u8], _url: &Url) -> Result<RawFields, ParseError> {
        let doc = extract::document(raw);
        let title = extract::first_text(&doc, &Selector::parse("h1").unwrap())
            .ok_or(ParseError::MissingField(Field::Title))?;
        let body = extract::joined_text(&doc, &Selector::parse("p").unwrap());
        if body.is_empty() {
            return Err(ParseError::MissingField(Field::Body));
        }
        Ok(RawFields {
            title,
            subtitle: None,
            published: extract::first_attr(&doc, &Selector::parse("time[datetime]").unwrap(), "datetime"),
            body,
            utc_offset: FixedOffset::east_opt(0).unwrap(),
        })
    }
}

/// An article page the [`StubAdapter`] can parse.
pub fn article_html(title: &str, body: &str) -> String {
    format!("<html><body><h1>{title}</h1><p>{body}</p></body></html>")
}

struct Route {
    delay: Duration,
    response: Result<Vec<u8>, FetchError>,
}

/// Canned responses keyed by URL. Unknown URLs answer 404.
#[derive(Default)]
pub struct StubFetcher {
    routes: HashMap<String, Route>,
    calls: Mutex<HashMap<String, usize>>,
}

fn route_key(url: &str) -> String {
    Url::parse(url).unwrap().to_string()
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, html: &str) -> Self {
        self.page_after(url, html, Duration::ZERO)
    }

    /// Serve `html` only after `delay`.
    pub fn page_after(mut self, url: &str, html: &str, delay: Duration) -> Self {
        self.routes.insert(
            route_key(url),
            Route {
                delay,
                response: Ok(html.as_bytes().to_vec()),
            },
        );
        self
    }

    pub fn fail(mut self, url: &str, err: FetchError) -> Self {
        self.routes.insert(
            route_key(url),
            Route {
                delay: Duration::ZERO,
                response: Err(err),
            },
        );
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        let calls = self.calls.lock().unwrap();
        calls.get(&route_key(url)).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetch for StubFetcher {
    async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<Vec<u8>, FetchError> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        match self.routes.get(url.as_str()) {
            Some(route) => {
                if !route.delay.is_zero() {
                    tokio::time::sleep(route.delay).await;
                }
                route.response.clone()
            }
            None => Err(FetchError::Status {
                status: 404,
                retry_after: None,
            }),
        }
    }
}

/// Keeps every written batch in memory.
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<RunBatch>>,
}

impl MemorySink {
    pub fn batches(&self) -> Vec<RunBatch> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(&self, batch: &RunBatch) -> Result<PathBuf, SinkError> {
        let mut batches = self.batches.lock().unwrap();
        batches.push(batch.clone());
        Ok(PathBuf::from(format!("memory/{}.json", batches.len())))
    }
}

/// Every write fails as if the disk were full.
pub struct FailingSink;

#[async_trait]
impl Sink for FailingSink {
    async fn write(&self, _batch: &RunBatch) -> Result<PathBuf, SinkError> {
        Err(SinkError::Io {
            path: PathBuf::from("feed/latest.json"),
            source: std::io::Error::other("no space left on device"),
        })
    }
}
