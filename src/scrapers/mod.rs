//! Source adapters: one module per news site.
//!
//! Every adapter implements [`SourceAdapter`], which splits the work into two
//! phases:
//!
//! 1. **Listing**: a [`Listing`] strategy names the pages to visit, and
//!    [`list_candidates`] turns them into article URLs using the adapter's
//!    `link_pattern`
//! 2. **Parsing**: [`SourceAdapter::parse`] extracts [`RawFields`] from one
//!    fetched article page
//!
//! # Supported Sources
//!
//! | Source | Module | Listing | Notes |
//! |--------|--------|---------|-------|
//! | Clarín | [`clarin`] | RSS feed | Date from `meta[name=date]` |
//! | El Tribuno | [`eltribuno`] | Homepage | Date from a `data-fecha_c` attribute |
//! | La Nación | [`lanacion`] | Homepage | Date encoded in the `-nidDDMMYYYY` slug |
//! | La Política Online | [`lpo`] | Homepage | |
//! | Noticias Mercedinas | [`noticiasmercedinas`] | Paginated index | Small host, stricter rate limit |
//!
//! Adding a source means adding a module here and an entry in [`registry`];
//! nothing else in the crate refers to a site by name.

use crate::error::{ParseError, RegistryError};
use crate::fetch::{Fetch, HostLimit, host_key};
use crate::models::{ErrorEntry, RawFields};
use crate::normalize::canonical_url;
use itertools::Itertools;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub mod clarin;
pub mod eltribuno;
pub mod extract;
pub mod lanacion;
pub mod lpo;
pub mod noticiasmercedinas;

/// Where an adapter finds its article links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    /// Fixed HTML index pages.
    Seeds(Vec<Url>),
    /// An HTML index paginated through a `{page}` placeholder.
    Paginated {
        template: String,
        first: u32,
        last: u32,
    },
    /// RSS, Atom or sitemap document.
    Feed(Url),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageKind {
    Html,
    Feed,
}

impl Listing {
    fn pages(&self) -> Vec<(Url, PageKind)> {
        match self {
            Listing::Seeds(urls) => urls.iter().cloned().map(|u| (u, PageKind::Html)).collect(),
            Listing::Paginated {
                template,
                first,
                last,
            } => (*first..=*last)
                .filter_map(|page| {
                    let raw = template.replace("{page}", &page.to_string());
                    match Url::parse(&raw) {
                        Ok(url) => Some((url, PageKind::Html)),
                        Err(e) => {
                            warn!(%raw, error = %e, "Skipping invalid listing page url");
                            None
                        }
                    }
                })
                .collect(),
            Listing::Feed(url) => vec![(url.clone(), PageKind::Feed)],
        }
    }

    /// Hosts the listing pages live on.
    pub fn hosts(&self) -> Vec<String> {
        self.pages()
            .iter()
            .map(|(url, _)| host_key(url))
            .unique()
            .collect()
    }
}

/// The extraction contract every news site implements.
pub trait SourceAdapter: Send + Sync {
    /// Globally unique identifier, also written to each record.
    fn source_name(&self) -> &str;

    fn listing(&self) -> Listing;

    /// Absolute article URLs must match this pattern to become candidates.
    fn link_pattern(&self) -> &Regex;

    /// Politeness limit for this site's hosts.
    fn rate_limit(&self, default: HostLimit) -> HostLimit {
        default
    }

    /// Extract raw fields from an article page. Must be a pure function of
    /// its input and must not panic on malformed markup.
    fn parse(&self, raw: &[u8], url: &Url) -> Result<RawFields, ParseError>;
}

/// Candidate article URLs for one run, plus the listing pages that failed.
#[derive(Debug, Default)]
pub struct Candidates {
    pub urls: Vec<Url>,
    pub failures: Vec<ErrorEntry>,
}

/// Visit the adapter's listing pages and collect candidate article URLs.
///
/// Links are filtered by the adapter's pattern, deduplicated on their
/// canonical form (first occurrence wins) and capped at `limit`. A listing
/// page that cannot be fetched or parsed is reported and skipped.
#[instrument(level = "info", skip_all, fields(source = adapter.source_name()))]
pub async fn list_candidates(
    adapter: &dyn SourceAdapter,
    fetcher: &dyn Fetch,
    timeout: Duration,
    limit: usize,
) -> Candidates {
    let source = adapter.source_name();
    let mut found: Vec<Url> = Vec::new();
    let mut failures = Vec::new();

    for (page, kind) in adapter.listing().pages() {
        let body = match fetcher.fetch(&page, timeout).await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %page, error = %e, "Listing page fetch failed");
                failures.push(ErrorEntry::from_fetch(source, Some(&page), &e));
                continue;
            }
        };

        let links = match kind {
            PageKind::Html => {
                let doc = extract::document(&body);
                extract::html_links(&doc, &page)
            }
            PageKind::Feed => match extract::feed_links(&body) {
                Ok(links) => links.iter().filter_map(|l| page.join(l).ok()).collect(),
                Err(e) => {
                    warn!(url = %page, error = %e, "Listing feed parse failed");
                    failures.push(ErrorEntry::from_parse(source, Some(&page), &e));
                    continue;
                }
            },
        };
        let matched = extract::matching(links, adapter.link_pattern());
        debug!(url = %page, count = matched.len(), "Listing page scanned");
        found.extend(matched);
    }

    let urls: Vec<Url> = found
        .into_iter()
        .unique_by(|url| canonical_url(url).to_string())
        .take(limit)
        .collect();

    info!(count = urls.len(), failed_pages = failures.len(), "Indexed candidate article URLs");
    Candidates { urls, failures }
}

/// Every adapter compiled into the binary.
pub fn registry() -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        Arc::new(clarin::Clarin::new()),
        Arc::new(eltribuno::ElTribuno::new()),
        Arc::new(lanacion::LaNacion::new()),
        Arc::new(lpo::LaPoliticaOnline::new()),
        Arc::new(noticiasmercedinas::NoticiasMercedinas::new()),
    ]
}

/// Check that source names are unique and keep only the `wanted` ones
/// (all of them when `wanted` is empty).
pub fn select(
    adapters: Vec<Arc<dyn SourceAdapter>>,
    wanted: &[String],
) -> Result<Vec<Arc<dyn SourceAdapter>>, RegistryError> {
    let mut names = HashSet::new();
    for adapter in &adapters {
        if !names.insert(adapter.source_name().to_string()) {
            return Err(RegistryError::Duplicate(adapter.source_name().to_string()));
        }
    }
    if let Some(unknown) = wanted.iter().find(|w| !names.contains(w.as_str())) {
        return Err(RegistryError::Unknown(unknown.clone()));
    }

    let selected: Vec<_> = adapters
        .into_iter()
        .filter(|a| wanted.is_empty() || wanted.iter().any(|w| w == a.source_name()))
        .collect();
    if selected.is_empty() {
        return Err(RegistryError::Empty);
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::models::ErrorKind;
    use crate::testing::{StubAdapter, StubFetcher};

    #[test]
    fn test_registry_names_are_unique() {
        let adapters = select(registry(), &[]).unwrap();
        assert_eq!(adapters.len(), 5);
    }

    #[test]
    fn test_select_filters_and_rejects_unknown() {
        let picked = select(registry(), &["lanacion".to_string()]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].source_name(), "lanacion");

        let err = select(registry(), &["pagina12".to_string()]).err().unwrap();
        assert_eq!(err, RegistryError::Unknown("pagina12".to_string()));
    }

    #[test]
    fn test_select_rejects_duplicate_names() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(StubAdapter::new("A", "https://a.example/")),
            Arc::new(StubAdapter::new("A", "https://b.example/")),
        ];
        let err = select(adapters, &[]).err().unwrap();
        assert_eq!(err, RegistryError::Duplicate("A".to_string()));
    }

    #[test]
    fn test_paginated_listing_pages() {
        let listing = Listing::Paginated {
            template: "https://news.example/page/{page}/".to_string(),
            first: 1,
            last: 3,
        };
        let pages: Vec<String> = listing.pages().into_iter().map(|(u, _)| u.to_string()).collect();
        assert_eq!(
            pages,
            vec![
                "https://news.example/page/1/",
                "https://news.example/page/2/",
                "https://news.example/page/3/",
            ]
        );
        assert_eq!(listing.hosts(), vec!["news.example".to_string()]);
    }

    #[tokio::test]
    async fn test_list_candidates_dedupes_and_caps() {
        let adapter = StubAdapter::new("A", "https://a.example/");
        let fetcher = StubFetcher::new().page(
            "https://a.example/",
            r#"<a href="/news/1">1</a>
               <a href="/news/1?utm_source=home">1 again</a>
               <a href="/about">about</a>
               <a href="/news/2">2</a>
               <a href="/news/3">3</a>"#,
        );
        let found = list_candidates(&adapter, &fetcher, Duration::from_secs(1), 2).await;
        assert!(found.failures.is_empty());
        assert_eq!(
            found.urls.iter().map(Url::as_str).collect::<Vec<_>>(),
            vec!["https://a.example/news/1", "https://a.example/news/2"]
        );
    }

    #[tokio::test]
    async fn test_list_candidates_reports_failed_pages() {
        let adapter = StubAdapter::new("A", "https://a.example/").with_listing(Listing::Seeds(vec![
            Url::parse("https://a.example/").unwrap(),
            Url::parse("https://a.example/mas").unwrap(),
        ]));
        let fetcher = StubFetcher::new()
            .fail("https://a.example/", FetchError::Status { status: 503, retry_after: None })
            .page("https://a.example/mas", r#"<a href="/news/9">9</a>"#);
        let found = list_candidates(&adapter, &fetcher, Duration::from_secs(1), 10).await;
        assert_eq!(found.urls.len(), 1);
        assert_eq!(found.failures.len(), 1);
        assert_eq!(found.failures[0].kind, ErrorKind::Fetch);
        assert_eq!(found.failures[0].url.as_deref(), Some("https://a.example/"));
    }

    #[tokio::test]
    async fn test_list_candidates_from_feed() {
        let adapter = StubAdapter::new("A", "https://a.example/")
            .with_listing(Listing::Feed(Url::parse("https://a.example/feed").unwrap()));
        let fetcher = StubFetcher::new().page(
            "https://a.example/feed",
            "<rss><channel><item><link>https://a.example/news/7</link></item>\
             <item><link>/news/8</link></item></channel></rss>",
        );
        let found = list_candidates(&adapter, &fetcher, Duration::from_secs(1), 10).await;
        assert_eq!(
            found.urls.iter().map(Url::as_str).collect::<Vec<_>>(),
            vec!["https://a.example/news/7", "https://a.example/news/8"]
        );
    }
}
