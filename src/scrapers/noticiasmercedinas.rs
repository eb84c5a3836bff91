//! Noticias Mercedinas article scraper.
//!
//! A small WordPress site: the index is walked through its `/page/N/`
//! pagination and requests are spaced more generously than the default.

use super::{Listing, SourceAdapter, extract};
use crate::error::{Field, ParseError};
use crate::fetch::HostLimit;
use crate::models::RawFields;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;
use std::time::Duration;
use url::Url;

const INDEX_TEMPLATE: &str = "https://noticiasmercedinas.com/site/page/{page}/";
const INDEX_PAGES: u32 = 3;

static LINK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://noticiasmercedinas\.com/site/\d{4}/\d{2}/\d{2}/[^/]+/?$").unwrap()
});

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static DATE: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").unwrap());
static ARTICLE_BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("article p").unwrap());
static ANY_PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

#[derive(Debug, Default)]
pub struct NoticiasMercedinas;

impl NoticiasMercedinas {
    pub fn new() -> Self {
        Self
    }
}

impl SourceAdapter for NoticiasMercedinas {
    fn source_name(&self) -> &str {
        "noticiasmercedinas"
    }

    fn listing(&self) -> Listing {
        Listing::Paginated {
            template: INDEX_TEMPLATE.to_string(),
            first: 1,
            last: INDEX_PAGES,
        }
    }

    fn link_pattern(&self) -> &Regex {
        &LINK_PATTERN
    }

    fn rate_limit(&self, default: HostLimit) -> HostLimit {
        HostLimit {
            max_concurrent: 1,
            min_interval: default.min_interval.max(Duration::from_secs(2)),
        }
    }

    fn parse(&self, raw: &[u8], _url: &Url) -> Result<RawFields, ParseError> {
        let doc = extract::document(raw);

        let title =
            extract::first_text(&doc, &TITLE).ok_or(ParseError::MissingField(Field::Title))?;
        let mut body = extract::joined_text(&doc, &ARTICLE_BODY);
        if body.is_empty() {
            body = extract::joined_text(&doc, &ANY_PARAGRAPH);
        }
        if body.is_empty() {
            return Err(ParseError::MissingField(Field::Body));
        }

        Ok(RawFields {
            title,
            subtitle: None,
            published: extract::first_attr(&doc, &DATE, "datetime"),
            body,
            utc_offset: extract::argentina_offset(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://noticiasmercedinas.com/site/2024/03/15/corte-de-luz/").unwrap()
    }

    #[test]
    fn test_parse_prefers_article_paragraphs() {
        let page = r#"<header><p>Menú</p></header>
            <article><h1>Corte de luz programado</h1>
              <time datetime="2024-03-15T09:00:00-03:00">15 marzo</time>
              <p>La cooperativa anunció un corte.</p>
            </article>
            <footer><p>© Noticias Mercedinas</p></footer>"#;
        let fields = NoticiasMercedinas::new().parse(page.as_bytes(), &url()).unwrap();
        assert_eq!(fields.title, "Corte de luz programado");
        assert_eq!(fields.published.as_deref(), Some("2024-03-15T09:00:00-03:00"));
        assert_eq!(fields.body, "La cooperativa anunció un corte.");
        assert_eq!(fields.subtitle, None);
    }

    #[test]
    fn test_parse_falls_back_to_all_paragraphs() {
        let page = "<h1>Título</h1><div><p>Uno.</p><p>Dos.</p></div>";
        let fields = NoticiasMercedinas::new().parse(page.as_bytes(), &url()).unwrap();
        assert_eq!(fields.body, "Uno. Dos.");
        assert_eq!(fields.published, None);
    }

    #[test]
    fn test_rate_limit_is_stricter_than_default() {
        let limit = NoticiasMercedinas::new().rate_limit(HostLimit {
            max_concurrent: 4,
            min_interval: Duration::from_millis(500),
        });
        assert_eq!(limit.max_concurrent, 1);
        assert_eq!(limit.min_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_listing_is_paginated() {
        let listing = NoticiasMercedinas::new().listing();
        assert_eq!(listing.hosts(), vec!["noticiasmercedinas.com".to_string()]);
        assert!(matches!(listing, Listing::Paginated { first: 1, last: 3, .. }));
    }

    #[test]
    fn test_link_pattern() {
        let p = NoticiasMercedinas::new();
        assert!(p.link_pattern().is_match(url().as_str()));
        assert!(!p.link_pattern().is_match("https://noticiasmercedinas.com/site/page/2/"));
    }
}
