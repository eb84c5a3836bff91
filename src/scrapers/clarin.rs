//! Clarín article scraper.
//!
//! Candidates come from the "lo último" RSS feed, which lists the newest
//! stories across every section. Article pages carry the publication date in
//! `meta[name="date"]` and the lead in the meta description.

use super::{Listing, SourceAdapter, extract};
use crate::error::{Field, ParseError};
use crate::models::RawFields;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;
use url::Url;

const FEED_URL: &str = "https://www.clarin.com/rss/lo-ultimo/";

static LINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://www\.clarin\.com/[^/?#]+/[^?#]+\.html$").unwrap());

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static DATE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[name="date"], meta[property="article:published_time"]"#).unwrap()
});
static SUBTITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="description"]"#).unwrap());
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("div#cuerpo p").unwrap());

#[derive(Debug, Default)]
pub struct Clarin;

impl Clarin {
    pub fn new() -> Self {
        Self
    }
}

impl SourceAdapter for Clarin {
    fn source_name(&self) -> &str {
        "clarin"
    }

    fn listing(&self) -> Listing {
        match Url::parse(FEED_URL) {
            Ok(url) => Listing::Feed(url),
            Err(_) => Listing::Seeds(Vec::new()),
        }
    }

    fn link_pattern(&self) -> &Regex {
        &LINK_PATTERN
    }

    fn parse(&self, raw: &[u8], _url: &Url) -> Result<RawFields, ParseError> {
        let doc = extract::document(raw);

        let title =
            extract::first_text(&doc, &TITLE).ok_or(ParseError::MissingField(Field::Title))?;
        let body = extract::joined_text(&doc, &BODY);
        if body.is_empty() {
            return Err(ParseError::MissingField(Field::Body));
        }

        Ok(RawFields {
            title,
            subtitle: extract::first_attr(&doc, &SUBTITLE, "content"),
            published: extract::first_attr(&doc, &DATE, "content"),
            body,
            utc_offset: extract::argentina_offset(),
        })
    }
}
