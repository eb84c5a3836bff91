//! La Política Online article scraper.

use super::{Listing, SourceAdapter, extract};
use crate::error::{Field, ParseError};
use crate::models::RawFields;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;
use url::Url;

const HOME_URL: &str = "https://www.lapoliticaonline.com/";

static LINK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://www\.lapoliticaonline\.com/[^/]+/[a-z0-9\-]+/?$").unwrap()
});

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("div.title").unwrap());
static DATE: Lazy<Selector> = Lazy::new(|| Selector::parse("span.time").unwrap());
static SUBTITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("div.description").unwrap());
static BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[class="zleft z75"] p"#).unwrap());

#[derive(Debug, Default)]
pub struct LaPoliticaOnline;

impl LaPoliticaOnline {
    pub fn new() -> Self {
        Self
    }
}

impl SourceAdapter for LaPoliticaOnline {
    fn source_name(&self) -> &str {
        "lapoliticaonline"
    }

    fn listing(&self) -> Listing {
        Listing::Seeds(Url::parse(HOME_URL).into_iter().collect())
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
            subtitle: extract::first_text(&doc, &SUBTITLE),
            published: extract::first_text(&doc, &DATE),
            body,
            utc_offset: extract::argentina_offset(),
        })
    }
}
