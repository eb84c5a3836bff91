//! La Nación article scraper.
//!
//! The site renders dates as free text, but every article slug ends in
//! `-nidDDMMYYYY...`, so the publication day is taken from the URL and the
//! `<time>` text is only a fallback.

use super::{Listing, SourceAdapter, extract};
use crate::error::{Field, ParseError};
use crate::models::RawFields;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;
use url::Url;

const HOME_URL: &str = "https://www.lanacion.com.ar/";

static LINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://www\.lanacion\.com\.ar/[^/]+/.+-nid\d+/?$").unwrap());
static NID_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-nid(\d{2})(\d{2})(\d{4})").unwrap());

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static SUBTITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h2").unwrap());
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("section.cuerpo__nota p").unwrap());

#[derive(Debug, Default)]
pub struct LaNacion;

impl LaNacion {
    pub fn new() -> Self {
        Self
    }
}

/// `-nid15032024` → `2024-03-15`.
fn date_from_url(url: &Url) -> Option<String> {
    let caps = NID_DATE.captures(url.path())?;
    Some(format!("{}-{}-{}", &caps[3], &caps[2], &caps[1]))
}

impl SourceAdapter for LaNacion {
    fn source_name(&self) -> &str {
        "lanacion"
    }

    fn listing(&self) -> Listing {
        Listing::Seeds(Url::parse(HOME_URL).into_iter().collect())
    }

    fn link_pattern(&self) -> &Regex {
        &LINK_PATTERN
    }

    fn parse(&self, raw: &[u8], url: &Url) -> Result<RawFields, ParseError> {
        let doc = extract::document(raw);

        let title =
            extract::first_text(&doc, &TITLE).ok_or(ParseError::MissingField(Field::Title))?;
        let body = extract::joined_text(&doc, &BODY);
        if body.is_empty() {
            return Err(ParseError::MissingField(Field::Body));
        }
        let published = date_from_url(url).or_else(|| {
            let text = extract::joined_text(&doc, &TIME);
            (!text.is_empty()).then_some(text)
        });

        Ok(RawFields {
            title,
            subtitle: extract::first_text(&doc, &SUBTITLE),
            published,
            body,
            utc_offset: extract::argentina_offset(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<article>
        <h1>Inflación de marzo</h1>
        <h2>El índice se ubicó por debajo de lo esperado</h2>
        <time>15 de marzo de 2024</time>
        <section class="cuerpo__nota">
          <p>El Indec informó el dato mensual.</p>
          <p>Los analistas esperaban más.</p>
        </section></article>"#;

    #[test]
    fn test_date_comes_from_nid() {
        let url = Url::parse(
            "https://www.lanacion.com.ar/economia/inflacion-de-marzo-nid15032024/",
        )
        .unwrap();
        let fields = LaNacion::new().parse(PAGE.as_bytes(), &url).unwrap();
        assert_eq!(fields.title, "Inflación de marzo");
        assert_eq!(
            fields.subtitle.as_deref(),
            Some("El índice se ubicó por debajo de lo esperado")
        );
        assert_eq!(fields.published.as_deref(), Some("2024-03-15"));
        assert_eq!(
            fields.body,
            "El Indec informó el dato mensual. Los analistas esperaban más."
        );
    }

    #[test]
    fn test_date_falls_back_to_time_text() {
        let url = Url::parse("https://www.lanacion.com.ar/economia/inflacion-nid123/").unwrap();
        let fields = LaNacion::new().parse(PAGE.as_bytes(), &url).unwrap();
        assert_eq!(fields.published.as_deref(), Some("15 de marzo de 2024"));
    }

    #[test]
    fn test_link_pattern() {
        let p = LaNacion::new();
        assert!(p.link_pattern().is_match(
            "https://www.lanacion.com.ar/economia/inflacion-de-marzo-nid15032024/"
        ));
        assert!(!p.link_pattern().is_match("https://www.lanacion.com.ar/economia/"));
    }
}
