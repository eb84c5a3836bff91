//! El Tribuno (Salta) article scraper.
//!
//! Article URLs embed the publication day (`/seccion/2024-3-15-10-30-0-slug`).
//! The page exposes the creation timestamp on an `input` element's
//! `data-fecha_c` attribute, and the body sits in the AMP-gated note block.

use super::{Listing, SourceAdapter, extract};
use crate::error::{Field, ParseError};
use crate::models::RawFields;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;
use url::Url;

const HOME_URL: &str = "https://www.eltribuno.com/";

static LINK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://www\.eltribuno\.com/[^/]+/\d{4}-\d{1,2}-\d{1,2}-[^?#]*$").unwrap()
});

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static DATE: Lazy<Selector> = Lazy::new(|| Selector::parse("input[data-fecha_c]").unwrap());
static SUBTITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("div.articulo__intro").unwrap());
static BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[amp-access="mostrarNota"] p"#).unwrap());

#[derive(Debug, Default)]
pub struct ElTribuno;

impl ElTribuno {
    pub fn new() -> Self {
        Self
    }
}

impl SourceAdapter for ElTribuno {
    fn source_name(&self) -> &str {
        "eltribuno"
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
            published: extract::first_attr(&doc, &DATE, "data-fecha_c"),
            body,
            utc_offset: extract::argentina_offset(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_article() {
        let page = r#"<body>
            <input type="hidden" data-fecha_c="2024-03-15 08:15:00">
            <h1>Corte de ruta en Güemes</h1>
            <div class="articulo__intro">Vecinos reclaman por el agua.</div>
            <div amp-access="mostrarNota">
              <p>Desde temprano, la ruta 34 permanece cortada.</p>
              <p>Se esperan novedades.</p>
            </div></body>"#;
        let url = Url::parse("https://www.eltribuno.com/salta/2024-3-15-8-15-0-corte-de-ruta").unwrap();
        let fields = ElTribuno::new().parse(page.as_bytes(), &url).unwrap();
        assert_eq!(fields.title, "Corte de ruta en Güemes");
        assert_eq!(fields.subtitle.as_deref(), Some("Vecinos reclaman por el agua."));
        assert_eq!(fields.published.as_deref(), Some("2024-03-15 08:15:00"));
        assert_eq!(
            fields.body,
            "Desde temprano, la ruta 34 permanece cortada. Se esperan novedades."
        );
    }

    #[test]
    fn test_missing_title() {
        let url = Url::parse("https://www.eltribuno.com/salta/2024-3-15-x").unwrap();
        assert_eq!(
            ElTribuno::new().parse(b"<div amp-access=\"mostrarNota\"><p>x</p></div>", &url),
            Err(ParseError::MissingField(Field::Title))
        );
    }

    #[test]
    fn test_link_pattern() {
        let p = ElTribuno::new();
        assert!(p.link_pattern().is_match(
            "https://www.eltribuno.com/salta/2024-3-15-8-15-0-corte-de-ruta"
        ));
        assert!(!p.link_pattern().is_match("https://www.eltribuno.com/salta/seccion/policiales"));
    }
}
