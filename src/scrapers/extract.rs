//! Field and link extraction helpers shared by every site adapter.
//!
//! HTML goes through `scraper`; RSS, Atom and sitemap documents through a
//! streaming `quick-xml` reader. Nothing here panics on malformed markup:
//! missing elements simply yield `None` or an empty result.

use crate::error::ParseError;
use chrono::FixedOffset;
use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::encoding::Decoder;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, BytesStart, Event};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// Local time of the Argentine outlets: UTC-3, no daylight saving.
pub fn argentina_offset() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).expect("UTC-3 is a valid offset")
}

/// Parse a fetched page. Invalid UTF-8 is replaced rather than rejected, and
/// html5ever recovers from any malformed markup.
pub fn document(raw: &[u8]) -> Html {
    Html::parse_document(&String::from_utf8_lossy(raw))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Text of the first matching element that has any.
pub fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .map(element_text)
        .find(|text| !text.is_empty())
}

/// Text of every matching element, joined with single spaces.
pub fn joined_text(doc: &Html, selector: &Selector) -> String {
    doc.select(selector)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trimmed, non-empty attribute value of the first element carrying it.
pub fn first_attr(doc: &Html, selector: &Selector, attr: &str) -> Option<String> {
    doc.select(selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Every `a[href]` in the page, resolved against `base`.
pub fn html_links(doc: &Html, base: &Url) -> Vec<Url> {
    doc.select(&ANCHOR)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .collect()
}

/// Keep links whose absolute form matches `pattern`, in document order.
pub fn matching(links: impl IntoIterator<Item = Url>, pattern: &Regex) -> Vec<Url> {
    links
        .into_iter()
        .filter(|url| pattern.is_match(url.as_str()))
        .collect()
}

/// `href` of an Atom `<link>` that points at the entry itself.
fn atom_href(e: &BytesStart<'_>, decoder: Decoder) -> Result<Option<String>, quick_xml::Error> {
    let mut href = None;
    let mut rel = None;
    for attr in e.attributes().with_checks(false).flatten() {
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(attr.decode_and_unescape_value(decoder)?.into_owned()),
            b"rel" => rel = Some(attr.decode_and_unescape_value(decoder)?.into_owned()),
            _ => {}
        }
    }
    Ok(match rel.as_deref() {
        None | Some("alternate") => href,
        Some(_) => None,
    })
}

/// Text behind `&name;`: character references and the five predefined
/// entities. Unknown entities resolve to nothing.
fn resolve_ref(r: &BytesRef<'_>) -> Result<String, quick_xml::Error> {
    if let Some(ch) = r.resolve_char_ref()? {
        return Ok(ch.to_string());
    }
    let name = r.decode()?;
    Ok(resolve_predefined_entity(&name).unwrap_or_default().to_string())
}

fn feed_error(reader: &Reader<&[u8]>, e: impl std::fmt::Display) -> ParseError {
    ParseError::Feed(format!("at byte {}: {e}", reader.buffer_position()))
}

fn is_entry(name: &[u8]) -> bool {
    matches!(name, b"item" | b"entry" | b"url")
}

/// Article links from an RSS 2.0 (`<item><link>`), Atom
/// (`<entry><link href>`) or sitemap (`<url><loc>`) document.
pub fn feed_links(raw: &[u8]) -> Result<Vec<String>, ParseError> {
    let mut reader = Reader::from_reader(raw);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut links = Vec::new();
    let mut in_entry = false;
    let mut capture: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if is_entry(name.as_ref()) {
                    in_entry = true;
                } else if in_entry && name.as_ref() == b"link" {
                    match atom_href(&e, reader.decoder()).map_err(|err| feed_error(&reader, err))? {
                        Some(href) => links.push(href),
                        None if e.attributes().count() == 0 => capture = Some(String::new()),
                        None => {}
                    }
                } else if in_entry && name.as_ref() == b"loc" {
                    capture = Some(String::new());
                }
            }
            Ok(Event::Empty(e)) => {
                if in_entry && e.local_name().as_ref() == b"link" {
                    links.extend(
                        atom_href(&e, reader.decoder()).map_err(|err| feed_error(&reader, err))?,
                    );
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(text) = capture.as_mut() {
                    text.push_str(&t.decode().map_err(|err| feed_error(&reader, err))?);
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(text) = capture.as_mut() {
                    text.push_str(&t.decode().map_err(|err| feed_error(&reader, err))?);
                }
            }
            Ok(Event::GeneralRef(r)) => {
                if let Some(text) = capture.as_mut() {
                    text.push_str(&resolve_ref(&r).map_err(|err| feed_error(&reader, err))?);
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if is_entry(name.as_ref()) {
                    in_entry = false;
                    capture = None;
                } else if matches!(name.as_ref(), b"link" | b"loc") {
                    if let Some(text) = capture.take() {
                        let text = text.trim();
                        if !text.is_empty() {
                            links.push(text.to_string());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(feed_error(&reader, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(links)
}
