//! Conversion of raw adapter output into canonical [`ArticleRecord`]s.
//!
//! Responsibilities:
//! - whitespace and control-character cleanup of every text field
//! - publication-date parsing across the formats news sites actually use,
//!   normalized to UTC (unparseable dates become `null` plus a raw side field)
//! - required-field validation
//! - URL canonicalization and deduplication against the [`SharedDedupIndex`]

use crate::dedup::{DedupKey, SharedDedupIndex};
use crate::error::ValidationError;
use crate::models::{ArticleRecord, RawFields};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};
use url::{Url, form_urlencoded};

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static RE_SPANISH_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\d{1,2})\s+de\s+([a-záéíóú]+)(?:\s+de)?\s+(\d{4})(?:\D{1,8}?(\d{1,2}):(\d{2}))?",
    )
    .unwrap()
});

/// Query parameters that only identify a campaign or referrer.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "mc_cid", "mc_eid", "igshid", "_ga", "ref", "ref_src",
];

const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%z",
];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];

/// Strip control and zero-width characters, collapse whitespace, trim.
pub fn clean_text(s: &str) -> String {
    let stripped: String = s
        .chars()
        .filter(|c| !matches!(c, '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{feff}'))
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    RE_WS.replace_all(&stripped, " ").trim().to_string()
}

fn spanish_month(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "enero" => 1,
        "febrero" => 2,
        "marzo" => 3,
        "abril" => 4,
        "mayo" => 5,
        "junio" => 6,
        "julio" => 7,
        "agosto" => 8,
        "septiembre" | "setiembre" => 9,
        "octubre" => 10,
        "noviembre" => 11,
        "diciembre" => 12,
        _ => return None,
    };
    Some(month)
}

fn local_to_utc(naive: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_spanish(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let caps = RE_SPANISH_DATE.captures(raw)?;
    let day: u32 = caps.get(1)?.as_str().parse().ok()?;
    let month = spanish_month(caps.get(2)?.as_str())?;
    let year: i32 = caps.get(3)?.as_str().parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let (hour, minute) = match (caps.get(4), caps.get(5)) {
        (Some(h), Some(m)) => (h.as_str().parse().ok()?, m.as_str().parse().ok()?),
        _ => (0, 0),
    };
    local_to_utc(date.and_hms_opt(hour, minute, 0)?, offset)
}

/// Parse a publication date in any supported format.
///
/// Values without zone information are read in `offset`, the site's local
/// time. Returns `None` when nothing matches.
pub fn parse_published(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return local_to_utc(naive, offset);
        }
    }
    for fmt in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return local_to_utc(date.and_hms_opt(0, 0, 0)?, offset);
        }
    }
    parse_spanish(raw, offset)
}

fn is_tracking_param(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name.as_str())
}

/// Canonical form of an article URL.
///
/// Scheme and host are already lowercased (and default ports dropped) by
/// [`Url`] parsing; this additionally drops the fragment and tracking query
/// parameters. Remaining query segments keep their original spelling.
pub fn canonical_url(url: &Url) -> Url {
    let mut canonical = url.clone();
    canonical.set_fragment(None);

    let Some(query) = canonical.query() else {
        return canonical;
    };
    // Segments are kept exactly as served; only the key is decoded for the check.
    let kept: Vec<&str> = query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .filter(|segment| {
            form_urlencoded::parse(segment.as_bytes())
                .next()
                .is_none_or(|(key, _)| !is_tracking_param(&key))
        })
        .collect();
    let rebuilt = kept.join("&");
    if rebuilt.is_empty() {
        canonical.set_query(None);
    } else if rebuilt != query {
        canonical.set_query(Some(&rebuilt));
    }
    canonical
}

/// Dedup key of an article: its source plus the [`canonical_url`].
///
/// # Examples
///
/// ```ignore
/// let url = Url::parse("https://a.example/n?utm_source=x#top").unwrap();
/// assert_eq!(dedup_key("A", &url), DedupKey::new("A", "https://a.example/n"));
/// ```
pub fn dedup_key(source_name: &str, url: &Url) -> DedupKey {
    DedupKey::new(source_name, canonical_url(url).to_string())
}

/// Outcome of normalizing one parsed page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Fresh(ArticleRecord),
    /// Already emitted within the retention window; dropped from the batch.
    Duplicate(DedupKey),
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    dedup: SharedDedupIndex,
}

impl Normalizer {
    pub fn new(dedup: SharedDedupIndex) -> Self {
        Self { dedup }
    }

    #[instrument(level = "debug", skip_all, fields(source = %source_name, %url))]
    pub fn normalize(
        &self,
        source_name: &str,
        url: &Url,
        raw: RawFields,
    ) -> Result<Normalized, ValidationError> {
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ValidationError::BadUrl(url.to_string()));
        }

        let title = clean_text(&raw.title);
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        let body_text = clean_text(&raw.body);
        if body_text.is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        let subtitle = raw
            .subtitle
            .as_deref()
            .map(clean_text)
            .filter(|s| !s.is_empty());

        let published_raw = raw
            .published
            .as_deref()
            .map(clean_text)
            .filter(|s| !s.is_empty());
        let published_at = published_raw
            .as_deref()
            .and_then(|s| parse_published(s, raw.utc_offset));
        let published_at_raw = match (&published_at, published_raw) {
            (None, Some(unparsed)) => {
                debug!(raw = %unparsed, "Unparseable publication date kept raw");
                Some(unparsed)
            }
            _ => None,
        };

        let key = dedup_key(source_name, url);
        if !self.dedup.insert(key.clone(), Utc::now()) {
            debug!("Suppressing already-emitted article");
            return Ok(Normalized::Duplicate(key));
        }

        Ok(Normalized::Fresh(ArticleRecord {
            title,
            published_at,
            body_text,
            url: key.url,
            source_name: source_name.to_string(),
            subtitle,
            published_at_raw,
        }))
    }
}
