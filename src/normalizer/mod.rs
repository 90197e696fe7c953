pub mod anchor;

use chrono::{DateTime, Utc};
use html_escape::decode_html_entities;

use crate::app::Result;
use crate::domain::{NormalizedItem, ParsedItem};

/// RSS `pubDate` layout with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
pub const PUBLISHED_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

#[derive(Clone)]
pub struct Normalizer;

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Corrects one parsed item for storage.
    ///
    /// Fails only when the description is an anchor wrapper that cannot be
    /// used; a bad publication date just leaves `published_at` unset.
    pub fn normalize(&self, item: &ParsedItem) -> Result<NormalizedItem> {
        let title = decode_html_entities(item.title.trim()).into_owned();
        let mut link = item.link.trim().to_string();
        let mut description = decode_html_entities(&item.description).into_owned();

        if let Some(fragment) = anchor::extract_anchor(&description)? {
            tracing::debug!("Using anchor {} as link for {:?}", fragment.href, title);
            link = fragment.href;
            description = fragment.text;
        }

        Ok(NormalizedItem {
            title,
            link,
            description,
            published_at: parse_published(&item.published),
        })
    }
}

/// Parses a publication date, preferring the numeric-zone layout and
/// accepting any RFC 2822 date (e.g. a `GMT` zone) after that.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match DateTime::parse_from_str(raw, PUBLISHED_FORMAT) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => match DateTime::parse_from_rfc2822(raw) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(_) => {
                tracing::warn!("Unparseable publication date {:?}: {}", raw, e);
                None
            }
        },
    }
}
