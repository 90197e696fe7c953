//! Transient shapes produced while a feed is being ingested. None of these
//! are persisted.

use chrono::{DateTime, Utc};

/// One fetched feed: channel metadata plus its items in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<ParsedItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Raw publication date as it appeared in the document.
    pub published: String,
}

/// The single anchor element a description consisted of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperlinkFragment {
    pub href: String,
    pub target: Option<String>,
    pub text: String,
}

/// A parsed item after decoding, hyperlink fallback and date parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published_at: Option<DateTime<Utc>>,
}
