use scraper::{ElementRef, Html, Node};

use crate::app::{Result, TributaryError};
use crate::domain::HyperlinkFragment;

/// Cheap textual pre-check: the whole string opens with `<a` and closes
/// with `</a>`.
pub fn looks_like_anchor(description: &str) -> bool {
    let s = description.trim();
    let opens = s
        .strip_prefix("<a")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_whitespace() || c == '>');

    opens && s.ends_with("</a>")
}

/// Extracts the anchor when `description` is exactly one `<a>` element.
///
/// Returns `Ok(None)` for anything else, including descriptions that merely
/// contain links. An anchor wrapper without an `href` is an error since the
/// item link cannot be corrected from it.
pub fn extract_anchor(description: &str) -> Result<Option<HyperlinkFragment>> {
    if !looks_like_anchor(description) {
        return Ok(None);
    }

    let fragment = Html::parse_fragment(description.trim());
    let root = fragment.root_element();

    let mut anchor = None;
    for child in root.children() {
        match child.value() {
            Node::Text(text) if text.trim().is_empty() => continue,
            Node::Element(element) if element.name() == "a" && anchor.is_none() => {
                anchor = ElementRef::wrap(child);
            }
            _ => return Ok(None),
        }
    }

    let Some(anchor) = anchor else {
        return Err(TributaryError::ItemParse(format!(
            "description looks like an anchor but none was parsed: {}",
            description
        )));
    };

    let href = anchor
        .value()
        .attr("href")
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .ok_or_else(|| {
            TributaryError::ItemParse(format!("anchor without href: {}", description))
        })?;

    Ok(Some(HyperlinkFragment {
        href: href.to_string(),
        target: anchor.value().attr("target").map(String::from),
        text: anchor.text().collect::<String>().trim().to_string(),
    }))
}
