use feed_rs::parser;
use html_escape::decode_html_entities;
use rss::Channel;

use crate::app::{Result, TributaryError};
use crate::domain::{ParsedDocument, ParsedItem};
use crate::normalizer::PUBLISHED_FORMAT;

/// Parses a fetched body into a [`ParsedDocument`].
///
/// RSS 2.0 is read with the `rss` crate so the raw `pubDate` survives
/// untouched. Anything else (Atom, RSS 1.0, JSON Feed) goes through
/// `feed-rs`, with its parsed dates rendered back into the RSS layout.
/// Titles and descriptions come back entity-decoded.
pub fn parse_document(body: &[u8]) -> Result<ParsedDocument> {
    let mut document = match Channel::read_from(body) {
        Ok(channel) => from_rss(&channel),
        Err(rss_err) => match parser::parse(body) {
            Ok(feed) => from_feed_rs(feed),
            Err(e) => {
                tracing::debug!("feed-rs fallback failed: {}", e);
                return Err(TributaryError::FeedParse(rss_err.to_string()));
            }
        },
    };

    decode_document(&mut document);
    Ok(document)
}

fn from_rss(channel: &Channel) -> ParsedDocument {
    let items = channel
        .items()
        .iter()
        .map(|item| ParsedItem {
            title: item.title().unwrap_or_default().to_string(),
            link: item.link().unwrap_or_default().to_string(),
            description: item.description().unwrap_or_default().to_string(),
            published: item.pub_date().unwrap_or_default().to_string(),
        })
        .collect();

    ParsedDocument {
        title: channel.title().to_string(),
        link: channel.link().to_string(),
        description: channel.description().to_string(),
        items,
    }
}

fn from_feed_rs(feed: feed_rs::model::Feed) -> ParsedDocument {
    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let description = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();

            ParsedItem {
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                link: entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default(),
                description,
                published: entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.format(PUBLISHED_FORMAT).to_string())
                    .unwrap_or_default(),
            }
        })
        .collect();

    ParsedDocument {
        title: feed.title.map(|t| t.content).unwrap_or_default(),
        link: feed
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default(),
        description: feed.description.map(|d| d.content).unwrap_or_default(),
        items,
    }
}

fn decode_document(document: &mut ParsedDocument) {
    document.title = decode_html_entities(&document.title).into_owned();
    document.description = decode_html_entities(&document.description).into_owned();

    for item in &mut document.items {
        item.title = decode_html_entities(&item.title).into_owned();
        item.description = decode_html_entities(&item.description).into_owned();
    }
}
