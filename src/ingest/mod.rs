//! One ingestion pass over a single feed.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::app::Result;
use crate::domain::{Feed, NewPost};
use crate::fetcher::ContentFetcher;
use crate::normalizer::Normalizer;
use crate::store::Store;

/// Counts for one pass. `fetched` is the number of items in the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub fetched: usize,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl IngestOutcome {
    /// Nothing new was stored.
    pub fn is_noop(&self) -> bool {
        self.created == 0
    }
}

pub struct Ingestor<S: Store> {
    store: Arc<S>,
    fetcher: ContentFetcher,
    normalizer: Normalizer,
}

impl<S: Store> Ingestor<S> {
    pub fn new(store: Arc<S>, fetcher: ContentFetcher, normalizer: Normalizer) -> Self {
        Self {
            store,
            fetcher,
            normalizer,
        }
    }

    /// Fetches `feed` and stores every item whose link this feed has not
    /// stored before.
    ///
    /// Only fetch and parse failures are returned. Problems with a single
    /// item are logged and counted in [`IngestOutcome::failed`].
    pub async fn ingest_feed(&self, feed: &Feed) -> Result<IngestOutcome> {
        let document = self.fetcher.fetch_document(&feed.url).await?;

        let mut outcome = IngestOutcome {
            fetched: document.items.len(),
            ..Default::default()
        };

        if document.items.is_empty() {
            debug!("No items in {}", feed.url);
            return Ok(outcome);
        }

        for item in &document.items {
            let normalized = match self.normalizer.normalize(item) {
                Ok(normalized) => normalized,
                Err(e) => {
                    warn!("Skipping item {:?} from {}: {}", item.title, feed.url, e);
                    outcome.failed += 1;
                    continue;
                }
            };

            if normalized.link.is_empty() {
                warn!("Skipping item {:?} from {}: no link", normalized.title, feed.url);
                outcome.failed += 1;
                continue;
            }

            match self.store.get_post_by_url(feed.id, &normalized.link) {
                Ok(Some(_)) => {
                    outcome.skipped += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Lookup failed for {}: {}", normalized.link, e);
                    outcome.failed += 1;
                    continue;
                }
            }

            let post = NewPost::new(
                feed.id,
                normalized.title,
                normalized.link,
                normalized.description,
            )
            .published_at(normalized.published_at);

            match self.store.create_post(&post) {
                Ok(_) => outcome.created += 1,
                Err(e) => {
                    warn!("Failed to store {}: {}", post.url, e);
                    outcome.failed += 1;
                }
            }
        }

        Ok(outcome)
    }
}
