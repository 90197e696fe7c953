pub mod http_fetcher;
pub mod parse;

use std::sync::Arc;

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::ParsedDocument;

pub use parse::parse_document;

#[async_trait]
pub trait Fetcher {
    /// Returns the full response body. Non-success statuses are errors.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches a feed and parses it into a [`ParsedDocument`].
#[derive(Clone)]
pub struct ContentFetcher {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
}

impl ContentFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        Self { fetcher }
    }

    pub async fn fetch_document(&self, url: &str) -> Result<ParsedDocument> {
        let body = self.fetcher.fetch(url).await?;
        tracing::debug!("Fetched {} bytes from {}", body.len(), url);

        parse_document(&body)
    }
}
