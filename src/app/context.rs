use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::app::error::{Result, TributaryError};
use crate::config::Config;
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::{ContentFetcher, Fetcher};
use crate::ingest::Ingestor;
use crate::normalizer::Normalizer;
use crate::store::sqlite::SqliteStore;

/// Everything a command needs, built once by `main` and passed down.
pub struct AppContext {
    pub store: Arc<SqliteStore>,
    pub fetcher: ContentFetcher,
    pub normalizer: Normalizer,
}

impl AppContext {
    /// Builds the context from config. `db_path` overrides `database.path`.
    pub fn with_config(config: &Config, db_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path.or_else(|| config.database.path.clone()) {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        let store = Arc::new(SqliteStore::new(&db_path)?);
        let http: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::with_settings(
            &config.poller.user_agent,
            Duration::from_secs(config.poller.timeout_secs),
        )?);

        Ok(Self {
            store,
            fetcher: ContentFetcher::new(http),
            normalizer: Normalizer::new(),
        })
    }

    pub fn in_memory(fetcher: Arc<dyn Fetcher + Send + Sync>) -> Result<Self> {
        Ok(Self {
            store: Arc::new(SqliteStore::in_memory()?),
            fetcher: ContentFetcher::new(fetcher),
            normalizer: Normalizer::new(),
        })
    }

    pub fn ingestor(&self) -> Ingestor<SqliteStore> {
        Ingestor::new(
            self.store.clone(),
            self.fetcher.clone(),
            self.normalizer.clone(),
        )
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| TributaryError::Config("Could not find data directory".into()))?;
        let tributary_dir = data_dir.join("tributary");
        std::fs::create_dir_all(&tributary_dir)?;
        Ok(tributary_dir.join("tributary.db"))
    }
}
