use thiserror::Error;

#[derive(Error, Debug)]
pub enum TributaryError {
    #[error("Storage failure: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unreadable feed document: {0}")]
    FeedParse(String),

    #[error("Unusable feed item: {0}")]
    ItemParse(String),

    #[error("Bad feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("No feeds to poll; add one first")]
    NoFeeds,

    #[error("No feed matching {0}")]
    FeedNotFound(String),

    #[error("No user named {0}")]
    UserNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TributaryError>;
