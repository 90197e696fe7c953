//! # Tributary
//!
//! A feed aggregator that polls RSS/Atom feeds on a fixed interval and
//! keeps every new post in SQLite.
//!
//! ## Architecture
//!
//! Each tick of the poller runs one pass of the pipeline:
//!
//! ```text
//! Scheduler → Fetcher → Normalizer → Ingest → Store
//! ```
//!
//! - [`scheduler`]: claims the least recently polled feed and drives ingestion
//! - [`fetcher`]: downloads and parses a feed document
//! - [`normalizer`]: cleans up entries (entities, bare-link descriptions, dates)
//! - [`ingest`]: stores entries whose link is not known yet
//! - [`store`]: SQLite persistence layer
//!
//! ## Quick Start
//!
//! ```bash
//! # Register a feed for the user named in config.toml
//! tributary add "Rust Blog" https://blog.rust-lang.org/feed.xml
//!
//! # List feeds
//! tributary feeds
//!
//! # Poll every 30 seconds until Ctrl-C
//! tributary agg 30s
//!
//! # Show the latest posts
//! tributary browse --limit 5
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// store, fetcher, normalizer.
pub mod app;

/// Command-line interface using clap.
///
/// - `add <name> <url>` - Register a feed
/// - `feeds` - List feeds
/// - `browse [--limit N]` - Show recent posts
/// - `agg [interval] [--workers N]` - Run the poller
pub mod cli;

/// Configuration loaded from `~/.config/tributary/config.toml`.
pub mod config;

/// Core domain models.
///
/// - [`User`](domain::User), [`Feed`](domain::Feed) and [`Post`](domain::Post): stored records
/// - [`ParsedDocument`](domain::ParsedDocument): a feed as downloaded
/// - [`NormalizedItem`](domain::NormalizedItem): an entry ready to store
pub mod domain;

/// Content fetching.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait returning a raw body
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
/// - [`ContentFetcher`](fetcher::ContentFetcher): fetch + parse into a [`ParsedDocument`](domain::ParsedDocument)
pub mod fetcher;

/// Turns a feed into new posts, skipping links already stored.
pub mod ingest;

/// Per-entry cleanup: HTML entity decoding, bare-hyperlink descriptions,
/// publication date parsing.
pub mod normalizer;

/// The polling loop.
///
/// - [`Scheduler`](scheduler::Scheduler): claims feeds oldest first and ingests them each tick
/// - [`parse_interval`](scheduler::parse_interval): interval strings such as `"1m30s"`
pub mod scheduler;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;
