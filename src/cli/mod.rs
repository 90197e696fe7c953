pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const DEFAULT_BROWSE_LIMIT: usize = 2;

#[derive(Parser)]
#[command(name = "tributary")]
#[command(about = "Polls RSS/Atom feeds and keeps every new post", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/tributary/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database file, overriding the config
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a feed for the current user
    Add {
        /// Display name of the feed
        name: String,
        /// URL of the feed
        url: String,
    },
    /// List registered feeds
    Feeds,
    /// Show recent posts from the current user's feeds
    Browse {
        /// Number of posts to show
        #[arg(short, long, default_value_t = DEFAULT_BROWSE_LIMIT)]
        limit: usize,
    },
    /// Poll feeds until interrupted
    Agg {
        /// Time between polls (e.g. "30s", "1m30s", "1h"); defaults to the config value
        interval: Option<String>,

        /// Feeds polled concurrently per tick
        #[arg(short, long)]
        workers: Option<usize>,
    },
}
