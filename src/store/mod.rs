pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{Feed, NewPost, Post, User};

pub use sqlite::SqliteStore;

pub trait Store {
    // User operations
    fn get_or_create_user(&self, name: &str) -> Result<User>;
    fn get_user(&self, id: i64) -> Result<Option<User>>;
    fn get_user_by_name(&self, name: &str) -> Result<Option<User>>;

    // Feed operations
    fn add_feed(&self, feed: &Feed) -> Result<i64>;
    fn get_feed(&self, id: i64) -> Result<Option<Feed>>;
    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>>;
    fn get_all_feeds(&self) -> Result<Vec<Feed>>;

    // Polling operations
    /// The feed polled least recently; never-polled feeds come first.
    fn get_next_feed_to_fetch(&self) -> Result<Option<Feed>>;
    /// Records a poll at `at`. The stored timestamp never moves backwards.
    fn mark_feed_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<Feed>;
    /// Selects and marks the next feed in one transaction.
    fn claim_next_feed(&self, at: DateTime<Utc>) -> Result<Option<Feed>>;

    // Post operations
    fn get_post_by_url(&self, feed_id: i64, url: &str) -> Result<Option<Post>>;
    fn create_post(&self, post: &NewPost) -> Result<Post>;
    fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>>;
    fn get_posts_for_user(&self, user_id: i64, limit: usize) -> Result<Vec<Post>>;
}
