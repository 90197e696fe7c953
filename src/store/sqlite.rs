use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};
use uuid::Uuid;

use crate::app::{Result, TributaryError};
use crate::domain::{Feed, NewPost, Post, User};
use crate::store::Store;

const FEED_COLUMNS: &str = "id, url, name, user_id, last_fetched_at, created_at, updated_at";
const POST_COLUMNS: &str =
    "id, feed_id, title, url, description, published_at, created_at, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;

        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| TributaryError::Other(format!("Migration failed: {}", e)))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            TributaryError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    /// Fixed-width UTC so that text order matches time order in SQL.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn feed_from_row(row: &Row<'_>) -> rusqlite::Result<Feed> {
        Ok(Feed {
            id: row.get(0)?,
            url: row.get(1)?,
            name: row.get(2)?,
            user_id: row.get(3)?,
            last_fetched_at: row
                .get::<_, Option<String>>(4)?
                .and_then(|s| Self::parse_datetime(&s)),
            created_at: row
                .get::<_, String>(5)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
            updated_at: row
                .get::<_, String>(6)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }

    fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
        let id: String = row.get(0)?;
        let id = Uuid::parse_str(&id)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;

        Ok(Post {
            id,
            feed_id: row.get(1)?,
            title: row.get(2)?,
            url: row.get(3)?,
            description: row.get(4)?,
            published_at: row
                .get::<_, Option<String>>(5)?
                .and_then(|s| Self::parse_datetime(&s)),
            created_at: row
                .get::<_, String>(6)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
            updated_at: row
                .get::<_, String>(7)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }

    fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row
                .get::<_, String>(2)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }

    fn select_feed(conn: &Connection, id: i64) -> Result<Option<Feed>> {
        let feed = conn
            .query_row(
                &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?1"),
                params![id],
                Self::feed_from_row,
            )
            .optional()?;

        Ok(feed)
    }

    fn select_next_feed(conn: &Connection) -> Result<Option<Feed>> {
        let feed = conn
            .query_row(
                &format!(
                    "SELECT {FEED_COLUMNS} FROM feeds
                     ORDER BY last_fetched_at IS NOT NULL, last_fetched_at ASC, id ASC
                     LIMIT 1"
                ),
                [],
                Self::feed_from_row,
            )
            .optional()?;

        Ok(feed)
    }

    /// A claim puts the feed behind every other one. If the clock is behind
    /// the newest stored poll, stamp just after that poll instead.
    fn claim_stamp(conn: &Connection, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let latest = conn
            .query_row("SELECT MAX(last_fetched_at) FROM feeds", [], |row| {
                row.get::<_, Option<String>>(0)
            })?
            .and_then(|s| Self::parse_datetime(&s));

        Ok(match latest {
            Some(latest) if latest >= at => latest + chrono::Duration::microseconds(1),
            _ => at,
        })
    }

    fn mark_fetched(conn: &Connection, feed_id: i64, at: &DateTime<Utc>) -> Result<Feed> {
        let at = Self::format_datetime(at);

        conn.execute(
            "UPDATE feeds SET last_fetched_at = ?1, updated_at = ?1
             WHERE id = ?2 AND (last_fetched_at IS NULL OR last_fetched_at < ?1)",
            params![at, feed_id],
        )?;

        Self::select_feed(conn, feed_id)?
            .ok_or_else(|| TributaryError::FeedNotFound(feed_id.to_string()))
    }
}

impl Store for SqliteStore {
    fn get_or_create_user(&self, name: &str) -> Result<User> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT OR IGNORE INTO users (name, created_at) VALUES (?1, ?2)",
            params![name, Self::format_datetime(&Utc::now())],
        )?;

        let user = conn.query_row(
            "SELECT id, name, created_at FROM users WHERE name = ?1",
            params![name],
            Self::user_from_row,
        )?;

        Ok(user)
    }

    fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;

        let user = conn
            .query_row(
                "SELECT id, name, created_at FROM users WHERE id = ?1",
                params![id],
                Self::user_from_row,
            )
            .optional()?;

        Ok(user)
    }

    fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        let conn = self.conn()?;

        let user = conn
            .query_row(
                "SELECT id, name, created_at FROM users WHERE name = ?1",
                params![name],
                Self::user_from_row,
            )
            .optional()?;

        Ok(user)
    }

    fn add_feed(&self, feed: &Feed) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO feeds (url, name, user_id, last_fetched_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                feed.url,
                feed.name,
                feed.user_id,
                feed.last_fetched_at.as_ref().map(Self::format_datetime),
                Self::format_datetime(&feed.created_at),
                Self::format_datetime(&feed.updated_at)
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn get_feed(&self, id: i64) -> Result<Option<Feed>> {
        let conn = self.conn()?;
        Self::select_feed(&conn, id)
    }

    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let conn = self.conn()?;

        let feed = conn
            .query_row(
                &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?1"),
                params![url],
                Self::feed_from_row,
            )
            .optional()?;

        Ok(feed)
    }

    fn get_all_feeds(&self) -> Result<Vec<Feed>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY name, url"
        ))?;

        let feeds = stmt
            .query_map([], Self::feed_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(feeds)
    }

    fn get_next_feed_to_fetch(&self) -> Result<Option<Feed>> {
        let conn = self.conn()?;
        Self::select_next_feed(&conn)
    }

    fn mark_feed_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<Feed> {
        let conn = self.conn()?;
        Self::mark_fetched(&conn, feed_id, &at)
    }

    fn claim_next_feed(&self, at: DateTime<Utc>) -> Result<Option<Feed>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let Some(next) = Self::select_next_feed(&tx)? else {
            return Ok(None);
        };
        let stamp = Self::claim_stamp(&tx, at)?;
        let claimed = Self::mark_fetched(&tx, next.id, &stamp)?;

        tx.commit()?;
        Ok(Some(claimed))
    }

    fn get_post_by_url(&self, feed_id: i64, url: &str) -> Result<Option<Post>> {
        let conn = self.conn()?;

        let post = conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE feed_id = ?1 AND url = ?2"),
                params![feed_id, url],
                Self::post_from_row,
            )
            .optional()?;

        Ok(post)
    }

    fn create_post(&self, post: &NewPost) -> Result<Post> {
        let conn = self.conn()?;
        let created_at = Self::format_datetime(&post.created_at);

        conn.execute(
            "INSERT INTO posts (id, feed_id, title, url, description, published_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                post.id.to_string(),
                post.feed_id,
                post.title,
                post.url,
                post.description,
                post.published_at.as_ref().map(Self::format_datetime),
                created_at
            ],
        )?;

        Ok(Post {
            id: post.id,
            feed_id: post.feed_id,
            title: post.title.clone(),
            url: post.url.clone(),
            description: post.description.clone(),
            published_at: post.published_at,
            created_at: post.created_at,
            updated_at: post.created_at,
        })
    }

    fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE feed_id = ?1 ORDER BY created_at, rowid"
        ))?;

        let posts = stmt
            .query_map(params![feed_id], Self::post_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    fn get_posts_for_user(&self, user_id: i64, limit: usize) -> Result<Vec<Post>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT p.id, p.feed_id, p.title, p.url, p.description, p.published_at, p.created_at, p.updated_at
             FROM posts p
             JOIN feeds f ON p.feed_id = f.id
             WHERE f.user_id = ?1
             ORDER BY p.published_at IS NULL, p.published_at DESC, p.created_at DESC
             LIMIT ?2",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let posts = stmt
            .query_map(params![user_id, limit], Self::post_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn store_with_user() -> (SqliteStore, i64) {
        let store = SqliteStore::in_memory().unwrap();
        let user = store.get_or_create_user("kai").unwrap();
        (store, user.id)
    }

    fn add_feed(store: &SqliteStore, user_id: i64, name: &str) -> i64 {
        let feed = Feed::new(
            name.into(),
            format!("https://example.com/{}.xml", name),
            user_id,
        );
        store.add_feed(&feed).unwrap()
    }

    #[test]
    fn test_add_and_get_feed() {
        let (store, user_id) = store_with_user();
        let id = add_feed(&store, user_id, "lane");

        let retrieved = store.get_feed(id).unwrap().unwrap();
        assert_eq!(retrieved.url, "https://example.com/lane.xml");
        assert_eq!(retrieved.name, "lane");
        assert_eq!(retrieved.user_id, user_id);
        assert!(retrieved.last_fetched_at.is_none());
    }

    #[test]
    fn test_get_or_create_user_is_stable() {
        let store = SqliteStore::in_memory().unwrap();
        let first = store.get_or_create_user("kai").unwrap();
        let second = store.get_or_create_user("kai").unwrap();
        assert_eq!(first.id, second.id);

        assert!(store.get_user_by_name("nobody").unwrap().is_none());
        assert_eq!(store.get_user(first.id).unwrap().unwrap().name, "kai");
    }

    #[test]
    fn test_get_feed_by_url() {
        let (store, user_id) = store_with_user();
        add_feed(&store, user_id, "lane");

        let found = store
            .get_feed_by_url("https://example.com/lane.xml")
            .unwrap();
        assert!(found.is_some());

        let missing = store
            .get_feed_by_url("https://example.com/nonexistent.xml")
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_duplicate_feed_url_rejected() {
        let (store, user_id) = store_with_user();
        add_feed(&store, user_id, "lane");

        let dup = Feed::new("other".into(), "https://example.com/lane.xml".into(), user_id);
        assert!(store.add_feed(&dup).is_err());
    }

    #[test]
    fn test_get_all_feeds_ordering() {
        let (store, user_id) = store_with_user();
        add_feed(&store, user_id, "c");
        add_feed(&store, user_id, "a");
        add_feed(&store, user_id, "b");

        let feeds = store.get_all_feeds().unwrap();
        let names: Vec<&str> = feeds.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_next_feed_prefers_never_fetched() {
        let (store, user_id) = store_with_user();
        let polled = add_feed(&store, user_id, "polled");
        let fresh = add_feed(&store, user_id, "fresh");

        store
            .mark_feed_fetched(polled, Utc::now() - Duration::hours(1))
            .unwrap();

        let next = store.get_next_feed_to_fetch().unwrap().unwrap();
        assert_eq!(next.id, fresh);
    }

    #[test]
    fn test_next_feed_picks_oldest() {
        let (store, user_id) = store_with_user();
        let now = Utc::now();
        let a = add_feed(&store, user_id, "a");
        let b = add_feed(&store, user_id, "b");
        let c = add_feed(&store, user_id, "c");

        store.mark_feed_fetched(a, now - Duration::minutes(5)).unwrap();
        store.mark_feed_fetched(b, now - Duration::hours(2)).unwrap();
        store.mark_feed_fetched(c, now - Duration::minutes(30)).unwrap();

        assert_eq!(store.get_next_feed_to_fetch().unwrap().unwrap().id, b);
    }

    #[test]
    fn test_next_feed_empty_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.get_next_feed_to_fetch().unwrap().is_none());
        assert!(store.claim_next_feed(Utc::now()).unwrap().is_none());
    }

    #[test]
    fn test_mark_feed_fetched_is_monotonic() {
        let (store, user_id) = store_with_user();
        let id = add_feed(&store, user_id, "lane");
        let now = Utc::now();

        let feed = store.mark_feed_fetched(id, now).unwrap();
        assert_eq!(
            feed.last_fetched_at.unwrap().timestamp_micros(),
            now.timestamp_micros()
        );

        let feed = store
            .mark_feed_fetched(id, now - Duration::hours(1))
            .unwrap();
        assert_eq!(
            feed.last_fetched_at.unwrap().timestamp_micros(),
            now.timestamp_micros()
        );
    }

    #[test]
    fn test_mark_feed_fetched_unknown_feed() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store.mark_feed_fetched(42, Utc::now()).unwrap_err();
        assert!(matches!(err, TributaryError::FeedNotFound(_)));
    }

    #[test]
    fn test_claim_rotates_through_feeds() {
        let (store, user_id) = store_with_user();
        let a = add_feed(&store, user_id, "a");
        let b = add_feed(&store, user_id, "b");
        let now = Utc::now();

        let first = store.claim_next_feed(now).unwrap().unwrap();
        let second = store
            .claim_next_feed(now + Duration::seconds(1))
            .unwrap()
            .unwrap();
        let third = store
            .claim_next_feed(now + Duration::seconds(2))
            .unwrap()
            .unwrap();

        assert_eq!(first.id, a);
        assert_eq!(second.id, b);
        assert_eq!(third.id, a);
        assert!(first.last_fetched_at.is_some());
    }

    #[test]
    fn test_claim_rotates_when_clock_is_behind() {
        let (store, user_id) = store_with_user();
        let a = add_feed(&store, user_id, "a");
        let b = add_feed(&store, user_id, "b");
        let now = Utc::now();

        store.mark_feed_fetched(a, now + Duration::hours(1)).unwrap();
        store.mark_feed_fetched(b, now + Duration::hours(2)).unwrap();

        let claimed: Vec<i64> = (0..4)
            .map(|i| {
                store
                    .claim_next_feed(now + Duration::minutes(i))
                    .unwrap()
                    .unwrap()
                    .id
            })
            .collect();

        assert_eq!(claimed, vec![a, b, a, b]);

        let a_feed = store.get_feed(a).unwrap().unwrap();
        let b_feed = store.get_feed(b).unwrap().unwrap();
        assert!(a_feed.last_fetched_at.unwrap() > now + Duration::hours(2));
        assert!(b_feed.last_fetched_at > a_feed.last_fetched_at);
    }

    #[test]
    fn test_create_and_find_post() {
        let (store, user_id) = store_with_user();
        let feed_id = add_feed(&store, user_id, "lane");

        let new = NewPost::new(
            feed_id,
            "Hello".into(),
            "https://example.com/hello".into(),
            "First post".into(),
        );
        let created = store.create_post(&new).unwrap();
        assert_eq!(created.id, new.id);

        let found = store
            .get_post_by_url(feed_id, "https://example.com/hello")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, new.id);
        assert_eq!(found.title, "Hello");
        assert_eq!(found.description, "First post");
        assert!(found.published_at.is_none());
    }

    #[test]
    fn test_post_url_unique_per_feed() {
        let (store, user_id) = store_with_user();
        let lane = add_feed(&store, user_id, "lane");
        let other = add_feed(&store, user_id, "other");
        let url = "https://example.com/shared";

        store
            .create_post(&NewPost::new(lane, "A".into(), url.into(), String::new()))
            .unwrap();

        let dup = store.create_post(&NewPost::new(lane, "B".into(), url.into(), String::new()));
        assert!(matches!(dup, Err(TributaryError::Database(_))));

        // Same link under another feed is a distinct post
        store
            .create_post(&NewPost::new(other, "C".into(), url.into(), String::new()))
            .unwrap();
        assert!(store.get_post_by_url(other, url).unwrap().is_some());
        assert_eq!(store.get_posts_for_feed(lane).unwrap().len(), 1);
    }

    #[test]
    fn test_posts_for_user_limit_and_order() {
        let (store, user_id) = store_with_user();
        let feed_id = add_feed(&store, user_id, "lane");
        let now = Utc::now();

        for i in 0..3 {
            let post = NewPost::new(
                feed_id,
                format!("Post {}", i),
                format!("https://example.com/{}", i),
                String::new(),
            )
            .published_at(Some(now - Duration::days(i)));
            store.create_post(&post).unwrap();
        }

        let posts = store.get_posts_for_user(user_id, 2).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].title, "Post 0");
        assert_eq!(posts[1].title, "Post 1");

        let stranger = store.get_or_create_user("stranger").unwrap();
        assert!(store.get_posts_for_user(stranger.id, 10).unwrap().is_empty());
    }

    #[test]
    fn test_get_feed_nonexistent() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.get_feed(999).unwrap().is_none());
    }
}
