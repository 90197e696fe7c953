//! The polling loop.
//!
//! Every tick claims the feed polled least recently (never-polled feeds
//! first), stamps it as fetched *before* fetching, and ingests it. A feed
//! that fails to fetch simply waits for its next turn.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::app::{AppContext, Result, TributaryError};
use crate::domain::Feed;
use crate::ingest::{IngestOutcome, Ingestor};
use crate::store::{SqliteStore, Store};

pub const DEFAULT_WORKERS: usize = 1;

/// Result of polling one claimed feed.
#[derive(Debug)]
pub struct PollResult {
    pub feed: Feed,
    pub outcome: Result<IngestOutcome>,
}

pub struct Scheduler<S: Store + Send + Sync + 'static> {
    store: Arc<S>,
    ingestor: Arc<Ingestor<S>>,
    workers: usize,
}

impl<S: Store + Send + Sync + 'static> Scheduler<S> {
    pub fn new(store: Arc<S>, ingestor: Ingestor<S>) -> Self {
        Self::with_workers(store, ingestor, DEFAULT_WORKERS)
    }

    pub fn with_workers(store: Arc<S>, ingestor: Ingestor<S>, workers: usize) -> Self {
        Self {
            store,
            ingestor: Arc::new(ingestor),
            workers,
        }
    }

    /// Polls until `shutdown` resolves. The first tick fires immediately.
    ///
    /// Returns early with an error only when the scheduler itself cannot
    /// make progress: a bad interval, no feeds, or a failed claim.
    pub async fn run<F>(&self, period: Duration, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if period.is_zero() {
            return Err(TributaryError::Config(
                "Polling interval must be greater than zero".into(),
            ));
        }
        if self.workers == 0 {
            return Err(TributaryError::Config(
                "Worker count must be at least 1".into(),
            ));
        }

        info!(
            "Polling feeds every {} ({} worker{})",
            format_interval(period),
            self.workers,
            if self.workers == 1 { "" } else { "s" }
        );

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Poller shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            self.tick().await?;
        }
    }

    /// One tick: claim up to `workers` feeds, then ingest them and wait for
    /// all of them to finish.
    pub async fn tick(&self) -> Result<Vec<PollResult>> {
        let claimed = self.claim_batch()?;

        let handles: Vec<_> = claimed
            .into_iter()
            .map(|feed| {
                let ingestor = self.ingestor.clone();
                let task_feed = feed.clone();
                let handle = tokio::spawn(async move { ingestor.ingest_feed(&task_feed).await });
                (feed, handle)
            })
            .collect();

        let (feeds, handles): (Vec<Feed>, Vec<_>) = handles.into_iter().unzip();
        let joined = join_all(handles).await;

        let results = feeds
            .into_iter()
            .zip(joined)
            .map(|(feed, joined)| {
                let outcome = joined.unwrap_or_else(|e| {
                    Err(TributaryError::Other(format!("Task join error: {}", e)))
                });
                report(&feed, &outcome);
                PollResult { feed, outcome }
            })
            .collect();

        Ok(results)
    }

    /// Claims distinct feeds, oldest first. Stops early once the oldest feed
    /// is one already claimed this tick.
    fn claim_batch(&self) -> Result<Vec<Feed>> {
        let mut claimed: Vec<Feed> = Vec::with_capacity(self.workers);

        while claimed.len() < self.workers {
            match self.store.claim_next_feed(Utc::now())? {
                Some(feed) if claimed.iter().any(|c| c.id == feed.id) => break,
                Some(feed) => claimed.push(feed),
                None => break,
            }
        }

        if claimed.is_empty() {
            return Err(TributaryError::NoFeeds);
        }

        Ok(claimed)
    }
}

fn report(feed: &Feed, outcome: &Result<IngestOutcome>) {
    match outcome {
        Ok(outcome) if outcome.fetched == 0 => {
            info!("{}: no items", feed.display_name());
        }
        Ok(outcome) => {
            info!(
                feed_id = feed.id,
                "{}: {} new, {} already stored, {} failed",
                feed.display_name(),
                outcome.created,
                outcome.skipped,
                outcome.failed
            );
        }
        Err(e) => {
            error!(feed_id = feed.id, "Error polling {}: {}", feed.display_name(), e);
        }
    }
}

/// Runs the polling loop over the context's store until `shutdown` resolves.
pub async fn run_polling_loop<F>(
    ctx: &AppContext,
    period: Duration,
    workers: usize,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let scheduler: Scheduler<SqliteStore> =
        Scheduler::with_workers(ctx.store.clone(), ctx.ingestor(), workers);
    scheduler.run(period, shutdown).await
}

/// Parses intervals such as `"45s"`, `"1m30s"`, `"6h"` or `"1d"`. A bare
/// number is seconds. Zero and negative intervals are rejected.
pub fn parse_interval(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    let invalid = || {
        TributaryError::Config(format!(
            "Invalid interval: '{}'. Use a format like '30s', '1m30s', '1h'",
            s
        ))
    };

    if s.is_empty() || s.starts_with('-') {
        return Err(invalid());
    }

    let total = if let Ok(secs) = s.parse::<u64>() {
        Duration::from_secs(secs)
    } else {
        let mut total = Duration::ZERO;
        let mut rest = s.as_str();

        while !rest.is_empty() {
            let digits = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
            rest = &rest[digits..];

            let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
            let part = match &rest[..unit_len] {
                "ms" => Duration::from_millis(value),
                "s" => Duration::from_secs(value),
                "m" => Duration::from_secs(value.saturating_mul(60)),
                "h" => Duration::from_secs(value.saturating_mul(3600)),
                "d" => Duration::from_secs(value.saturating_mul(86400)),
                _ => return Err(invalid()),
            };
            rest = &rest[unit_len..];

            total = total.checked_add(part).ok_or_else(invalid)?;
        }

        total
    };

    if total.is_zero() {
        return Err(TributaryError::Config(format!(
            "Interval must be greater than zero: '{}'",
            s
        )));
    }

    Ok(total)
}

/// Format interval for display
pub fn format_interval(period: Duration) -> String {
    let secs = period.as_secs();

    if period.subsec_millis() != 0 || secs == 0 {
        format!("{}ms", period.as_millis())
    } else if secs >= 86400 && secs.is_multiple_of(86400) {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::fetcher::ContentFetcher;
    use crate::ingest::testing::{rss, ScriptedFetcher};
    use crate::normalizer::Normalizer;

    struct Harness {
        store: Arc<SqliteStore>,
        fetcher: Arc<ScriptedFetcher>,
        user_id: i64,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(SqliteStore::in_memory().unwrap());
            let user_id = store.get_or_create_user("kai").unwrap().id;
            Self {
                store,
                fetcher: Arc::new(ScriptedFetcher::default()),
                user_id,
            }
        }

        fn add_feed(&self, name: &str, served: bool) -> Feed {
            let url = format!("https://example.com/{}.xml", name);
            let mut feed = Feed::new(name.into(), url.clone(), self.user_id);
            feed.id = self.store.add_feed(&feed).unwrap();

            if served {
                self.fetcher.serve(
                    &url,
                    &rss(&[(name, &format!("https://example.com/{}/1", name), "x", "")]),
                );
            }
            feed
        }

        fn scheduler(&self, workers: usize) -> Scheduler<SqliteStore> {
            let ingestor = Ingestor::new(
                self.store.clone(),
                ContentFetcher::new(self.fetcher.clone()),
                Normalizer::new(),
            );
            Scheduler::with_workers(self.store.clone(), ingestor, workers)
        }
    }

    #[tokio::test]
    async fn test_zero_interval_is_config_error() {
        let harness = Harness::new();
        harness.add_feed("a", true);

        let err = harness
            .scheduler(1)
            .run(Duration::ZERO, std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, TributaryError::Config(_)));
        assert!(harness.fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_zero_workers_is_config_error() {
        let harness = Harness::new();
        let err = harness
            .scheduler(0)
            .run(Duration::from_secs(1), std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, TributaryError::Config(_)));
    }

    #[tokio::test]
    async fn test_no_feeds_stops_loop() {
        let harness = Harness::new();
        let err = harness
            .scheduler(1)
            .run(Duration::from_secs(1), std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, TributaryError::NoFeeds));
    }

    #[tokio::test]
    async fn test_never_polled_feed_goes_first() {
        let harness = Harness::new();
        let b = harness.add_feed("b", true);
        let a = harness.add_feed("a", true);
        harness
            .store
            .mark_feed_fetched(b.id, Utc::now() - ChronoDuration::hours(1))
            .unwrap();

        let scheduler = harness.scheduler(1);

        let first = scheduler.tick().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].feed.id, a.id);

        let a_after = harness.store.get_feed(a.id).unwrap().unwrap();
        let b_after = harness.store.get_feed(b.id).unwrap().unwrap();
        assert!(a_after.last_fetched_at > b_after.last_fetched_at);

        let second = scheduler.tick().await.unwrap();
        assert_eq!(second[0].feed.id, b.id);
        assert_eq!(
            harness.fetcher.requests(),
            vec![a.url.clone(), b.url.clone()]
        );
    }

    #[tokio::test]
    async fn test_claim_happens_even_when_fetch_fails() {
        let harness = Harness::new();
        let broken = harness.add_feed("broken", false);
        let healthy = harness.add_feed("healthy", true);

        let scheduler = harness.scheduler(1);
        let results = scheduler.tick().await.unwrap();

        assert_eq!(results[0].feed.id, broken.id);
        assert!(results[0].outcome.is_err());

        let broken_after = harness.store.get_feed(broken.id).unwrap().unwrap();
        assert!(broken_after.last_fetched_at.is_some());

        let healthy_after = harness.store.get_feed(healthy.id).unwrap().unwrap();
        assert!(healthy_after.last_fetched_at.is_none());
        assert!(harness
            .store
            .get_posts_for_feed(healthy.id)
            .unwrap()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_broken_feed() {
        let harness = Harness::new();
        let broken = harness.add_feed("broken", false);
        let healthy = harness.add_feed("healthy", true);

        let scheduler = harness.scheduler(1);
        let shutdown = tokio::time::sleep(Duration::from_secs(150));

        scheduler
            .run(Duration::from_secs(60), shutdown)
            .await
            .unwrap();

        assert_eq!(
            harness.fetcher.requests(),
            vec![broken.url.clone(), healthy.url.clone(), broken.url.clone()]
        );
        assert_eq!(harness.store.get_posts_for_feed(healthy.id).unwrap().len(), 1);
        assert!(harness.store.get_posts_for_feed(broken.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let harness = Harness::new();
        harness.add_feed("a", true);

        harness
            .scheduler(1)
            .run(Duration::from_secs(60), std::future::ready(()))
            .await
            .unwrap();

        assert!(harness.fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_workers_claim_distinct_feeds() {
        let harness = Harness::new();
        let a = harness.add_feed("a", true);
        let b = harness.add_feed("b", true);
        let c = harness.add_feed("c", true);

        let scheduler = harness.scheduler(2);

        let first = scheduler.tick().await.unwrap();
        let mut ids: Vec<i64> = first.iter().map(|r| r.feed.id).collect();
        ids.sort();
        assert_eq!(ids, vec![a.id, b.id]);
        assert!(first.iter().all(|r| r.outcome.is_ok()));

        let second = scheduler.tick().await.unwrap();
        assert_eq!(second[0].feed.id, c.id);
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn test_workers_capped_by_feed_count() {
        let harness = Harness::new();
        harness.add_feed("a", true);
        harness.add_feed("b", true);

        let results = harness.scheduler(5).tick().await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(harness.fetcher.requests().len(), 2);
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_interval("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_interval("1d").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_interval("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_interval("3600").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_interval("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_interval("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_interval(" 2H ").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_parse_interval_rejects_bad_input() {
        for bad in ["", "0", "0s", "-5m", "abc", "5x", "m5", "1.5h"] {
            let err = parse_interval(bad).unwrap_err();
            assert!(matches!(err, TributaryError::Config(_)), "{}", bad);
        }
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(Duration::from_secs(3600)), "1h");
        assert_eq!(format_interval(Duration::from_secs(1800)), "30m");
        assert_eq!(format_interval(Duration::from_secs(86400)), "1d");
        assert_eq!(format_interval(Duration::from_secs(90)), "90s");
        assert_eq!(format_interval(Duration::from_millis(1500)), "1500ms");
    }
}
