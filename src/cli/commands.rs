use crate::app::{AppContext, Result, TributaryError};
use crate::config::Config;
use crate::domain::Feed;
use crate::scheduler::{format_interval, parse_interval, run_polling_loop};
use crate::store::Store;

/// The configured user; commands that own data refuse to guess one.
pub fn current_user(config: &Config) -> Result<&str> {
    config
        .user
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| TributaryError::Config("no user set; add `name` under [user]".into()))
}

pub fn add_feed(ctx: &AppContext, user_name: &str, name: &str, url: &str) -> Result<Feed> {
    url::Url::parse(url)?;

    if let Some(existing) = ctx.store.get_feed_by_url(url)? {
        println!("Feed already exists: {} ({})", existing.display_name(), url);
        return Ok(existing);
    }

    let user = ctx.store.get_or_create_user(user_name)?;
    let feed = Feed::new(name.to_string(), url.to_string(), user.id);
    let id = ctx.store.add_feed(&feed)?;
    let feed = ctx
        .store
        .get_feed(id)?
        .ok_or_else(|| TributaryError::FeedNotFound(url.to_string()))?;

    println!("Added feed: {} ({})", feed.display_name(), feed.url);
    Ok(feed)
}

pub fn list_feeds(ctx: &AppContext) -> Result<()> {
    let feeds = ctx.store.get_all_feeds()?;

    if feeds.is_empty() {
        println!("No feeds");
        return Ok(());
    }

    for feed in feeds {
        let owner = ctx
            .store
            .get_user(feed.user_id)?
            .map(|u| u.name)
            .unwrap_or_else(|| "?".to_string());
        let fetched = feed
            .last_fetched_at
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());

        println!(
            "{} [{}]\n  {}\n  last fetched: {}",
            feed.display_name(),
            owner,
            feed.url,
            fetched
        );
    }

    Ok(())
}

pub fn browse(ctx: &AppContext, user_name: &str, limit: usize) -> Result<()> {
    let user = ctx
        .store
        .get_user_by_name(user_name)?
        .ok_or_else(|| TributaryError::UserNotFound(user_name.to_string()))?;

    let posts = ctx.store.get_posts_for_user(user.id, limit)?;

    if posts.is_empty() {
        println!("No posts");
        return Ok(());
    }

    for post in posts {
        let date = post
            .published_at
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "          ".to_string());

        println!("{} {}\n  {}", date, post.display_title(), post.url);
    }

    Ok(())
}

/// Polls until Ctrl-C or SIGTERM.
pub async fn aggregate(ctx: &AppContext, interval: &str, workers: usize) -> Result<()> {
    let period = parse_interval(interval)?;
    println!("Collecting feeds every {}", format_interval(period));
    run_polling_loop(ctx, period, workers, shutdown_signal()).await
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("Could not install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
