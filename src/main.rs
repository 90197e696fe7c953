use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tributary::app::AppContext;
use tributary::cli::{commands, Cli, Commands};
use tributary::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let ctx = AppContext::with_config(&config, cli.db)?;

    match cli.command {
        Commands::Add { name, url } => {
            let user = commands::current_user(&config)?;
            commands::add_feed(&ctx, user, &name, &url)?;
        }
        Commands::Feeds => {
            commands::list_feeds(&ctx)?;
        }
        Commands::Browse { limit } => {
            let user = commands::current_user(&config)?;
            commands::browse(&ctx, user, limit)?;
        }
        Commands::Agg { interval, workers } => {
            let interval = interval.unwrap_or_else(|| config.poller.interval.clone());
            let workers = workers.unwrap_or(config.poller.workers);
            commands::aggregate(&ctx, &interval, workers).await?;
        }
    }

    Ok(())
}
