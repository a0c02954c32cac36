use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use goodrec_ingest::config::Config;
use goodrec_ingest::db;
use goodrec_ingest::normalize::Window;
use goodrec_ingest::sources;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Fetch, normalize, and publish the NYC event snapshot"
)]
struct Args {
    /// Walk the marketplace listing much deeper than the scheduled run.
    /// Intended for manual one-off backfills.
    #[arg(long)]
    backfill: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = Config::from_env()?;
    let window = Window::current();
    info!(start = %window.start, end = %window.end, backfill = args.backfill, "starting event ingest");

    let adapters = sources::default_sources(&cfg, args.backfill);
    let events = sources::fetch_all(&adapters, &window).await;
    if events.is_empty() {
        // Keep whatever snapshot is already published.
        warn!("no events fetched; skipping publish");
        return Ok(());
    }

    let Some(database_url) = cfg.database_url.as_deref() else {
        info!(count = events.len(), "DATABASE_URL not set; printing samples instead of publishing");
        for event in events.iter().take(5) {
            println!("{}", serde_json::to_string_pretty(event)?);
        }
        return Ok(());
    };

    let pool = db::init_pool(database_url).await?;
    db::run_migrations(&pool).await?;
    let published = db::publish_snapshot(&pool, &events).await?;
    info!(published, count = events.len(), "event snapshot complete");
    pool.close().await;
    Ok(())
}
