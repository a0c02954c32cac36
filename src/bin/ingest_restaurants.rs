use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::info;

use goodrec_ingest::config::Config;
use goodrec_ingest::db;
use goodrec_ingest::restaurants;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Upsert the scraped restaurant export into the restaurant collection"
)]
struct Args {
    /// JSON array of scraped restaurant records.
    #[arg(long, default_value = "data/restaurants.json")]
    input: PathBuf,
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

    let records = restaurants::load_records(&args.input).await?;
    info!(count = records.len(), input = %args.input.display(), "loaded restaurant export");
    if records.is_empty() {
        info!("nothing to ingest");
        return Ok(());
    }

    let Some(database_url) = cfg.database_url.as_deref() else {
        info!("DATABASE_URL not set; printing samples instead of ingesting");
        for record in records.iter().take(3) {
            println!("{}", serde_json::to_string_pretty(record)?);
        }
        return Ok(());
    };

    let pool = db::init_pool(database_url).await?;
    db::run_migrations(&pool).await?;
    let summary = restaurants::run_ingest(&pool, &records, Utc::now()).await?;
    info!(
        upserted = summary.upserted,
        skipped = summary.skipped,
        pruned = summary.pruned,
        "restaurant snapshot complete"
    );
    pool.close().await;
    Ok(())
}
