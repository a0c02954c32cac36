use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use goodrec_ingest::config::Config;
use goodrec_ingest::db;
use goodrec_ingest::filters;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Export facet catalogs for upstream query classification"
)]
struct Args {
    /// Directory the JSON catalogs are written to.
    #[arg(long, default_value = "data")]
    out_dir: PathBuf,

    /// Skip the live upstream facet pull and only export snapshot catalogs.
    #[arg(long)]
    skip_upstream: bool,
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
    let now = Utc::now();

    if let Some(database_url) = cfg.database_url.as_deref() {
        let pool = db::init_pool(database_url).await?;
        db::run_migrations(&pool).await?;

        let snapshot = filters::SnapshotText::from_store(&pool).await?;
        let catalog = filters::build_catalog(&snapshot, now);
        let catalog_path = args.out_dir.join("event_categories.json");
        filters::write_json(&catalog_path, &catalog)?;
        info!(events = snapshot.total_events, path = %catalog_path.display(), "wrote event category catalog");

        let payloads = db::load_restaurant_payloads(&pool).await?;
        let restaurant_facets = filters::build_restaurant_facets(&payloads, now);
        let restaurant_path = args.out_dir.join("restaurant_filters.json");
        filters::write_json(&restaurant_path, &restaurant_facets)?;
        info!(restaurants = payloads.len(), path = %restaurant_path.display(), "wrote restaurant facets");

        pool.close().await;
    } else {
        info!("DATABASE_URL not set; skipping snapshot catalogs");
    }

    if !args.skip_upstream {
        match filters::fetch_upstream_facets(now).await {
            Ok(facets) => {
                let path = args.out_dir.join("event_filters.json");
                filters::write_json(&path, &facets)?;
                info!(path = %path.display(), "wrote upstream facet vocabularies");
            }
            Err(err) => {
                // The next scheduled run is the retry.
                warn!(?err, "upstream facet pull failed; keeping previous export");
            }
        }
    }

    Ok(())
}
