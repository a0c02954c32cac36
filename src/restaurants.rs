//! Restaurant snapshot ingester.
//!
//! Unlike the event snapshot this never truncates: records are upserted by
//! URL, so enrichment fields refresh while `created_at` survives, and rows
//! whose `start` fell behind the retention horizon are purged at the end of
//! each run.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::db::{self, Pool};
use crate::model::RestaurantRecord;

pub const RESTAURANT_SOURCE: &str = "eventbrite";
pub const RETENTION_DAYS: i64 = 21;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub upserted: usize,
    pub skipped: usize,
    pub pruned: u64,
}

/// Load a scraped-restaurant export: a JSON array of records.
pub async fn load_records(path: &Path) -> Result<Vec<RestaurantRecord>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read restaurant export {}", path.display()))?;
    let records: Vec<RestaurantRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("restaurant export {} is not a JSON array", path.display()))?;
    Ok(records)
}

/// Upsert every record, then prune rows older than the retention horizon.
/// A record that fails to persist is logged and skipped, never fatal.
pub async fn run_ingest(
    pool: &Pool,
    records: &[RestaurantRecord],
    now: DateTime<Utc>,
) -> Result<IngestSummary> {
    db::ensure_restaurant_indexes(pool).await?;

    let mut summary = IngestSummary::default();
    for record in records {
        if record.url.trim().is_empty() {
            warn!("restaurant record without url; skipping");
            summary.skipped += 1;
            continue;
        }
        match db::upsert_restaurant(pool, record, RESTAURANT_SOURCE, now).await {
            Ok(()) => summary.upserted += 1,
            Err(err) => {
                warn!(url = %record.url, ?err, "restaurant upsert failed; skipping");
                summary.skipped += 1;
            }
        }
    }

    let cutoff = now - Duration::days(RETENTION_DAYS);
    summary.pruned = db::prune_stale_restaurants(pool, cutoff).await?;

    info!(
        upserted = summary.upserted,
        skipped = summary.skipped,
        pruned = summary.pruned,
        "restaurant ingest complete"
    );
    Ok(summary)
}
