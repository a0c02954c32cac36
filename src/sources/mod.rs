//! Source adapters: one fetcher+parser per origin.
//!
//! Adapters are error-isolated: a failed fetch is logged and contributes an
//! empty list, never a failed run. The aggregator drives all adapters
//! concurrently and dedups the union in a fixed order so the first-seen-wins
//! rule stays deterministic.

pub mod marketplace;
pub mod parks;
pub mod permitted;
pub mod ticketing;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

use crate::config::Config;
use crate::model::{Event, Platform};
use crate::normalize::{dedup_events, Window};

#[async_trait]
pub trait EventSource: Send + Sync {
    fn platform(&self) -> Platform;

    /// Fetch and normalize this origin's listings for the publish window.
    async fn fetch(&self, window: &Window) -> Result<Vec<Event>>;
}

/// The fixed adapter order. Cross-source dedup keeps the first occurrence,
/// so this order decides which origin survives a `(name, date)` collision.
pub fn default_sources(cfg: &Config, backfill: bool) -> Vec<Box<dyn EventSource>> {
    let marketplace = if backfill {
        marketplace::Marketplace::backfill()
    } else {
        marketplace::Marketplace::incremental()
    };
    vec![
        Box::new(permitted::PermittedEvents::new()),
        Box::new(parks::ParksEvents::new()),
        Box::new(marketplace),
        Box::new(ticketing::Ticketing::new(cfg.ticketmaster_api_key.clone())),
    ]
}

/// Drive all adapters concurrently, isolate failures, concatenate in adapter
/// order, and dedup across origins.
pub async fn fetch_all(sources: &[Box<dyn EventSource>], window: &Window) -> Vec<Event> {
    let results = join_all(sources.iter().map(|source| async move {
        let platform = source.platform();
        match source.fetch(window).await {
            Ok(events) => {
                info!(platform = %platform, count = events.len(), "source fetched");
                events
            }
            Err(err) => {
                warn!(platform = %platform, ?err, "source failed; continuing without it");
                Vec::new()
            }
        }
    }))
    .await;

    let combined: Vec<Event> = results.into_iter().flatten().collect();
    let total = combined.len();
    let deduped = dedup_events(combined);
    if deduped.len() < total {
        info!(
            dropped = total - deduped.len(),
            kept = deduped.len(),
            "cross-source dedup"
        );
    }
    deduped
}
