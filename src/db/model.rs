//! Row views returned by repositories. Business logic lives higher up.

use chrono::{DateTime, Utc};

/// Restaurant row as persisted: identity, bookkeeping timestamps, and the
/// full pass-through payload.
#[derive(Debug, Clone)]
pub struct StoredRestaurant {
    pub url: String,
    pub name: Option<String>,
    pub payload: String,
    pub start: Option<DateTime<Utc>>,
    pub source: String,
    pub scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
