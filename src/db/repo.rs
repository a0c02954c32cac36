use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use super::model::StoredRestaurant;
use crate::model::{Event, Platform, RestaurantRecord};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, ensure the parent directory exists so a fresh
/// checkout can run without a manual mkdir. In-memory URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }
    let rest = url["sqlite:".len()..].trim_start_matches("//");
    let path_part = rest.split('?').next().unwrap_or(rest);
    if let Some(parent) = std::path::Path::new(path_part).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    url.to_string()
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Event snapshot
// ---------------------------------------------------------------------------

/// Replace the published snapshot with `events` in one transaction, then make
/// sure the query indexes exist. An empty batch is a no-op returning `false`:
/// the previous snapshot stays published.
#[instrument(skip_all)]
pub async fn publish_snapshot(pool: &Pool, events: &[Event]) -> Result<bool> {
    if events.is_empty() {
        return Ok(false);
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM events").execute(&mut *tx).await?;
    for event in events {
        // The in-memory `_sourceId` debug field is not published.
        sqlx::query(
            "INSERT INTO events (name, date, time, location, description, link, price, source, platform, is_active) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.name)
        .bind(&event.date)
        .bind(&event.time)
        .bind(&event.location)
        .bind(&event.description)
        .bind(&event.link)
        .bind(&event.price)
        .bind(&event.source)
        .bind(event.platform.as_str())
        .bind(event.is_active)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    ensure_event_indexes(pool).await?;
    Ok(true)
}

/// Idempotent index creation for the events collection: the query paths used
/// downstream (date, platform, active flag) plus a text lookup spanning
/// name/description/location.
pub async fn ensure_event_indexes(pool: &Pool) -> Result<()> {
    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_events_date ON events(date)",
        "CREATE INDEX IF NOT EXISTS idx_events_platform ON events(platform)",
        "CREATE INDEX IF NOT EXISTS idx_events_is_active ON events(is_active)",
        "CREATE INDEX IF NOT EXISTS idx_events_text ON events(name, description, location)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

pub async fn count_events(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn load_events(pool: &Pool) -> Result<Vec<Event>> {
    let rows = sqlx::query(
        "SELECT name, date, time, location, description, link, price, source, platform, is_active \
         FROM events ORDER BY date, name",
    )
    .fetch_all(pool)
    .await?;

    let mut events = Vec::with_capacity(rows.len());
    for row in rows {
        let platform_str: String = row.get("platform");
        let platform = Platform::parse_platform(&platform_str)
            .with_context(|| format!("unknown platform in store: {platform_str}"))?;
        events.push(Event {
            name: row.get("name"),
            date: row.get("date"),
            time: row.get("time"),
            location: row.get("location"),
            description: row.get("description"),
            link: row.get("link"),
            price: row.get("price"),
            source: row.get("source"),
            platform,
            is_active: row.get("is_active"),
            source_id: None,
        });
    }
    Ok(events)
}

async fn distinct_column(pool: &Pool, sql: &'static str) -> Result<Vec<String>> {
    let values: Vec<String> = sqlx::query_scalar(sql).fetch_all(pool).await?;
    Ok(values)
}

pub async fn distinct_event_names(pool: &Pool) -> Result<Vec<String>> {
    distinct_column(pool, "SELECT DISTINCT name FROM events ORDER BY name").await
}

pub async fn distinct_event_descriptions(pool: &Pool) -> Result<Vec<String>> {
    distinct_column(
        pool,
        "SELECT DISTINCT description FROM events ORDER BY description",
    )
    .await
}

pub async fn distinct_event_platforms(pool: &Pool) -> Result<Vec<String>> {
    distinct_column(pool, "SELECT DISTINCT platform FROM events ORDER BY platform").await
}

pub async fn distinct_event_locations(pool: &Pool) -> Result<Vec<String>> {
    distinct_column(pool, "SELECT DISTINCT location FROM events ORDER BY location").await
}

// ---------------------------------------------------------------------------
// Restaurants
// ---------------------------------------------------------------------------

/// Upsert one restaurant keyed by URL. Repeated ingestion refreshes every
/// field and `scraped_at`; `created_at` is written only on first insert.
#[instrument(skip_all, fields(url = %record.url))]
pub async fn upsert_restaurant(
    pool: &Pool,
    record: &RestaurantRecord,
    source: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let payload = serde_json::to_string(record)
        .with_context(|| format!("failed to serialize restaurant {}", record.url))?;
    sqlx::query(
        "INSERT INTO restaurants (url, name, payload, start, source, scraped_at, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(url) DO UPDATE SET \
           name = excluded.name, \
           payload = excluded.payload, \
           start = excluded.start, \
           source = excluded.source, \
           scraped_at = excluded.scraped_at",
    )
    .bind(&record.url)
    .bind(&record.name)
    .bind(payload)
    .bind(record.start.map(ts))
    .bind(source)
    .bind(ts(now))
    .bind(ts(now))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn ensure_restaurant_indexes(pool: &Pool) -> Result<()> {
    for statement in [
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_restaurants_url ON restaurants(url)",
        "CREATE INDEX IF NOT EXISTS idx_restaurants_start ON restaurants(start)",
        "CREATE INDEX IF NOT EXISTS idx_restaurants_scraped_at ON restaurants(scraped_at)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Drop rows whose `start` fell behind the retention horizon. Rows without a
/// `start` are kept indefinitely.
#[instrument(skip_all)]
pub async fn prune_stale_restaurants(
    pool: &Pool,
    cutoff: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM restaurants WHERE start IS NOT NULL AND start < ?")
        .bind(ts(cutoff))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn get_restaurant(pool: &Pool, url: &str) -> Result<Option<StoredRestaurant>> {
    let row = sqlx::query(
        "SELECT url, name, payload, start, source, scraped_at, created_at \
         FROM restaurants WHERE url = ?",
    )
    .bind(url)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let scraped_at_raw: String = row.get("scraped_at");
    let created_at_raw: String = row.get("created_at");
    Ok(Some(StoredRestaurant {
        url: row.get("url"),
        name: row.get("name"),
        payload: row.get("payload"),
        start: row
            .try_get::<Option<String>, _>("start")
            .ok()
            .flatten()
            .as_deref()
            .and_then(parse_ts),
        source: row.get("source"),
        scraped_at: parse_ts(&scraped_at_raw)
            .with_context(|| format!("bad scraped_at timestamp: {scraped_at_raw}"))?,
        created_at: parse_ts(&created_at_raw)
            .with_context(|| format!("bad created_at timestamp: {created_at_raw}"))?,
    }))
}

pub async fn count_restaurants(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM restaurants")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn load_restaurant_payloads(pool: &Pool) -> Result<Vec<serde_json::Value>> {
    let payloads: Vec<String> = sqlx::query_scalar("SELECT payload FROM restaurants")
        .fetch_all(pool)
        .await?;
    Ok(payloads
        .iter()
        .filter_map(|p| serde_json::from_str(p).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SOURCE_TAG;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn event(name: &str, date: &str) -> Event {
        Event {
            name: name.into(),
            date: date.into(),
            time: Some("7:00 PM".into()),
            location: "New York City".into(),
            description: "Test listing.".into(),
            link: "https://example.com".into(),
            price: "Free".into(),
            source: SOURCE_TAG.into(),
            platform: Platform::NycParks,
            is_active: true,
            source_id: Some("debug-1".into()),
        }
    }

    #[tokio::test]
    async fn publish_replaces_previous_snapshot() {
        let pool = setup_pool().await;
        assert!(publish_snapshot(&pool, &[event("A", "2026-08-10")]).await.unwrap());
        assert!(publish_snapshot(&pool, &[event("B", "2026-08-11"), event("C", "2026-08-12")])
            .await
            .unwrap());

        assert_eq!(count_events(&pool).await.unwrap(), 2);
        let names: Vec<String> = distinct_event_names(&pool).await.unwrap();
        assert_eq!(names, vec!["B".to_string(), "C".to_string()]);
    }

    #[tokio::test]
    async fn empty_batch_is_skipped_and_keeps_snapshot() {
        let pool = setup_pool().await;
        publish_snapshot(&pool, &[event("A", "2026-08-10")]).await.unwrap();
        assert!(!publish_snapshot(&pool, &[]).await.unwrap());
        assert_eq!(count_events(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn indexes_are_created_idempotently() {
        let pool = setup_pool().await;
        ensure_event_indexes(&pool).await.unwrap();
        ensure_event_indexes(&pool).await.unwrap();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_events_%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn source_id_is_stripped_at_publish() {
        let pool = setup_pool().await;
        publish_snapshot(&pool, &[event("A", "2026-08-10")]).await.unwrap();
        let loaded = load_events(&pool).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].source_id, None);
        assert_eq!(loaded[0].name, "A");
    }
}
