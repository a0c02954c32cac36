//! Ticketing discovery API adapter (Ticketmaster).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveTime;
use serde::Deserialize;
use tracing::{debug, info};

use super::EventSource;
use crate::http;
use crate::model::{Event, Platform, SOURCE_TAG};
use crate::normalize::{
    clean_description, clean_text, compose_location, format_price_range, format_time_12h,
    parse_start, Window,
};

const DISCOVERY_URL: &str = "https://app.ticketmaster.com/discovery/v2/events.json";
const PAGE_SIZE: u32 = 100;
/// Soft cap; the API reports more pages than a snapshot needs.
const MAX_PAGES: u32 = 3;
const PAGE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    #[serde(rename = "_embedded")]
    embedded: Option<DiscoveryEmbedded>,
    page: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryEmbedded {
    #[serde(default)]
    events: Vec<TicketedEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketedEvent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dates: Option<EventDates>,
    #[serde(default)]
    pub price_ranges: Option<Vec<PriceRange>>,
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<EventEmbedded>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventDates {
    #[serde(default)]
    pub start: Option<EventStartDates>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStartDates {
    #[serde(default)]
    pub local_date: Option<String>,
    #[serde(default)]
    pub local_time: Option<String>,
    #[serde(default)]
    pub date_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceRange {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventEmbedded {
    #[serde(default)]
    pub venues: Vec<Venue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Venue {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<VenueCity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueCity {
    #[serde(default)]
    pub name: Option<String>,
}

pub struct Ticketing {
    api_key: Option<String>,
}

impl Ticketing {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }

    pub fn normalize_row(row: &TicketedEvent, window: &Window) -> Option<Event> {
        let name = clean_text(row.name.as_deref()?);
        if name.is_empty() {
            return None;
        }

        let start_dates = row.dates.as_ref().and_then(|d| d.start.as_ref())?;
        let start = start_dates
            .local_date
            .as_deref()
            .and_then(parse_start)
            .or_else(|| start_dates.date_time.as_deref().and_then(parse_start))?;
        if !window.contains(start.date) {
            return None;
        }

        let time = start_dates
            .local_time
            .as_deref()
            .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M:%S").ok())
            .or(start.time)
            .map(format_time_12h);

        let venue = row
            .embedded
            .as_ref()
            .and_then(|e| e.venues.first());
        let venue_name = venue.and_then(|v| v.name.as_deref());
        let city = venue.and_then(|v| v.city.as_ref()).and_then(|c| c.name.as_deref());

        let description = row
            .info
            .as_deref()
            .or(row.description.as_deref())
            .unwrap_or_default();

        Some(Event {
            date: start.date.format("%Y-%m-%d").to_string(),
            time,
            location: compose_location(venue_name, None, city, "New York City"),
            description: clean_description(description, &name, Platform::Ticketmaster),
            link: row
                .url
                .clone()
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| "https://www.ticketmaster.com".to_string()),
            price: range_price(row.price_ranges.as_deref()),
            source: SOURCE_TAG.to_string(),
            platform: Platform::Ticketmaster,
            is_active: true,
            source_id: row.id.clone(),
            name,
        })
    }
}

fn range_price(ranges: Option<&[PriceRange]>) -> String {
    let Some(range) = ranges.and_then(|r| r.first()) else {
        return "Check source".to_string();
    };
    match (range.min, range.max) {
        (Some(min), Some(max)) => format_price_range(min, max),
        (Some(only), None) | (None, Some(only)) => format_price_range(only, only),
        (None, None) => "Check source".to_string(),
    }
}

#[async_trait]
impl EventSource for Ticketing {
    fn platform(&self) -> Platform {
        Platform::Ticketmaster
    }

    async fn fetch(&self, window: &Window) -> Result<Vec<Event>> {
        let Some(api_key) = self.api_key.as_deref() else {
            info!("ticketing API key not configured; skipping adapter");
            return Ok(Vec::new());
        };

        let (open, close) = window.utc_bounds();
        let start_param = open.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let end_param = close.format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let mut events = Vec::new();
        let mut page = 0u32;
        loop {
            let page_param = page.to_string();
            let size_param = PAGE_SIZE.to_string();
            let response: DiscoveryResponse = http::api_client()
                .get(DISCOVERY_URL)
                .query(&[
                    ("apikey", api_key),
                    ("city", "New York"),
                    ("stateCode", "NY"),
                    ("startDateTime", start_param.as_str()),
                    ("endDateTime", end_param.as_str()),
                    ("size", size_param.as_str()),
                    ("page", page_param.as_str()),
                    ("sort", "date,asc"),
                ])
                .send()
                .await
                .with_context(|| format!("ticketing page {page} request failed"))?
                .error_for_status()
                .with_context(|| format!("ticketing page {page} returned an error status"))?
                .json()
                .await
                .with_context(|| format!("ticketing page {page} response was not valid JSON"))?;

            let rows = response
                .embedded
                .map(|e| e.events)
                .unwrap_or_default();
            debug!(page, rows = rows.len(), "ticketing page fetched");
            if rows.is_empty() {
                break;
            }
            events.extend(rows.iter().filter_map(|row| Self::normalize_row(row, window)));

            let total_pages = response.page.map(|p| p.total_pages).unwrap_or(1);
            page += 1;
            if page >= total_pages.min(MAX_PAGES) {
                break;
            }
            tokio::time::sleep(PAGE_DELAY).await;
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn window() -> Window {
        Window::for_today(NaiveDate::from_ymd_opt(2026, 8, 7).unwrap())
    }

    fn row() -> TicketedEvent {
        serde_json::from_value(serde_json::json!({
            "name": "Knicks vs. Celtics",
            "id": "vvG1iZ9pZ",
            "url": "https://www.ticketmaster.com/event/vvG1iZ9pZ",
            "dates": {"start": {"localDate": "2026-08-15", "localTime": "19:30:00"}},
            "priceRanges": [{"min": 60.0, "max": 250.0}],
            "_embedded": {"venues": [{"name": "Madison Square Garden", "city": {"name": "New York"}}]}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn missing_api_key_yields_empty_list() {
        let adapter = Ticketing::new(None);
        let events = adapter.fetch(&window()).await.unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn normalizes_a_discovery_row() {
        let event = Ticketing::normalize_row(&row(), &window()).unwrap();
        assert_eq!(event.name, "Knicks vs. Celtics");
        assert_eq!(event.date, "2026-08-15");
        assert_eq!(event.time.as_deref(), Some("7:30 PM"));
        // The city label is suppressed; venue stands alone.
        assert_eq!(event.location, "Madison Square Garden");
        assert_eq!(event.price, "$60 - $250");
        assert_eq!(event.platform, Platform::Ticketmaster);
    }

    #[test]
    fn single_point_price_range_collapses() {
        let mut r = row();
        r.price_ranges = Some(vec![PriceRange {
            min: Some(25.0),
            max: Some(25.0),
        }]);
        let event = Ticketing::normalize_row(&r, &window()).unwrap();
        assert_eq!(event.price, "$25");
    }

    #[test]
    fn missing_price_ranges_means_check_source() {
        let mut r = row();
        r.price_ranges = None;
        let event = Ticketing::normalize_row(&r, &window()).unwrap();
        assert_eq!(event.price, "Check source");
    }

    #[test]
    fn out_of_window_rows_are_dropped() {
        let mut r = row();
        r.dates = Some(EventDates {
            start: Some(EventStartDates {
                local_date: Some("2026-10-01".into()),
                local_time: None,
                date_time: None,
            }),
        });
        assert!(Ticketing::normalize_row(&r, &window()).is_none());
    }
}
