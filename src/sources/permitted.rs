//! Municipal permitted-events adapter (NYC Open Data).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::EventSource;
use crate::http;
use crate::model::{Event, Platform, SOURCE_TAG};
use crate::normalize::{
    borough_name, clean_description, clean_text, compose_location, format_time_12h, parse_start,
    Window,
};

const ENDPOINT: &str = "https://data.cityofnewyork.us/resource/tvpp-9vvx.json";
/// The API carries no per-event URLs; published records link here instead.
const LANDING_PAGE: &str = "https://www.nyc.gov/events";
const ROW_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct PermittedRow {
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub event_location: Option<String>,
    #[serde(default)]
    pub event_borough: Option<String>,
    #[serde(default)]
    pub start_date_time: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
}

pub struct PermittedEvents;

impl PermittedEvents {
    pub fn new() -> Self {
        PermittedEvents
    }

    pub fn normalize_row(row: &PermittedRow, window: &Window) -> Option<Event> {
        let name = clean_text(row.event_name.as_deref()?);
        if name.is_empty() {
            return None;
        }
        let start = parse_start(row.start_date_time.as_deref()?)?;
        if !window.contains(start.date) {
            return None;
        }
        let borough = row.event_borough.as_deref().map(borough_name);
        Some(Event {
            date: start.date.format("%Y-%m-%d").to_string(),
            time: start.time.map(format_time_12h),
            location: compose_location(
                row.event_location.as_deref(),
                None,
                borough.as_deref(),
                "New York City",
            ),
            description: clean_description("", &name, Platform::NycOpenData),
            link: LANDING_PAGE.to_string(),
            price: "Check source".to_string(),
            source: SOURCE_TAG.to_string(),
            platform: Platform::NycOpenData,
            is_active: true,
            source_id: row.event_id.clone(),
            name,
        })
    }
}

impl Default for PermittedEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for PermittedEvents {
    fn platform(&self) -> Platform {
        Platform::NycOpenData
    }

    async fn fetch(&self, window: &Window) -> Result<Vec<Event>> {
        let where_clause = format!("start_date_time >= '{}'", window.start_param());
        let limit = ROW_LIMIT.to_string();
        let rows: Vec<PermittedRow> = http::api_client()
            .get(ENDPOINT)
            .query(&[
                ("$where", where_clause.as_str()),
                ("$order", "start_date_time"),
                ("$limit", limit.as_str()),
            ])
            .send()
            .await
            .context("permitted-events request failed")?
            .error_for_status()
            .context("permitted-events returned an error status")?
            .json()
            .await
            .context("permitted-events response was not valid JSON")?;

        debug!(rows = rows.len(), "permitted-events rows fetched");
        Ok(rows
            .iter()
            .filter_map(|row| Self::normalize_row(row, window))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn window() -> Window {
        Window::for_today(NaiveDate::from_ymd_opt(2026, 8, 7).unwrap())
    }

    fn row(name: &str, start: &str) -> PermittedRow {
        PermittedRow {
            event_name: Some(name.into()),
            event_location: Some("Washington Square Park".into()),
            event_borough: Some("M".into()),
            start_date_time: Some(start.into()),
            event_id: Some("775533".into()),
        }
    }

    #[test]
    fn normalizes_a_permitted_row() {
        let event =
            PermittedEvents::normalize_row(&row("Street Fair", "2026-08-09T11:00:00.000"), &window())
                .unwrap();
        assert_eq!(event.name, "Street Fair");
        assert_eq!(event.date, "2026-08-09");
        assert_eq!(event.time.as_deref(), Some("11:00 AM"));
        assert_eq!(event.location, "Washington Square Park, Manhattan");
        assert_eq!(event.price, "Check source");
        assert_eq!(event.link, LANDING_PAGE);
        assert_eq!(event.platform, Platform::NycOpenData);
        assert_eq!(event.source_id.as_deref(), Some("775533"));
        assert_eq!(
            event.description,
            "Street Fair. Check NYC Open Data for full details."
        );
    }

    #[test]
    fn full_borough_names_are_normalized() {
        let mut r = row("Parade", "2026-08-09T11:00:00.000");
        r.event_borough = Some("BROOKLYN".into());
        let event = PermittedEvents::normalize_row(&r, &window()).unwrap();
        assert!(event.location.ends_with(", Brooklyn"));
    }

    #[test]
    fn rows_outside_the_window_are_dropped() {
        let past = row("Old Fair", "2026-08-01T11:00:00.000");
        assert!(PermittedEvents::normalize_row(&past, &window()).is_none());
        let far = row("Future Fair", "2026-09-15T11:00:00.000");
        assert!(PermittedEvents::normalize_row(&far, &window()).is_none());
    }

    #[test]
    fn rows_without_name_or_date_are_dropped() {
        let mut nameless = row("x", "2026-08-09T11:00:00.000");
        nameless.event_name = None;
        assert!(PermittedEvents::normalize_row(&nameless, &window()).is_none());

        let mut dateless = row("Fair", "x");
        dateless.start_date_time = Some("sometime soon".into());
        assert!(PermittedEvents::normalize_row(&dateless, &window()).is_none());
    }
}
