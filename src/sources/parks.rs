//! NYC Parks events adapter (RSS feed republished as JSON).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::EventSource;
use crate::http;
use crate::model::{Event, Platform, SOURCE_TAG};
use crate::normalize::{
    borough_name, clean_description, clean_text, compose_location, parse_start, Window,
};

const FEED_URL: &str = "https://www.nycgovparks.org/xml/events_300_rss.json";
const LANDING_PAGE: &str = "https://www.nycgovparks.org/events";

#[derive(Debug, Clone, Deserialize)]
pub struct ParksRow {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub startdate: Option<String>,
    #[serde(default)]
    pub starttime: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub categories: Option<String>,
    #[serde(default)]
    pub parkids: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub guid: Option<String>,
}

pub struct ParksEvents;

impl ParksEvents {
    pub fn new() -> Self {
        ParksEvents
    }

    pub fn normalize_row(row: &ParksRow, window: &Window) -> Option<Event> {
        let name = clean_text(row.title.as_deref()?);
        if name.is_empty() {
            return None;
        }
        let start = parse_start(row.startdate.as_deref()?)?;
        if !window.contains(start.date) {
            return None;
        }

        // Park ids lead with a borough code, e.g. "B123" for Brooklyn.
        let borough = row
            .parkids
            .as_deref()
            .and_then(|ids| ids.chars().next())
            .filter(|c| matches!(c, 'M' | 'B' | 'Q' | 'X' | 'R'))
            .map(|c| borough_name(&c.to_string()));

        let time = row
            .starttime
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_uppercase);

        let categories = row
            .categories
            .as_deref()
            .map(clean_text)
            .filter(|c| !c.is_empty());
        let raw_description = categories
            .map(|c| format!("{c}. Free event at NYC Parks."))
            .unwrap_or_default();

        Some(Event {
            date: start.date.format("%Y-%m-%d").to_string(),
            time,
            location: compose_location(
                row.location.as_deref(),
                borough.as_deref(),
                None,
                "NYC Park",
            ),
            description: clean_description(&raw_description, &name, Platform::NycParks),
            link: row
                .link
                .clone()
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| LANDING_PAGE.to_string()),
            price: "Free".to_string(),
            source: SOURCE_TAG.to_string(),
            platform: Platform::NycParks,
            is_active: true,
            source_id: row.guid.clone(),
            name,
        })
    }
}

impl Default for ParksEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for ParksEvents {
    fn platform(&self) -> Platform {
        Platform::NycParks
    }

    async fn fetch(&self, window: &Window) -> Result<Vec<Event>> {
        let rows: Vec<ParksRow> = http::api_client()
            .get(FEED_URL)
            .send()
            .await
            .context("parks feed request failed")?
            .error_for_status()
            .context("parks feed returned an error status")?
            .json()
            .await
            .context("parks feed response was not valid JSON")?;

        debug!(rows = rows.len(), "parks rows fetched");
        Ok(rows
            .iter()
            .filter_map(|row| Self::normalize_row(row, window))
            .collect())
    }
}
