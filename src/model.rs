use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Brand tag stamped on every published event.
pub const SOURCE_TAG: &str = "GoodRec";

/// Origin of an event record. One fixed value per source adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "NYC Open Data")]
    NycOpenData,
    #[serde(rename = "NYC Parks")]
    NycParks,
    #[serde(rename = "Eventbrite")]
    Eventbrite,
    #[serde(rename = "Ticketmaster")]
    Ticketmaster,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::NycOpenData => "NYC Open Data",
            Platform::NycParks => "NYC Parks",
            Platform::Eventbrite => "Eventbrite",
            Platform::Ticketmaster => "Ticketmaster",
        }
    }

    pub fn parse_platform(s: &str) -> Option<Platform> {
        match s {
            "NYC Open Data" => Some(Platform::NycOpenData),
            "NYC Parks" => Some(Platform::NycParks),
            "Eventbrite" => Some(Platform::Eventbrite),
            "Ticketmaster" => Some(Platform::Ticketmaster),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical event as published into the `events` collection.
///
/// `date` is the calendar date of the event start in the America/New_York
/// civil day, always within the 14-day publish window. `source_id` is a
/// per-adapter debug identifier stripped before publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub name: String,
    pub date: String,
    pub time: Option<String>,
    pub location: String,
    pub description: String,
    pub link: String,
    pub price: String,
    pub source: String,
    pub platform: Platform,
    pub is_active: bool,
    #[serde(rename = "_sourceId", default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl Event {
    /// Cross-source dedup key: exactly one published record per key.
    pub fn dedup_key(&self) -> (String, String) {
        (self.name.to_lowercase(), self.date.clone())
    }
}

/// A scraped restaurant as handed to the snapshot ingester.
///
/// Identity is the `url`; every other enrichment field (cuisine, rating,
/// opening hours, Google metadata, ...) passes through untouched in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantRecord {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trip() {
        for p in [
            Platform::NycOpenData,
            Platform::NycParks,
            Platform::Eventbrite,
            Platform::Ticketmaster,
        ] {
            assert_eq!(Platform::parse_platform(p.as_str()), Some(p));
        }
        assert_eq!(Platform::parse_platform("Craigslist"), None);
    }

    #[test]
    fn event_serializes_with_document_field_names() {
        let event = Event {
            name: "NYC Jazz Night".into(),
            date: "2026-08-10".into(),
            time: Some("8:00 PM".into()),
            location: "Blue Room — East Village".into(),
            description: "Live jazz.".into(),
            link: "https://example.com/e/1".into(),
            price: "Free".into(),
            source: SOURCE_TAG.into(),
            platform: Platform::Eventbrite,
            is_active: true,
            source_id: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["isActive"], serde_json::json!(true));
        assert_eq!(value["platform"], serde_json::json!("Eventbrite"));
        assert!(value.get("_sourceId").is_none());
    }

    #[test]
    fn restaurant_record_keeps_enrichment_fields() {
        let raw = serde_json::json!({
            "url": "https://example.com/r/1",
            "name": "Lucali",
            "cuisineDescription": "Pizza",
            "rating": 4.7,
            "googleTypes": ["restaurant"]
        });
        let rec: RestaurantRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(rec.url, "https://example.com/r/1");
        assert_eq!(rec.extra["cuisineDescription"], "Pizza");
        assert_eq!(rec.extra["rating"], serde_json::json!(4.7));
    }
}
