//! Consumer events marketplace adapter (Eventbrite), scraped from HTML.
//!
//! Listing pages embed one or more `application/ld+json` blocks whose shape
//! varies: a bare `Event`, an `ItemList` of `ListItem`s wrapping events, or
//! nested arrays of either. The parser walks the JSON recursively and emits a
//! flat list of event nodes, so a markup change in one block never breaks the
//! others.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use super::EventSource;
use crate::http;
use crate::model::{Event, Platform, SOURCE_TAG};
use crate::normalize::{
    clean_description, clean_text, compose_location, format_time_12h, is_zero_amount, parse_start,
    Window,
};

const LISTING_URL: &str = "https://www.eventbrite.com/d/ny--new-york/events/";

static LD_JSON_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("ld+json selector")
});

/// Paging behavior. The incremental plan runs on the regular schedule; the
/// backfill plan is a manual one-off that walks much deeper into the listing.
#[derive(Debug, Clone, Copy)]
pub struct PagePlan {
    pub max_pages: u32,
    pub wave_size: usize,
    pub wave_delay: Duration,
}

impl PagePlan {
    pub const INCREMENTAL: PagePlan = PagePlan {
        max_pages: 10,
        wave_size: 2,
        wave_delay: Duration::from_millis(1000),
    };

    pub const BACKFILL: PagePlan = PagePlan {
        max_pages: 150,
        wave_size: 5,
        wave_delay: Duration::from_millis(500),
    };
}

pub struct Marketplace {
    plan: PagePlan,
}

impl Marketplace {
    pub fn incremental() -> Self {
        Self {
            plan: PagePlan::INCREMENTAL,
        }
    }

    pub fn backfill() -> Self {
        Self {
            plan: PagePlan::BACKFILL,
        }
    }

    /// Parse one listing page's HTML into normalized events, deduped within
    /// the page on `(name, date)`.
    pub fn parse_page(html: &str, window: &Window) -> Vec<Event> {
        let document = Html::parse_document(html);
        let mut values = Vec::new();
        for script in document.select(&LD_JSON_SELECTOR) {
            let raw = script.inner_html();
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => values.push(value),
                Err(err) => {
                    debug!(?err, "skipping malformed ld+json block");
                }
            }
        }
        let mut nodes = Vec::new();
        for value in &values {
            collect_event_nodes(value, &mut nodes);
        }

        let mut seen = HashSet::new();
        nodes
            .iter()
            .filter_map(|node| normalize_node(node, window))
            .filter(|event| seen.insert(event.dedup_key()))
            .collect()
    }

    async fn fetch_page(&self, page: u32) -> Result<String> {
        let response = http::scrape_client()
            .get(LISTING_URL)
            .query(&[("page", page.to_string())])
            .send()
            .await
            .with_context(|| format!("marketplace page {page} request failed"))?
            .error_for_status()
            .with_context(|| format!("marketplace page {page} returned an error status"))?;
        response
            .text()
            .await
            .with_context(|| format!("marketplace page {page} body unreadable"))
    }
}

#[async_trait]
impl EventSource for Marketplace {
    fn platform(&self) -> Platform {
        Platform::Eventbrite
    }

    async fn fetch(&self, window: &Window) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        let mut page = 1u32;

        'waves: while page <= self.plan.max_pages {
            let wave_end = (page + self.plan.wave_size as u32 - 1).min(self.plan.max_pages);
            let pages: Vec<u32> = (page..=wave_end).collect();
            let bodies = join_all(pages.iter().map(|p| self.fetch_page(*p))).await;

            for (p, body) in pages.iter().zip(bodies) {
                let parsed = match body {
                    Ok(html) => Marketplace::parse_page(&html, window),
                    Err(err) => {
                        // One bad page ends the walk; earlier pages still count.
                        warn!(page = *p, ?err, "marketplace page fetch failed; stopping");
                        break 'waves;
                    }
                };
                if parsed.is_empty() {
                    debug!(page = *p, "empty marketplace page; stopping");
                    break 'waves;
                }
                events.extend(parsed);
            }

            page = wave_end + 1;
            if page <= self.plan.max_pages {
                tokio::time::sleep(self.plan.wave_delay).await;
            }
        }

        Ok(events)
    }
}

/// Recursively harvest JSON-LD nodes whose `@type` is `Event`, descending
/// through arrays, `ItemList.itemListElement`, and `ListItem.item` wrappers.
fn collect_event_nodes<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_event_nodes(item, out);
            }
        }
        Value::Object(map) => {
            if is_event_type(map.get("@type")) {
                out.push(value);
                return;
            }
            if let Some(items) = map.get("itemListElement") {
                collect_event_nodes(items, out);
            }
            if let Some(item) = map.get("item") {
                collect_event_nodes(item, out);
            }
        }
        _ => {}
    }
}

fn is_event_type(type_field: Option<&Value>) -> bool {
    match type_field {
        Some(Value::String(s)) => s == "Event",
        Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some("Event")),
        _ => false,
    }
}

fn normalize_node(node: &Value, window: &Window) -> Option<Event> {
    let name = clean_text(node.get("name")?.as_str()?);
    if name.is_empty() {
        return None;
    }
    let start = parse_start(node.get("startDate")?.as_str()?)?;
    if !window.contains(start.date) {
        return None;
    }

    let location = node.get("location");
    let venue = location.and_then(|l| l.get("name")).and_then(Value::as_str);
    let address = location.and_then(|l| l.get("address"));
    let neighborhood = address
        .and_then(|a| a.get("addressLocality"))
        .and_then(Value::as_str);
    let region = address
        .and_then(|a| a.get("addressRegion"))
        .and_then(Value::as_str);

    let description = node
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let link = node
        .get("url")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| LISTING_URL.to_string());

    Some(Event {
        date: start.date.format("%Y-%m-%d").to_string(),
        time: start.time.map(format_time_12h),
        location: compose_location(venue, neighborhood, region, "New York City"),
        description: clean_description(description, &name, Platform::Eventbrite),
        price: offer_price(node.get("offers")),
        source: SOURCE_TAG.to_string(),
        platform: Platform::Eventbrite,
        is_active: true,
        source_id: Some(link.clone()),
        link,
        name,
    })
}

/// First offer wins: a zero amount is `Free`, any other amount is `$<value>`,
/// and a listing without usable offer data is `Check site`.
fn offer_price(offers: Option<&Value>) -> String {
    let first = match offers {
        Some(Value::Array(items)) => items.first(),
        Some(value @ Value::Object(_)) => Some(value),
        _ => None,
    };
    let Some(offer) = first else {
        return "Check site".to_string();
    };

    let amount = offer
        .get("price")
        .or_else(|| offer.get("lowPrice"))
        .and_then(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    match amount {
        Some(raw) if is_zero_amount(&raw) => "Free".to_string(),
        Some(raw) => format!("${raw}"),
        None => "Check site".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn window() -> Window {
        Window::for_today(NaiveDate::from_ymd_opt(2026, 8, 7).unwrap())
    }

    const ITEM_LIST_HTML: &str = r#"
    <html><head>
    <script type="application/ld+json">
    {
      "@context": "https://schema.org",
      "@type": "ItemList",
      "itemListElement": [
        {
          "@type": "ListItem",
          "position": 1,
          "item": {
            "@type": "Event",
            "name": "NYC Jazz Night",
            "startDate": "2026-08-08T20:00:00-05:00",
            "location": {
              "name": "Blue Room",
              "address": {"addressLocality": "East Village", "addressRegion": "NY"}
            },
            "offers": {"price": "0.00"},
            "url": "https://www.eventbrite.com/e/nyc-jazz-night-tickets-1"
          }
        }
      ]
    }
    </script>
    </head><body></body></html>
    "#;

    #[test]
    fn parses_item_list_wrapped_events() {
        let events = Marketplace::parse_page(ITEM_LIST_HTML, &window());
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.name, "NYC Jazz Night");
        assert_eq!(event.price, "Free");
        assert_eq!(event.location, "Blue Room — East Village");
        assert_eq!(
            event.link,
            "https://www.eventbrite.com/e/nyc-jazz-night-tickets-1"
        );
        assert_eq!(event.platform, Platform::Eventbrite);
    }

    #[test]
    fn parses_bare_events_and_nested_arrays() {
        let html = r#"
        <script type="application/ld+json">
        [[
          {"@type": "Event", "name": "Rooftop Comedy", "startDate": "2026-08-09T19:30:00-04:00",
           "offers": [{"lowPrice": "15.00"}]},
          {"@type": "Organization", "name": "Not An Event"}
        ]]
        </script>
        <script type="application/ld+json">not json at all</script>
        "#;
        let events = Marketplace::parse_page(html, &window());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Rooftop Comedy");
        assert_eq!(events[0].price, "$15.00");
        assert_eq!(events[0].time.as_deref(), Some("7:30 PM"));
        assert_eq!(events[0].link, LISTING_URL);
    }

    #[test]
    fn page_level_dedup_on_name_and_date() {
        let html = r#"
        <script type="application/ld+json">
        [
          {"@type": "Event", "name": "Night Market", "startDate": "2026-08-10"},
          {"@type": "Event", "name": "night market", "startDate": "2026-08-10"},
          {"@type": "Event", "name": "Night Market", "startDate": "2026-08-11"}
        ]
        </script>
        "#;
        let events = Marketplace::parse_page(html, &window());
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn missing_offers_means_check_site() {
        let html = r#"
        <script type="application/ld+json">
        {"@type": "Event", "name": "Gallery Walk", "startDate": "2026-08-12"}
        </script>
        "#;
        let events = Marketplace::parse_page(html, &window());
        assert_eq!(events[0].price, "Check site");
        assert_eq!(events[0].time, None);
    }

    #[test]
    fn out_of_window_nodes_are_dropped() {
        let html = r#"
        <script type="application/ld+json">
        {"@type": "Event", "name": "Winter Gala", "startDate": "2026-12-31T20:00:00-05:00"}
        </script>
        "#;
        assert!(Marketplace::parse_page(html, &window()).is_empty());
    }

    #[test]
    fn event_type_arrays_are_recognized() {
        let value: Value = serde_json::json!({
            "@type": ["Event", "SocialEvent"],
            "name": "Block Party",
            "startDate": "2026-08-09"
        });
        let mut nodes = Vec::new();
        collect_event_nodes(&value, &mut nodes);
        assert_eq!(nodes.len(), 1);
    }
}
