//! Offline facet extraction.
//!
//! Two catalogs feed the upstream query classifier: one derived from the
//! published snapshot (category matches and keyword frequencies), one pulled
//! straight from the municipal APIs (facet vocabularies the snapshot never
//! carries, like agencies and community boards).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::db;
use crate::http;

const PERMITTED_ENDPOINT: &str = "https://data.cityofnewyork.us/resource/tvpp-9vvx.json";
const PARKS_FEED: &str = "https://www.nycgovparks.org/xml/events_300_rss.json";
const TOP_KEYWORDS: usize = 100;
const MIN_KEYWORD_COUNT: usize = 3;

/// Fixed category vocabulary matched against the published snapshot text.
const CATEGORY_PATTERNS: &[(&str, &str)] = &[
    ("sports", r"(?i)\b(yoga|run|running|marathon|basketball|soccer|tennis|fitness|bike|cycling|skate|swim|golf|baseball)\b"),
    ("music", r"(?i)\b(music|concert|jazz|band|orchestra|hip-?hop|karaoke|choir|symphony|singer)\b"),
    ("comedy", r"(?i)\b(comedy|stand-?up|improv|comedian)\b"),
    ("theater", r"(?i)\b(theater|theatre|broadway|musical|opera|playwright)\b"),
    ("art", r"(?i)\b(art|gallery|exhibit|exhibition|mural|sculpture|painting)\b"),
    ("film", r"(?i)\b(film|movie|cinema|screening|documentary)\b"),
    ("dance", r"(?i)\b(dance|ballet|salsa|tango|swing)\b"),
    ("food", r"(?i)\b(food|tasting|dinner|brunch|restaurant|wine|beer|cocktail|pizza)\b"),
    ("market", r"(?i)\b(market|flea|bazaar|fair|vendors|pop-?up)\b"),
    ("education", r"(?i)\b(workshop|class|lecture|seminar|course|learning)\b"),
    ("networking", r"(?i)\b(networking|meetup|mixer|startup|career)\b"),
    ("family", r"(?i)\b(family|kids|children|toddler|storytime)\b"),
    ("outdoor", r"(?i)\b(park|outdoor|garden|hike|picnic|beach|waterfront)\b"),
    ("nightlife", r"(?i)\b(nightlife|party|club|rooftop|lounge)\b"),
    ("wellness", r"(?i)\b(wellness|meditation|mindfulness|spa|healing|breathwork)\b"),
    ("special", r"(?i)\b(festival|parade|celebration|holiday|fireworks|anniversary)\b"),
];

static CATEGORY_REGEXES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    CATEGORY_PATTERNS
        .iter()
        .map(|(name, pattern)| (*name, Regex::new(pattern).expect("valid category regex")))
        .collect()
});

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z']+").expect("valid word regex"));

/// Words too common (or too much our own boilerplate) to be useful keywords.
static STOP_WORDS: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    [
        "about", "after", "also", "celebrate", "check", "come", "details", "event", "events",
        "every", "experience", "featuring", "free", "from", "full", "have", "here", "join",
        "more", "night", "open", "over", "park", "parks", "source", "that", "their", "them",
        "there", "this", "through", "ticket", "tickets", "into", "what", "when", "where",
        "will", "with", "york", "your",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, Serialize)]
pub struct KeywordCount {
    pub word: String,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCatalog {
    pub generated_at: String,
    pub total_events: usize,
    pub platforms: Vec<String>,
    pub categories: Vec<String>,
    pub grouped_categories: BTreeMap<String, Vec<String>>,
    pub top_keywords: Vec<KeywordCount>,
}

/// Distinct text pulled from the published collection: the inputs to
/// category matching and keyword aggregation.
#[derive(Debug, Default)]
pub struct SnapshotText {
    pub total_events: usize,
    pub names: Vec<String>,
    pub descriptions: Vec<String>,
    pub platforms: Vec<String>,
    pub locations: Vec<String>,
}

impl SnapshotText {
    pub async fn from_store(pool: &db::Pool) -> Result<SnapshotText> {
        Ok(SnapshotText {
            total_events: db::count_events(pool).await? as usize,
            names: db::distinct_event_names(pool).await?,
            descriptions: db::distinct_event_descriptions(pool).await?,
            platforms: db::distinct_event_platforms(pool).await?,
            locations: db::distinct_event_locations(pool).await?,
        })
    }
}

/// Build the snapshot-derived catalog: category matches over the distinct
/// name/description/location text, keyword frequencies over descriptions.
pub fn build_catalog(snapshot: &SnapshotText, generated_at: DateTime<Utc>) -> CategoryCatalog {
    let mut corpus = String::new();
    for chunk in snapshot
        .names
        .iter()
        .chain(&snapshot.descriptions)
        .chain(&snapshot.locations)
    {
        corpus.push_str(chunk);
        corpus.push('\n');
    }

    let mut grouped_categories = BTreeMap::new();
    for (name, regex) in CATEGORY_REGEXES.iter() {
        let tokens: BTreeSet<String> = regex
            .find_iter(&corpus)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        if !tokens.is_empty() {
            grouped_categories.insert(name.to_string(), tokens.into_iter().collect());
        }
    }
    let categories: Vec<String> = grouped_categories.keys().cloned().collect();

    CategoryCatalog {
        generated_at: generated_at.to_rfc3339(),
        total_events: snapshot.total_events,
        platforms: snapshot.platforms.clone(),
        categories,
        grouped_categories,
        top_keywords: top_keywords(snapshot.descriptions.iter().map(String::as_str)),
    }
}

/// Whole-word frequencies from descriptions: words longer than three
/// characters, stop words removed, kept at three or more occurrences.
fn top_keywords<'a>(descriptions: impl Iterator<Item = &'a str>) -> Vec<KeywordCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for description in descriptions {
        let lowered = description.to_lowercase();
        for word in WORD_RE.find_iter(&lowered) {
            let word = word.as_str();
            if word.len() <= 3 || STOP_WORDS.contains(word) {
                continue;
            }
            *counts.entry(word.to_string()).or_default() += 1;
        }
    }

    let mut keywords: Vec<KeywordCount> = counts
        .into_iter()
        .filter(|(_, count)| *count >= MIN_KEYWORD_COUNT)
        .map(|(word, count)| KeywordCount { word, count })
        .collect();
    keywords.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
    keywords.truncate(TOP_KEYWORDS);
    keywords
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermittedFacets {
    pub event_types: Vec<String>,
    pub boroughs: Vec<String>,
    pub agencies: Vec<String>,
    pub street_closure_types: Vec<String>,
    pub community_boards: Vec<String>,
    pub police_precincts: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParksFacets {
    pub categories: Vec<String>,
    pub park_names: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamFacets {
    pub generated_at: String,
    pub permitted: PermittedFacets,
    pub parks: ParksFacets,
}

/// Pull facet vocabularies straight from the upstream APIs.
pub async fn fetch_upstream_facets(generated_at: DateTime<Utc>) -> Result<UpstreamFacets> {
    let permitted_rows: Vec<Value> = http::api_client()
        .get(PERMITTED_ENDPOINT)
        .query(&[("$limit", "1000")])
        .send()
        .await
        .context("permitted facet request failed")?
        .error_for_status()
        .context("permitted facet request returned an error status")?
        .json()
        .await
        .context("permitted facet response was not valid JSON")?;

    let parks_rows: Vec<Value> = http::api_client()
        .get(PARKS_FEED)
        .send()
        .await
        .context("parks facet request failed")?
        .error_for_status()
        .context("parks facet request returned an error status")?
        .json()
        .await
        .context("parks facet response was not valid JSON")?;

    Ok(UpstreamFacets {
        generated_at: generated_at.to_rfc3339(),
        permitted: permitted_facets(&permitted_rows),
        parks: parks_facets(&parks_rows),
    })
}

pub fn permitted_facets(rows: &[Value]) -> PermittedFacets {
    let mut community_boards = collect_field(rows, "community_board");
    numeric_aware_sort(&mut community_boards);
    let mut police_precincts = collect_field(rows, "police_precinct");
    numeric_aware_sort(&mut police_precincts);
    PermittedFacets {
        event_types: collect_field(rows, "event_type"),
        boroughs: collect_field(rows, "event_borough"),
        agencies: collect_field(rows, "event_agency"),
        street_closure_types: collect_field(rows, "street_closure_type"),
        community_boards,
        police_precincts,
    }
}

pub fn parks_facets(rows: &[Value]) -> ParksFacets {
    let mut categories = BTreeSet::new();
    for row in rows {
        if let Some(raw) = row.get("categories").and_then(Value::as_str) {
            for part in raw.split(',') {
                let part = part.trim();
                if !part.is_empty() {
                    categories.insert(part.to_string());
                }
            }
        }
    }
    ParksFacets {
        categories: categories.into_iter().collect(),
        park_names: collect_field(rows, "location"),
    }
}

/// Sorted unique non-empty string values of one field.
fn collect_field(rows: &[Value], field: &str) -> Vec<String> {
    let values: BTreeSet<String> = rows
        .iter()
        .filter_map(|row| row.get(field))
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect();
    values.into_iter().collect()
}

/// Values with a number in them sort by that number first, so "2" lands
/// before "10" and mixed labels stay stable.
fn numeric_aware_sort(values: &mut [String]) {
    values.sort_by(|a, b| match (first_number(a), first_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.cmp(b),
    });
}

fn first_number(value: &str) -> Option<i64> {
    static NUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid number regex"));
    NUM_RE.find(value)?.as_str().parse().ok()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantFacets {
    pub generated_at: String,
    pub total_restaurants: usize,
    pub cuisines: Vec<String>,
    pub price_levels: Vec<String>,
    pub google_types: Vec<String>,
}

pub fn build_restaurant_facets(
    payloads: &[Value],
    generated_at: DateTime<Utc>,
) -> RestaurantFacets {
    let mut cuisines = BTreeSet::new();
    let mut price_levels = BTreeSet::new();
    let mut google_types = BTreeSet::new();
    for payload in payloads {
        if let Some(c) = payload.get("cuisineDescription").and_then(Value::as_str) {
            if !c.trim().is_empty() {
                cuisines.insert(c.trim().to_string());
            }
        }
        match payload.get("priceLevel") {
            Some(Value::String(s)) if !s.trim().is_empty() => {
                price_levels.insert(s.trim().to_string());
            }
            Some(Value::Number(n)) => {
                price_levels.insert(n.to_string());
            }
            _ => {}
        }
        if let Some(types) = payload.get("googleTypes").and_then(Value::as_array) {
            for t in types.iter().filter_map(Value::as_str) {
                google_types.insert(t.to_string());
            }
        }
    }
    RestaurantFacets {
        generated_at: generated_at.to_rfc3339(),
        total_restaurants: payloads.len(),
        cuisines: cuisines.into_iter().collect(),
        price_levels: price_levels.into_iter().collect(),
        google_types: google_types.into_iter().collect(),
    }
}

/// Pretty-print a catalog to disk, creating the parent directory if needed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let rendered = serde_json::to_string_pretty(value).context("failed to render catalog")?;
    std::fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SnapshotText {
        SnapshotText {
            total_events: 2,
            names: vec!["Jazz Night".into(), "Morning Yoga".into()],
            descriptions: vec![
                "Live jazz with a full band.".into(),
                "Outdoor yoga session.".into(),
            ],
            platforms: vec!["Eventbrite".into(), "NYC Parks".into()],
            locations: vec![
                "Blue Room — East Village".into(),
                "Prospect Park — Brooklyn".into(),
            ],
        }
    }

    #[test]
    fn catalog_groups_matched_categories() {
        let catalog = build_catalog(&snapshot(), Utc::now());
        assert_eq!(catalog.total_events, 2);
        assert_eq!(
            catalog.platforms,
            vec!["Eventbrite".to_string(), "NYC Parks".to_string()]
        );
        assert!(catalog.categories.contains(&"music".to_string()));
        assert!(catalog.categories.contains(&"sports".to_string()));
        assert_eq!(
            catalog.grouped_categories["music"],
            vec!["band".to_string(), "jazz".to_string()]
        );
    }

    #[test]
    fn keywords_respect_length_stopword_and_count_rules() {
        let descriptions = vec![
            "salsa lessons with live salsa music and salsa dancing",
            "the dancing continues with more dancing",
            "free dancing for all",
        ];
        let keywords = top_keywords(descriptions.into_iter());
        let words: Vec<&str> = keywords.iter().map(|k| k.word.as_str()).collect();
        // "salsa" and "dancing" appear three times; "the"/"free"/"all" never qualify.
        assert!(words.contains(&"salsa"));
        assert!(words.contains(&"dancing"));
        assert!(!words.contains(&"free"));
        assert!(!words.contains(&"with"));
        assert!(!words.contains(&"all"));
    }

    #[test]
    fn numeric_aware_sort_orders_boards_naturally() {
        let mut values = vec![
            "10".to_string(),
            "2".to_string(),
            "Citywide".to_string(),
            "1".to_string(),
        ];
        numeric_aware_sort(&mut values);
        assert_eq!(values, vec!["1", "2", "10", "Citywide"]);
    }

    #[test]
    fn permitted_facets_collects_distinct_fields() {
        let rows = vec![
            serde_json::json!({"event_type": "Special Event", "event_borough": "Manhattan", "community_board": "12", "police_precinct": "5"}),
            serde_json::json!({"event_type": "Street Fair", "event_borough": "Manhattan", "community_board": "3", "police_precinct": "19"}),
        ];
        let facets = permitted_facets(&rows);
        assert_eq!(facets.event_types, vec!["Special Event", "Street Fair"]);
        assert_eq!(facets.boroughs, vec!["Manhattan"]);
        assert_eq!(facets.community_boards, vec!["3", "12"]);
        assert_eq!(facets.police_precincts, vec!["5", "19"]);
    }

    #[test]
    fn parks_facets_split_categories() {
        let rows = vec![
            serde_json::json!({"categories": "Fitness, Outdoor Fitness", "location": "Prospect Park"}),
            serde_json::json!({"categories": "Art", "location": "Central Park"}),
        ];
        let facets = parks_facets(&rows);
        assert_eq!(facets.categories, vec!["Art", "Fitness", "Outdoor Fitness"]);
        assert_eq!(facets.park_names, vec!["Central Park", "Prospect Park"]);
    }

    #[test]
    fn write_json_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        write_json(&path, &serde_json::json!({"ok": true})).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"ok\""));
    }

    #[test]
    fn restaurant_facets_from_payloads() {
        let payloads = vec![
            serde_json::json!({"cuisineDescription": "Pizza", "priceLevel": 2, "googleTypes": ["restaurant", "bar"]}),
            serde_json::json!({"cuisineDescription": "Thai", "priceLevel": "PRICE_LEVEL_MODERATE"}),
        ];
        let facets = build_restaurant_facets(&payloads, Utc::now());
        assert_eq!(facets.cuisines, vec!["Pizza", "Thai"]);
        assert_eq!(facets.price_levels, vec!["2", "PRICE_LEVEL_MODERATE"]);
        assert_eq!(facets.google_types, vec!["bar", "restaurant"]);
    }
}
