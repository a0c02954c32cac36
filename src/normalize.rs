//! Shared normalization rules: the publish window, date/time parsing and
//! formatting, location composition, description sanitation, price shapes,
//! and cross-source dedup.
//!
//! Every adapter funnels its raw rows through these helpers so the canonical
//! `Event` invariants hold no matter which origin a record came from.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{Event, Platform};

pub const NY_TZ: Tz = chrono_tz::America::New_York;

/// Maximum published description length, ellipsis included.
const DESCRIPTION_MAX: usize = 150;
const DESCRIPTION_TRUNCATED: usize = 147;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

/// The 14-day publish window in America/New_York civil days.
///
/// `start` is today at local midnight; `end` is today+14, inclusive through
/// 23:59:59.999. Rows outside the window are dropped before publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    pub fn current() -> Window {
        Window::for_today(Utc::now().with_timezone(&NY_TZ).date_naive())
    }

    pub fn for_today(today: NaiveDate) -> Window {
        Window {
            start: today,
            end: today + Duration::days(14),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// `YYYY-MM-DD` lower bound for query parameters.
    pub fn start_param(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    /// Window bounds as UTC instants, for APIs that filter on ISO datetimes.
    pub fn utc_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let open = local_instant(self.start, NaiveTime::MIN);
        let close = local_instant(
            self.end,
            NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN),
        );
        (open, close)
    }
}

fn local_instant(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    // DST gaps resolve to the earliest valid instant.
    NY_TZ
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .unwrap_or_else(|| Utc.from_utc_datetime(&date.and_time(time)).with_timezone(&NY_TZ))
        .with_timezone(&Utc)
}

/// An event start resolved to the America/New_York civil day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventStart {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

/// Permissive start parsing: RFC 3339 with offset, naive datetime (assumed
/// already NY-local, as the municipal feeds emit), or a bare calendar date.
pub fn parse_start(raw: &str) -> Option<EventStart> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        let local = dt.with_timezone(&NY_TZ);
        return Some(EventStart {
            date: local.date_naive(),
            time: Some(local.time()),
        });
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(EventStart {
                date: naive.date(),
                time: Some(naive.time()),
            });
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(EventStart { date, time: None });
    }
    None
}

/// The en-US 12-hour rendering used across the snapshot, e.g. `"7:05 PM"`.
pub fn format_time_12h(time: NaiveTime) -> String {
    let (is_pm, hour) = time.hour12();
    format!(
        "{}:{:02} {}",
        hour,
        time.minute(),
        if is_pm { "PM" } else { "AM" }
    )
}

/// Borough code (or full name) normalization. Unknown values pass through.
pub fn borough_name(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed {
        "M" => "Manhattan",
        "B" => "Brooklyn",
        "Q" => "Queens",
        "X" => "Bronx",
        "R" => "Staten Island",
        _ => match trimmed.to_lowercase().as_str() {
            "manhattan" => "Manhattan",
            "brooklyn" => "Brooklyn",
            "queens" => "Queens",
            "bronx" | "the bronx" => "Bronx",
            "staten island" => "Staten Island",
            _ => return trimmed.to_string(),
        },
    }
    .to_string()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// `"<venue> — <area>[, <borough>]"` with `NY`/`New York` suppressed at the
/// borough slot; falls back to borough alone, then to the provided default.
pub fn compose_location(
    venue: Option<&str>,
    area: Option<&str>,
    borough: Option<&str>,
    fallback: &str,
) -> String {
    let area = non_empty(area).filter(|a| !is_state_label(a));
    let borough = non_empty(borough).filter(|b| !is_state_label(b));
    let Some(venue) = non_empty(venue) else {
        return area.or(borough).unwrap_or(fallback).to_string();
    };
    let mut out = venue.to_string();
    if let Some(area) = area {
        out.push_str(" — ");
        out.push_str(area);
    }
    if let Some(borough) = borough.filter(|b| !b.eq_ignore_ascii_case(venue)) {
        out.push_str(", ");
        out.push_str(borough);
    }
    out
}

fn is_state_label(value: &str) -> bool {
    value.eq_ignore_ascii_case("NY") || value.eq_ignore_ascii_case("New York")
}

/// Collapse runs of whitespace into single spaces.
pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Strip HTML, collapse whitespace, and clamp to the publish bound. Empty
/// input synthesizes `"<name>. Check <platform> for full details."`.
pub fn clean_description(raw: &str, name: &str, platform: Platform) -> String {
    let stripped = TAG_RE.replace_all(raw, " ");
    let text = clean_text(&decode_entities(&stripped));
    if text.is_empty() {
        return format!("{}. Check {} for full details.", name, platform.as_str());
    }
    truncate_description(&text)
}

fn truncate_description(text: &str) -> String {
    if text.chars().count() <= DESCRIPTION_MAX {
        return text.to_string();
    }
    let mut out: String = text.chars().take(DESCRIPTION_TRUNCATED).collect();
    out.push_str("...");
    out
}

/// `"$<n>"` or `"$<lo> - $<hi>"` from a ticketing price range.
pub fn format_price_range(min: f64, max: f64) -> String {
    if (min - max).abs() < f64::EPSILON {
        format!("${}", format_amount(min))
    } else {
        format!("${} - ${}", format_amount(min), format_amount(max))
    }
}

fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// A marketplace offer amount of zero means the listing is free.
pub fn is_zero_amount(raw: &str) -> bool {
    matches!(raw.trim().parse::<f64>(), Ok(v) if v == 0.0)
}

/// Cross-source dedup on `(lowercase(name), date)`, first occurrence wins.
/// Callers pass adapters' output concatenated in the fixed adapter order.
pub fn dedup_events(events: Vec<Event>) -> Vec<Event> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|event| seen.insert(event.dedup_key()))
        .collect()
}
