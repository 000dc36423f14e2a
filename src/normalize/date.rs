use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use super::text::clean_text;

/// Venue calendars are authored in Pacific time; offset-carrying timestamps are
/// converted here before the calendar day is taken.
pub const REFERENCE_TZ: Tz = chrono_tz::America::Los_Angeles;

/// A year-less date further in the past than this is assumed to be next year's.
const ROLLOVER_GRACE_DAYS: i64 = 30;

const STRUCTURED_FORMATS: [&str; 6] = [
    "%A, %B %d, %Y",
    "%B %d, %Y",
    "%m/%d/%Y",
    "%a, %b %d, %Y",
    "%b %d, %Y",
    "%A %m/%d/%Y",
];

const MONTHS: [(&str, u32); 12] = [
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

static ISO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})(.*)$").expect("iso date regex"));
static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}:\d{2}").expect("clock regex"));

/// Resolves free text into a calendar day.
///
/// Tries ISO 8601 first, then a fixed list of long/numeric formats, then a
/// token scan for a month name, the nearest day number and an optional `20xx`
/// year. `today` anchors year inference for dates printed without a year.
pub fn normalize_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let cleaned = clean_text(text);
    if cleaned.is_empty() {
        return None;
    }

    if let Some(date) = parse_iso(&cleaned) {
        return Some(date);
    }

    for fmt in STRUCTURED_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, fmt) {
            return Some(date);
        }
    }

    scan_tokens(&cleaned, today)
}

/// Splits a machine timestamp into the Pacific calendar day and a display
/// time such as `7:30 PM`. Naive timestamps are taken as already local.
pub fn split_timestamp(text: &str) -> Option<(NaiveDate, String)> {
    let trimmed = text.trim();
    if let Some(local) = parse_offset_timestamp(trimmed) {
        return Some((local.date_naive(), local.format("%-I:%M %p").to_string()));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some((naive.date(), naive.format("%-I:%M %p").to_string()));
        }
    }
    None
}

fn parse_iso(text: &str) -> Option<NaiveDate> {
    let caps = ISO_RE.captures(text)?;
    let year = caps.get(1)?.as_str().parse().ok()?;
    let month = caps.get(2)?.as_str().parse().ok()?;
    let day = caps.get(3)?.as_str().parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let suffix = caps.get(4).map_or("", |m| m.as_str()).trim();
    if suffix.is_empty() {
        return Some(date);
    }
    match parse_offset_timestamp(text) {
        Some(local) => Some(local.date_naive()),
        None => Some(date),
    }
}

fn parse_offset_timestamp(text: &str) -> Option<DateTime<Tz>> {
    let normalized = match text.strip_suffix('Z').or_else(|| text.strip_suffix('z')) {
        Some(head) => format!("{head}+00:00"),
        None => text.to_string(),
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(parsed.with_timezone(&REFERENCE_TZ));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(parsed) = DateTime::parse_from_str(&normalized, fmt) {
            return Some(parsed.with_timezone(&REFERENCE_TZ));
        }
    }
    None
}

fn scan_tokens(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let without_clock = CLOCK_RE.replace_all(text, " ");
    let lowered = without_clock.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect();

    let (month_idx, month) = tokens
        .iter()
        .enumerate()
        .find_map(|(idx, token)| month_number(token).map(|month| (idx, month)))?;

    // Nearest number wins; on a tie the one after the month ("Jan 17") is preferred.
    let day = tokens
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != month_idx)
        .filter_map(|(idx, token)| {
            day_number(token).map(|day| ((idx.abs_diff(month_idx), idx < month_idx), day))
        })
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, day)| day)?;

    match tokens.iter().find_map(|token| year_number(token)) {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => infer_year(month, day, today),
    }
}

fn month_number(token: &str) -> Option<u32> {
    if token.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .find(|(name, _)| name.starts_with(token))
        .map(|(_, number)| *number)
}

fn day_number(token: &str) -> Option<u32> {
    let digits = ["st", "nd", "rd", "th"]
        .iter()
        .find_map(|suffix| token.strip_suffix(suffix))
        .unwrap_or(token);
    if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|day| (1..=31).contains(day))
}

fn year_number(token: &str) -> Option<i32> {
    if token.len() == 4 && token.starts_with("20") && token.bytes().all(|b| b.is_ascii_digit()) {
        token.parse().ok()
    } else {
        None
    }
}

fn infer_year(month: u32, day: u32, today: NaiveDate) -> Option<NaiveDate> {
    let cutoff = today - Duration::days(ROLLOVER_GRACE_DAYS);
    match NaiveDate::from_ymd_opt(today.year(), month, day) {
        Some(date) if date >= cutoff => Some(date),
        _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
    }
}
