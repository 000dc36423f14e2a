use std::collections::HashSet;

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use super::base::{self, SelectorChain};
use super::{collect_candidates, RunContext, VenueScraper};
use crate::models::Event;
use crate::normalize;

const BASE_URL: &str = "https://www.sfjazz.org";
const URL: &str = "https://www.sfjazz.org/calendar/";
const VENUE_ID: &str = "sfjazz";
const VENUE_NAME: &str = "SFJAZZ Center";

const DENYLIST: [&str; 23] = [
    "MORE INFO",
    "BUY TICKETS",
    "LEARN MORE",
    "SOLD OUT",
    "ABOUT",
    "CONTACT",
    "SUPPORT",
    "DONATE",
    "JOIN",
    "LOGIN",
    "SIGN IN",
    "CALENDAR",
    "EVENTS",
    "HOME",
    "MENU",
    "TICKETS",
    "SUBSCRIBE",
    "MEMBERSHIP",
    "GIFT CARDS",
    "SEARCH",
    "SFJAZZ CENTER",
    "SFJAZZ",
    "201 FRANKLIN ST",
];
const LINK_NOISE: [&str; 4] = ["MORE INFO", "BUY TICKETS", "LEARN MORE", "SOLD OUT"];
const ROOM_WORDS: [&str; 5] = ["lab", "auditorium", "hall", "room", "lounge"];
const MIN_TITLE_CHARS: usize = 4;

static CARDS: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[
        ".calendar-list-item",
        ".event-card",
        ".calendar-event",
        ".show-item",
        "[class*='calendar-item']",
        "[class*='event-item']",
        ".show-card",
        "article[class*='event']",
    ])
});
static TITLE: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[
        "h2",
        "h3",
        "h4",
        ".event-title",
        ".title",
        "[class*='title']",
        "[class*='name']",
    ])
});
static DATE: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[".date", ".event-date", "[class*='date']", "time", "[datetime]"])
});
static TIME: Lazy<SelectorChain> =
    Lazy::new(|| SelectorChain::new(&[".time", ".event-time", "[class*='time']"]));
static STATUS: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[".status", ".badge", "[class*='sold-out']", "[class*='status']"])
});
static SERIES: Lazy<SelectorChain> =
    Lazy::new(|| SelectorChain::new(&[".series", ".category", "[class*='series']"]));
static DESCRIPTION: Lazy<SelectorChain> =
    Lazy::new(|| SelectorChain::new(&[".description", ".summary", "p"]));

static CARD_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a[href*='ticket'], a[href*='event'], a[href*='show']")
        .expect("sfjazz card link selector")
});
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("sfjazz image selector"));
static TICKET_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[href*="/tickets/events/"]"#).expect("sfjazz ticket link selector")
});

static WEEKDAY_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(MON|TUE|WED|THU|FRI|SAT|SUN)").expect("weekday prefix regex"));
static LEADING_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\d{1,2}:\d{2}\s*(AM|PM)?").expect("leading time regex")
});
static TIME_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d{1,2}:\d{2}|\d{1,2}\s*(AM|PM))").expect("time line regex"));

pub struct SfJazz;

impl VenueScraper for SfJazz {
    fn venue_id(&self) -> &'static str {
        VENUE_ID
    }

    fn venue_name(&self) -> &'static str {
        VENUE_NAME
    }

    fn venue_url(&self) -> &'static str {
        URL
    }

    fn extract(&self, html: &str, ctx: &mut RunContext) -> Vec<Event> {
        let embedded = embedded_events(html, ctx);
        if !embedded.is_empty() {
            ctx.note(&format!("{} events from embedded JSON", embedded.len()));
            return embedded;
        }

        let document = Html::parse_document(html);
        let root = document.root_element();
        let cards = CARDS.all_elements(&root);
        if cards.is_empty() {
            ctx.note("no event cards, scanning ticket links");
            return ticket_link_events(&root, ctx);
        }

        collect_candidates(ctx, cards, |card, ctx| {
            Ok(parse_card(card, ctx)?.into_iter().collect())
        })
    }
}

/// Listing data some calendar builds inline as a script global.
fn embedded_events(html: &str, ctx: &mut RunContext) -> Vec<Event> {
    let items = base::script_assignment(html, "window.calendarEvents")
        .filter(Value::is_array)
        .or_else(|| base::script_assignment(html, "window.events").filter(Value::is_array))
        .or_else(|| {
            base::script_assignment(html, "window.__INITIAL_STATE__")
                .and_then(|state| state.get("events").cloned())
                .filter(Value::is_array)
        });
    let Some(Value::Array(items)) = items else {
        return Vec::new();
    };

    collect_candidates(ctx, items, |item, ctx| {
        let text = |key: &str| {
            item.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };
        let Some(title) = text("name").or_else(|| text("title")) else {
            ctx.skip("embedded event without a title");
            return Ok(Vec::new());
        };

        let date = text("date")
            .or_else(|| text("startDate"))
            .and_then(|raw| normalize::normalize_date(raw, ctx.today()))
            .unwrap_or_else(|| ctx.today());
        let venue = text("venueName").unwrap_or(VENUE_NAME);

        let mut event = Event::new(normalize::clean_text(title), date, venue, ctx.scraped_at());
        event.time = text("timeString")
            .or_else(|| text("time"))
            .and_then(normalize::normalize_time);
        event.description = text("description").and_then(normalize::normalize_description);
        event.ticket_url = base::absolute_url(
            BASE_URL,
            text("url").or_else(|| text("ticketUrl")).map(str::to_string),
        );
        event.status = text("status").map(str::to_string);
        event.series = text("seriesName").map(str::to_string);
        Ok(vec![event])
    })
}

fn parse_card(card: ElementRef<'_>, ctx: &mut RunContext) -> Result<Option<Event>> {
    let title = TITLE
        .first_with_text(&card)
        .map(base::text_lines)
        .unwrap_or_else(|| base::text_lines(card))
        .into_iter()
        .next();
    let Some(title) = title else {
        ctx.skip("card without text");
        return Ok(None);
    };
    if let Some(reason) = rejected_title(&title) {
        ctx.skip(reason);
        return Ok(None);
    }

    let date = DATE
        .first_text(&card)
        .or_else(|| DATE.first_attr(&card, &["datetime"]))
        .and_then(|raw| normalize::normalize_date(&raw, ctx.today()))
        .unwrap_or_else(|| ctx.today());

    let mut event = Event::new(title, date, VENUE_NAME, ctx.scraped_at());

    let href = card
        .select(&CARD_LINK_SELECTOR)
        .next()
        .and_then(|link| link.value().attr("href"))
        .or_else(|| card.value().attr("href"))
        .map(str::to_string);
    event.ticket_url = base::absolute_url(BASE_URL, href);
    event.image_url = base::absolute_url(
        BASE_URL,
        base::first_attr(&card, &IMAGE_SELECTOR, "src"),
    );
    event.status = STATUS.first_text(&card);
    event.series = SERIES.first_text(&card);

    let time_text = TIME.first_text(&card);
    let description = DESCRIPTION
        .first_with_text(&card)
        .map(|el| base::text_lines(el).join("\n"));
    let (time, room) = split_time_venue(time_text.as_deref().or(description.as_deref()));
    event.time = time.as_deref().and_then(normalize::normalize_time);
    if let Some(room) = room {
        event.venue = room;
    }
    event.description = description
        .filter(|text| Some(normalize::clean_text(text)) != time_text)
        .and_then(|text| normalize::normalize_description(&text));

    Ok(Some(event))
}

/// Why a card title is navigation chrome rather than a show, if it is.
fn rejected_title(title: &str) -> Option<&'static str> {
    let upper = title.to_uppercase();
    if base::is_denied(title, &DENYLIST) {
        Some("navigation title")
    } else if title.chars().count() < MIN_TITLE_CHARS {
        Some("title too short")
    } else if upper.starts_with("W/") {
        Some("supporting act line")
    } else if WEEKDAY_PREFIX_RE.is_match(&upper) {
        Some("date line as title")
    } else {
        None
    }
}

/// Splits strings like `7:00 PM | Joe Henderson Lab` into a time and, when
/// the other part names a room, a venue.
fn split_time_venue(text: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return (None, None);
    };

    if text.contains('|') {
        let mut time = None;
        let mut room = None;
        for part in text.split('|').map(str::trim) {
            if LEADING_TIME_RE.is_match(part) {
                time = Some(part.to_string());
            } else if !part.is_empty() && room.is_none() {
                let lowered = part.to_lowercase();
                if ROOM_WORDS.iter().any(|word| lowered.contains(word)) {
                    room = Some(part.to_string());
                }
            }
        }
        return (time, room);
    }

    let time = LEADING_TIME_RE.find(text).map(|m| m.as_str().to_string());
    (time, None)
}

fn ticket_link_events(root: &ElementRef<'_>, ctx: &mut RunContext) -> Vec<Event> {
    let mut seen = HashSet::new();
    let links: Vec<_> = root
        .select(&TICKET_LINK_SELECTOR)
        .filter(|link| {
            link.value()
                .attr("href")
                .is_some_and(|href| !href.is_empty() && seen.insert(href.to_string()))
        })
        .collect();
    ctx.note(&format!("{} distinct ticket links", links.len()));

    collect_candidates(ctx, links, |link, ctx| {
        let mut lines = base::text_lines(link);
        if lines.iter().all(|line| LINK_NOISE.contains(&line.as_str())) {
            if let Some(container) = base::closest(&link, &["div"]) {
                lines = base::text_lines(container);
            }
        }
        lines.retain(|line| !LINK_NOISE.contains(&line.as_str()));
        if lines.is_empty() {
            ctx.skip("ticket link without text");
            return Ok(Vec::new());
        }

        let mut title = None;
        let mut date_line = None;
        let mut time_line = None;
        for line in &lines {
            if WEEKDAY_PREFIX_RE.is_match(&line.to_uppercase()) {
                date_line = Some(line.as_str());
            } else if TIME_LINE_RE.is_match(line) {
                time_line = Some(line.as_str());
            } else if title.is_none() && line.chars().count() > 3 {
                title = Some(line.clone());
            }
        }
        let title = title.unwrap_or_else(|| lines[0].clone());

        let date = date_line
            .and_then(|line| normalize::normalize_date(line, ctx.today()))
            .unwrap_or_else(|| ctx.today());
        let mut event = Event::new(title, date, VENUE_NAME, ctx.scraped_at());
        event.time = time_line.and_then(normalize::normalize_time);
        event.ticket_url = base::absolute_url(
            BASE_URL,
            link.value().attr("href").map(str::to_string),
        );
        Ok(vec![event])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    const SAMPLE_HTML: &str = r#"
    <html><body>
    <nav><a href="/calendar/">CALENDAR</a></nav>
    <div class="calendar-list-item">
        <div class="date">SAT, JAN 17</div>
        <h3>Charles Lloyd<br>Sky Quartet</h3>
        <div class="time">7:30 PM | Miner Auditorium</div>
        <span class="badge">Few Tickets Left</span>
        <span class="series">Legends</span>
        <p>Saxophone master<br>returns home</p>
        <a href="/tickets/events/charles-lloyd-2025">BUY TICKETS</a>
        <img src="/media/lloyd.jpg">
    </div>
    <div class="calendar-list-item">
        <div class="date">SUN, JAN 18</div>
        <h3>W/ Special Guests</h3>
    </div>
    <div class="calendar-list-item">
        <h3>BUY TICKETS</h3>
    </div>
    <div class="calendar-list-item">
        <div class="date">Feb 2</div>
        <h3>SFJAZZ High School All-Stars</h3>
        <div class="time">2:00 PM</div>
        <a href="https://www.sfjazz.org/tickets/events/all-stars">MORE INFO</a>
    </div>
    </body></html>
    "#;

    const LINKS_ONLY_HTML: &str = r#"
    <html><body>
    <div>
        <a href="/tickets/events/meshell">
            <span>THU, MAR 6</span>
            <span>Meshell Ndegeocello</span>
            <span>8:00 PM</span>
        </a>
    </div>
    <div>
        <span>FRI, MAR 7</span>
        <h4>Brad Mehldau Trio</h4>
        <a href="/tickets/events/mehldau">BUY TICKETS</a>
    </div>
    <div><a href="/tickets/events/meshell">MORE INFO</a></div>
    </body></html>
    "#;

    fn ctx() -> RunContext {
        RunContext::new(VENUE_ID, Utc.with_ymd_and_hms(2025, 1, 10, 20, 0, 0).unwrap())
    }

    #[test]
    fn parses_calendar_cards() {
        let mut ctx = ctx();
        let events = SfJazz.extract(SAMPLE_HTML, &mut ctx);
        assert_eq!(events.len(), 2);

        let lloyd = &events[0];
        assert_eq!(lloyd.title, "Charles Lloyd");
        assert_eq!(lloyd.artists, vec!["Charles Lloyd".to_string()]);
        assert_eq!(lloyd.date, NaiveDate::from_ymd_opt(2025, 1, 17).unwrap());
        assert_eq!(lloyd.time.as_deref(), Some("7:30 PM"));
        assert_eq!(lloyd.venue, "Miner Auditorium");
        assert_eq!(lloyd.status.as_deref(), Some("Few Tickets Left"));
        assert_eq!(lloyd.series.as_deref(), Some("Legends"));
        assert_eq!(lloyd.description.as_deref(), Some("Saxophone master\nreturns home"));
        assert_eq!(
            lloyd.ticket_url.as_deref(),
            Some("https://www.sfjazz.org/tickets/events/charles-lloyd-2025")
        );
        assert_eq!(lloyd.image_url.as_deref(), Some("https://www.sfjazz.org/media/lloyd.jpg"));

        let all_stars = &events[1];
        assert_eq!(all_stars.title, "SFJAZZ High School All-Stars");
        assert_eq!(all_stars.date, NaiveDate::from_ymd_opt(2025, 2, 2).unwrap());
        assert_eq!(all_stars.time.as_deref(), Some("2:00 PM"));
        assert_eq!(all_stars.venue, "SFJAZZ Center");
        assert_eq!(all_stars.description, None);
        assert_eq!(ctx.skipped(), 2);
    }

    #[test]
    fn title_filters() {
        assert_eq!(rejected_title("Sold Out"), Some("navigation title"));
        assert_eq!(rejected_title("Joe"), Some("title too short"));
        assert_eq!(rejected_title("w/ Friends"), Some("supporting act line"));
        assert_eq!(rejected_title("Fri, Jan 17"), Some("date line as title"));
        assert_eq!(rejected_title("Kenny Barron"), None);
    }

    #[test]
    fn time_and_room_split() {
        assert_eq!(
            split_time_venue(Some("7:00 PM | Joe Henderson Lab")),
            (Some("7:00 PM".to_string()), Some("Joe Henderson Lab".to_string()))
        );
        assert_eq!(
            split_time_venue(Some("7:00 PM | Two Sets")),
            (Some("7:00 PM".to_string()), None)
        );
        assert_eq!(
            split_time_venue(Some("Joe Henderson Lab | 7:00 PM")),
            (Some("7:00 PM".to_string()), Some("Joe Henderson Lab".to_string()))
        );
        assert_eq!(split_time_venue(Some("8:00pm")), (Some("8:00pm".to_string()), None));
        assert_eq!(split_time_venue(Some("Two sets nightly")), (None, None));
        assert_eq!(split_time_venue(None), (None, None));
    }

    #[test]
    fn embedded_json_wins_over_markup() {
        let html = r#"<script>window.calendarEvents = [
            {"name": "Regina Carter", "date": "2025-03-14", "timeString": "7:30pm",
             "venueName": "Joe Henderson Lab", "url": "/tickets/events/carter", "seriesName": "Strings"},
            {"title": "Untitled Fallback", "startDate": "March 15, 2025"},
            {"date": "2025-03-16"}
        ];</script>
        <div class="calendar-list-item"><h3>Ignored Card</h3></div>"#;
        let mut ctx = ctx();
        let events = SfJazz.extract(html, &mut ctx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "Regina Carter");
        assert_eq!(events[0].time.as_deref(), Some("7:30 PM"));
        assert_eq!(events[0].venue, "Joe Henderson Lab");
        assert_eq!(
            events[0].ticket_url.as_deref(),
            Some("https://www.sfjazz.org/tickets/events/carter")
        );
        assert_eq!(events[1].title, "Untitled Fallback");
        assert_eq!(events[1].date, NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
        assert_eq!(events[1].venue, "SFJAZZ Center");
        assert_eq!(ctx.skipped(), 1);
    }

    #[test]
    fn falls_back_to_ticket_links() {
        let events = SfJazz.extract(LINKS_ONLY_HTML, &mut ctx());
        assert_eq!(events.len(), 2);

        assert_eq!(events[0].title, "Meshell Ndegeocello");
        assert_eq!(events[0].date, NaiveDate::from_ymd_opt(2025, 3, 6).unwrap());
        assert_eq!(events[0].time.as_deref(), Some("8:00 PM"));
        assert_eq!(
            events[0].ticket_url.as_deref(),
            Some("https://www.sfjazz.org/tickets/events/meshell")
        );

        assert_eq!(events[1].title, "Brad Mehldau Trio");
        assert_eq!(events[1].date, NaiveDate::from_ymd_opt(2025, 3, 7).unwrap());
        assert_eq!(events[1].time, None);
    }
}
