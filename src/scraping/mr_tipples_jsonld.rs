use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use super::base::{self, SelectorChain};
use super::{collect_candidates, RunContext, VenueScraper};
use crate::models::Event;
use crate::normalize;

const BASE_URL: &str = "https://mrtipplessf.com";
const URL: &str = "https://mrtipplessf.com/calendar/";
const VENUE_ID: &str = "mrtipples";
const VENUE_NAME: &str = "Mr. Tipple's";

static EVENT_ROWS: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[
        ".tribe-events-calendar-list__event",
        ".tribe-common-g-row",
        ".tribe-events-pro-photo__event",
        "article.tribe-events-pro-photo__event",
        ".type-tribe_events",
        "[class*='tribe-events'] article",
    ])
});
static TITLE: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[
        ".tribe-events-calendar-list__event-title a",
        ".tribe-events-pro-photo__event-title a",
        "h3 a",
        "h2 a",
        ".tribe-events-title a",
        "a.tribe-event-url",
    ])
});

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*='event']").expect("tipples link selector"));
static DATETIME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time[datetime], [datetime]").expect("tipples datetime selector"));
static PRICE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".tribe-events-c-small-cta__price, [class*='price']")
        .expect("tipples price selector")
});
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("tipples image selector"));

static MONTH_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2}\b",
    )
    .expect("month day regex")
});

pub struct MrTipples;

impl VenueScraper for MrTipples {
    fn venue_id(&self) -> &'static str {
        VENUE_ID
    }

    fn venue_name(&self) -> &'static str {
        VENUE_NAME
    }

    fn venue_url(&self) -> &'static str {
        URL
    }

    /// Structured data first, then the calendar markup. Both are kept: the
    /// later DOM candidate replaces a JSON-LD one with the same identity.
    fn extract(&self, html: &str, ctx: &mut RunContext) -> Vec<Event> {
        let document = Html::parse_document(html);

        let nodes: Vec<Value> = base::ld_json_blocks(&document)
            .into_iter()
            .flat_map(flatten_ld_json)
            .filter(is_event_node)
            .collect();
        ctx.note(&format!("{} events in structured data", nodes.len()));
        let mut events = collect_candidates(ctx, nodes, |node, ctx| {
            Ok(parse_schema_event(&node, ctx)?.into_iter().collect())
        });

        let rows = EVENT_ROWS.all_elements(&document.root_element());
        ctx.note(&format!("{} calendar rows", rows.len()));
        events.extend(collect_candidates(ctx, rows, |row, ctx| {
            Ok(parse_calendar_row(row, ctx)?.into_iter().collect())
        }));
        events
    }
}

/// A JSON-LD block may be one node, a list of nodes, or an `@graph` wrapper.
fn flatten_ld_json(block: Value) -> Vec<Value> {
    match block {
        Value::Array(items) => items.into_iter().flat_map(flatten_ld_json).collect(),
        Value::Object(mut object) => match object.remove("@graph") {
            Some(graph) => flatten_ld_json(graph),
            None => vec![Value::Object(object)],
        },
        _ => Vec::new(),
    }
}

fn is_event_node(node: &Value) -> bool {
    let is_event_type = |kind: &str| kind.ends_with("Event");
    match node.get("@type") {
        Some(Value::String(kind)) => is_event_type(kind),
        Some(Value::Array(kinds)) => kinds.iter().filter_map(Value::as_str).any(is_event_type),
        _ => false,
    }
}

fn parse_schema_event(node: &Value, ctx: &mut RunContext) -> Result<Option<Event>> {
    let title = node
        .get("name")
        .and_then(Value::as_str)
        .map(normalize::clean_text)
        .unwrap_or_default();
    if title.is_empty() {
        ctx.skip("structured event without a name");
        return Ok(None);
    }

    let today = ctx.today();
    let start = node.get("startDate").and_then(Value::as_str).unwrap_or_default();
    let (date, time) = match normalize::split_timestamp(start) {
        Some((date, time)) => (date, Some(time)),
        None => (normalize::normalize_date(start, today).unwrap_or(today), None),
    };

    let mut event = Event::new(title, date, VENUE_NAME, ctx.scraped_at());
    event.time = time;
    event.description = node
        .get("description")
        .and_then(Value::as_str)
        .and_then(normalize::normalize_description);
    event.ticket_url = node
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string);
    event.image_url = node.get("image").and_then(normalize::first_image_url);

    let prices: Vec<String> = match node.get("offers") {
        Some(Value::Array(offers)) => offers
            .iter()
            .filter_map(|offer| offer.get("price"))
            .filter_map(normalize::price_from_json)
            .collect(),
        Some(offer) if offer.is_object() => offer
            .get("price")
            .and_then(normalize::price_from_json)
            .into_iter()
            .collect(),
        _ => Vec::new(),
    };
    event.price = normalize::format_price(&prices);

    Ok(Some(event))
}

fn parse_calendar_row(row: ElementRef<'_>, ctx: &mut RunContext) -> Result<Option<Event>> {
    let Some(title) = TITLE.first_text(&row) else {
        ctx.skip("calendar row without a title");
        return Ok(None);
    };

    let today = ctx.today();
    let stamp = base::first_attr(&row, &DATETIME_SELECTOR, "datetime");
    let (date, time) = match stamp.as_deref().and_then(normalize::split_timestamp) {
        Some((date, time)) => (Some(date), Some(time)),
        // date-only attributes carry no showtime
        None => (
            stamp.as_deref().and_then(|text| normalize::normalize_date(text, today)),
            None,
        ),
    };
    let date = date
        .or_else(|| {
            let text = base::inner_text(row);
            MONTH_DAY_RE
                .find(&text)
                .and_then(|found| normalize::normalize_date(found.as_str(), today))
        })
        .unwrap_or(today);

    let mut event = Event::new(title, date, VENUE_NAME, ctx.scraped_at());
    event.time = time;
    event.ticket_url = base::absolute_url(BASE_URL, base::first_attr(&row, &LINK_SELECTOR, "href"));
    event.image_url = base::absolute_url(BASE_URL, base::first_attr(&row, &IMAGE_SELECTOR, "src"));
    event.price = base::first_text(&row, &PRICE_SELECTOR).map(|text| {
        normalize::format_price(&normalize::prices_in_text(&text)).unwrap_or(text)
    });

    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup;
    use crate::models::IdentityScope;
    use chrono::{NaiveDate, TimeZone, Utc};

    const SAMPLE_HTML: &str = r#"
    <html><head>
    <script type="application/ld+json">
    [
        {
            "@context": "http://schema.org",
            "@type": "Event",
            "name": "Kev Choice Ensemble",
            "startDate": "2025-01-18T19:30:00-08:00",
            "url": "https://mrtipplessf.com/event/kev-choice-ensemble/",
            "offers": {"@type": "Offer", "price": "15"},
            "image": ["https://mrtipplessf.com/wp-content/uploads/kev.jpg"],
            "description": "Hip hop meets jazz<br />Two sets"
        },
        {"@type": "Organization", "name": "Mr. Tipple's Recording Studio"}
    ]
    </script>
    <script type="application/ld+json">
    {"@context": "https://schema.org", "@graph": [
        {"@type": "WebPage", "name": "Calendar"},
        {
            "@type": ["MusicEvent"],
            "name": "Sunday Standards",
            "startDate": "2025-01-19",
            "offers": [{"price": 10}, {"price": 20}],
            "image": {"@type": "ImageObject", "url": "https://cdn.example/standards.jpg"}
        },
        {"@type": "Event", "startDate": "2025-01-20T20:00:00-08:00"}
    ]}
    </script>
    <script type="application/ld+json">{ not json</script>
    </head><body>
    <div class="tribe-events-calendar-list">
        <article class="tribe-events-calendar-list__event">
            <time class="tribe-events-calendar-list__event-datetime" datetime="2025-01-19">January 19</time>
            <img src="/wp-content/uploads/standards-dom.jpg">
            <h3 class="tribe-events-calendar-list__event-title">
                <a href="https://mrtipplessf.com/event/sunday-standards/">Sunday Standards</a>
            </h3>
            <span class="tribe-events-c-small-cta__price">$12</span>
        </article>
        <article class="tribe-events-calendar-list__event">
            <h3 class="tribe-events-calendar-list__event-title">
                <a href="/event/vinyl-night/">Vinyl Night</a>
            </h3>
            <p>Thursday, February 6 @ 8:00 pm</p>
            <span class="tribe-events-c-small-cta__price">Free</span>
        </article>
        <article class="tribe-events-calendar-list__event">
            <p>Closed for a private event</p>
        </article>
    </div>
    </body></html>
    "#;

    fn ctx() -> RunContext {
        RunContext::new(VENUE_ID, Utc.with_ymd_and_hms(2025, 1, 10, 20, 0, 0).unwrap())
    }

    fn find<'a>(events: &'a [Event], title: &str) -> Vec<&'a Event> {
        events.iter().filter(|event| event.title == title).collect()
    }

    #[test]
    fn reads_structured_events_in_every_shape() {
        let mut ctx = ctx();
        let events = MrTipples.extract(SAMPLE_HTML, &mut ctx);

        let kev = find(&events, "Kev Choice Ensemble");
        assert_eq!(kev.len(), 1);
        let kev = kev[0];
        assert_eq!(kev.date, NaiveDate::from_ymd_opt(2025, 1, 18).unwrap());
        assert_eq!(kev.time.as_deref(), Some("7:30 PM"));
        assert_eq!(kev.price.as_deref(), Some("$15"));
        assert_eq!(kev.description.as_deref(), Some("Hip hop meets jazz\nTwo sets"));
        assert_eq!(
            kev.image_url.as_deref(),
            Some("https://mrtipplessf.com/wp-content/uploads/kev.jpg")
        );
        assert_eq!(kev.venue, "Mr. Tipple's");

        let standards = find(&events, "Sunday Standards");
        assert_eq!(standards.len(), 2);
        let from_graph = standards[0];
        assert_eq!(from_graph.date, NaiveDate::from_ymd_opt(2025, 1, 19).unwrap());
        assert_eq!(from_graph.time, None);
        assert_eq!(from_graph.price.as_deref(), Some("$10 - $20"));
        assert_eq!(
            from_graph.image_url.as_deref(),
            Some("https://cdn.example/standards.jpg")
        );

        assert!(find(&events, "Mr. Tipple's Recording Studio").is_empty());
        assert!(find(&events, "Calendar").is_empty());
        // nameless structured event and the untitled calendar row
        assert_eq!(ctx.skipped(), 2);
        assert_eq!(ctx.failed(), 0);
    }

    #[test]
    fn calendar_rows_fill_in_from_markup() {
        let events = MrTipples.extract(SAMPLE_HTML, &mut ctx());
        let vinyl = find(&events, "Vinyl Night");
        assert_eq!(vinyl.len(), 1);
        let vinyl = vinyl[0];
        assert_eq!(vinyl.date, NaiveDate::from_ymd_opt(2025, 2, 6).unwrap());
        assert_eq!(vinyl.time, None);
        assert_eq!(vinyl.price.as_deref(), Some("Free"));
        assert_eq!(
            vinyl.ticket_url.as_deref(),
            Some("https://mrtipplessf.com/event/vinyl-night/")
        );
    }

    #[test]
    fn calendar_row_wins_identity_clash() {
        let events = MrTipples.extract(SAMPLE_HTML, &mut ctx());
        let unique = dedup::collapse(events, IdentityScope::TitleDate);
        let standards = find(&unique, "Sunday Standards");
        assert_eq!(standards.len(), 1);
        assert_eq!(standards[0].price.as_deref(), Some("$12"));
        assert_eq!(
            standards[0].image_url.as_deref(),
            Some("https://mrtipplessf.com/wp-content/uploads/standards-dom.jpg")
        );
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn flattens_graph_and_lists() {
        let block = serde_json::json!({"@graph": [[{"@type": "Event"}], {"@type": "Place"}]});
        let nodes = flatten_ld_json(block);
        assert_eq!(nodes.len(), 2);
        assert!(is_event_node(&nodes[0]));
        assert!(!is_event_node(&nodes[1]));
    }
}
