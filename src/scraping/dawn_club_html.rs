use anyhow::Result;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::base::{self, SelectorChain};
use super::{collect_candidates, RunContext, VenueScraper};
use crate::models::Event;
use crate::normalize;

const BASE_URL: &str = "https://www.dawnclub.com";
const URL: &str = "https://www.dawnclub.com/music";
const VENUE_ID: &str = "dawnclub";
const VENUE_NAME: &str = "Dawn Club";
const MIN_DESCRIPTION_CHARS: usize = 10;

static ITEMS: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[
        ".eventlist-event",
        ".eventlist--upcoming article",
        "[class*='eventlist'] article",
        ".summary-item",
        "article[class*='event']",
        // bare links to event pages when the list markup is missing
        "a[href*='/music/']",
    ])
});
static TITLE: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[
        ".eventlist-title a",
        ".eventlist-title",
        "h1 a",
        "h2 a",
        "h3 a",
        ".summary-title a",
        ".summary-title",
    ])
});
static DATE: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[
        ".eventlist-datetag",
        ".event-date",
        "time.event-date",
        ".summary-metadata-item--date",
        "[class*='date']",
    ])
});
static TIME: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[
        ".eventlist-time",
        ".event-time",
        ".event-time-12hr",
        "[class*='time']",
    ])
});
static IMAGE: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[
        ".eventlist-thumbnail img",
        ".summary-thumbnail img",
        "img[class*='event']",
        "img",
    ])
});
static DESCRIPTION: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[
        ".eventlist-excerpt",
        ".summary-excerpt",
        ".event-description",
        "p",
    ])
});

static DATETIME_ATTR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time[datetime]").expect("dawn club datetime selector"));
static MUSIC_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*='/music/']").expect("dawn club link selector"));

pub struct DawnClub;

impl VenueScraper for DawnClub {
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
        let document = Html::parse_document(html);
        let items = ITEMS.all_elements(&document.root_element());
        ctx.note(&format!("{} list items", items.len()));
        collect_candidates(ctx, items, |item, ctx| {
            Ok(parse_item(item, ctx)?.into_iter().collect())
        })
    }
}

fn parse_item(item: ElementRef<'_>, ctx: &mut RunContext) -> Result<Option<Event>> {
    let title = TITLE
        .first_text(&item)
        .or_else(|| base::text_lines(item).into_iter().next());
    let Some(title) = title else {
        ctx.skip("item without a title");
        return Ok(None);
    };

    let today = ctx.today();
    let date = DATE
        .first_text_where(&item, |text| normalize::normalize_date(text, today).is_some())
        .and_then(|text| normalize::normalize_date(&text, today))
        .or_else(|| {
            base::first_attr(&item, &DATETIME_ATTR_SELECTOR, "datetime")
                .and_then(|stamp| normalize::normalize_date(&stamp, today))
        })
        .unwrap_or(today);

    let mut event = Event::new(title, date, VENUE_NAME, ctx.scraped_at());
    event.time = TIME
        .first_text_where(&item, |text| normalize::normalize_time(text).is_some())
        .and_then(|text| normalize::normalize_time(&text));

    let href = item
        .select(&MUSIC_LINK_SELECTOR)
        .next()
        .or_else(|| Some(item).filter(|el| el.value().name() == "a"))
        .and_then(|link| link.value().attr("href"))
        .map(str::to_string);
    event.ticket_url = base::absolute_url(BASE_URL, href);
    event.image_url = base::absolute_url(BASE_URL, IMAGE.first_attr(&item, &["src", "data-src"]));

    event.description = DESCRIPTION
        .first_element_where(&item, |el| {
            base::inner_text(el).chars().count() > MIN_DESCRIPTION_CHARS
        })
        .map(|el| base::text_lines(el).join("\n"))
        .and_then(|text| normalize::normalize_description(&text));

    Ok(Some(event))
}
