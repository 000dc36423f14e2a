use anyhow::Result;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::base::{self, SelectorChain};
use super::{collect_candidates, RunContext, VenueScraper};
use crate::models::{Event, IdentityScope};
use crate::normalize;

const BASE_URL: &str = "https://keysjazzbistro.com";
const URL: &str = "https://keysjazzbistro.com/upcoming-shows/";
const VENUE_ID: &str = "keysjazz";
const VENUE_NAME: &str = "Keys Jazz Bistro";

const TITLE_DENYLIST: [&str; 4] = ["tickets", "get tickets", "upcoming shows", "previous shows"];
const NON_DATE_MARKERS: [&str; 5] = ["seating", "policy", "ticket", "get tickets", "$"];
const MIN_DESCRIPTION_CHARS: usize = 20;

static POSTS: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[
        ".wp-block-post",
        ".wp-block-post-template > li",
        ".wp-block-query li",
        "article.post",
        "li.wp-block-post",
    ])
});
static TITLE: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[
        "h2.wp-block-post-title a",
        "h2.wp-block-post-title",
        ".wp-block-post-title a",
        "h2 a",
        "h2",
    ])
});

static HEADING_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("h2 a[href*='upcoming-shows'], h2 a[href*='event']")
        .expect("keys heading link selector")
});
static EVENT_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("h2 a, a[href*='upcoming-shows']").expect("keys event link selector")
});
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("keys image selector"));
static PARAGRAPH_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p").expect("keys paragraph selector"));
static TICKET_BUTTON_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a.wp-block-button__link, a[href*='add-to-cart']")
        .expect("keys ticket button selector")
});

static DATE_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(monday|tuesday|wednesday|thursday|friday|saturday|sunday|jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)",
    )
    .expect("date word regex")
});
static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}:\d{2}").expect("clock regex"));

type Showtime = (NaiveDate, Option<String>);

pub struct KeysJazz;

impl VenueScraper for KeysJazz {
    fn venue_id(&self) -> &'static str {
        VENUE_ID
    }

    fn venue_name(&self) -> &'static str {
        VENUE_NAME
    }

    fn venue_url(&self) -> &'static str {
        URL
    }

    fn identity(&self) -> IdentityScope {
        IdentityScope::TitleDateTime
    }

    fn extract(&self, html: &str, ctx: &mut RunContext) -> Vec<Event> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let mut posts = POSTS.all_elements(&root);
        if posts.is_empty() {
            ctx.note("no post containers, using show headings");
            posts = root
                .select(&HEADING_LINK_SELECTOR)
                .filter_map(|link| {
                    base::closest(&link, &["li"]).or_else(|| {
                        link.parent()
                            .and_then(|parent| parent.parent())
                            .and_then(ElementRef::wrap)
                    })
                })
                .collect();
        }

        collect_candidates(ctx, posts, parse_post)
    }
}

/// One post may list several nights or sets; each becomes its own event.
fn parse_post(post: ElementRef<'_>, ctx: &mut RunContext) -> Result<Vec<Event>> {
    let title = TITLE.first_text_where(&post, |text| !base::is_denied(text, &TITLE_DENYLIST));
    let Some(title) = title else {
        ctx.skip("post without a show title");
        return Ok(Vec::new());
    };

    let event_url = base::absolute_url(BASE_URL, base::first_attr(&post, &EVENT_LINK_SELECTOR, "href"));
    let image_url = base::absolute_url(BASE_URL, base::first_attr(&post, &IMAGE_SELECTOR, "src"));
    let description = post
        .select(&PARAGRAPH_SELECTOR)
        .next()
        .map(|p| base::text_lines(p).join("\n"))
        .filter(|text| text.chars().count() > MIN_DESCRIPTION_CHARS)
        .and_then(|text| normalize::normalize_description(&text));

    let lines = base::text_lines(post);
    let price = lines
        .iter()
        .find_map(|line| normalize::prices_in_text(line).into_iter().next())
        .and_then(|amount| normalize::format_price(&[amount]));

    let mut showtimes: Vec<Showtime> = Vec::new();
    for line in &lines {
        let lowered = line.to_lowercase();
        if NON_DATE_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            continue;
        }
        if !DATE_WORD_RE.is_match(line) {
            continue;
        }
        if let Some(date) = normalize::normalize_date(line, ctx.today()) {
            push_unique(&mut showtimes, (date, normalize::normalize_time(line)));
        }
    }

    for button in post.select(&TICKET_BUTTON_SELECTOR) {
        let label = base::inner_text(button);
        if !CLOCK_RE.is_match(&label) {
            continue;
        }
        let Some(container) = base::closest(&button, &["div"]) else {
            continue;
        };
        let container_lines = base::text_lines(container);
        let date = container_lines
            .iter()
            .find_map(|line| normalize::normalize_date(line, ctx.today()));
        let time = normalize::normalize_time(&label).or_else(|| {
            container_lines
                .iter()
                .find_map(|line| normalize::normalize_time(line))
        });
        if let Some(date) = date {
            push_unique(&mut showtimes, (date, time));
        }
    }

    if showtimes.is_empty() {
        ctx.note(&format!("no showtime for {title}, dating it today"));
        showtimes.push((ctx.today(), None));
    }

    Ok(showtimes
        .into_iter()
        .map(|(date, time)| {
            let mut event = Event::new(title.clone(), date, VENUE_NAME, ctx.scraped_at());
            event.time = time;
            event.description = description.clone();
            event.ticket_url = event_url.clone();
            event.price = price.clone();
            event.image_url = image_url.clone();
            event
        })
        .collect())
}

fn push_unique(showtimes: &mut Vec<Showtime>, showtime: Showtime) {
    if !showtimes.contains(&showtime) {
        showtimes.push(showtime);
    }
}
