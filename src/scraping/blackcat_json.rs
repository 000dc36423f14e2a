use anyhow::{anyhow, Result};
use serde_json::Value;

use super::{collect_candidates, RunContext, VenueScraper};
use super::base;
use crate::models::Event;
use crate::normalize;

const BASE_URL: &str = "https://blackcatsf.turntabletickets.com";
const VENUE_ID: &str = "blackcat";
const VENUE_NAME: &str = "Black Cat SF";
const PRELOAD_VAR: &str = "window.__tt_preload";

pub struct BlackCat;

impl VenueScraper for BlackCat {
    fn venue_id(&self) -> &'static str {
        VENUE_ID
    }

    fn venue_name(&self) -> &'static str {
        VENUE_NAME
    }

    fn venue_url(&self) -> &'static str {
        BASE_URL
    }

    fn extract(&self, html: &str, ctx: &mut RunContext) -> Vec<Event> {
        let Some(preload) = base::script_assignment(html, PRELOAD_VAR) else {
            ctx.note("no preload data on page");
            return Vec::new();
        };

        let performances = preload
            .pointer("/pagination/performances")
            .and_then(Value::as_array)
            .filter(|list| !list.is_empty())
            .or_else(|| preload.get("performances").and_then(Value::as_array))
            .cloned()
            .unwrap_or_default();
        ctx.note(&format!("{} performances in preload data", performances.len()));

        collect_candidates(ctx, performances, |perf, ctx| {
            Ok(parse_performance(&perf, ctx)?.into_iter().collect())
        })
    }
}

fn parse_performance(perf: &Value, ctx: &mut RunContext) -> Result<Option<Event>> {
    if !perf.is_object() {
        return Err(anyhow!("performance is not an object"));
    }
    let show = perf.get("show").cloned().unwrap_or(Value::Null);

    let title = show
        .get("name")
        .and_then(Value::as_str)
        .map(normalize::clean_text)
        .unwrap_or_default();
    if title.is_empty() {
        ctx.skip("performance without a show name");
        return Ok(None);
    }

    let (date, time) = match perf.get("datetime").and_then(Value::as_str) {
        Some(stamp) if !stamp.trim().is_empty() => {
            let (date, time) = normalize::split_timestamp(stamp)
                .ok_or_else(|| anyhow!("unreadable datetime {stamp:?} for {title}"))?;
            (date, Some(time))
        }
        _ => {
            let date = perf
                .get("date")
                .and_then(Value::as_str)
                .and_then(|text| normalize::normalize_date(text, ctx.today()))
                .unwrap_or_else(|| ctx.today());
            let time = perf
                .get("time")
                .and_then(Value::as_str)
                .and_then(normalize::normalize_time);
            (date, time)
        }
    };

    let mut event = Event::new(title, date, VENUE_NAME, ctx.scraped_at());
    event.time = time;
    event.description = show
        .get("description")
        .and_then(Value::as_str)
        .and_then(normalize::normalize_description);

    let prices: Vec<String> = show
        .get("price_per_person")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(normalize::price_from_json).collect())
        .unwrap_or_default();
    event.price = normalize::format_price(&prices);

    let show_id = perf
        .get("show_id")
        .and_then(id_string)
        .or_else(|| show.get("id").and_then(id_string));
    event.ticket_url =
        show_id.map(|id| format!("{BASE_URL}/shows/{id}/?date={}", event.date.format("%Y-%m-%d")));

    event.image_url = normalize::select_image(
        show.get("srcset"),
        show.get("image").and_then(Value::as_str),
    );

    event.status = if perf.get("sold_out").and_then(Value::as_bool).unwrap_or(false) {
        Some("Sold Out".to_string())
    } else if perf.get("few_remaining").and_then(Value::as_bool).unwrap_or(false) {
        Some("Few Tickets Left".to_string())
    } else {
        None
    };
    event.series = perf
        .get("category")
        .and_then(Value::as_str)
        .map(normalize::clean_text)
        .filter(|category| !category.is_empty());

    Ok(Some(event))
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    }
}
