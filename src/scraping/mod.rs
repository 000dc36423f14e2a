pub mod base;
pub mod blackcat_json;
pub mod context;
pub mod dawn_club_html;
pub mod keys_jazz_html;
pub mod mr_tipples_jsonld;
pub mod sfjazz_html;

use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::db::Store;
use crate::dedup;
use crate::models::{Event, IdentityScope};

pub use base::Fetcher;
pub use context::RunContext;

/// One source site. Implementations only turn a fetched page into candidate
/// events; fetching, collapsing and persisting are shared.
pub trait VenueScraper: Send + Sync {
    fn venue_id(&self) -> &'static str;
    fn venue_name(&self) -> &'static str;
    fn venue_url(&self) -> &'static str;

    fn identity(&self) -> IdentityScope {
        IdentityScope::TitleDate
    }

    /// Never fails as a whole: elements that cannot be read are reported
    /// through `ctx` and left out.
    fn extract(&self, html: &str, ctx: &mut RunContext) -> Vec<Event>;

    fn fetch(&self, fetcher: &Fetcher, ctx: &mut RunContext) -> anyhow::Result<Vec<Event>> {
        let html = fetcher
            .fetch_html(self.venue_url())
            .with_context(|| format!("fetching {}", self.venue_name()))?;
        Ok(self.extract(&html, ctx))
    }
}

#[derive(Clone, serde::Serialize)]
pub struct ScraperInfo {
    pub id: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ScrapeStats {
    pub venue: String,
    pub total_scraped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub duration: Duration,
    pub scraped_at: DateTime<Utc>,
}

/// Outcome of one venue inside a multi-venue run.
pub struct VenueReport {
    pub venue_id: &'static str,
    pub result: anyhow::Result<ScrapeStats>,
}

fn active_scrapers() -> Vec<Box<dyn VenueScraper>> {
    vec![
        Box::new(sfjazz_html::SfJazz),
        Box::new(blackcat_json::BlackCat),
        Box::new(keys_jazz_html::KeysJazz),
        Box::new(dawn_club_html::DawnClub),
        Box::new(mr_tipples_jsonld::MrTipples),
    ]
}

pub fn list_scrapers() -> Vec<ScraperInfo> {
    active_scrapers()
        .into_iter()
        .map(|scraper| ScraperInfo {
            id: scraper.venue_id().to_string(),
            name: scraper.venue_name().to_string(),
            url: scraper.venue_url().to_string(),
        })
        .collect()
}

pub fn find_scraper(id: &str) -> Option<Box<dyn VenueScraper>> {
    active_scrapers()
        .into_iter()
        .find(|scraper| scraper.venue_id() == id)
}

/// Runs `parse` over every raw element, keeping what it yields. An element
/// whose parse fails is logged through `ctx` and does not stop the rest.
pub(crate) fn collect_candidates<T, I, F>(ctx: &mut RunContext, items: I, mut parse: F) -> Vec<Event>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T, &mut RunContext) -> anyhow::Result<Vec<Event>>,
{
    let mut events = Vec::new();
    for item in items {
        match parse(item, ctx) {
            Ok(mut parsed) => events.append(&mut parsed),
            Err(err) => ctx.element_failed(&err),
        }
    }
    events
}

/// Fetch, extract, collapse and reconcile a single venue.
pub fn run_venue(
    scraper: &dyn VenueScraper,
    fetcher: &Fetcher,
    store: &Store,
    now: DateTime<Utc>,
) -> anyhow::Result<ScrapeStats> {
    let started = Instant::now();
    let mut ctx = RunContext::new(scraper.venue_id(), now);
    let span = ctx.span().clone();
    let _guard = span.enter();

    info!(url = scraper.venue_url(), "scraping venue");
    let candidates = scraper.fetch(fetcher, &mut ctx)?;
    let unique = dedup::collapse(candidates, scraper.identity());
    let total_scraped = unique.len();
    let counts = dedup::reconcile(unique, scraper.identity(), store)
        .with_context(|| format!("saving events for {}", scraper.venue_name()))?;

    let stats = ScrapeStats {
        venue: scraper.venue_name().to_string(),
        total_scraped,
        inserted: counts.inserted,
        updated: counts.updated,
        skipped: ctx.skipped(),
        duration: started.elapsed(),
        scraped_at: now,
    };
    info!(
        total = stats.total_scraped,
        inserted = stats.inserted,
        updated = stats.updated,
        skipped = stats.skipped,
        "venue complete"
    );
    Ok(stats)
}

/// Runs each venue in turn. An empty `ids` means every registered venue.
/// Unknown ids are rejected before anything is fetched; after that a failing
/// venue is reported and the rest still run.
pub fn run_venues(
    ids: &[String],
    fetcher: &Fetcher,
    store: &Store,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<VenueReport>> {
    let scrapers = if ids.is_empty() {
        active_scrapers()
    } else {
        ids.iter()
            .map(|id| find_scraper(id).ok_or_else(|| anyhow::anyhow!("unknown venue id: {id}")))
            .collect::<anyhow::Result<Vec<_>>>()?
    };

    let mut reports = Vec::with_capacity(scrapers.len());
    let mut failed = 0;
    for scraper in scrapers {
        let result = run_venue(scraper.as_ref(), fetcher, store, now);
        if let Err(err) = &result {
            warn!(venue = scraper.venue_id(), error = format!("{err:#}"), "venue failed");
            failed += 1;
        }
        reports.push(VenueReport {
            venue_id: scraper.venue_id(),
            result,
        });
    }

    if failed > 0 {
        warn!(failed, total = reports.len(), "some venues failed");
    }
    Ok(reports)
}
