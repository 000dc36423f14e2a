use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jazz_scrape_lib::config::{AppConfig, ConfigStore};
use jazz_scrape_lib::models::Event;
use jazz_scrape_lib::{scraping, utils};

#[derive(Parser, Debug)]
#[command(author, version, about = "Collects Bay Area jazz listings into one event store")]
struct Cli {
    /// Event database to use instead of the configured one.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scrape venues and merge their listings into the store
    Scrape {
        /// Venue id to scrape; repeat for several. Defaults to the configured venues.
        #[arg(long = "venue")]
        venues: Vec<String>,
        /// Also write every stored event to this JSON file.
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// List stored events
    List {
        /// Only this venue (id or display name).
        #[arg(long)]
        venue: Option<String>,
        /// Only events on or after this date (YYYY-MM-DD).
        #[arg(long, value_parser = parse_day)]
        from: Option<NaiveDate>,
    },
    /// Search titles and artists
    Search { query: String },
    /// Show store totals
    Stats,
    /// Write every stored event to a JSON file
    Export { path: Option<PathBuf> },
    /// Download event images
    Images {
        /// Also write a url-to-file manifest here.
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// List the venues that can be scraped
    Venues,
    /// Show or change persisted settings
    Config {
        #[arg(long)]
        database: Option<PathBuf>,
        #[arg(long)]
        max_retries: Option<u32>,
        /// Venue ids scraped by default; repeat for several.
        #[arg(long = "venue")]
        venues: Vec<String>,
    },
}

fn parse_day(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|err| format!("expected YYYY-MM-DD: {err}"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config_store = match &cli.config {
        Some(path) => ConfigStore::load_from(path.clone()),
        None => ConfigStore::load(),
    }
    .context("loading config")?;
    let mut config = config_store.read()?;
    if let Some(db) = &cli.db {
        config.database_path = Some(db.clone());
    }

    match cli.command {
        Commands::Scrape { venues, export } => run_scrape(&config, &venues, export),
        Commands::List { venue, from } => run_list(&config, venue.as_deref(), from),
        Commands::Search { query } => {
            let store = jazz_scrape_lib::open_store(&config)?;
            let events = store.search_events(&query)?;
            print_events(&events);
            println!("{} match(es) for {query:?}", events.len());
            Ok(())
        }
        Commands::Stats => run_stats(&config),
        Commands::Export { path } => {
            let path = path.unwrap_or_else(utils::export_path);
            let count = jazz_scrape_lib::export_store(&config, &path)?;
            println!("Exported {count} events to {}", path.display());
            Ok(())
        }
        Commands::Images { manifest } => {
            let stats = jazz_scrape_lib::download_images(&config, manifest.as_deref())?;
            println!(
                "Images: {} urls, {} downloaded, {} failed ({})",
                stats.total_urls,
                stats.downloaded,
                stats.failed,
                stats.image_dir.display()
            );
            Ok(())
        }
        Commands::Venues => {
            for info in scraping::list_scrapers() {
                println!("{:<10} {:<18} {}", info.id, info.name, info.url);
            }
            Ok(())
        }
        Commands::Config {
            database,
            max_retries,
            venues,
        } => run_config(&config_store, database, max_retries, venues),
    }
}

fn run_scrape(config: &AppConfig, venues: &[String], export: Option<PathBuf>) -> Result<()> {
    let reports = jazz_scrape_lib::scrape_venues(config, venues)?;

    let mut failed = 0;
    for report in &reports {
        match &report.result {
            Ok(stats) => println!(
                "{}: {} events ({} new, {} updated, {} skipped) in {:.1}s",
                stats.venue,
                stats.total_scraped,
                stats.inserted,
                stats.updated,
                stats.skipped,
                stats.duration.as_secs_f64()
            ),
            Err(err) => {
                failed += 1;
                println!("{}: failed: {err:#}", report.venue_id);
            }
        }
    }

    if let Some(path) = export {
        let count = jazz_scrape_lib::export_store(config, &path)?;
        println!("Exported {count} events to {}", path.display());
    }

    if failed > 0 && failed == reports.len() {
        bail!("every venue failed");
    }
    info!(venues = reports.len(), failed, "scrape finished");
    Ok(())
}

fn run_list(config: &AppConfig, venue: Option<&str>, from: Option<NaiveDate>) -> Result<()> {
    let store = jazz_scrape_lib::open_store(config)?;
    let mut events = match from {
        Some(day) => store.upcoming_events(day)?,
        None => store.all_events()?,
    };

    if let Some(venue) = venue {
        let name = scraping::find_scraper(venue)
            .map(|scraper| scraper.venue_name().to_string())
            .unwrap_or_else(|| venue.to_string());
        events.retain(|event| event.venue.eq_ignore_ascii_case(&name));
    }

    print_events(&events);
    println!("{} event(s)", events.len());
    Ok(())
}

fn run_stats(config: &AppConfig) -> Result<()> {
    let store = jazz_scrape_lib::open_store(config)?;
    let stats = store.stats()?;
    println!("Total events: {}", stats.total_events);
    match stats.last_scraped {
        Some(at) => println!("Last scraped: {}", at.to_rfc3339()),
        None => println!("Last scraped: never"),
    }
    for (venue, count) in store.venue_counts()? {
        println!("  {venue:<18} {count}");
    }
    Ok(())
}

fn run_config(
    store: &ConfigStore,
    database: Option<PathBuf>,
    max_retries: Option<u32>,
    venues: Vec<String>,
) -> Result<()> {
    if let Some(unknown) = venues.iter().find(|id| scraping::find_scraper(id).is_none()) {
        bail!("unknown venue id: {unknown}");
    }

    let changed = database.is_some() || max_retries.is_some() || !venues.is_empty();
    let config = if changed {
        store.update(|config| {
            if let Some(path) = database {
                config.database_path = Some(path);
            }
            if let Some(retries) = max_retries {
                config.max_retries = retries;
            }
            if !venues.is_empty() {
                config.venues = venues;
            }
        })?
    } else {
        store.read()?
    };

    println!("{}", serde_json::to_string_pretty(&config)?);
    println!("(stored at {})", store.path().display());
    Ok(())
}

fn print_events(events: &[Event]) {
    for event in events {
        let time = event.time.as_deref().unwrap_or("");
        let price = event.price.as_deref().unwrap_or("");
        println!(
            "{}  {:<8}  {} @ {}  {}",
            event.date, time, event.title, event.venue, price
        );
    }
}
