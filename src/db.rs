use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::Event;
use crate::utils;

const EVENT_COLUMNS: &str = "title, date, time, venue, artists, description, ticket_url, \
     price, status, series, image_url, scraped_at";

/// SQLite-backed event table, unique on `(title, date)`.
///
/// Single writer only. Every upsert is its own transaction, so a batch that
/// fails halfway leaves the earlier rows applied.
pub struct Store {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub total_events: i64,
    pub last_scraped: Option<DateTime<Utc>>,
}

impl Store {
    pub fn open_default() -> rusqlite::Result<Self> {
        Self::open(&utils::database_path())
    }

    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                date TEXT NOT NULL,
                time TEXT,
                venue TEXT NOT NULL,
                artists TEXT NOT NULL,
                description TEXT,
                ticket_url TEXT,
                price TEXT,
                status TEXT,
                series TEXT,
                image_url TEXT,
                scraped_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(title, date)
            );
            CREATE INDEX IF NOT EXISTS idx_events_date ON events(date);
            CREATE INDEX IF NOT EXISTS idx_events_scraped_at ON events(scraped_at);",
        )?;
        Ok(())
    }

    /// Inserts the event, or on an identity clash overwrites every non-key
    /// column. Absent fields in `event` clear what was stored.
    pub fn upsert_event(&self, event: &Event) -> rusqlite::Result<UpsertOutcome> {
        let now = Utc::now();
        let artists = serde_json::to_string(&event.artists)
            .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;

        let tx = self.conn.unchecked_transaction()?;
        let inserted = tx.execute(
            "INSERT INTO events (title, date, time, venue, artists, description, ticket_url,
                                 price, status, series, image_url, scraped_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
             ON CONFLICT(title, date) DO NOTHING",
            params![
                event.title,
                event.date,
                event.time,
                event.venue,
                artists,
                event.description,
                event.ticket_url,
                event.price,
                event.status,
                event.series,
                event.image_url,
                event.scraped_at,
                now,
            ],
        )?;

        let outcome = if inserted > 0 {
            UpsertOutcome::Inserted
        } else {
            tx.execute(
                "UPDATE events SET
                    time = ?3, venue = ?4, artists = ?5, description = ?6, ticket_url = ?7,
                    price = ?8, status = ?9, series = ?10, image_url = ?11, scraped_at = ?12,
                    updated_at = ?13
                 WHERE title = ?1 AND date = ?2",
                params![
                    event.title,
                    event.date,
                    event.time,
                    event.venue,
                    artists,
                    event.description,
                    event.ticket_url,
                    event.price,
                    event.status,
                    event.series,
                    event.image_url,
                    event.scraped_at,
                    now,
                ],
            )?;
            UpsertOutcome::Updated
        };
        tx.commit()?;
        Ok(outcome)
    }

    pub fn get_event(&self, title: &str, date: NaiveDate) -> rusqlite::Result<Option<Event>> {
        self.conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE title = ?1 AND date = ?2"),
                params![title, date],
                row_to_event,
            )
            .optional()
    }

    pub fn all_events(&self) -> rusqlite::Result<Vec<Event>> {
        self.query_events(
            &format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY date, id"),
            params![],
        )
    }

    pub fn upcoming_events(&self, from: NaiveDate) -> rusqlite::Result<Vec<Event>> {
        self.query_events(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE date >= ?1 ORDER BY date, id"),
            params![from],
        )
    }

    /// Substring match over the title and the performer list.
    pub fn search_events(&self, query: &str) -> rusqlite::Result<Vec<Event>> {
        let pattern = format!("%{query}%");
        self.query_events(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM events
                 WHERE title LIKE ?1 OR artists LIKE ?1
                 ORDER BY date, id"
            ),
            params![pattern],
        )
    }

    pub fn stats(&self) -> rusqlite::Result<StoreStats> {
        self.conn.query_row(
            "SELECT COUNT(*), MAX(scraped_at) FROM events",
            [],
            |row| {
                Ok(StoreStats {
                    total_events: row.get(0)?,
                    last_scraped: row.get(1)?,
                })
            },
        )
    }

    pub fn venue_counts(&self) -> rusqlite::Result<Vec<(String, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT venue, COUNT(*) FROM events GROUP BY venue ORDER BY venue")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect()
    }

    fn query_events(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> rusqlite::Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_event)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    let artists: String = row.get("artists")?;
    let artists: Vec<String> = serde_json::from_str(&artists).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            artists.len(),
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })?;
    Ok(Event {
        title: row.get("title")?,
        date: row.get("date")?,
        time: row.get("time")?,
        venue: row.get("venue")?,
        artists,
        description: row.get("description")?,
        ticket_url: row.get("ticket_url")?,
        price: row.get("price")?,
        status: row.get("status")?,
        series: row.get("series")?,
        image_url: row.get("image_url")?,
        scraped_at: row.get("scraped_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(title: &str, day: u32) -> Event {
        let mut event = Event::new(
            title,
            NaiveDate::from_ymd_opt(2025, 2, day).unwrap(),
            "Black Cat SF",
            Utc.with_ymd_and_hms(2025, 1, 20, 18, 0, 0).unwrap(),
        );
        event.status = Some("On Sale".to_string());
        event
    }

    #[test]
    fn insert_then_update_on_same_identity() {
        let store = Store::open_in_memory().unwrap();
        let original = event("Miles Davis Tribute", 1);
        assert_eq!(store.upsert_event(&original).unwrap(), UpsertOutcome::Inserted);

        let mut changed = original.clone();
        changed.price = Some("$25".to_string());
        assert_eq!(store.upsert_event(&changed).unwrap(), UpsertOutcome::Updated);

        let stored = store
            .get_event("Miles Davis Tribute", original.date)
            .unwrap()
            .unwrap();
        assert_eq!(stored, changed);
        assert_eq!(store.stats().unwrap().total_events, 1);
    }

    #[test]
    fn update_overwrites_with_absent_fields() {
        let store = Store::open_in_memory().unwrap();
        let original = event("Miles Davis Tribute", 1);
        store.upsert_event(&original).unwrap();

        let mut degraded = original.clone();
        degraded.status = None;
        store.upsert_event(&degraded).unwrap();

        let stored = store
            .get_event("Miles Davis Tribute", original.date)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, None);
    }

    #[test]
    fn queries_are_date_ordered() {
        let store = Store::open_in_memory().unwrap();
        for (title, day) in [("Late Set", 20), ("Early Set", 3), ("Middle Set", 10)] {
            store.upsert_event(&event(title, day)).unwrap();
        }

        let titles: Vec<_> = store
            .all_events()
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["Early Set", "Middle Set", "Late Set"]);

        let upcoming = store
            .upcoming_events(NaiveDate::from_ymd_opt(2025, 2, 10).unwrap())
            .unwrap();
        assert_eq!(upcoming.len(), 2);
        assert_eq!(upcoming[0].title, "Middle Set");
    }

    #[test]
    fn search_matches_title_and_artists() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_event(&event("Coltrane Night", 1)).unwrap();
        let mut billed = event("Sunday Jazz Brunch", 2);
        billed.artists = vec!["Sunday Jazz Brunch".to_string(), "Alice Coltrane Trio".to_string()];
        store.upsert_event(&billed).unwrap();
        store.upsert_event(&event("Monk Tribute", 3)).unwrap();

        let found = store.search_events("Coltrane").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].artists.len(), 2);
    }

    #[test]
    fn stats_report_latest_scrape() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(
            store.stats().unwrap(),
            StoreStats {
                total_events: 0,
                last_scraped: None
            }
        );

        let older = event("First", 1);
        let mut newer = event("Second", 2);
        newer.scraped_at = Utc.with_ymd_and_hms(2025, 1, 21, 9, 30, 0).unwrap();
        store.upsert_event(&older).unwrap();
        store.upsert_event(&newer).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.last_scraped, Some(newer.scraped_at));
        assert_eq!(
            store.venue_counts().unwrap(),
            vec![("Black Cat SF".to_string(), 2)]
        );
    }
}
