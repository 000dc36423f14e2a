use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A normalized listing. Built fresh on every scrape and never patched in place;
/// the store merges it by identity key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    pub title: String,
    pub date: NaiveDate,
    pub time: Option<String>,
    pub venue: String,
    pub artists: Vec<String>,
    pub description: Option<String>,
    pub ticket_url: Option<String>,
    pub price: Option<String>,
    pub status: Option<String>,
    pub series: Option<String>,
    pub image_url: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

impl Event {
    /// A bare event whose only artist is the title, which is how every source
    /// we scrape presents its performers.
    pub fn new(
        title: impl Into<String>,
        date: NaiveDate,
        venue: impl Into<String>,
        scraped_at: DateTime<Utc>,
    ) -> Self {
        let title = title.into();
        Self {
            artists: vec![title.clone()],
            title,
            date,
            time: None,
            venue: venue.into(),
            description: None,
            ticket_url: None,
            price: None,
            status: None,
            series: None,
            image_url: None,
            scraped_at,
        }
    }

    pub fn key(&self, scope: IdentityScope) -> EventKey {
        EventKey {
            title: self.title.clone(),
            date: self.date,
            time: match scope {
                IdentityScope::TitleDate => None,
                IdentityScope::TitleDateTime => self.time.clone(),
            },
        }
    }

    /// Identity under the default `(title, date)` scope.
    pub fn identity(&self) -> EventKey {
        self.key(IdentityScope::TitleDate)
    }

    pub fn same_event(&self, other: &Event) -> bool {
        self.identity() == other.identity()
    }
}

/// Which fields decide that two candidates describe the same show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityScope {
    #[default]
    TitleDate,
    /// For venues that list several showtimes of one title on the same night.
    TitleDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub title: String,
    pub date: NaiveDate,
    pub time: Option<String>,
}
