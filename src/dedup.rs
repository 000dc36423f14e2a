use std::collections::HashMap;

use crate::db::{Store, UpsertOutcome};
use crate::models::{Event, IdentityScope};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub inserted: usize,
    pub updated: usize,
}

/// Collapses a batch to one candidate per identity key.
///
/// A later candidate replaces an earlier one outright (no field merging) but
/// keeps the position where the key was first seen.
pub fn collapse(candidates: Vec<Event>, scope: IdentityScope) -> Vec<Event> {
    let mut positions = HashMap::new();
    let mut unique: Vec<Event> = Vec::with_capacity(candidates.len());

    for event in candidates {
        let key = event.key(scope);
        match positions.get(&key) {
            Some(&idx) => unique[idx] = event,
            None => {
                positions.insert(key, unique.len());
                unique.push(event);
            }
        }
    }
    unique
}

/// Collapses `candidates` and upserts each survivor into `store`.
///
/// Updates replace every stored field, so a field missing from the new
/// scrape is cleared rather than kept. Each upsert commits on its own; an
/// error stops the batch with the earlier upserts already applied.
pub fn reconcile(
    candidates: Vec<Event>,
    scope: IdentityScope,
    store: &Store,
) -> rusqlite::Result<ReconcileCounts> {
    let mut counts = ReconcileCounts::default();
    for event in collapse(candidates, scope) {
        match store.upsert_event(&event)? {
            UpsertOutcome::Inserted => counts.inserted += 1,
            UpsertOutcome::Updated => counts.updated += 1,
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn candidate(title: &str, price: &str) -> Event {
        let mut event = Event::new(
            title,
            NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            "SFJAZZ Center",
            Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap(),
        );
        event.price = Some(price.to_string());
        event
    }

    #[test]
    fn later_candidate_wins_within_batch() {
        let batch = vec![
            candidate("Miles Davis Tribute", "$20"),
            candidate("Bill Evans Songbook", "$30"),
            candidate("Miles Davis Tribute", "$25"),
        ];
        let unique = collapse(batch, IdentityScope::TitleDate);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].title, "Miles Davis Tribute");
        assert_eq!(unique[0].price.as_deref(), Some("$25"));
        assert_eq!(unique[1].title, "Bill Evans Songbook");
    }

    #[test]
    fn time_scope_keeps_each_showtime() {
        let mut early = candidate("Keys Late Night", "$20");
        early.time = Some("7:00 PM".to_string());
        let mut late = early.clone();
        late.time = Some("9:30 PM".to_string());

        assert_eq!(
            collapse(vec![early.clone(), late.clone()], IdentityScope::TitleDateTime).len(),
            2
        );
        assert_eq!(collapse(vec![early, late], IdentityScope::TitleDate).len(), 1);
    }

    #[test]
    fn end_to_end_batch_into_empty_store() {
        let store = Store::open_in_memory().unwrap();
        let batch = vec![
            candidate("Miles Davis Tribute", "$20"),
            candidate("Miles Davis Tribute", "$25"),
        ];
        let counts = reconcile(batch, IdentityScope::TitleDate, &store).unwrap();
        assert_eq!(
            counts,
            ReconcileCounts {
                inserted: 1,
                updated: 0
            }
        );

        let stored = store
            .get_event("Miles Davis Tribute", NaiveDate::from_ymd_opt(2025, 2, 1).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(stored.price.as_deref(), Some("$25"));
    }

    #[test]
    fn reconciling_twice_only_updates() {
        let store = Store::open_in_memory().unwrap();
        let batch = vec![
            candidate("Miles Davis Tribute", "$20"),
            candidate("Bill Evans Songbook", "$30"),
            candidate("Bill Evans Songbook", "$35"),
        ];

        let first = reconcile(batch.clone(), IdentityScope::TitleDate, &store).unwrap();
        let after_first = store.all_events().unwrap();
        let second = reconcile(batch, IdentityScope::TitleDate, &store).unwrap();

        assert_eq!(first, ReconcileCounts { inserted: 2, updated: 0 });
        assert_eq!(second, ReconcileCounts { inserted: 0, updated: 2 });
        assert_eq!(store.all_events().unwrap(), after_first);
    }

    #[test]
    fn showtimes_of_one_night_share_a_row() {
        let store = Store::open_in_memory().unwrap();
        let mut early = candidate("Keys Late Night", "$20");
        early.time = Some("7:00 PM".to_string());
        let mut late = early.clone();
        late.time = Some("9:30 PM".to_string());

        let counts = reconcile(vec![early, late], IdentityScope::TitleDateTime, &store).unwrap();
        assert_eq!(counts, ReconcileCounts { inserted: 1, updated: 1 });

        let stored = store.all_events().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].time.as_deref(), Some("9:30 PM"));
    }

    #[test]
    fn stored_status_is_cleared_by_later_scrape() {
        let store = Store::open_in_memory().unwrap();
        let mut on_sale = candidate("Miles Davis Tribute", "$20");
        on_sale.status = Some("On Sale".to_string());
        reconcile(vec![on_sale.clone()], IdentityScope::TitleDate, &store).unwrap();

        let mut rescraped = on_sale.clone();
        rescraped.status = None;
        let counts = reconcile(vec![rescraped], IdentityScope::TitleDate, &store).unwrap();
        assert_eq!(counts.updated, 1);

        let stored = store.get_event(&on_sale.title, on_sale.date).unwrap().unwrap();
        assert_eq!(stored.status, None);
    }
}
