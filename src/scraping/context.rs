use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn, Span};

use crate::normalize::REFERENCE_TZ;

/// Per-run reporting context handed to every adapter.
///
/// Holds the clock the normalizers reason against and tallies what was
/// dropped, so one venue's run never shares logging state with another's.
pub struct RunContext {
    venue_id: &'static str,
    today: NaiveDate,
    scraped_at: DateTime<Utc>,
    span: Span,
    skipped: usize,
    failed: usize,
}

impl RunContext {
    pub fn new(venue_id: &'static str, now: DateTime<Utc>) -> Self {
        Self {
            venue_id,
            today: now.with_timezone(&REFERENCE_TZ).date_naive(),
            scraped_at: now,
            span: tracing::info_span!("venue", id = venue_id),
            skipped: 0,
            failed: 0,
        }
    }

    pub fn venue_id(&self) -> &'static str {
        self.venue_id
    }

    /// Reference day for year inference and the missing-date fallback.
    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn scraped_at(&self) -> DateTime<Utc> {
        self.scraped_at
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// A candidate that was deliberately not emitted (no title, denylisted).
    pub fn skip(&mut self, reason: &str) {
        self.skipped += 1;
        let _guard = self.span.enter();
        debug!(reason, "skipped element");
    }

    /// A candidate whose extraction blew up; logged and left out of the batch.
    pub fn element_failed(&mut self, err: &anyhow::Error) {
        self.failed += 1;
        let _guard = self.span.enter();
        warn!(error = %err, "failed to parse element");
    }

    pub fn note(&self, message: &str) {
        let _guard = self.span.enter();
        debug!("{message}");
    }

    pub fn skipped(&self) -> usize {
        self.skipped + self.failed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn today_is_taken_in_pacific_time() {
        // 03:00 UTC on the 18th is still the evening of the 17th in San Francisco.
        let now = Utc.with_ymd_and_hms(2025, 1, 18, 3, 0, 0).unwrap();
        let ctx = RunContext::new("blackcat", now);
        assert_eq!(ctx.today(), NaiveDate::from_ymd_opt(2025, 1, 17).unwrap());
        assert_eq!(ctx.scraped_at(), now);
    }

    #[test]
    fn counts_skips_and_failures() {
        let mut ctx = RunContext::new("sfjazz", Utc::now());
        ctx.skip("no title");
        ctx.element_failed(&anyhow::anyhow!("bad markup"));
        assert_eq!(ctx.skipped(), 2);
        assert_eq!(ctx.failed(), 1);
    }
}
