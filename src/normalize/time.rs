use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::Regex;

// hour, minutes, meridiem, then an optional "- end" whose meridiem is group 4.
static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})(?::([0-5]\d))?(?:\s*([ap])\.?m\b\.?)?(?:\s*(?:-|–|to)\s*\d{1,2}(?::[0-5]\d)?(?:\s*([ap])\.?m\b\.?)?)?",
    )
    .expect("time regex")
});

/// Finds the first clock time in `text` and renders it as `H:MM AM`.
///
/// Only the start of a range is kept; it borrows the end's meridiem when it
/// has none of its own (`7:00 - 9:00 PM`). A time with no meridiem at all is
/// read on the 24-hour clock. Bare numbers are not times.
pub fn normalize_time(text: &str) -> Option<String> {
    TIME_RE.captures_iter(text).find_map(|caps| {
        let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        let minutes = caps.get(2);
        let meridiem = caps
            .get(3)
            .or_else(|| caps.get(4))
            .map(|m| m.as_str().to_ascii_lowercase());
        if minutes.is_none() && meridiem.is_none() {
            return None;
        }
        let minute: u32 = match minutes {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        let hour24 = match meridiem.as_deref() {
            Some(marker) => {
                if !(1..=12).contains(&hour) {
                    return None;
                }
                match (marker, hour) {
                    ("a", 12) => 0,
                    ("a", h) => h,
                    (_, 12) => 12,
                    (_, h) => h + 12,
                }
            }
            None => hour,
        };
        NaiveTime::from_hms_opt(hour24, minute, 0).map(|t| t.format("%-I:%M %p").to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form() {
        assert_eq!(normalize_time("7:00 PM"), Some("7:00 PM".to_string()));
        assert_eq!(normalize_time("07:30pm"), Some("7:30 PM".to_string()));
        assert_eq!(normalize_time("Show: 8:00 p.m."), Some("8:00 PM".to_string()));
        assert_eq!(normalize_time("DOORS 7pm"), Some("7:00 PM".to_string()));
        assert_eq!(normalize_time("12:15 am"), Some("12:15 AM".to_string()));
    }

    #[test]
    fn keeps_start_of_range() {
        assert_eq!(normalize_time("8:00 PM - 11:59 PM"), Some("8:00 PM".to_string()));
        assert_eq!(normalize_time("7:00 - 9:00 PM"), Some("7:00 PM".to_string()));
        assert_eq!(normalize_time("8:00 PM 11:59 PM"), Some("8:00 PM".to_string()));
    }

    #[test]
    fn skips_dates_before_the_time() {
        assert_eq!(
            normalize_time("Friday, January 17th @ 7:00pm"),
            Some("7:00 PM".to_string())
        );
        assert_eq!(
            normalize_time("Jan 17, 2025 7:30 PM | Joe Henderson Lab"),
            Some("7:30 PM".to_string())
        );
    }

    #[test]
    fn reads_bare_clock_as_24_hour() {
        assert_eq!(normalize_time("19:30"), Some("7:30 PM".to_string()));
        assert_eq!(normalize_time("12:00"), Some("12:00 PM".to_string()));
    }

    #[test]
    fn absent_without_a_time() {
        assert_eq!(normalize_time("Sold Out"), None);
        assert_eq!(normalize_time("Room 5"), None);
        assert_eq!(normalize_time("7 amazing sets"), None);
        assert_eq!(normalize_time(""), None);
    }
}
