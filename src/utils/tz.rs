//! Centralized timezone handling
//!
//! All user-facing datetime math happens in the user's configured IANA
//! timezone; storage and XMLTV output are UTC. Unlike the upstream APIs we
//! consume, nothing here ever works with naive datetimes.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Resolve an IANA timezone name, falling back to America/New_York.
///
/// A bad timezone string is a configuration problem but not worth failing a
/// whole tick over; the fallback matches the settings default.
pub fn resolve_tz(name: &str) -> Tz {
    name.parse::<Tz>().unwrap_or_else(|_| {
        tracing::warn!("Unknown timezone '{}', falling back to America/New_York", name);
        chrono_tz::America::New_York
    })
}

/// Current time in the user timezone.
pub fn now_in(tz: Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(&tz)
}

/// Convert a UTC instant to the user timezone.
pub fn to_user_tz(dt: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    dt.with_timezone(&tz)
}

/// The calendar date of a UTC instant as seen in the user timezone.
pub fn user_date(dt: DateTime<Utc>, tz: Tz) -> NaiveDate {
    dt.with_timezone(&tz).date_naive()
}

/// Midnight at the start of a local date, resolved in the user timezone.
///
/// DST gaps are resolved to the earliest valid instant.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Tz> {
    let naive = date.and_hms_opt(0, 0, 0).expect("valid midnight");
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(earliest, _) => earliest,
        chrono::LocalResult::None => tz
            .from_local_datetime(&date.and_hms_opt(1, 0, 0).expect("valid hour"))
            .earliest()
            .expect("resolvable local time"),
    }
}

/// End of day (23:59:59.999999999) for a local date in the user timezone.
pub fn local_end_of_day(date: NaiveDate, tz: Tz) -> DateTime<Tz> {
    let naive = date
        .and_hms_nano_opt(23, 59, 59, 999_999_999)
        .expect("valid end of day");
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(_, latest) => latest,
        chrono::LocalResult::None => local_midnight(date, tz) + chrono::Duration::hours(23),
    }
}

/// Format an instant for XMLTV output: `YYYYMMDDHHMMSS +0000` in UTC.
pub fn format_datetime_xmltv(dt: DateTime<Utc>) -> String {
    format!("{} +0000", dt.format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolve_tz() {
        assert_eq!(resolve_tz("America/New_York"), chrono_tz::America::New_York);
        assert_eq!(resolve_tz("Europe/London"), chrono_tz::Europe::London);
        // Bad names fall back instead of failing
        assert_eq!(resolve_tz("Not/AZone"), chrono_tz::America::New_York);
    }

    #[test]
    fn test_user_date_crosses_midnight() {
        // 02:00 UTC is still the previous evening in New York
        let dt = Utc.with_ymd_and_hms(2025, 1, 11, 2, 0, 0).unwrap();
        let date = user_date(dt, chrono_tz::America::New_York);
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
    }

    #[test]
    fn test_xmltv_format() {
        let dt = Utc.with_ymd_and_hms(2024, 11, 28, 18, 30, 0).unwrap();
        assert_eq!(format_datetime_xmltv(dt), "20241128183000 +0000");
    }

    #[test]
    fn test_local_midnight_is_midnight() {
        let tz = chrono_tz::America::New_York;
        let midnight = local_midnight(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(), tz);
        assert_eq!(midnight.format("%H:%M:%S").to_string(), "00:00:00");
    }
}
