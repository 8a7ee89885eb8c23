//! Stream name normalization
//!
//! Cleans heterogeneous, poorly-formatted stream names before matching:
//! mojibake repair, provider-prefix stripping, accent folding, city aliasing,
//! and datetime extraction with masking. The step order is load-bearing:
//! mojibake repair must run before anything assuming valid text, accent
//! folding must run before city aliasing, and datetime masking must run last
//! so separator/score regexes never see raw date tokens.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

pub const DATE_MASK: &str = "DATE_MASK";
pub const TIME_MASK: &str = "TIME_MASK";

/// Fixed substitutions for common double-encoded UTF-8 sequences.
/// Longer sequences first so "â€™" wins over its prefix bytes.
const MOJIBAKE_TABLE: &[(&str, &str)] = &[
    ("â€™", "'"),
    ("â€œ", "\""),
    ("â€\u{9d}", "\""),
    ("â€“", "-"),
    ("â€”", "-"),
    ("Ã¡", "á"),
    ("Ã©", "é"),
    ("Ã­", "í"),
    ("Ã³", "ó"),
    ("Ãº", "ú"),
    ("Ã±", "ñ"),
    ("Ã¼", "ü"),
    ("Ã¶", "ö"),
    ("Ã¤", "ä"),
    ("Ã§", "ç"),
    ("Ã£", "ã"),
    ("Ãµ", "õ"),
    ("Ã¨", "è"),
    ("Ã\u{a0}", "à"),
    ("Â", ""),
];

/// IPTV brand prefixes stripped from stream names, longest match first.
const PROVIDER_PREFIXES: &[&str] = &[
    "espn+", "espn", "dazn", "fox sports", "fs1", "fs2", "tsn", "sportsnet", "bein sports",
    "bein", "sky sports", "bt sport", "nbcsn", "nbc sports", "tnt sports", "tnt", "abc", "cbs",
    "paramount+", "peacock", "prime video", "amazon", "ppv", "uk", "usa", "us", "ca",
];

/// Multilingual city variants, applied after accent folding so the keys are
/// plain ASCII regardless of input encoding.
const CITY_ALIASES: &[(&str, &str)] = &[
    ("munchen", "munich"),
    ("koln", "cologne"),
    ("wien", "vienna"),
    ("praha", "prague"),
    ("moskva", "moscow"),
    ("roma", "rome"),
    ("milano", "milan"),
    ("torino", "turin"),
    ("napoli", "naples"),
    ("lisboa", "lisbon"),
    ("sevilla", "seville"),
    ("warszawa", "warsaw"),
    ("bruxelles", "brussels"),
    ("genova", "genoa"),
    ("firenze", "florence"),
];

const MONTH_NAMES: &[(&str, u32)] = &[
    ("january", 1), ("february", 2), ("march", 3), ("april", 4), ("may", 5), ("june", 6),
    ("july", 7), ("august", 8), ("september", 9), ("october", 10), ("november", 11),
    ("december", 12), ("jan", 1), ("feb", 2), ("mar", 3), ("apr", 4), ("jun", 6), ("jul", 7),
    ("aug", 8), ("sep", 9), ("sept", 9), ("oct", 10), ("nov", 11), ("dec", 12),
];

/// Result of stream normalization with extracted metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedStream {
    pub original: String,
    pub normalized: String,
    pub extracted_date: Option<NaiveDate>,
    pub extracted_time: Option<NaiveTime>,
    pub league_hint: Option<String>,
    pub provider_prefix: Option<String>,
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("iso date regex"))
}

fn us_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2}(?:\d{2})?))?\b").expect("us date regex")
    })
}

fn day_month_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(\d{1,2})\s+(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\b\.?",
        )
        .expect("day month regex")
    })
}

fn month_day_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\b\.?\s+(\d{1,2})\b",
        )
        .expect("month day regex")
    })
}

fn time_12h_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").expect("12h time regex")
    })
}

fn time_24h_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("24h time regex"))
}

/// Normalize a raw stream name. Pure and deterministic; never fails.
pub fn normalize(raw: &str) -> NormalizedStream {
    normalize_with_reference(raw, Utc::now().date_naive())
}

/// Normalization with an explicit reference date for MM/DD year inference.
pub fn normalize_with_reference(raw: &str, today: NaiveDate) -> NormalizedStream {
    if raw.trim().is_empty() {
        return NormalizedStream::default();
    }

    // 1. Newlines to spaces
    let mut text = raw.replace(['\n', '\r'], " ");

    // 2. Mojibake repair
    for (bad, good) in MOJIBAKE_TABLE {
        if text.contains(bad) {
            text = text.replace(bad, good);
        }
    }

    // 3. Provider prefix strip (longest match, case-insensitive)
    let (text, provider_prefix) = strip_provider_prefix(&text);
    let mut text = text;

    // 4. Accent fold, then city aliasing (aliasing keys assume folded ASCII)
    text = deunicode::deunicode(&text);
    text = apply_city_aliases(&text);

    // 5. Datetime extraction and masking
    let (text, extracted_date) = extract_and_mask_date(&text, today);
    let (text, extracted_time) = extract_and_mask_time(&text);

    // 6. Collapse whitespace, trim
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");

    NormalizedStream {
        original: raw.to_string(),
        normalized,
        extracted_date,
        extracted_time,
        league_hint: None,
        provider_prefix,
    }
}

fn strip_provider_prefix(text: &str) -> (String, Option<String>) {
    let trimmed = text.trim_start();
    let lower = trimmed.to_lowercase();

    let mut prefixes: Vec<&&str> = PROVIDER_PREFIXES.iter().collect();
    prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));

    for prefix in prefixes {
        if lower.starts_with(*prefix) {
            let after = &trimmed[prefix.len()..];
            // Require a delimiter (or end) so "USA" doesn't eat "Usain"
            let mut rest = after;
            let mut saw_delimiter = rest.is_empty();
            while let Some(c) = rest.chars().next() {
                if c == ':' || c == '-' || c == '|' || c.is_whitespace() {
                    saw_delimiter = true;
                    rest = &rest[c.len_utf8()..];
                } else {
                    break;
                }
            }
            if saw_delimiter {
                let stripped = trimmed[..prefix.len()].to_string();
                return (rest.to_string(), Some(stripped));
            }
        }
    }

    (trimmed.to_string(), None)
}

fn city_alias_table() -> &'static Vec<(Regex, &'static str)> {
    static TABLE: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        CITY_ALIASES
            .iter()
            .filter_map(|(variant, canonical)| {
                Regex::new(&format!(r"(?i)\b{variant}\b"))
                    .ok()
                    .map(|re| (re, *canonical))
            })
            .collect()
    })
}

fn apply_city_aliases(text: &str) -> String {
    let mut result = text.to_string();
    for (re, canonical) in city_alias_table() {
        if re.is_match(&result) {
            result = re.replace_all(&result, *canonical).to_string();
        }
    }
    result
}

/// Find the first date in the text, replace its span with DATE_MASK.
///
/// Tries ISO, then US MM/DD, then "14 Jan", then "Jan 14". Day-month runs
/// before month-day so "14 Jan" is preferred when both orderings could fire.
fn extract_and_mask_date(text: &str, today: NaiveDate) -> (String, Option<NaiveDate>) {
    // ISO: 2024-11-28
    if let Some(caps) = iso_date_re().captures(text) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().unwrap_or(0),
            caps[2].parse().unwrap_or(0),
            caps[3].parse().unwrap_or(0),
        );
        if let Some(date) = date {
            let span = caps.get(0).expect("whole match");
            return (mask_span(text, span.start(), span.end(), DATE_MASK), Some(date));
        }
    }

    // US: 11/28, 11/28/24, 11/28/2024
    if let Some(caps) = us_date_re().captures(text) {
        let month: u32 = caps[1].parse().unwrap_or(0);
        let day: u32 = caps[2].parse().unwrap_or(0);
        let year = match caps.get(3) {
            Some(y) => {
                let raw: i32 = y.as_str().parse().unwrap_or(0);
                Some(if raw < 100 { 2000 + raw } else { raw })
            }
            None => None,
        };
        if let Some(date) = resolve_us_date(month, day, year, today) {
            let span = caps.get(0).expect("whole match");
            return (mask_span(text, span.start(), span.end(), DATE_MASK), Some(date));
        }
    }

    // "14 Jan" / "14 January"
    if let Some(caps) = day_month_re().captures(text) {
        let day: u32 = caps[1].parse().unwrap_or(0);
        if let Some(month) = month_number(&caps[2]) {
            if let Some(date) = resolve_nearest_year(month, day, today) {
                let span = caps.get(0).expect("whole match");
                return (mask_span(text, span.start(), span.end(), DATE_MASK), Some(date));
            }
        }
    }

    // "Jan 14" — a day followed by ':' is a time ("Jan 11:45pm"), so skip
    // that candidate and keep looking
    for caps in month_day_re().captures_iter(text) {
        let day_match = caps.get(2).expect("day group");
        if text[day_match.end()..].starts_with(':') {
            continue;
        }
        if let Some(month) = month_number(&caps[1]) {
            let day: u32 = caps[2].parse().unwrap_or(0);
            if let Some(date) = resolve_nearest_year(month, day, today) {
                let span = caps.get(0).expect("whole match");
                return (
                    mask_span(text, span.start(), span.end(), DATE_MASK),
                    Some(date),
                );
            }
        }
    }

    (text.to_string(), None)
}

/// Find the first time in the text, replace its span with TIME_MASK.
fn extract_and_mask_time(text: &str) -> (String, Option<NaiveTime>) {
    if let Some(caps) = time_12h_re().captures(text) {
        let mut hour: u32 = caps[1].parse().unwrap_or(0);
        let minute: u32 = caps.get(2).map_or(0, |m| m.as_str().parse().unwrap_or(0));
        let pm = caps[3].to_lowercase() == "pm";
        if hour <= 12 {
            if pm && hour < 12 {
                hour += 12;
            } else if !pm && hour == 12 {
                hour = 0;
            }
            if let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) {
                let span = caps.get(0).expect("whole match");
                return (mask_span(text, span.start(), span.end(), TIME_MASK), Some(time));
            }
        }
    }

    if let Some(caps) = time_24h_re().captures(text) {
        let hour: u32 = caps[1].parse().unwrap_or(0);
        let minute: u32 = caps[2].parse().unwrap_or(0);
        if let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) {
            let span = caps.get(0).expect("whole match");
            return (mask_span(text, span.start(), span.end(), TIME_MASK), Some(time));
        }
    }

    (text.to_string(), None)
}

fn mask_span(text: &str, start: usize, end: usize, mask: &str) -> String {
    format!("{}{}{}", &text[..start], mask, &text[end..])
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    MONTH_NAMES
        .iter()
        .find(|(n, _)| *n == lower)
        .map(|(_, num)| *num)
}

/// Resolve a US-format date, inferring the year by ±180-day proximity when
/// absent: more than 180 days in the future means last year, more than 180
/// days in the past means next year.
fn resolve_us_date(
    month: u32,
    day: u32,
    year: Option<i32>,
    today: NaiveDate,
) -> Option<NaiveDate> {
    match year {
        Some(y) => NaiveDate::from_ymd_opt(y, month, day),
        None => resolve_nearest_year(month, day, today),
    }
}

fn resolve_nearest_year(month: u32, day: u32, today: NaiveDate) -> Option<NaiveDate> {
    let candidate = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    let window = Duration::days(180);
    if candidate - today > window {
        NaiveDate::from_ymd_opt(today.year() - 1, month, day)
    } else if today - candidate > window {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()
    }

    #[test]
    fn test_empty_input() {
        let result = normalize("");
        assert_eq!(result.normalized, "");
        assert!(result.extracted_date.is_none());
    }

    #[test]
    fn test_mojibake_repair() {
        let result = normalize_with_reference("Bayern MÃ¼nchen vs Dortmund", today());
        assert!(result.normalized.contains("munich"));
        assert!(!result.normalized.contains("Ã"));
    }

    #[test]
    fn test_provider_prefix_strip() {
        let result = normalize_with_reference("ESPN+ : Lions vs Packers", today());
        assert_eq!(result.provider_prefix.as_deref(), Some("ESPN+"));
        assert!(result.normalized.starts_with("Lions"));
    }

    #[test]
    fn test_prefix_requires_delimiter() {
        // "USA" should not be stripped out of a word
        let result = normalize_with_reference("Usain Bolt Special", today());
        assert!(result.provider_prefix.is_none());
    }

    #[test]
    fn test_city_alias_after_accent_fold() {
        let result = normalize_with_reference("München 1860 vs Köln", today());
        assert!(result.normalized.contains("munich"));
        assert!(result.normalized.contains("cologne"));
    }

    #[test]
    fn test_us_date_extraction_and_mask() {
        let result =
            normalize_with_reference("DETROIT LIONS VS GREEN BAY PACKERS 11/28/2024", today());
        assert_eq!(
            result.extracted_date,
            Some(NaiveDate::from_ymd_opt(2024, 11, 28).unwrap())
        );
        assert!(result.normalized.contains(DATE_MASK));
        assert!(!result.normalized.contains("11/28"));
    }

    #[test]
    fn test_year_inference_within_window() {
        // today = 2025-02-01: "01/15" is this year
        let result = normalize_with_reference("Game 01/15", today());
        assert_eq!(
            result.extracted_date,
            Some(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
        );
    }

    #[test]
    fn test_year_inference_past_window() {
        // today = 2025-02-01: "08/15" would be >180 days ahead, so last year
        let result = normalize_with_reference("Game 08/15", today());
        assert_eq!(
            result.extracted_date,
            Some(NaiveDate::from_ymd_opt(2024, 8, 15).unwrap())
        );
    }

    #[test]
    fn test_month_name_not_confused_with_time() {
        // "Jan 11:45pm" is a time, not January 11
        let result = normalize_with_reference("UFC Jan 11:45pm", today());
        assert!(result.extracted_date.is_none());
        assert_eq!(
            result.extracted_time,
            Some(NaiveTime::from_hms_opt(23, 45, 0).unwrap())
        );
    }

    #[test]
    fn test_time_like_day_skipped_for_later_date() {
        // The Jan 11 candidate is a time; the real date comes later
        let result = normalize_with_reference("UFC Jan 11:45pm card Dec 31", today());
        assert_eq!(
            result.extracted_date,
            Some(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap())
        );
    }

    #[test]
    fn test_day_month_preferred_over_month_day() {
        // Both orderings could fire on "14 Jan 11" style text; day-month wins
        let result = normalize_with_reference("Match 14 Jan", today());
        assert_eq!(
            result.extracted_date,
            Some(NaiveDate::from_ymd_opt(2025, 1, 14).unwrap())
        );
    }

    #[test]
    fn test_twelve_hour_time() {
        let result = normalize_with_reference("Celtics vs Knicks 7pm", today());
        assert_eq!(
            result.extracted_time,
            Some(NaiveTime::from_hms_opt(19, 0, 0).unwrap())
        );
        assert!(result.normalized.contains(TIME_MASK));
    }

    #[test]
    fn test_single_mask_each() {
        let result =
            normalize_with_reference("A vs B 11/28/2024 7:30pm (was 11/27 6pm)", today());
        let date_masks = result.normalized.matches(DATE_MASK).count();
        let time_masks = result.normalized.matches(TIME_MASK).count();
        assert_eq!(date_masks, 1);
        assert_eq!(time_masks, 1);
    }

    #[test]
    fn test_normalize_idempotent() {
        let first = normalize_with_reference("ESPN+ : MÃ¼nchen vs KÃ¶ln 11/28 7pm", today());
        let second = normalize_with_reference(&first.normalized, today());
        assert_eq!(first.normalized, second.normalized);
    }

    #[test]
    fn test_newlines_collapsed() {
        let result = normalize_with_reference("Lions\nvs\nPackers", today());
        assert_eq!(result.normalized, "Lions vs Packers");
    }
}
