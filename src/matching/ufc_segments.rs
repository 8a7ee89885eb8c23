//! UFC card segment expansion
//!
//! Turns one matched UFC event-stream pair into per-segment channels
//! (Early Prelims / Prelims / Main Card). Segment timing comes from ESPN
//! bout-level data when present; estimation is the fallback. Non-UFC
//! matches pass through untouched.

use crate::matching::classifier::CardSegment;
use crate::matching::outcome::MatchMethod;
use crate::matching::patterns::PatternSet;
use crate::models::{Event, SourceStream};
use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Segment codes ordered earliest to latest.
pub const SEGMENT_ORDER: [&str; 3] = ["early_prelims", "prelims", "main_card"];

/// Display suffix per segment; main card is the default channel and gets none.
pub fn segment_display_name(segment: &str) -> &'static str {
    match segment {
        "early_prelims" => "Early Prelims",
        "prelims" => "Prelims",
        _ => "",
    }
}

/// One stream successfully matched to an event, flowing through the
/// expansion -> lifecycle -> channel upsert pipeline.
#[derive(Debug, Clone)]
pub struct MatchedStream {
    pub stream: SourceStream,
    pub event: Event,
    pub method: MatchMethod,
    pub origin_method: Option<MatchMethod>,
    pub league: String,
    pub confidence: f64,
    pub card_segment: Option<CardSegment>,
    pub extracted_time: Option<NaiveTime>,
    pub segment: Option<SegmentInfo>,
}

/// Resolved segment assignment with concrete timing.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    pub code: String,
    pub display: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Expand UFC matches into segment-annotated matches. Excluded content
/// (weigh-ins, pressers) is dropped; everything non-UFC passes through.
pub fn expand_ufc_segments(
    matches: Vec<MatchedStream>,
    patterns: &PatternSet,
    mma_duration_hours: f64,
    user_tz: Tz,
) -> Vec<MatchedStream> {
    let mut result = Vec::new();
    // event_id -> segment -> matches
    let mut ufc_by_segment: HashMap<String, HashMap<String, Vec<MatchedStream>>> = HashMap::new();

    for mut matched in matches {
        if !matched.event.is_ufc() {
            result.push(matched);
            continue;
        }

        if patterns.is_excluded(&matched.stream.name) {
            debug!(
                "Dropping non-event UFC content: '{}'",
                truncate(&matched.stream.name, 50)
            );
            continue;
        }

        let mut segment = matched
            .card_segment
            .map(|s| s.as_code().to_string())
            .or_else(|| patterns.detect_card_segment(&matched.stream.name))
            .unwrap_or_else(|| "main_card".to_string());

        // Combined broadcasts live on the main card channel
        if segment == "combined" {
            segment = "main_card".to_string();
        }

        // A stream labeled "prelims" whose own time is closer to the early
        // prelims start is actually early prelims
        if segment == "prelims" {
            segment = disambiguate_prelims_by_time(
                &segment,
                matched.extracted_time,
                &matched.event,
                user_tz,
            );
        }

        segment = canonicalize_segment(&segment, &matched.event);

        matched.card_segment = CardSegment::parse(&segment);
        ufc_by_segment
            .entry(matched.event.id.clone())
            .or_default()
            .entry(segment)
            .or_default()
            .push(matched);
    }

    let mut ufc_count = 0;
    let mut segment_count = 0;

    for (event_id, segments) in ufc_by_segment {
        for segment in SEGMENT_ORDER {
            let Some(matches) = segments.get(segment) else {
                continue;
            };
            if matches.is_empty() {
                continue;
            }

            let event = &matches[0].event;
            let (start, end) = get_segment_times(event, segment, mma_duration_hours);
            let info = SegmentInfo {
                code: segment.to_string(),
                display: segment_display_name(segment).to_string(),
                start,
                end,
            };

            debug!(
                "Event {} segment '{}': {} streams, {} - {}",
                event_id,
                segment,
                matches.len(),
                start.format("%H:%M"),
                end.format("%H:%M"),
            );

            segment_count += 1;
            for matched in matches {
                ufc_count += 1;
                let mut expanded = matched.clone();
                expanded.segment = Some(info.clone());
                result.push(expanded);
            }
        }
    }

    if ufc_count > 0 {
        info!(
            "Expanded {} UFC streams into {} segment channels",
            ufc_count, segment_count
        );
    }

    result
}

/// Validate a detected segment against ESPN's segment data, remapping to the
/// nearest present segment (later-or-same preferred, then earlier).
pub fn canonicalize_segment(detected: &str, event: &Event) -> String {
    if event.segment_times.is_empty() {
        return detected.to_string();
    }

    if event.segment_times.contains_key(detected) {
        return detected.to_string();
    }

    if let Some(detected_idx) = SEGMENT_ORDER.iter().position(|s| *s == detected) {
        for segment in &SEGMENT_ORDER[detected_idx..] {
            if event.segment_times.contains_key(*segment) {
                info!(
                    "Mapped segment '{}' to '{}' (not in ESPN data)",
                    detected, segment
                );
                return segment.to_string();
            }
        }
        for segment in SEGMENT_ORDER[..detected_idx].iter().rev() {
            if event.segment_times.contains_key(*segment) {
                info!(
                    "Mapped segment '{}' to '{}' (not in ESPN data)",
                    detected, segment
                );
                return segment.to_string();
            }
        }
    }

    if event.segment_times.contains_key("main_card") {
        warn!("Unknown segment '{}', defaulting to main_card", detected);
        return "main_card".to_string();
    }

    let fallback = event
        .segment_times
        .keys()
        .next()
        .cloned()
        .unwrap_or_else(|| "main_card".to_string());
    warn!("Unknown segment '{}', defaulting to '{}'", detected, fallback);
    fallback
}

/// Reassign "prelims" to "early_prelims" when the stream's own time token
/// sits closer to the early prelims start. Stream times are local; ESPN
/// times are UTC and get converted before comparing.
pub fn disambiguate_prelims_by_time(
    detected: &str,
    stream_time: Option<NaiveTime>,
    event: &Event,
    user_tz: Tz,
) -> String {
    if detected != "prelims" {
        return detected.to_string();
    }
    let Some(stream_time) = stream_time else {
        return detected.to_string();
    };
    let (Some(early_dt), Some(prelims_dt)) = (
        event.segment_times.get("early_prelims"),
        event.segment_times.get("prelims"),
    ) else {
        return detected.to_string();
    };

    let early_time = early_dt.with_timezone(&user_tz).time();
    let prelims_time = prelims_dt.with_timezone(&user_tz).time();

    let dist_to_early = time_distance(stream_time, early_time);
    let dist_to_prelims = time_distance(stream_time, prelims_time);

    if dist_to_early < dist_to_prelims {
        info!(
            "Disambiguated 'prelims' to 'early_prelims' by time (stream={}, early={}, prelims={})",
            stream_time, early_time, prelims_time
        );
        return "early_prelims".to_string();
    }

    detected.to_string()
}

/// Seconds between two wall-clock times, accounting for midnight wraparound
/// (a stream at 23:00 against an event at 01:00 is 2 hours apart, not 22).
fn time_distance(a: NaiveTime, b: NaiveTime) -> u32 {
    let a_secs = a.num_seconds_from_midnight();
    let b_secs = b.num_seconds_from_midnight();
    let diff = a_secs.abs_diff(b_secs);
    diff.min(86_400 - diff)
}

/// Exact start/end for a segment from ESPN data. End-of-segment is the next
/// present segment's start; the last segment runs an estimated duration.
pub fn get_segment_times(
    event: &Event,
    segment: &str,
    mma_duration_hours: f64,
) -> (DateTime<Utc>, DateTime<Utc>) {
    if let Some(start) = event.segment_times.get(segment) {
        let present: Vec<&str> = SEGMENT_ORDER
            .iter()
            .copied()
            .filter(|s| event.segment_times.contains_key(*s))
            .collect();

        let end = match present.iter().position(|s| *s == segment) {
            Some(idx) if idx + 1 < present.len() => event.segment_times[present[idx + 1]],
            _ => *start + hours(mma_duration_hours / 2.0),
        };
        return (*start, end);
    }

    warn!(
        "No ESPN segment times for event {} segment {}, estimating",
        event.id, segment
    );
    estimate_segment_times(event, segment, mma_duration_hours)
}

fn estimate_segment_times(
    event: &Event,
    segment: &str,
    mma_duration_hours: f64,
) -> (DateTime<Utc>, DateTime<Utc>) {
    if let Some(main_card_start) = event.main_card_start {
        let prelims_start = main_card_start - hours(1.5);
        return match segment {
            "early_prelims" => (event.start_time, prelims_start),
            "prelims" => {
                let start = if event.start_time > prelims_start {
                    event.start_time
                } else {
                    prelims_start
                };
                (start, main_card_start)
            }
            _ => (main_card_start, main_card_start + hours(mma_duration_hours / 2.0)),
        };
    }

    // No main_card_start either: thirds of the estimated duration
    let third = hours(mma_duration_hours / 3.0);
    match segment {
        "early_prelims" => (event.start_time, event.start_time + third),
        "prelims" => (event.start_time + third, event.start_time + third * 2),
        _ => (event.start_time + third * 2, event.start_time + third * 3),
    }
}

fn hours(h: f64) -> Duration {
    Duration::seconds((h * 3600.0) as i64)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventStatus;
    use chrono::TimeZone;

    fn ufc_event(segments: &[(&str, DateTime<Utc>)]) -> Event {
        Event {
            id: "600051598".to_string(),
            provider: "espn".to_string(),
            name: "UFC 315: Muhammad vs Della Maddalena".to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 5, 10, 22, 0, 0).unwrap(),
            home_team: None,
            away_team: None,
            status: EventStatus::default(),
            sport: "mma".to_string(),
            league: "ufc".to_string(),
            home_score: None,
            away_score: None,
            venue: None,
            broadcasts: vec![],
            season: None,
            segment_times: segments.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            main_card_start: None,
        }
    }

    fn full_card() -> Event {
        ufc_event(&[
            ("early_prelims", Utc.with_ymd_and_hms(2025, 5, 10, 22, 0, 0).unwrap()),
            ("prelims", Utc.with_ymd_and_hms(2025, 5, 10, 23, 30, 0).unwrap()),
            ("main_card", Utc.with_ymd_and_hms(2025, 5, 11, 2, 0, 0).unwrap()),
        ])
    }

    #[test]
    fn test_canonicalize_present_segment() {
        assert_eq!(canonicalize_segment("prelims", &full_card()), "prelims");
    }

    #[test]
    fn test_canonicalize_prefers_later_then_earlier() {
        // Fight Night card: prelims + main card only
        let event = ufc_event(&[
            ("prelims", Utc.with_ymd_and_hms(2025, 5, 10, 23, 0, 0).unwrap()),
            ("main_card", Utc.with_ymd_and_hms(2025, 5, 11, 1, 0, 0).unwrap()),
        ]);
        // early_prelims maps forward to prelims
        assert_eq!(canonicalize_segment("early_prelims", &event), "prelims");

        // Only early prelims present: main_card maps backward
        let event = ufc_event(&[(
            "early_prelims",
            Utc.with_ymd_and_hms(2025, 5, 10, 22, 0, 0).unwrap(),
        )]);
        assert_eq!(canonicalize_segment("main_card", &event), "early_prelims");
    }

    #[test]
    fn test_canonicalize_without_espn_data_trusts_detection() {
        let event = ufc_event(&[]);
        assert_eq!(canonicalize_segment("prelims", &event), "prelims");
    }

    #[test]
    fn test_segment_end_is_next_segment_start() {
        let event = full_card();
        let (start, end) = get_segment_times(&event, "early_prelims", 5.0);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 5, 10, 22, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 5, 10, 23, 30, 0).unwrap());

        // Last segment: start + mma_duration/2
        let (start, end) = get_segment_times(&event, "main_card", 5.0);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 5, 11, 2, 0, 0).unwrap());
        assert_eq!(end, start + Duration::minutes(150));
    }

    #[test]
    fn test_prelims_time_disambiguation() {
        let event = full_card();
        let tz = chrono_tz::America::New_York;
        // Early prelims at 22:00Z = 18:00 ET; prelims at 23:30Z = 19:30 ET.
        // A "prelims" stream labeled 6pm is closer to early prelims.
        let segment = disambiguate_prelims_by_time(
            "prelims",
            NaiveTime::from_hms_opt(18, 0, 0),
            &event,
            tz,
        );
        assert_eq!(segment, "early_prelims");

        // 7:30pm stays prelims
        let segment = disambiguate_prelims_by_time(
            "prelims",
            NaiveTime::from_hms_opt(19, 30, 0),
            &event,
            tz,
        );
        assert_eq!(segment, "prelims");
    }

    #[test]
    fn test_time_distance_wraps_midnight() {
        let a = NaiveTime::from_hms_opt(23, 0, 0).unwrap();
        let b = NaiveTime::from_hms_opt(1, 0, 0).unwrap();
        assert_eq!(time_distance(a, b), 7200);
    }

    #[test]
    fn test_expansion_groups_by_segment() {
        let patterns = crate::matching::patterns::PatternSet::build(&[]);
        let event = full_card();
        let tz = chrono_tz::America::New_York;

        let make = |id: i64, name: &str, segment: CardSegment| MatchedStream {
            stream: SourceStream {
                id,
                name: name.to_string(),
                url: None,
                m3u_account_id: None,
                m3u_account_name: None,
                group_title: None,
            },
            event: event.clone(),
            method: MatchMethod::Keyword,
            origin_method: None,
            league: "ufc".to_string(),
            confidence: 1.0,
            card_segment: Some(segment),
            extracted_time: None,
            segment: None,
        };

        let expanded = expand_ufc_segments(
            vec![
                make(1, "UFC 315 Early Prelims", CardSegment::EarlyPrelims),
                make(2, "UFC 315 Prelims", CardSegment::Prelims),
                make(3, "UFC 315 Main Card", CardSegment::MainCard),
            ],
            &patterns,
            5.0,
            tz,
        );

        assert_eq!(expanded.len(), 3);
        let main = expanded
            .iter()
            .find(|m| m.segment.as_ref().unwrap().code == "main_card")
            .unwrap();
        let info = main.segment.as_ref().unwrap();
        assert_eq!(info.start, Utc.with_ymd_and_hms(2025, 5, 11, 2, 0, 0).unwrap());
        assert_eq!(info.end, info.start + Duration::minutes(150));
    }

    #[test]
    fn test_weigh_in_dropped_and_non_ufc_passthrough() {
        let patterns = crate::matching::patterns::PatternSet::build(&[]);
        let tz = chrono_tz::America::New_York;
        let mut non_ufc_event = full_card();
        non_ufc_event.sport = "hockey".to_string();
        non_ufc_event.league = "nhl".to_string();

        let weigh_in = MatchedStream {
            stream: SourceStream {
                id: 1,
                name: "UFC 315 Weigh-In".to_string(),
                url: None,
                m3u_account_id: None,
                m3u_account_name: None,
                group_title: None,
            },
            event: full_card(),
            method: MatchMethod::Keyword,
            origin_method: None,
            league: "ufc".to_string(),
            confidence: 1.0,
            card_segment: None,
            extracted_time: None,
            segment: None,
        };
        let hockey = MatchedStream {
            stream: SourceStream {
                id: 2,
                name: "Wings vs Hawks".to_string(),
                url: None,
                m3u_account_id: None,
                m3u_account_name: None,
                group_title: None,
            },
            event: non_ufc_event,
            method: MatchMethod::Fuzzy,
            origin_method: None,
            league: "nhl".to_string(),
            confidence: 0.9,
            card_segment: None,
            extracted_time: None,
            segment: None,
        };

        let expanded = expand_ufc_segments(vec![weigh_in, hockey], &patterns, 5.0, tz);
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].stream.id, 2);
        assert!(expanded[0].segment.is_none());
    }
}
