//! Provider-facing event and team types
//!
//! Events are fetched on demand and not persisted long-term; the fingerprint
//! cache stores a serialized snapshot of this type so a cached stream can be
//! resolved without a provider call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub short_name: Option<String>,
    pub abbreviation: Option<String>,
    pub logo_url: Option<String>,
    pub sport: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EventStatus {
    /// scheduled, live, final, postponed, cancelled, delayed
    pub state: String,
    /// Provider detail string, e.g. "Final OT"
    #[serde(default)]
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub provider: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub home_team: Option<Team>,
    pub away_team: Option<Team>,
    #[serde(default)]
    pub status: EventStatus,
    pub sport: String,
    pub league: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub venue: Option<String>,
    #[serde(default)]
    pub broadcasts: Vec<String>,
    pub season: Option<i64>,
    /// UFC only: segment_code -> UTC start, from ESPN bout-level data.
    /// BTreeMap keeps snapshot serialization stable.
    #[serde(default)]
    pub segment_times: BTreeMap<String, DateTime<Utc>>,
    /// UFC only: main card start, used for fallback segment estimation.
    pub main_card_start: Option<DateTime<Utc>>,
}

impl Event {
    /// Check if this event is final/completed.
    ///
    /// Providers report final state differently: ESPN uses "final"/"post",
    /// TheSportsDB folds "ft"/"aet"/"finished" into "final", and detail
    /// strings carry variants like "Final OT". Check both fields.
    pub fn is_final(&self) -> bool {
        let state = self.status.state.to_lowercase();
        if matches!(state.as_str(), "final" | "post" | "completed") {
            return true;
        }
        self.status.detail.to_lowercase().contains("final")
    }

    /// UFC/MMA events get card-segment channel expansion.
    pub fn is_ufc(&self) -> bool {
        self.sport == "mma" && self.league == "ufc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_with_status(state: &str, detail: &str) -> Event {
        Event {
            id: "401".to_string(),
            provider: "espn".to_string(),
            name: "Test".to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 1, 10, 20, 0, 0).unwrap(),
            home_team: None,
            away_team: None,
            status: EventStatus {
                state: state.to_string(),
                detail: detail.to_string(),
            },
            sport: "hockey".to_string(),
            league: "nhl".to_string(),
            home_score: None,
            away_score: None,
            venue: None,
            broadcasts: vec![],
            season: None,
            segment_times: BTreeMap::new(),
            main_card_start: None,
        }
    }

    #[test]
    fn test_final_detection_by_state() {
        assert!(event_with_status("final", "").is_final());
        assert!(event_with_status("post", "").is_final());
        assert!(!event_with_status("scheduled", "").is_final());
        assert!(!event_with_status("live", "In Progress").is_final());
    }

    #[test]
    fn test_final_detection_by_detail() {
        assert!(event_with_status("live", "Final OT").is_final());
        assert!(event_with_status("in", "Final - 3OT").is_final());
    }
}
