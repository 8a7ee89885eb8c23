//! Discriminated match outcomes
//!
//! The core never raises across component boundaries for data problems.
//! Every match attempt resolves to exactly one of: matched, filtered (not a
//! failure), failed, or excluded-by-lifecycle. The serialized `kind` field
//! keys the per-stream diagnostic logs.

use crate::models::Event;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Fuzzy,
    Keyword,
    Cache,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fuzzy => "fuzzy",
            Self::Keyword => "keyword",
            Self::Cache => "cache",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fuzzy" => Some(Self::Fuzzy),
            "keyword" => Some(Self::Keyword),
            "cache" => Some(Self::Cache),
            _ => None,
        }
    }
}

/// Reasons a stream was filtered. Counted separately from failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilteredReason {
    Placeholder,
    ExcludedByRegex,
    NotEvent,
    KeywordIgnore,
}

/// Reasons a stream failed to match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailedReason {
    NoCandidateLeagues,
    NoEventsOnDate,
    NoMatch,
    NoEventCardMatch,
}

/// Reasons a matched event was excluded by lifecycle policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExcludedReason {
    EventFinal,
    EventPast,
    BeforeWindow,
}

/// Outcome of one stream match attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched {
        event: Box<Event>,
        method: MatchMethod,
        /// Original method when `method` is CACHE, so diagnostics can show
        /// "Cache (origin: fuzzy)" even after many cache hits.
        origin_method: Option<MatchMethod>,
        detected_league: String,
        confidence: f64,
    },
    Filtered {
        reason: FilteredReason,
        detail: String,
    },
    Failed {
        reason: FailedReason,
        detail: String,
    },
    Excluded {
        event: Box<Event>,
        reason: ExcludedReason,
    },
}

impl MatchOutcome {
    pub fn matched(
        event: Event,
        method: MatchMethod,
        detected_league: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self::Matched {
            event: Box::new(event),
            method,
            origin_method: None,
            detected_league: detected_league.into(),
            confidence,
        }
    }

    pub fn cache_hit(event: Event, origin: Option<MatchMethod>, detected_league: String) -> Self {
        Self::Matched {
            event: Box::new(event),
            method: MatchMethod::Cache,
            origin_method: origin,
            detected_league,
            confidence: 1.0,
        }
    }

    pub fn filtered(reason: FilteredReason, detail: impl Into<String>) -> Self {
        Self::Filtered {
            reason,
            detail: detail.into(),
        }
    }

    pub fn failed(reason: FailedReason, detail: impl Into<String>) -> Self {
        Self::Failed {
            reason,
            detail: detail.into(),
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }

    pub fn event(&self) -> Option<&Event> {
        match self {
            Self::Matched { event, .. } | Self::Excluded { event, .. } => Some(event),
            _ => None,
        }
    }

    /// The method that originally produced this match (cache hits report
    /// their origin, not CACHE itself).
    pub fn effective_method(&self) -> Option<MatchMethod> {
        match self {
            Self::Matched {
                method,
                origin_method,
                ..
            } => Some(origin_method.unwrap_or(*method)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_round_trip() {
        for method in [MatchMethod::Fuzzy, MatchMethod::Keyword, MatchMethod::Cache] {
            assert_eq!(MatchMethod::parse(method.as_str()), Some(method));
        }
        assert_eq!(MatchMethod::parse("bogus"), None);
    }

    #[test]
    fn test_outcome_kind_serialization() {
        let outcome = MatchOutcome::failed(FailedReason::NoMatch, "nothing close");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "failed");
        assert_eq!(json["reason"], "NO_MATCH");
    }

    #[test]
    fn test_effective_method_prefers_origin() {
        let event = crate::models::Event {
            id: "e1".into(),
            provider: "espn".into(),
            name: "A @ B".into(),
            start_time: chrono::Utc::now(),
            home_team: None,
            away_team: None,
            status: Default::default(),
            sport: "hockey".into(),
            league: "nhl".into(),
            home_score: None,
            away_score: None,
            venue: None,
            broadcasts: vec![],
            season: None,
            segment_times: Default::default(),
            main_card_start: None,
        };
        let outcome =
            MatchOutcome::cache_hit(event, Some(MatchMethod::Fuzzy), "nhl".to_string());
        assert_eq!(outcome.effective_method(), Some(MatchMethod::Fuzzy));
    }
}
