//! Stream classification
//!
//! Buckets a normalized stream into one of four categories and extracts
//! league/sport/event/card-segment hints. The decision order matters:
//! placeholder and exclusion checks short-circuit before combat detection so
//! "UFC 315 Weigh-In" never becomes an event card.

use crate::matching::normalizer::NormalizedStream;
use crate::matching::patterns::DetectionKeywordService;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamCategory {
    Placeholder,
    EventCard,
    TeamVsTeam,
    Unknown,
}

/// UFC/combat card segment detected from the stream name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CardSegment {
    EarlyPrelims,
    Prelims,
    MainCard,
    Combined,
}

impl CardSegment {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::EarlyPrelims => "early_prelims",
            Self::Prelims => "prelims",
            Self::MainCard => "main_card",
            Self::Combined => "combined",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "early_prelims" => Some(Self::EarlyPrelims),
            "prelims" => Some(Self::Prelims),
            "main_card" => Some(Self::MainCard),
            "combined" => Some(Self::Combined),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifiedStream {
    pub normalized: NormalizedStream,
    pub category: StreamCategory,
    /// One or more candidate league codes hinted by the stream text
    pub league_hints: Vec<String>,
    pub sport_hint: Option<String>,
    /// e.g. "UFC 315" for event cards
    pub event_hint: Option<String>,
    pub card_segment: Option<CardSegment>,
    /// The two side tokens around the game separator, for TEAM_VS_TEAM
    pub side_tokens: Option<(String, String)>,
}

fn event_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b((?:ufc\s*(?:fn|fight\s*night)?|pfl|bellator|one\s*fc)\s*\d+)")
            .expect("event number regex")
    })
}

#[derive(Clone)]
pub struct Classifier {
    patterns: DetectionKeywordService,
}

impl Classifier {
    pub fn new(patterns: DetectionKeywordService) -> Self {
        Self { patterns }
    }

    /// Classify a normalized stream.
    pub fn classify(&self, normalized: NormalizedStream) -> ClassifiedStream {
        let set = self.patterns.current();
        let text = normalized.normalized.clone();

        let league_hints = set.detect_leagues(&text).unwrap_or_default();
        let sport_hint = set.detect_sport(&text);

        // 1. Placeholder streams are filtered downstream, not failed
        if set.is_placeholder(&text) {
            return ClassifiedStream {
                normalized,
                category: StreamCategory::Placeholder,
                league_hints,
                sport_hint,
                event_hint: None,
                card_segment: None,
                side_tokens: None,
            };
        }

        // 2. Combat non-event content (weigh-ins, pressers) is also a placeholder
        if set.is_excluded(&text) {
            return ClassifiedStream {
                normalized,
                category: StreamCategory::Placeholder,
                league_hints,
                sport_hint,
                event_hint: None,
                card_segment: None,
                side_tokens: None,
            };
        }

        // 3. Combat keywords -> event card, with event number and segment hints
        if set.is_combat_sport(&text) {
            let event_hint = event_number_re()
                .captures(&text)
                .map(|caps| caps[1].to_uppercase().split_whitespace().collect::<Vec<_>>().join(" "));
            let card_segment = set
                .detect_card_segment(&text)
                .and_then(|code| CardSegment::parse(&code));
            return ClassifiedStream {
                normalized,
                category: StreamCategory::EventCard,
                league_hints,
                sport_hint,
                event_hint,
                card_segment,
                side_tokens: None,
            };
        }

        // 4. Game separator -> team vs team, capture the side tokens
        if let Some((separator, pos)) = set.find_separator(&text) {
            let left = text[..pos].trim().to_string();
            let right = text[pos + separator.len()..].trim().to_string();
            if !left.is_empty() && !right.is_empty() {
                return ClassifiedStream {
                    normalized,
                    category: StreamCategory::TeamVsTeam,
                    league_hints,
                    sport_hint,
                    event_hint: None,
                    card_segment: None,
                    side_tokens: Some((clean_side_token(&left), clean_side_token(&right))),
                };
            }
        }

        // 5. Nothing recognizable
        ClassifiedStream {
            normalized,
            category: StreamCategory::Unknown,
            league_hints,
            sport_hint,
            event_hint: None,
            card_segment: None,
            side_tokens: None,
        }
    }
}

/// Strip mask tokens, leftover separators, and short "NFL:"-style lead-ins
/// from a side token so the cache lookup sees just the team name.
fn clean_side_token(token: &str) -> String {
    let mut cleaned = token
        .replace(crate::matching::normalizer::DATE_MASK, " ")
        .replace(crate::matching::normalizer::TIME_MASK, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if let Some(pos) = cleaned.rfind(':') {
        if pos <= 12 {
            cleaned = cleaned[pos + 1..].to_string();
        }
    }

    cleaned
        .trim_matches(|c: char| "|-:".contains(c) || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::normalizer::normalize;

    fn classifier() -> Classifier {
        Classifier::new(DetectionKeywordService::default())
    }

    #[test]
    fn test_placeholder_classification() {
        let result = classifier().classify(normalize("Channel Off Air"));
        assert_eq!(result.category, StreamCategory::Placeholder);
    }

    #[test]
    fn test_weigh_in_is_placeholder_not_event_card() {
        let result = classifier().classify(normalize("UFC 315 Weigh-In"));
        assert_eq!(result.category, StreamCategory::Placeholder);
    }

    #[test]
    fn test_event_card_with_hint_and_segment() {
        let result = classifier().classify(normalize("UFC 315 Early Prelims"));
        assert_eq!(result.category, StreamCategory::EventCard);
        assert_eq!(result.event_hint.as_deref(), Some("UFC 315"));
        assert_eq!(result.card_segment, Some(CardSegment::EarlyPrelims));
    }

    #[test]
    fn test_team_vs_team_side_tokens() {
        let result = classifier().classify(normalize("Detroit Lions vs Green Bay Packers"));
        assert_eq!(result.category, StreamCategory::TeamVsTeam);
        let (left, right) = result.side_tokens.unwrap();
        assert_eq!(left, "Detroit Lions");
        assert_eq!(right, "Green Bay Packers");
    }

    #[test]
    fn test_side_tokens_exclude_masks() {
        let result = classifier().classify(normalize("Lions @ Packers 11/28/2024 7pm"));
        let (_, right) = result.side_tokens.unwrap();
        assert_eq!(right, "Packers");
    }

    #[test]
    fn test_unknown_classification() {
        let result = classifier().classify(normalize("Some Random Documentary"));
        assert_eq!(result.category, StreamCategory::Unknown);
    }

    #[test]
    fn test_league_hint_extraction() {
        let result = classifier().classify(normalize("NFL: Lions vs Packers"));
        assert!(result.league_hints.contains(&"nfl".to_string()));
        assert_eq!(result.category, StreamCategory::TeamVsTeam);
        // the league lead-in is stripped from the side token
        let (left, _) = result.side_tokens.unwrap();
        assert_eq!(left, "Lions");
    }
}
