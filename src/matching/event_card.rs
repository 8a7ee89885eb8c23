//! Event-card stream matching (UFC, Boxing, PFL)
//!
//! Combat sports don't have team-vs-team structure; streams carry an event
//! number ("UFC 315") or fighter names. There is usually one card per league
//! per date, so matching confirms identity rather than disambiguating.

use crate::database::match_cache;
use crate::matching::classifier::{ClassifiedStream, StreamCategory};
use crate::matching::outcome::{FailedReason, FilteredReason, MatchMethod, MatchOutcome};
use crate::matching::team_matcher::MatchContext;
use crate::models::Event;
use crate::providers::ProviderRegistry;
use crate::utils::tz::user_date;
use regex::Regex;
use sqlx::{Pool, Sqlite};
use std::sync::OnceLock;
use tracing::debug;

/// Fighter surnames shorter than this are too ambiguous to match on.
const MIN_SURNAME_LENGTH: usize = 4;

fn ufc_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(ufc\s*(?:fn|fight\s*night)?\s*\d+)").expect("ufc number regex")
    })
}

fn org_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)((?:pfl|bellator|one\s*fc)\s*\d+)").expect("org number regex")
    })
}

pub struct EventCardMatcher {
    pool: Pool<Sqlite>,
    registry: ProviderRegistry,
}

impl EventCardMatcher {
    pub fn new(pool: Pool<Sqlite>, registry: ProviderRegistry) -> Self {
        Self { pool, registry }
    }

    pub async fn match_stream(
        &self,
        classified: &ClassifiedStream,
        league: &str,
        ctx: &MatchContext,
    ) -> MatchOutcome {
        if classified.category != StreamCategory::EventCard {
            return MatchOutcome::filtered(FilteredReason::NotEvent, "Not an event card stream");
        }

        let fingerprint = classified.normalized.normalized.clone();

        // Cache probe, same validity rule as the team matcher
        if let Some(outcome) = self.check_cache(&fingerprint, ctx).await {
            return outcome;
        }

        let events = self
            .registry
            .get_events(league, ctx.target_date)
            .await
            .into_iter()
            .filter(|e| user_date(e.start_time, ctx.user_tz) == ctx.target_date)
            .collect::<Vec<_>>();

        if events.is_empty() {
            return MatchOutcome::failed(
                FailedReason::NoEventCardMatch,
                format!("No {league} events on {}", ctx.target_date),
            );
        }

        let outcome = self.match_to_card(classified, &events, league);

        if let MatchOutcome::Matched { event, method, .. } = &outcome {
            if let Err(e) = match_cache::set(
                &self.pool,
                ctx.group_id,
                &fingerprint,
                event,
                league,
                ctx.generation,
                *method,
            )
            .await
            {
                tracing::warn!("Failed to write match cache entry: {}", e);
            }
        }

        outcome
    }

    async fn check_cache(&self, fingerprint: &str, ctx: &MatchContext) -> Option<MatchOutcome> {
        let entry = match match_cache::get(&self.pool, ctx.group_id, fingerprint).await {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!("Match cache read failed: {}", e);
                return None;
            }
        };

        if user_date(entry.event.start_time, ctx.user_tz) != ctx.target_date {
            return None;
        }

        if let Err(e) =
            match_cache::touch(&self.pool, ctx.group_id, fingerprint, ctx.generation).await
        {
            tracing::warn!("Match cache touch failed: {}", e);
        }

        let league = entry.league.clone();
        Some(MatchOutcome::cache_hit(
            entry.event,
            entry.match_method,
            league,
        ))
    }

    fn match_to_card(
        &self,
        classified: &ClassifiedStream,
        events: &[Event],
        league: &str,
    ) -> MatchOutcome {
        let stream_lower = classified.normalized.normalized.to_lowercase();

        // Strategy 1: event number with word-boundary matching, so that
        // "UFC 32" can never land inside "UFC 325".
        if let Some(event_num) = classified
            .event_hint
            .as_deref()
            .and_then(extract_event_number)
        {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(&event_num));
            if let Ok(re) = Regex::new(&pattern) {
                for event in events {
                    if re.is_match(&event.name) {
                        debug!(
                            "Matched '{}' -> {} by event number",
                            classified.normalized.original, event.name
                        );
                        return MatchOutcome::matched(
                            event.clone(),
                            MatchMethod::Keyword,
                            league,
                            1.0,
                        );
                    }
                }
            }
            debug!(
                "Event number '{}' not found in {} events",
                event_num,
                events.len()
            );
        }

        // Strategy 2: fighter surname containment (last names are the
        // reliable part; given names get clipped by stream naming)
        for event in events {
            let fighters = [
                event.home_team.as_ref().map(|t| t.name.as_str()),
                event.away_team.as_ref().map(|t| t.name.as_str()),
            ];
            for fighter in fighters.into_iter().flatten() {
                if let Some(surname) = fighter.split_whitespace().last() {
                    let surname_lower = surname.to_lowercase();
                    if surname_lower.len() >= MIN_SURNAME_LENGTH
                        && stream_lower.contains(&surname_lower)
                    {
                        debug!(
                            "Matched '{}' -> {} by fighter name '{}'",
                            classified.normalized.original, event.name, surname
                        );
                        return MatchOutcome::matched(
                            event.clone(),
                            MatchMethod::Fuzzy,
                            league,
                            0.75,
                        );
                    }
                }
            }
        }

        MatchOutcome::failed(
            FailedReason::NoEventCardMatch,
            format!("Could not match to any {league} event"),
        )
    }
}

/// Extract a normalized event identifier from a hint like "UFC 315",
/// "UFC FN 45", or "Bellator 300".
fn extract_event_number(hint: &str) -> Option<String> {
    if let Some(caps) = ufc_number_re().captures(hint) {
        return Some(
            caps[1]
                .to_uppercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        );
    }
    if let Some(caps) = org_number_re().captures(hint) {
        return Some(caps[1].to_uppercase());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_event_number() {
        assert_eq!(extract_event_number("UFC 315").as_deref(), Some("UFC 315"));
        assert_eq!(
            extract_event_number("ufc fight night 45").as_deref(),
            Some("UFC FIGHT NIGHT 45")
        );
        assert_eq!(
            extract_event_number("Bellator 300").as_deref(),
            Some("BELLATOR 300")
        );
        assert_eq!(extract_event_number("random fight"), None);
    }

    #[test]
    fn test_word_boundary_prevents_prefix_match() {
        // "UFC 32" against "UFC 325: Smith vs Jones" must not match
        let pattern = format!(r"(?i)\b{}\b", regex::escape("UFC 32"));
        let re = Regex::new(&pattern).unwrap();
        assert!(!re.is_match("UFC 325: Smith vs Jones"));
        assert!(re.is_match("UFC 32: Name"));
    }
}
