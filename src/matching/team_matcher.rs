//! Team-vs-team stream matching
//!
//! Resolves a classified TEAM_VS_TEAM stream to a provider event: fingerprint
//! cache probe, candidate-league resolution through the team cache, windowed
//! event fetch per candidate, fuzzy scoring per side, then threshold and
//! tie-break rules. Successful matches are written back to the fingerprint
//! cache; failures are never cached.

use crate::database::{match_cache, team_cache};
use crate::matching::classifier::{ClassifiedStream, StreamCategory};
use crate::matching::outcome::{FailedReason, FilteredReason, MatchMethod, MatchOutcome};
use crate::matching::MATCH_WINDOW_DAYS;
use crate::models::Event;
use crate::providers::ProviderRegistry;
use crate::utils::fuzzy::{normalize_for_matching, FuzzyMatcher};
use crate::utils::tz::user_date;
use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;
use sqlx::{Pool, Sqlite};
use tracing::debug;
use uuid::Uuid;

/// Accept immediately at or above this min-side score.
pub const HIGH_CONFIDENCE: f64 = 85.0;
/// Both sides must clear this floor for any non-high-confidence accept.
pub const BOTH_TEAMS: f64 = 60.0;
/// Date-confirmed accepts need at least this min-side score.
pub const ACCEPT_WITH_DATE: f64 = 75.0;

/// Per-stream matching context, shared by the team and event-card matchers.
#[derive(Debug, Clone)]
pub struct MatchContext {
    pub group_id: Uuid,
    /// League codes configured on the group; empty means unconstrained.
    pub group_leagues: Vec<String>,
    pub target_date: NaiveDate,
    pub generation: i64,
    pub user_tz: Tz,
}

#[derive(Debug, Clone)]
struct ScoredEvent {
    event: Event,
    min_score: f64,
    combined_score: f64,
}

pub struct TeamMatcher {
    pool: Pool<Sqlite>,
    registry: ProviderRegistry,
    fuzzy: FuzzyMatcher,
}

impl TeamMatcher {
    pub fn new(pool: Pool<Sqlite>, registry: ProviderRegistry) -> Self {
        Self {
            pool,
            registry,
            fuzzy: FuzzyMatcher::default(),
        }
    }

    pub async fn match_stream(
        &self,
        classified: &ClassifiedStream,
        ctx: &MatchContext,
    ) -> MatchOutcome {
        if classified.category != StreamCategory::TeamVsTeam {
            return MatchOutcome::filtered(FilteredReason::NotEvent, "Not a team-vs-team stream");
        }

        let fingerprint = classified.normalized.normalized.clone();

        // 1. Cache probe
        if let Some(outcome) = self.check_cache(&fingerprint, ctx).await {
            return outcome;
        }

        let Some((team1, team2)) = classified.side_tokens.clone() else {
            return MatchOutcome::failed(FailedReason::NoMatch, "No team tokens extracted");
        };

        // 2. Candidate-league resolution
        let candidates = match self.resolve_candidates(&team1, &team2, classified, ctx).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("Candidate league lookup failed: {}", e);
                Vec::new()
            }
        };

        if candidates.is_empty() {
            return MatchOutcome::failed(
                FailedReason::NoCandidateLeagues,
                format!("No shared league for '{team1}' / '{team2}'"),
            );
        }

        // 3. Per-candidate event fetch across the match window. Past events
        // matter so just-finished games can still attach scores; lifecycle
        // excludes them later.
        let window_start = ctx.target_date - Duration::days(MATCH_WINDOW_DAYS);
        let window_end = ctx.target_date + Duration::days(MATCH_WINDOW_DAYS);
        let mut events: Vec<(String, Event)> = Vec::new();
        for (league, _provider) in &candidates {
            for event in self
                .registry
                .get_events_range(league, window_start, window_end)
                .await
            {
                events.push((league.clone(), event));
            }
        }

        if events.is_empty() {
            return MatchOutcome::failed(
                FailedReason::NoEventsOnDate,
                format!(
                    "No events in {} candidate league(s) around {}",
                    candidates.len(),
                    ctx.target_date
                ),
            );
        }

        // 4/5/6. Score, threshold, tie-break
        let text = normalize_for_matching(&classified.normalized.normalized);
        let scored: Vec<(String, ScoredEvent)> = events
            .into_iter()
            .filter_map(|(league, event)| {
                self.score_event(&event, &text)
                    .map(|scored| (league, scored))
            })
            .collect();

        let Some((league, best, confidence)) = select_best(
            scored,
            classified.normalized.extracted_date,
            ctx.target_date,
            ctx.user_tz,
        ) else {
            return MatchOutcome::failed(
                FailedReason::NoMatch,
                format!("No event scored above thresholds for '{team1}' vs '{team2}'"),
            );
        };

        debug!(
            "Matched '{}' -> {} ({}), confidence {:.0}",
            classified.normalized.original, best.name, league, confidence
        );

        // Cache only successes; a cached miss would pin the failure.
        if let Err(e) = match_cache::set(
            &self.pool,
            ctx.group_id,
            &fingerprint,
            &best,
            &league,
            ctx.generation,
            MatchMethod::Fuzzy,
        )
        .await
        {
            tracing::warn!("Failed to write match cache entry: {}", e);
        }

        MatchOutcome::matched(best, MatchMethod::Fuzzy, league, confidence)
    }

    /// Cache probe: a hit is only valid when the snapshot's event date (user
    /// tz) equals the requested target date — a new occurrence of the same
    /// matchup must fall through to fresh matching. The stale entry stays put
    /// for other dates.
    async fn check_cache(&self, fingerprint: &str, ctx: &MatchContext) -> Option<MatchOutcome> {
        let entry = match match_cache::get(&self.pool, ctx.group_id, fingerprint).await {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!("Match cache read failed: {}", e);
                return None;
            }
        };

        let event_date = user_date(entry.event.start_time, ctx.user_tz);
        if event_date != ctx.target_date {
            debug!(
                "Cache entry for '{}' is dated {} (want {}), re-matching",
                fingerprint, event_date, ctx.target_date
            );
            return None;
        }

        if let Err(e) =
            match_cache::touch(&self.pool, ctx.group_id, fingerprint, ctx.generation).await
        {
            tracing::warn!("Match cache touch failed: {}", e);
        }

        debug!(
            "Cache hit for '{}' (origin: {:?})",
            fingerprint, entry.match_method
        );
        let league = entry.league.clone();
        Some(MatchOutcome::cache_hit(
            entry.event,
            entry.match_method,
            league,
        ))
    }

    async fn resolve_candidates(
        &self,
        team1: &str,
        team2: &str,
        classified: &ClassifiedStream,
        ctx: &MatchContext,
    ) -> anyhow::Result<Vec<(String, String)>> {
        let mut candidates = team_cache::find_candidate_leagues(
            &self.pool,
            team1,
            team2,
            classified.sport_hint.as_deref(),
        )
        .await?;

        // Constrain by the stream's own league hints, then the group's set
        if !classified.league_hints.is_empty() {
            let hinted: Vec<(String, String)> = candidates
                .iter()
                .filter(|(league, _)| classified.league_hints.contains(league))
                .cloned()
                .collect();
            if !hinted.is_empty() {
                candidates = hinted;
            }
        }
        if !ctx.group_leagues.is_empty() {
            candidates.retain(|(league, _)| ctx.group_leagues.contains(league));
        }

        // Last resort: the hinted league itself, when the cache had nothing
        if candidates.is_empty() {
            if let Some(hint) = classified.league_hints.first() {
                let provider = self
                    .registry
                    .provider_for_league(hint)
                    .map(|p| p.name().to_string())
                    .unwrap_or_else(|| "espn".to_string());
                candidates.push((hint.clone(), provider));
            }
        }

        Ok(candidates)
    }

    /// Score one event against the stream text: one score per side, the
    /// event's score is the minimum. Events missing either side don't score.
    fn score_event(&self, event: &Event, text: &str) -> Option<ScoredEvent> {
        let home = event.home_team.as_ref()?;
        let away = event.away_team.as_ref()?;

        let home_patterns = self.fuzzy.generate_team_patterns(home);
        let away_patterns = self.fuzzy.generate_team_patterns(away);

        let home_score = self.fuzzy.score_patterns(&home_patterns, text);
        let away_score = self.fuzzy.score_patterns(&away_patterns, text);

        Some(ScoredEvent {
            event: event.clone(),
            min_score: home_score.min(away_score),
            combined_score: home_score + away_score,
        })
    }
}

/// Apply thresholds and tie-breaks to scored candidates.
///
/// Accept rules:
/// - min score ≥ 85: accept outright
/// - min score ≥ 60: accept if ≥ 75 with a date-confirmed stream, or if it is
///   the only candidate event on the target date
///
/// Ties break on combined score, then proximity to the target date, then the
/// lower event id (stable but arbitrary).
fn select_best(
    scored: Vec<(String, ScoredEvent)>,
    extracted_date: Option<NaiveDate>,
    target_date: NaiveDate,
    tz: Tz,
) -> Option<(String, Event, f64)> {
    let mut ranked: Vec<(String, ScoredEvent)> = scored
        .into_iter()
        .filter(|(_, s)| s.min_score >= BOTH_TEAMS)
        .collect();

    ranked.sort_by(|(_, a), (_, b)| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let dist_a = (user_date(a.event.start_time, tz) - target_date).num_days().abs();
                let dist_b = (user_date(b.event.start_time, tz) - target_date).num_days().abs();
                dist_a.cmp(&dist_b)
            })
            .then_with(|| compare_event_ids(&a.event.id, &b.event.id))
    });

    let on_target_count = ranked
        .iter()
        .filter(|(_, s)| user_date(s.event.start_time, tz) == target_date)
        .count();

    let (league, best) = ranked.into_iter().next()?;
    let event_date = user_date(best.event.start_time, tz);

    let accepted = if best.min_score >= HIGH_CONFIDENCE {
        true
    } else if best.min_score >= ACCEPT_WITH_DATE && extracted_date == Some(event_date) {
        true
    } else {
        // Only survivor on the target date
        on_target_count == 1 && event_date == target_date
    };

    if accepted {
        let confidence = best.min_score / 100.0;
        Some((league, best.event, confidence))
    } else {
        None
    }
}

fn compare_event_ids(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventStatus, Team};
    use chrono::{TimeZone, Utc};

    fn team(id: &str, name: &str, abbrev: &str) -> Team {
        Team {
            id: id.to_string(),
            name: name.to_string(),
            short_name: None,
            abbreviation: Some(abbrev.to_string()),
            logo_url: None,
            sport: None,
        }
    }

    fn event(id: &str, home: Team, away: Team, start: chrono::DateTime<Utc>) -> Event {
        Event {
            id: id.to_string(),
            provider: "espn".to_string(),
            name: format!("{} at {}", away.name, home.name),
            start_time: start,
            home_team: Some(home),
            away_team: Some(away),
            status: EventStatus::default(),
            sport: "football".to_string(),
            league: "nfl".to_string(),
            home_score: None,
            away_score: None,
            venue: None,
            broadcasts: vec![],
            season: None,
            segment_times: Default::default(),
            main_card_start: None,
        }
    }

    fn scored(league: &str, event: Event, min: f64, combined: f64) -> (String, ScoredEvent) {
        (
            league.to_string(),
            ScoredEvent {
                event,
                min_score: min,
                combined_score: combined,
            },
        )
    }

    #[test]
    fn test_high_confidence_accepts() {
        let tz = chrono_tz::America::New_York;
        let target = NaiveDate::from_ymd_opt(2024, 11, 28).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 11, 28, 18, 0, 0).unwrap();
        let e = event("1", team("DET", "Detroit Lions", "DET"), team("GB", "Green Bay Packers", "GB"), start);

        let result = select_best(vec![scored("nfl", e, 100.0, 200.0)], None, target, tz);
        assert!(result.is_some());
        let (_, _, confidence) = result.unwrap();
        assert!(confidence >= 0.85);
    }

    #[test]
    fn test_mid_confidence_needs_date_or_solo() {
        let tz = chrono_tz::America::New_York;
        let target = NaiveDate::from_ymd_opt(2024, 11, 28).unwrap();
        let on_target = Utc.with_ymd_and_hms(2024, 11, 28, 18, 0, 0).unwrap();
        let off_target = Utc.with_ymd_and_hms(2024, 11, 27, 18, 0, 0).unwrap();

        let e1 = event("1", team("A", "Alpha", "A"), team("B", "Beta", "B"), on_target);
        let e2 = event("2", team("C", "Gamma", "C"), team("D", "Delta", "D"), off_target);

        // 78 min score, no extracted date, two candidates but only one on
        // target date -> the on-target one is accepted
        let result = select_best(
            vec![scored("nfl", e1.clone(), 78.0, 160.0), scored("nfl", e2, 70.0, 140.0)],
            None,
            target,
            tz,
        );
        assert!(result.is_some());
        assert_eq!(result.unwrap().1.id, "1");

        // 78 min score with a matching extracted date also accepts
        let result = select_best(
            vec![scored("nfl", e1, 78.0, 160.0)],
            Some(target),
            target,
            tz,
        );
        assert!(result.is_some());
    }

    #[test]
    fn test_below_floor_rejected() {
        let tz = chrono_tz::America::New_York;
        let target = NaiveDate::from_ymd_opt(2024, 11, 28).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 11, 28, 18, 0, 0).unwrap();
        let e = event("1", team("A", "Alpha", "A"), team("B", "Beta", "B"), start);

        assert!(select_best(vec![scored("nfl", e, 55.0, 150.0)], Some(target), target, tz).is_none());
    }

    #[test]
    fn test_tie_breaks_on_date_then_id() {
        let tz = chrono_tz::America::New_York;
        let target = NaiveDate::from_ymd_opt(2024, 11, 28).unwrap();
        let near = Utc.with_ymd_and_hms(2024, 11, 28, 18, 0, 0).unwrap();
        let far = Utc.with_ymd_and_hms(2024, 11, 25, 18, 0, 0).unwrap();

        let e_near = event("9", team("A", "Alpha FC", "A"), team("B", "Beta FC", "B"), near);
        let e_far = event("2", team("A", "Alpha FC", "A"), team("B", "Beta FC", "B"), far);

        // Equal scores: the event closer to the target date wins
        let result = select_best(
            vec![
                scored("nfl", e_far.clone(), 90.0, 180.0),
                scored("nfl", e_near.clone(), 90.0, 180.0),
            ],
            None,
            target,
            tz,
        );
        assert_eq!(result.unwrap().1.id, "9");

        // Same date too: lower event id wins
        let e_same = event("4", team("A", "Alpha FC", "A"), team("B", "Beta FC", "B"), near);
        let result = select_best(
            vec![
                scored("nfl", e_near, 90.0, 180.0),
                scored("nfl", e_same, 90.0, 180.0),
            ],
            None,
            target,
            tz,
        );
        assert_eq!(result.unwrap().1.id, "4");
    }
}
