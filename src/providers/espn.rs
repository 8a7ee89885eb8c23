//! ESPN site API adapter
//!
//! Scoreboard and team endpoints keyed by (sport path, league slug) from the
//! league mappings. For UFC the scoreboard's bout-level competitions carry
//! card-segment markers; the earliest bout per segment becomes that
//! segment's start time. All failures surface as empty results with logged
//! detail — nothing provider-shaped escapes this module.

use crate::models::{Event, EventStatus, Team};
use crate::providers::SportsProvider;
use crate::services::league_mappings::LeagueMappingService;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

const BASE_URL: &str = "https://site.api.espn.com/apis/site/v2/sports";

pub struct EspnProvider {
    client: reqwest::Client,
    mappings: LeagueMappingService,
}

impl EspnProvider {
    pub fn new(timeout_secs: u64, mappings: LeagueMappingService) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, mappings }
    }

    /// (espn sport path, espn league slug) for a league code.
    fn league_path(&self, league: &str) -> Option<(String, String)> {
        let mapping = self.mappings.get_mapping(league, "espn")?;
        let sport_path = match mapping.sport.as_str() {
            "football" => "football",
            "basketball" => "basketball",
            "hockey" => "hockey",
            "baseball" => "baseball",
            "soccer" => "soccer",
            "mma" => "mma",
            "rugby" => "rugby",
            "lacrosse" => "lacrosse",
            "volleyball" => "volleyball",
            other => other,
        };
        Some((sport_path.to_string(), mapping.provider_league_id))
    }

    async fn fetch_json(&self, url: &str) -> Option<Value> {
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => match response.json().await {
                Ok(json) => Some(json),
                Err(e) => {
                    warn!("ESPN response decode failed for {}: {}", url, e);
                    None
                }
            },
            Ok(response) => {
                warn!("ESPN HTTP {} for {}", response.status(), url);
                None
            }
            Err(e) => {
                warn!("ESPN request failed for {}: {}", url, e);
                None
            }
        }
    }

    fn parse_scoreboard(&self, json: &Value, league: &str, sport: &str) -> Vec<Event> {
        let Some(raw_events) = json.get("events").and_then(Value::as_array) else {
            return Vec::new();
        };

        raw_events
            .iter()
            .filter_map(|raw| self.parse_event(raw, league, sport))
            .collect()
    }

    fn parse_event(&self, raw: &Value, league: &str, sport: &str) -> Option<Event> {
        let id = raw.get("id")?.as_str()?.to_string();
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let start_time = raw
            .get("date")
            .and_then(Value::as_str)
            .and_then(parse_espn_date)?;

        let status = parse_status(raw.pointer("/status/type"));
        let competitions = raw.get("competitions").and_then(Value::as_array);
        let first_competition = competitions.and_then(|c| c.first());

        let (home_team, away_team, home_score, away_score) =
            parse_competitors(first_competition);

        let venue = first_competition
            .and_then(|c| c.pointer("/venue/fullName"))
            .and_then(Value::as_str)
            .map(String::from);

        let broadcasts = first_competition
            .and_then(|c| c.get("broadcasts"))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|b| b.pointer("/names/0").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let season = raw.pointer("/season/year").and_then(Value::as_i64);

        // UFC scoreboards list one competition per bout, each tagged with a
        // card segment; the earliest bout starts the segment
        let (segment_times, main_card_start) = if sport == "mma" {
            let segments = parse_segment_times(competitions);
            let main_start = segments.get("main_card").copied();
            (segments, main_start)
        } else {
            (BTreeMap::new(), None)
        };

        Some(Event {
            id,
            provider: "espn".to_string(),
            name,
            start_time,
            home_team,
            away_team,
            status,
            sport: sport.to_string(),
            league: league.to_string(),
            home_score,
            away_score,
            venue,
            broadcasts,
            season,
            segment_times,
            main_card_start,
        })
    }
}

fn parse_espn_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // ESPN scoreboards use a minute-precision "2025-05-10T23:30Z" variant
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%MZ") {
        return Some(chrono::TimeZone::from_utc_datetime(&Utc, &naive));
    }
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M%z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_status(status_type: Option<&Value>) -> EventStatus {
    let Some(status_type) = status_type else {
        return EventStatus::default();
    };
    let state = match status_type.get("state").and_then(Value::as_str) {
        Some("pre") => "scheduled",
        Some("in") => "live",
        Some("post") => "final",
        Some(other) => other,
        None => "scheduled",
    };
    let detail = status_type
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    EventStatus {
        state: state.to_string(),
        detail: detail.to_string(),
    }
}

fn parse_competitors(
    competition: Option<&Value>,
) -> (Option<Team>, Option<Team>, Option<i64>, Option<i64>) {
    let Some(competitors) = competition
        .and_then(|c| c.get("competitors"))
        .and_then(Value::as_array)
    else {
        return (None, None, None, None);
    };

    let mut home = None;
    let mut away = None;
    let mut home_score = None;
    let mut away_score = None;

    for competitor in competitors {
        let team = parse_team(competitor.get("team"));
        let score = competitor
            .get("score")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok());
        match competitor.get("homeAway").and_then(Value::as_str) {
            Some("home") => {
                home = team;
                home_score = score;
            }
            Some("away") => {
                away = team;
                away_score = score;
            }
            // MMA bouts have plain order instead of home/away
            _ => {
                if home.is_none() {
                    home = team;
                } else if away.is_none() {
                    away = team;
                }
            }
        }
    }

    (home, away, home_score, away_score)
}

fn parse_team(raw: Option<&Value>) -> Option<Team> {
    let raw = raw?;
    // Fighters come through as "athlete" in MMA payloads
    let name = raw
        .get("displayName")
        .or_else(|| raw.get("fullName"))
        .and_then(Value::as_str)?
        .to_string();
    Some(Team {
        id: raw
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        name,
        short_name: raw
            .get("shortDisplayName")
            .and_then(Value::as_str)
            .map(String::from),
        abbreviation: raw
            .get("abbreviation")
            .and_then(Value::as_str)
            .map(String::from),
        logo_url: raw.get("logo").and_then(Value::as_str).map(String::from),
        sport: None,
    })
}

/// Earliest bout start per card segment, keyed by our segment codes.
fn parse_segment_times(competitions: Option<&Vec<Value>>) -> BTreeMap<String, DateTime<Utc>> {
    let mut segments: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
    let Some(competitions) = competitions else {
        return segments;
    };

    for bout in competitions {
        let Some(start) = bout
            .get("date")
            .and_then(Value::as_str)
            .and_then(parse_espn_date)
        else {
            continue;
        };
        let description = bout
            .pointer("/type/abbreviation")
            .or_else(|| bout.pointer("/cardSegment/description"))
            .and_then(Value::as_str)
            .unwrap_or("main");

        let code = match description.to_lowercase() {
            d if d.contains("early") => "early_prelims",
            d if d.contains("prelim") => "prelims",
            _ => "main_card",
        };

        segments
            .entry(code.to_string())
            .and_modify(|existing| {
                if start < *existing {
                    *existing = start;
                }
            })
            .or_insert(start);
    }

    segments
}

#[async_trait]
impl SportsProvider for EspnProvider {
    fn name(&self) -> &'static str {
        "espn"
    }

    fn supports_league(&self, league: &str) -> bool {
        self.mappings.supports_league(league, "espn")
    }

    fn get_supported_leagues(&self) -> Vec<String> {
        self.mappings
            .get_leagues_for_provider("espn")
            .into_iter()
            .map(|m| m.league_code)
            .collect()
    }

    async fn get_events(&self, league: &str, date: NaiveDate) -> Vec<Event> {
        let Some((sport_path, league_slug)) = self.league_path(league) else {
            debug!("ESPN has no mapping for league {}", league);
            return Vec::new();
        };
        let sport = self
            .mappings
            .sport_for_league(league)
            .unwrap_or_else(|| sport_path.clone());
        let url = format!(
            "{BASE_URL}/{sport_path}/{league_slug}/scoreboard?dates={}",
            date.format("%Y%m%d")
        );
        match self.fetch_json(&url).await {
            Some(json) => self.parse_scoreboard(&json, league, &sport),
            None => Vec::new(),
        }
    }

    async fn get_events_range(&self, league: &str, start: NaiveDate, end: NaiveDate) -> Vec<Event> {
        let Some((sport_path, league_slug)) = self.league_path(league) else {
            return Vec::new();
        };
        let sport = self
            .mappings
            .sport_for_league(league)
            .unwrap_or_else(|| sport_path.clone());
        let url = format!(
            "{BASE_URL}/{sport_path}/{league_slug}/scoreboard?dates={}-{}&limit=500",
            start.format("%Y%m%d"),
            end.format("%Y%m%d")
        );
        match self.fetch_json(&url).await {
            Some(json) => self.parse_scoreboard(&json, league, &sport),
            None => Vec::new(),
        }
    }

    async fn get_event(&self, id: &str, league: &str) -> Option<Event> {
        let (sport_path, league_slug) = self.league_path(league)?;
        let sport = self
            .mappings
            .sport_for_league(league)
            .unwrap_or_else(|| sport_path.clone());
        let url = format!("{BASE_URL}/{sport_path}/{league_slug}/scoreboard?event={id}");
        let json = self.fetch_json(&url).await?;
        self.parse_scoreboard(&json, league, &sport)
            .into_iter()
            .find(|e| e.id == id)
    }

    async fn get_team(&self, id: &str, league: &str) -> Option<Team> {
        let (sport_path, league_slug) = self.league_path(league)?;
        let url = format!("{BASE_URL}/{sport_path}/{league_slug}/teams/{id}");
        let json = self.fetch_json(&url).await?;
        parse_team(json.pointer("/team"))
    }

    async fn get_league_teams(&self, league: &str) -> Vec<Team> {
        let Some((sport_path, league_slug)) = self.league_path(league) else {
            return Vec::new();
        };
        let sport = self.mappings.sport_for_league(league);
        let url = format!("{BASE_URL}/{sport_path}/{league_slug}/teams?limit=500");
        let Some(json) = self.fetch_json(&url).await else {
            return Vec::new();
        };

        let Some(entries) = json
            .pointer("/sports/0/leagues/0/teams")
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|entry| parse_team(entry.get("team")))
            .map(|mut team| {
                team.sport = sport.clone();
                team
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_status_maps_espn_states() {
        let status = parse_status(Some(&json!({"state": "post", "description": "Final"})));
        assert_eq!(status.state, "final");
        assert_eq!(status.detail, "Final");

        let status = parse_status(Some(&json!({"state": "pre"})));
        assert_eq!(status.state, "scheduled");
    }

    #[test]
    fn test_parse_competitors_home_away() {
        let competition = json!({
            "competitors": [
                {"homeAway": "home", "score": "21",
                 "team": {"id": "8", "displayName": "Detroit Lions", "abbreviation": "DET"}},
                {"homeAway": "away", "score": "17",
                 "team": {"id": "9", "displayName": "Green Bay Packers", "abbreviation": "GB"}}
            ]
        });
        let (home, away, home_score, away_score) = parse_competitors(Some(&competition));
        assert_eq!(home.unwrap().name, "Detroit Lions");
        assert_eq!(away.unwrap().abbreviation.as_deref(), Some("GB"));
        assert_eq!(home_score, Some(21));
        assert_eq!(away_score, Some(17));
    }

    #[test]
    fn test_segment_times_take_earliest_bout() {
        let competitions = vec![
            json!({"date": "2025-05-10T23:30Z", "cardSegment": {"description": "Prelims"}}),
            json!({"date": "2025-05-10T23:00Z", "cardSegment": {"description": "Prelims"}}),
            json!({"date": "2025-05-11T02:00Z", "cardSegment": {"description": "Main Card"}}),
        ];
        let segments = parse_segment_times(Some(&competitions));
        assert_eq!(
            segments.get("prelims").unwrap().to_rfc3339(),
            "2025-05-10T23:00:00+00:00"
        );
        assert!(segments.contains_key("main_card"));
    }
}
