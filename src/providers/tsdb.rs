//! TheSportsDB adapter
//!
//! Covers leagues ESPN doesn't carry. The free-tier key ("3") is heavily
//! rate-limited and misses whole rosters, which is why the cache refresh
//! merges seed data and league mappings can configure a fallback provider.

use crate::models::{Event, EventStatus, Team};
use crate::providers::SportsProvider;
use crate::services::league_mappings::LeagueMappingService;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const BASE_URL: &str = "https://www.thesportsdb.com/api/v1/json";
const FREE_TIER_KEY: &str = "3";

pub struct TsdbProvider {
    client: reqwest::Client,
    api_key: String,
    mappings: LeagueMappingService,
}

impl TsdbProvider {
    pub fn new(timeout_secs: u64, api_key: String, mappings: LeagueMappingService) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            mappings,
        }
    }

    fn league_id(&self, league: &str) -> Option<String> {
        self.mappings
            .get_mapping(league, "tsdb")
            .map(|m| m.provider_league_id)
    }

    async fn fetch_json(&self, path: &str) -> Option<Value> {
        let url = format!("{BASE_URL}/{}/{path}", self.api_key);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                response.json().await.map_err(|e| {
                    warn!("TheSportsDB decode failed for {}: {}", path, e);
                }).ok()
            }
            Ok(response) => {
                warn!("TheSportsDB HTTP {} for {}", response.status(), path);
                None
            }
            Err(e) => {
                warn!("TheSportsDB request failed for {}: {}", path, e);
                None
            }
        }
    }

    fn parse_event(&self, raw: &Value, league: &str, sport: &str) -> Option<Event> {
        let id = raw.get("idEvent")?.as_str()?.to_string();
        let name = raw
            .get("strEvent")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let date = raw.get("dateEvent").and_then(Value::as_str)?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
        let time = raw
            .get("strTime")
            .and_then(Value::as_str)
            .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M:%S").ok())
            .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).expect("midnight"));
        let start_time = Utc.from_utc_datetime(&date.and_time(time));

        let team = |id_key: &str, name_key: &str| -> Option<Team> {
            let name = raw.get(name_key).and_then(Value::as_str)?;
            if name.is_empty() {
                return None;
            }
            Some(Team {
                id: raw
                    .get(id_key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                name: name.to_string(),
                short_name: None,
                abbreviation: None,
                logo_url: None,
                sport: Some(sport.to_string()),
            })
        };

        let score = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
        };

        Some(Event {
            id,
            provider: "tsdb".to_string(),
            name,
            start_time,
            home_team: team("idHomeTeam", "strHomeTeam"),
            away_team: team("idAwayTeam", "strAwayTeam"),
            status: parse_tsdb_status(raw.get("strStatus").and_then(Value::as_str)),
            sport: sport.to_string(),
            league: league.to_string(),
            home_score: score("intHomeScore"),
            away_score: score("intAwayScore"),
            venue: raw
                .get("strVenue")
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(String::from),
            broadcasts: Vec::new(),
            season: raw
                .get("strSeason")
                .and_then(Value::as_str)
                .and_then(|s| s.split('-').next())
                .and_then(|s| s.parse().ok()),
            segment_times: Default::default(),
            main_card_start: None,
        })
    }
}

fn parse_tsdb_status(raw: Option<&str>) -> EventStatus {
    let Some(raw) = raw else {
        return EventStatus::default();
    };
    let lower = raw.to_lowercase();
    let state = match lower.as_str() {
        "ft" | "aet" | "pen" | "match finished" | "finished" | "complete" => "final",
        "ns" | "not started" | "" => "scheduled",
        "postponed" | "post." => "postponed",
        "cancelled" | "canc." => "cancelled",
        "1h" | "2h" | "ht" | "live" | "in progress" => "live",
        _ => "scheduled",
    };
    EventStatus {
        state: state.to_string(),
        detail: raw.to_string(),
    }
}

#[async_trait]
impl SportsProvider for TsdbProvider {
    fn name(&self) -> &'static str {
        "tsdb"
    }

    /// Free-tier keys don't get full schedule coverage; leagues with a
    /// fallback configured route around this.
    fn is_premium(&self) -> bool {
        self.api_key != FREE_TIER_KEY
    }

    fn supports_league(&self, league: &str) -> bool {
        self.mappings.supports_league(league, "tsdb")
    }

    fn get_supported_leagues(&self) -> Vec<String> {
        self.mappings
            .get_leagues_for_provider("tsdb")
            .into_iter()
            .map(|m| m.league_code)
            .collect()
    }

    async fn get_events(&self, league: &str, date: NaiveDate) -> Vec<Event> {
        let Some(league_id) = self.league_id(league) else {
            debug!("TheSportsDB has no mapping for league {}", league);
            return Vec::new();
        };
        let sport = self
            .mappings
            .sport_for_league(league)
            .unwrap_or_else(|| "unknown".to_string());
        let path = format!("eventsday.php?d={}&l={}", date.format("%Y-%m-%d"), league_id);

        let Some(json) = self.fetch_json(&path).await else {
            return Vec::new();
        };
        json.get("events")
            .and_then(Value::as_array)
            .map(|events| {
                events
                    .iter()
                    .filter_map(|raw| self.parse_event(raw, league, &sport))
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn get_event(&self, id: &str, league: &str) -> Option<Event> {
        let sport = self
            .mappings
            .sport_for_league(league)
            .unwrap_or_else(|| "unknown".to_string());
        let json = self.fetch_json(&format!("lookupevent.php?id={id}")).await?;
        json.pointer("/events/0")
            .and_then(|raw| self.parse_event(raw, league, &sport))
    }

    async fn get_team(&self, id: &str, _league: &str) -> Option<Team> {
        let json = self.fetch_json(&format!("lookupteam.php?id={id}")).await?;
        let raw = json.pointer("/teams/0")?;
        Some(Team {
            id: id.to_string(),
            name: raw.get("strTeam").and_then(Value::as_str)?.to_string(),
            short_name: raw
                .get("strTeamShort")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from),
            abbreviation: None,
            logo_url: raw
                .get("strBadge")
                .and_then(Value::as_str)
                .map(String::from),
            sport: raw
                .get("strSport")
                .and_then(Value::as_str)
                .map(|s| s.to_lowercase()),
        })
    }

    async fn get_league_teams(&self, league: &str) -> Vec<Team> {
        let Some(league_id) = self.league_id(league) else {
            return Vec::new();
        };
        let sport = self.mappings.sport_for_league(league);
        let Some(json) = self
            .fetch_json(&format!("lookup_all_teams.php?id={league_id}"))
            .await
        else {
            return Vec::new();
        };

        json.get("teams")
            .and_then(Value::as_array)
            .map(|teams| {
                teams
                    .iter()
                    .filter_map(|raw| {
                        Some(Team {
                            id: raw.get("idTeam").and_then(Value::as_str)?.to_string(),
                            name: raw.get("strTeam").and_then(Value::as_str)?.to_string(),
                            short_name: raw
                                .get("strTeamShort")
                                .and_then(Value::as_str)
                                .filter(|s| !s.is_empty())
                                .map(String::from),
                            abbreviation: None,
                            logo_url: raw
                                .get("strBadge")
                                .and_then(Value::as_str)
                                .map(String::from),
                            sport: sport.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(parse_tsdb_status(Some("Match Finished")).state, "final");
        assert_eq!(parse_tsdb_status(Some("FT")).state, "final");
        assert_eq!(parse_tsdb_status(Some("NS")).state, "scheduled");
        assert_eq!(parse_tsdb_status(Some("2H")).state, "live");
        assert_eq!(parse_tsdb_status(None).state, "");
    }
}
