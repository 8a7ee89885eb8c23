//! Team/league cache refresh (C4 write side)
//!
//! Full-replacement refresh: enumerate enabled leagues across registered
//! providers, fetch rosters in a bounded parallel pool, dedupe, merge the
//! distributed seed file (free-tier TheSportsDB keys miss whole rosters),
//! then clear and rewrite `team_cache` / `league_cache` in one transaction.

use crate::assets::SeedAssets;
use crate::database::{team_cache, Database};
use crate::models::{CacheStats, TeamCacheEntry};
use crate::providers::ProviderRegistry;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{info, warn};

/// Bounded parallelism for per-league roster fetches.
const MAX_WORKERS: usize = 50;

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub success: bool,
    pub leagues_count: usize,
    pub teams_count: usize,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
struct DiscoveredLeague {
    league_slug: String,
    provider: String,
    league_name: Option<String>,
    sport: String,
    logo_url: Option<String>,
    team_count: i64,
}

#[derive(Debug, Deserialize)]
struct SeedTeam {
    team_name: String,
    #[serde(default)]
    team_abbrev: Option<String>,
    #[serde(default)]
    team_short_name: Option<String>,
    provider: String,
    provider_team_id: String,
    league: String,
    sport: String,
    #[serde(default)]
    logo_url: Option<String>,
}

#[derive(Clone)]
pub struct TeamCacheService {
    database: Database,
    registry: ProviderRegistry,
}

impl TeamCacheService {
    pub fn new(database: Database, registry: ProviderRegistry) -> Self {
        Self { database, registry }
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        team_cache::get_cache_stats(self.database.pool()).await
    }

    /// Refresh if the cache is stale (>7 days) or empty.
    pub async fn refresh_if_needed(&self, progress: impl Fn(&str, i64)) -> Result<bool> {
        let stats = self.stats().await?;
        if stats.is_stale || team_cache::is_cache_empty(self.database.pool()).await {
            info!("Team cache is stale or empty, refreshing");
            let outcome = self.refresh(progress).await?;
            return Ok(outcome.success);
        }
        Ok(false)
    }

    /// Full cache refresh across all registered providers. The progress
    /// callback receives (message, integer percent).
    pub async fn refresh(&self, progress: impl Fn(&str, i64)) -> Result<RefreshOutcome> {
        let started = Instant::now();
        let pool = self.database.pool();

        team_cache::set_refresh_in_progress(pool, true).await?;
        progress("Starting cache refresh", 5);

        let result = self.run_refresh(&progress).await;
        let duration = started.elapsed().as_secs_f64();

        match result {
            Ok((leagues, teams)) => {
                team_cache::update_cache_meta(pool, leagues as i64, teams as i64, duration, None)
                    .await?;
                team_cache::set_refresh_in_progress(pool, false).await?;
                progress("Cache refresh complete", 100);
                info!(
                    "Cache refresh complete: {} leagues, {} teams in {:.1}s",
                    leagues, teams, duration
                );
                Ok(RefreshOutcome {
                    success: true,
                    leagues_count: leagues,
                    teams_count: teams,
                    duration_seconds: duration,
                    error: None,
                })
            }
            Err(e) => {
                warn!("Cache refresh failed: {}", e);
                team_cache::update_cache_meta(pool, 0, 0, duration, Some(&e.to_string())).await?;
                team_cache::set_refresh_in_progress(pool, false).await?;
                Ok(RefreshOutcome {
                    success: false,
                    leagues_count: 0,
                    teams_count: 0,
                    duration_seconds: duration,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    async fn run_refresh(&self, progress: &impl Fn(&str, i64)) -> Result<(usize, usize)> {
        let mut all_teams: Vec<TeamCacheEntry> = Vec::new();
        let mut all_leagues: Vec<DiscoveredLeague> = Vec::new();

        let providers = self.registry.all();
        if providers.is_empty() {
            anyhow::bail!("No providers registered");
        }

        // 5% start, 5% saving; the remainder split across providers
        let progress_per_provider = 90 / providers.len() as i64;

        for (i, provider) in providers.iter().enumerate() {
            let base = 5 + i as i64 * progress_per_provider;
            progress(&format!("Fetching from {}", provider.name()), base);

            let leagues = provider.get_supported_leagues();
            let total = leagues.len().max(1);
            let provider_name = provider.name();

            let mut fetches = stream::iter(leagues.into_iter().map(|league| {
                let provider = provider.clone();
                async move {
                    let teams = provider.get_league_teams(&league).await;
                    (league, teams)
                }
            }))
            .buffer_unordered(MAX_WORKERS);

            let mut completed = 0usize;
            while let Some((league, teams)) = fetches.next().await {
                completed += 1;
                if completed % 20 == 0 {
                    let pct = base + (completed as i64 * progress_per_provider) / total as i64;
                    progress(
                        &format!("{provider_name}: {completed}/{total} leagues"),
                        pct,
                    );
                }

                let sport = teams
                    .first()
                    .and_then(|t| t.sport.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                all_leagues.push(DiscoveredLeague {
                    league_slug: league.clone(),
                    provider: provider_name.to_string(),
                    league_name: None,
                    sport: sport.clone(),
                    logo_url: None,
                    team_count: teams.len() as i64,
                });

                for team in teams {
                    all_teams.push(TeamCacheEntry {
                        provider: provider_name.to_string(),
                        provider_team_id: team.id,
                        league: league.clone(),
                        team_name: team.name,
                        team_abbrev: team.abbreviation,
                        team_short_name: team.short_name,
                        sport: team.sport.unwrap_or_else(|| sport.clone()),
                        logo_url: team.logo_url,
                    });
                }
            }
        }

        // Seed merge fills the rosters free-tier keys can't fetch
        let seeded = self.merge_with_seed(&mut all_teams);
        if seeded > 0 {
            info!("Merged {} teams from distributed seed data", seeded);
        }

        dedupe_teams(&mut all_teams);

        progress(
            &format!(
                "Saving {} teams, {} leagues",
                all_teams.len(),
                all_leagues.len()
            ),
            95,
        );
        self.save_cache(&all_teams, &all_leagues).await?;

        Ok((all_leagues.len(), all_teams.len()))
    }

    fn merge_with_seed(&self, all_teams: &mut Vec<TeamCacheEntry>) -> usize {
        let Some(raw) = SeedAssets::team_seed() else {
            return 0;
        };
        let seed: Vec<SeedTeam> = match serde_json::from_str(&raw) {
            Ok(seed) => seed,
            Err(e) => {
                warn!("Seed file unreadable: {}", e);
                return 0;
            }
        };

        let existing: HashSet<(String, String, String)> = all_teams
            .iter()
            .map(|t| (t.provider.clone(), t.provider_team_id.clone(), t.league.clone()))
            .collect();

        let mut added = 0;
        for team in seed {
            let key = (
                team.provider.clone(),
                team.provider_team_id.clone(),
                team.league.clone(),
            );
            if existing.contains(&key) {
                continue;
            }
            all_teams.push(TeamCacheEntry {
                provider: team.provider,
                provider_team_id: team.provider_team_id,
                league: team.league,
                team_name: team.team_name,
                team_abbrev: team.team_abbrev,
                team_short_name: team.team_short_name,
                sport: team.sport,
                logo_url: team.logo_url,
            });
            added += 1;
        }
        added
    }

    /// Transactional clear-and-rewrite of both cache tables.
    async fn save_cache(
        &self,
        teams: &[TeamCacheEntry],
        leagues: &[DiscoveredLeague],
    ) -> Result<()> {
        let mut tx = self.database.pool().begin().await?;

        sqlx::query("DELETE FROM team_cache").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM league_cache").execute(&mut *tx).await?;

        for team in teams {
            sqlx::query(
                "INSERT OR IGNORE INTO team_cache
                    (provider, provider_team_id, league, team_name, team_abbrev,
                     team_short_name, sport, logo_url)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&team.provider)
            .bind(&team.provider_team_id)
            .bind(&team.league)
            .bind(&team.team_name)
            .bind(&team.team_abbrev)
            .bind(&team.team_short_name)
            .bind(&team.sport)
            .bind(&team.logo_url)
            .execute(&mut *tx)
            .await?;
        }

        for league in leagues {
            sqlx::query(
                "INSERT OR IGNORE INTO league_cache
                    (league_slug, provider, league_name, sport, logo_url, team_count)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&league.league_slug)
            .bind(&league.provider)
            .bind(&league.league_name)
            .bind(&league.sport)
            .bind(&league.logo_url)
            .bind(league.team_count)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        // Keep configured mappings' team counts in step with the cache
        for league in leagues {
            if let Err(e) = crate::database::leagues::update_cached_team_count(
                self.database.pool(),
                &league.league_slug,
                &league.provider,
                league.team_count,
            )
            .await
            {
                warn!(
                    "Could not update cached team count for {}: {}",
                    league.league_slug, e
                );
            }
        }

        Ok(())
    }
}

fn dedupe_teams(teams: &mut Vec<TeamCacheEntry>) {
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    teams.retain(|t| {
        seen.insert((
            t.provider.clone(),
            t.provider_team_id.clone(),
            t.league.clone(),
        ))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(provider: &str, id: &str, league: &str) -> TeamCacheEntry {
        TeamCacheEntry {
            provider: provider.to_string(),
            provider_team_id: id.to_string(),
            league: league.to_string(),
            team_name: "Team".to_string(),
            team_abbrev: None,
            team_short_name: None,
            sport: "hockey".to_string(),
            logo_url: None,
        }
    }

    #[test]
    fn test_dedupe_by_provider_id_league() {
        let mut teams = vec![
            entry("espn", "6", "nhl"),
            entry("espn", "6", "nhl"),
            entry("espn", "6", "mlb"), // same id, different league: kept
        ];
        dedupe_teams(&mut teams);
        assert_eq!(teams.len(), 2);
    }
}
