//! League mapping service
//!
//! A read-mostly in-memory index over the `leagues` table, loaded once at
//! startup. Providers and the matcher consult this service instead of the
//! database, which keeps the parallel parts of a tick free of query traffic.
//! `reload` swaps the whole index atomically after the table changes.

use crate::models::LeagueMapping;
use anyhow::Result;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

struct Index {
    /// (league_code lowercase, provider) -> mapping
    mappings: HashMap<(String, String), LeagueMapping>,
    /// provider -> mappings
    provider_leagues: HashMap<String, Vec<LeagueMapping>>,
    /// league_code -> sport display lookup support
    sport_display_names: HashMap<String, String>,
    /// league_cache names for discovered leagues
    league_cache_names: HashMap<String, String>,
}

#[derive(Clone)]
pub struct LeagueMappingService {
    pool: Pool<Sqlite>,
    index: Arc<RwLock<Arc<Index>>>,
}

impl LeagueMappingService {
    /// Load all enabled mappings into memory.
    pub async fn load(pool: &Pool<Sqlite>) -> Result<Self> {
        let index = Self::build_index(pool).await?;
        Ok(Self {
            pool: pool.clone(),
            index: Arc::new(RwLock::new(Arc::new(index))),
        })
    }

    async fn build_index(pool: &Pool<Sqlite>) -> Result<Index> {
        let rows: Vec<LeagueMapping> = sqlx::query_as(
            r#"
            SELECT league_code, provider, provider_league_id, provider_league_name,
                   sport, display_name, logo_url, league_alias, league_id,
                   fallback_provider, fallback_league_id, import_enabled, enabled,
                   cached_team_count
            FROM leagues
            WHERE enabled = 1
            ORDER BY provider, league_code
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut mappings = HashMap::new();
        let mut provider_leagues: HashMap<String, Vec<LeagueMapping>> = HashMap::new();
        for row in rows {
            provider_leagues
                .entry(row.provider.clone())
                .or_default()
                .push(row.clone());
            mappings.insert((row.league_code.to_lowercase(), row.provider.clone()), row);
        }

        let sport_rows: Vec<(String, String)> =
            sqlx::query_as("SELECT sport_code, display_name FROM sports")
                .fetch_all(pool)
                .await?;
        let sport_display_names = sport_rows.into_iter().collect();

        let cache_rows: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT league_slug, league_name FROM league_cache")
                .fetch_all(pool)
                .await?;
        let league_cache_names = cache_rows
            .into_iter()
            .filter_map(|(slug, name)| name.map(|n| (slug.to_lowercase(), n)))
            .collect();

        tracing::info!(
            "Loaded {} league mappings across {} providers",
            mappings.len(),
            provider_leagues.len()
        );

        Ok(Index {
            mappings,
            provider_leagues,
            sport_display_names,
            league_cache_names,
        })
    }

    /// Reload from the database after the leagues table changed.
    pub async fn reload(&self) -> Result<()> {
        let rebuilt = Self::build_index(&self.pool).await?;
        *self.index.write().expect("mapping lock poisoned") = Arc::new(rebuilt);
        Ok(())
    }

    fn snapshot(&self) -> Arc<Index> {
        self.index.read().expect("mapping lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_mapping(&self, league_code: &str, provider: &str) -> Option<LeagueMapping> {
        self.snapshot()
            .mappings
            .get(&(league_code.to_lowercase(), provider.to_string()))
            .cloned()
    }

    /// First mapping for a league code regardless of provider.
    pub fn get_mapping_by_league(&self, league_code: &str) -> Option<LeagueMapping> {
        let key = league_code.to_lowercase();
        let snapshot = self.snapshot();
        snapshot
            .mappings
            .iter()
            .find(|((code, _), _)| *code == key)
            .map(|(_, mapping)| mapping.clone())
    }

    pub fn supports_league(&self, league_code: &str, provider: &str) -> bool {
        self.snapshot()
            .mappings
            .contains_key(&(league_code.to_lowercase(), provider.to_string()))
    }

    pub fn get_leagues_for_provider(&self, provider: &str) -> Vec<LeagueMapping> {
        self.snapshot()
            .provider_leagues
            .get(provider)
            .cloned()
            .unwrap_or_default()
    }

    pub fn sport_for_league(&self, league_code: &str) -> Option<String> {
        self.get_mapping_by_league(league_code).map(|m| m.sport)
    }

    /// Short display alias: league_alias -> display_name -> cached name -> CODE.
    pub fn get_league_alias(&self, league_code: &str) -> String {
        let key = league_code.to_lowercase();
        if let Some(mapping) = self.get_mapping_by_league(&key) {
            if let Some(alias) = mapping.league_alias.filter(|a| !a.is_empty()) {
                return alias;
            }
            if let Some(name) = mapping.display_name.filter(|n| !n.is_empty()) {
                return name;
            }
        }
        if let Some(name) = self.snapshot().league_cache_names.get(&key) {
            return name.clone();
        }
        league_code.to_uppercase()
    }

    /// Full display name: display_name -> cached name -> CODE.
    pub fn get_league_display_name(&self, league_code: &str) -> String {
        let key = league_code.to_lowercase();
        if let Some(name) = self
            .get_mapping_by_league(&key)
            .and_then(|m| m.display_name.filter(|n| !n.is_empty()))
        {
            return name;
        }
        if let Some(name) = self.snapshot().league_cache_names.get(&key) {
            return name.clone();
        }
        league_code.to_uppercase()
    }

    /// Sport display name from the sports table, title-cased fallback.
    pub fn get_sport_display_name(&self, sport_code: &str) -> String {
        let key = sport_code.to_lowercase();
        if let Some(name) = self.snapshot().sport_display_names.get(&key) {
            return name.clone();
        }
        let mut chars = key.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }
}
