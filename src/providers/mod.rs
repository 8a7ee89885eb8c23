//! Sports data providers
//!
//! A `SportsProvider` is the narrow capability the matching core sees:
//! events and teams by league and date. Adapters never let errors escape;
//! failures surface as empty results with logged detail, so core logic never
//! branches on provider-specific exceptions.

pub mod espn;
pub mod tsdb;

use crate::config::ProvidersConfig;
use crate::models::{Event, Team};
use crate::services::league_mappings::LeagueMappingService;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

#[async_trait]
pub trait SportsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this provider has full (premium) API access. Free tiers get
    /// fallback routing for leagues that configure one.
    fn is_premium(&self) -> bool {
        true
    }

    fn supports_league(&self, league: &str) -> bool;

    fn get_supported_leagues(&self) -> Vec<String>;

    /// Events for a league on a calendar date (provider-local scoreboard day).
    async fn get_events(&self, league: &str, date: NaiveDate) -> Vec<Event>;

    /// Events across an inclusive date range. The default fans out per day;
    /// adapters with ranged endpoints override this with one call.
    async fn get_events_range(
        &self,
        league: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<Event> {
        let mut events = Vec::new();
        let mut date = start;
        while date <= end {
            events.extend(self.get_events(league, date).await);
            date = date + chrono::Duration::days(1);
        }
        events
    }

    async fn get_event(&self, id: &str, league: &str) -> Option<Event>;

    async fn get_team(&self, id: &str, league: &str) -> Option<Team>;

    async fn get_league_teams(&self, league: &str) -> Vec<Team>;
}

/// Process-scoped provider registry, built once at startup after league
/// mappings are loaded.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn SportsProvider>>,
    mappings: LeagueMappingService,
}

impl ProviderRegistry {
    pub fn new(config: &ProvidersConfig, mappings: LeagueMappingService) -> Self {
        let providers: Vec<Arc<dyn SportsProvider>> = vec![
            Arc::new(espn::EspnProvider::new(
                config.request_timeout_secs,
                mappings.clone(),
            )),
            Arc::new(tsdb::TsdbProvider::new(
                config.request_timeout_secs,
                config.tsdb_api_key.clone(),
                mappings.clone(),
            )),
        ];
        Self {
            providers,
            mappings,
        }
    }

    /// Build a registry from explicit providers (tests use stub providers).
    pub fn from_providers(
        providers: Vec<Arc<dyn SportsProvider>>,
        mappings: LeagueMappingService,
    ) -> Self {
        Self {
            providers,
            mappings,
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn all(&self) -> &[Arc<dyn SportsProvider>] {
        &self.providers
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SportsProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    fn is_provider_premium(&self, name: &str) -> bool {
        self.get(name).map(|p| p.is_premium()).unwrap_or(false)
    }

    /// Resolve the effective provider for a league, honoring configured
    /// fallbacks when the primary provider runs on a limited tier.
    pub fn provider_for_league(&self, league_code: &str) -> Option<Arc<dyn SportsProvider>> {
        if let Some(mapping) = self.mappings.get_mapping_by_league(league_code) {
            if !self.is_provider_premium(&mapping.provider) {
                if let Some(fallback) = &mapping.fallback_provider {
                    if let Some(provider) = self.get(fallback) {
                        tracing::debug!(
                            "Using fallback provider {} for league {}",
                            fallback,
                            league_code
                        );
                        return Some(provider);
                    }
                }
            }
            return self.get(&mapping.provider);
        }
        // Unconfigured (discovered) leagues: first provider that claims them
        self.providers
            .iter()
            .find(|p| p.supports_league(league_code))
            .cloned()
    }

    /// Events for a league/date via the effective provider.
    pub async fn get_events(&self, league: &str, date: NaiveDate) -> Vec<Event> {
        match self.provider_for_league(league) {
            Some(provider) => provider.get_events(league, date).await,
            None => {
                tracing::debug!("No provider for league {}", league);
                Vec::new()
            }
        }
    }

    /// Events across a window via the effective provider.
    pub async fn get_events_range(
        &self,
        league: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<Event> {
        match self.provider_for_league(league) {
            Some(provider) => provider.get_events_range(league, start, end).await,
            None => Vec::new(),
        }
    }
}
