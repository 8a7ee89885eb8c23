//! Background scheduler (C14)
//!
//! Single periodic driver with a stop signal and an at-most-one-tick guard.
//! Each tick, in order: throttled M3U refresh, per-team and per-group EPG
//! generation, XMLTV delivery, scheduled deletions, detect-only
//! reconciliation, and history cleanup. A tick failure never kills the loop.

pub mod orchestrator;

use crate::database::{self, Database};
use crate::dispatcharr::DispatcharrClient;
use crate::matching::patterns::DetectionKeywordService;
use crate::models::settings::Settings;
use crate::providers::ProviderRegistry;
use crate::services::epg::{self, EpgGenerator, Programme};
use crate::services::league_mappings::LeagueMappingService;
use crate::services::progress::ProgressBus;
use crate::services::reconciler::Reconciler;
use crate::services::stream_ordering::StreamOrderingService;
use crate::utils::tz::resolve_tz;
use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cron::Schedule;
use orchestrator::Orchestrator;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, serde::Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub tick_in_progress: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

struct Shared {
    tick_in_progress: AtomicBool,
    last_run: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
    /// m3u account id -> last refresh instant, for the 60-minute skip window
    m3u_refreshed: Mutex<HashMap<i64, DateTime<Utc>>>,
    stop_tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct SchedulerService {
    database: Database,
    dispatcharr: DispatcharrClient,
    progress: ProgressBus,
    orchestrator: Arc<Orchestrator>,
    reconciler: Reconciler,
    registry: ProviderRegistry,
    shared: Arc<Shared>,
}

/// Cheap handle for the web layer: status, manual trigger, stop.
#[derive(Clone)]
pub struct SchedulerHandle {
    service: SchedulerService,
}

impl SchedulerHandle {
    pub async fn status(&self) -> SchedulerStatus {
        self.service.status().await
    }

    /// Trigger a tick outside the schedule. Manual runs are not cancellable;
    /// they complete or fail.
    pub fn trigger_run(&self) {
        let service = self.service.clone();
        tokio::spawn(async move {
            service.run_tick().await;
        });
    }

    pub fn stop(&self) {
        let _ = self.service.shared.stop_tx.send(true);
    }
}

impl SchedulerService {
    pub fn new(
        database: Database,
        registry: ProviderRegistry,
        _mappings: LeagueMappingService,
        dispatcharr: DispatcharrClient,
        progress: ProgressBus,
        patterns: DetectionKeywordService,
    ) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(
            database.clone(),
            registry.clone(),
            dispatcharr.clone(),
            patterns,
        ));
        let reconciler = Reconciler::new(database.clone(), dispatcharr.clone());
        let (stop_tx, _) = watch::channel(false);

        Self {
            database,
            dispatcharr,
            progress,
            orchestrator,
            reconciler,
            registry,
            shared: Arc::new(Shared {
                tick_in_progress: AtomicBool::new(false),
                last_run: Mutex::new(None),
                last_error: Mutex::new(None),
                m3u_refreshed: Mutex::new(HashMap::new()),
                stop_tx,
            }),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            service: self.clone(),
        }
    }

    pub async fn status(&self) -> SchedulerStatus {
        let running = !*self.shared.stop_tx.borrow();
        let tick_in_progress = self.shared.tick_in_progress.load(Ordering::SeqCst);
        SchedulerStatus {
            running,
            tick_in_progress,
            last_run: *self.shared.last_run.lock().await,
            last_error: self.shared.last_error.lock().await.clone(),
        }
    }

    /// Run the scheduler loop until stopped. The first tick runs
    /// immediately, with a startup reconcile when configured.
    pub async fn start(self) -> Result<()> {
        info!("Starting lifecycle scheduler");
        let mut stop_rx = self.shared.stop_tx.subscribe();

        let settings = database::settings::get_settings(self.database.pool()).await?;
        if settings.reconciliation.reconcile_on_startup {
            match self
                .reconciler
                .reconcile(&settings.reconciliation, false)
                .await
            {
                Ok(report) if !report.issues.is_empty() => {
                    info!("Startup reconcile: {:?}", report.summary)
                }
                Ok(_) => {}
                Err(e) => warn!("Startup reconcile failed: {}", e),
            }
        }

        self.run_tick().await;

        loop {
            let settings = match database::settings::get_settings(self.database.pool()).await {
                Ok(settings) => settings,
                Err(e) => {
                    error!("Could not load settings: {}", e);
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    continue;
                }
            };

            if !settings.scheduler.enabled {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(60)) => continue,
                    _ = stop_rx.changed() => break,
                }
            }

            let delay = next_tick_delay(&settings);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    self.run_tick().await;
                }
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Lifecycle scheduler stopped");
        Ok(())
    }

    /// One full engine tick. The in-progress flag is a CAS guard: concurrent
    /// triggers are rejected rather than queued.
    pub async fn run_tick(&self) {
        if self
            .shared
            .tick_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Tick already in progress, skipping trigger");
            return;
        }

        self.progress.start("generation");
        let result = self.run_tick_inner().await;

        match result {
            Ok(()) => {
                *self.shared.last_error.lock().await = None;
                self.progress.complete("Generation complete");
            }
            Err(e) => {
                error!("Scheduler tick failed: {}", e);
                *self.shared.last_error.lock().await = Some(e.to_string());
                self.progress.fail(&e.to_string());
            }
        }

        *self.shared.last_run.lock().await = Some(Utc::now());
        self.shared.tick_in_progress.store(false, Ordering::SeqCst);
    }

    async fn run_tick_inner(&self) -> Result<()> {
        let pool = self.database.pool();
        let settings = database::settings::get_settings(pool).await?;
        let user_tz = resolve_tz(&settings.user_timezone);

        // Task 1: M3U refresh, skipped for accounts refreshed inside 60 min
        self.progress.update("generation", "Refreshing M3U accounts", 5);
        self.refresh_m3u_accounts().await;

        // Task 2: team EPG
        self.progress.update("generation", "Generating team EPG", 15);
        let (team_channels, team_programmes) = self.build_team_epg(&settings).await?;

        // Task 3: group matching and channel lifecycle
        self.progress.update("generation", "Matching event groups", 25);
        let output = self.orchestrator.process_all_groups(&settings).await?;

        // Task 4: stream ordering rules over all active channels
        self.progress.update("generation", "Applying stream ordering", 70);
        let rules = list_ordering_rules(pool).await?;
        let group_names = group_name_lookup(pool).await?;
        let ordering = StreamOrderingService::new(rules, group_names);
        self.orchestrator
            .channel_manager()
            .apply_stream_ordering(&ordering)
            .await?;

        // Task 5: XMLTV assembly and delivery
        self.progress.update("generation", "Writing EPG", 80);
        let generator = EpgGenerator::new(settings.epg.clone(), user_tz);
        let mut channels: Vec<(String, String, Option<String>)> = team_channels;
        let mut programmes: Vec<Programme> = team_programmes;
        for schedule in &output.schedules {
            channels.push((
                schedule.tvg_id.clone(),
                schedule.display_name.clone(),
                schedule.icon.clone(),
            ));
            programmes.extend(generator.generate_programmes(schedule));
        }

        if let Some(path) = settings.epg.epg_output_path.as_deref().filter(|p| !p.is_empty()) {
            let xml = epg::write_xmltv(&channels, &programmes)?;
            epg::write_xmltv_file(path, &xml)?;

            if let Some(epg_id) = settings.dispatcharr.epg_id {
                let refresh = self.dispatcharr.trigger_epg_refresh(epg_id).await;
                if !refresh.success && self.dispatcharr.is_enabled() {
                    warn!("Downstream EPG refresh failed: {:?}", refresh.error);
                }
            }
        }

        // Task 6: scheduled deletions
        self.progress.update("generation", "Processing deletions", 88);
        self.orchestrator
            .channel_manager()
            .process_scheduled_deletions()
            .await;

        // Task 7: light reconciliation (detect-only in the background)
        if settings.reconciliation.reconcile_on_epg_generation {
            self.progress.update("generation", "Reconciling", 93);
            if let Err(e) = self
                .reconciler
                .reconcile(&settings.reconciliation, false)
                .await
            {
                warn!("Background reconcile failed: {}", e);
            }
        }

        // Task 8: history cleanup
        self.progress.update("generation", "Cleaning up history", 97);
        let retention = settings.reconciliation.channel_history_retention_days;
        match database::history::cleanup_old_history(pool, retention).await {
            Ok(0) => {}
            Ok(removed) => info!("Cleaned up {} old history record(s)", removed),
            Err(e) => warn!("History cleanup failed: {}", e),
        }

        Ok(())
    }

    /// Refresh the M3U accounts used by enabled groups, skipping any
    /// refreshed in the last 60 minutes.
    async fn refresh_m3u_accounts(&self) {
        if !self.dispatcharr.is_enabled() {
            return;
        }
        let Ok(groups) = database::groups::list_groups(self.database.pool(), false).await else {
            return;
        };

        let account_ids: std::collections::HashSet<i64> =
            groups.iter().filter_map(|g| g.m3u_account_id).collect();
        if account_ids.is_empty() {
            return;
        }

        let now = Utc::now();
        let mut refreshed_map = self.shared.m3u_refreshed.lock().await;
        let mut refreshed = 0;
        let mut skipped = 0;

        for account_id in account_ids {
            let recent = refreshed_map
                .get(&account_id)
                .map(|at| now - *at < ChronoDuration::minutes(60))
                .unwrap_or(false);
            if recent {
                skipped += 1;
                continue;
            }

            let result = self.dispatcharr.refresh_m3u_account(account_id).await;
            if result.success {
                refreshed_map.insert(account_id, now);
                refreshed += 1;
            } else {
                warn!(
                    "M3U refresh failed for account {}: {:?}",
                    account_id, result.error
                );
            }
        }

        if refreshed > 0 || skipped > 0 {
            info!(
                "M3U refresh: {} refreshed, {} skipped (recently updated)",
                refreshed, skipped
            );
        }
    }

    /// Channels + programmes for followed teams: one channel per team, one
    /// programme per scheduled event inside the window.
    async fn build_team_epg(
        &self,
        settings: &Settings,
    ) -> Result<(Vec<(String, String, Option<String>)>, Vec<Programme>)> {
        let pool = self.database.pool();
        let teams = database::teams::list_teams(pool, true).await?;
        if teams.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let user_tz = resolve_tz(&settings.user_timezone);
        let today = Utc::now().with_timezone(&user_tz).date_naive();
        let window_end = today + ChronoDuration::days(settings.epg.team_schedule_days_ahead);

        let mut channels = Vec::new();
        let mut programmes = Vec::new();

        for team in teams {
            channels.push((team.tvg_id.clone(), team.name.clone(), team.logo_url.clone()));

            // A team can appear in several leagues (cup + domestic league);
            // aggregate its schedule across all of them. Provider team ids
            // are only unique within a sport, hence the sport filter.
            let mut leagues = database::team_cache::get_team_leagues(
                pool,
                &team.provider_team_id,
                &team.provider,
                Some(&team.sport),
            )
            .await
            .unwrap_or_default();
            if leagues.is_empty() {
                leagues.push(team.league.clone());
            }

            let mut events = Vec::new();
            for league in &leagues {
                events.extend(
                    self.registry
                        .get_events_range(league, today, window_end)
                        .await,
                );
            }
            for event in events {
                let involves_team = [&event.home_team, &event.away_team]
                    .into_iter()
                    .flatten()
                    .any(|t| t.id == team.provider_team_id);
                if !involves_team {
                    continue;
                }

                let duration_hours = settings.durations.for_sport(&event.sport);
                let stop = event.start_time
                    + ChronoDuration::seconds((duration_hours * 3600.0) as i64);
                programmes.push(Programme {
                    channel_id: team.tvg_id.clone(),
                    title: event.name.clone(),
                    sub_title: event.venue.clone(),
                    description: Some(format!("{} ({})", event.name, event.league.to_uppercase())),
                    category: "Sports".to_string(),
                    start: event.start_time,
                    stop,
                    icon: team.logo_url.clone(),
                });
            }
        }

        Ok((channels, programmes))
    }
}

/// Delay until the next tick: a valid cron expression wins, otherwise the
/// interval. Long ticks are normal; there is deliberately no tick timeout.
fn next_tick_delay(settings: &Settings) -> Duration {
    if let Some(expression) = settings
        .scheduler
        .cron_expression
        .as_deref()
        .filter(|e| !e.is_empty())
    {
        match Schedule::from_str(expression) {
            Ok(schedule) => {
                if let Some(next) = schedule.upcoming(Utc).next() {
                    let seconds = (next - Utc::now()).num_seconds().max(1) as u64;
                    return Duration::from_secs(seconds);
                }
            }
            Err(e) => {
                warn!("Invalid cron expression '{}': {}", expression, e);
            }
        }
    }
    Duration::from_secs(settings.scheduler.interval_minutes.max(1) * 60)
}

async fn list_ordering_rules(
    pool: &sqlx::Pool<sqlx::Sqlite>,
) -> Result<Vec<crate::models::StreamOrderingRule>> {
    Ok(sqlx::query_as(
        "SELECT * FROM channel_sort_priorities WHERE enabled = 1 ORDER BY priority",
    )
    .fetch_all(pool)
    .await?)
}

async fn group_name_lookup(
    pool: &sqlx::Pool<sqlx::Sqlite>,
) -> Result<HashMap<uuid::Uuid, String>> {
    let rows: Vec<(uuid::Uuid, String)> =
        sqlx::query_as("SELECT id, name FROM event_epg_groups")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::SchedulerSettings;

    #[test]
    fn test_next_tick_delay_interval() {
        let mut settings: Settings = test_settings();
        settings.scheduler = SchedulerSettings {
            enabled: true,
            interval_minutes: 15,
            cron_expression: None,
        };
        assert_eq!(next_tick_delay(&settings), Duration::from_secs(900));
    }

    #[test]
    fn test_next_tick_delay_invalid_cron_falls_back() {
        let mut settings = test_settings();
        settings.scheduler.cron_expression = Some("not a cron".to_string());
        settings.scheduler.interval_minutes = 5;
        assert_eq!(next_tick_delay(&settings), Duration::from_secs(300));
    }

    fn test_settings() -> Settings {
        Settings {
            schema_version: 1,
            user_timezone: "America/New_York".to_string(),
            dispatcharr: Default::default(),
            lifecycle: Default::default(),
            scheduler: Default::default(),
            epg: Default::default(),
            durations: Default::default(),
            reconciliation: Default::default(),
            processing_generation: 0,
        }
    }
}
