//! Per-group matching pipeline (C15)
//!
//! For each enabled group: fetch the live stream list, apply the group's
//! filters, normalize and classify every stream, resolve matches through the
//! fingerprint cache / team matcher / event-card matcher, expand UFC
//! segments, apply lifecycle categorization, then hand the survivors to the
//! channel manager. One malformed stream never aborts a batch — per-stream
//! outcomes are kept for diagnostics instead.

use crate::database::{self, Database};
use crate::dispatcharr::DispatcharrClient;
use crate::matching::classifier::{Classifier, StreamCategory};
use crate::matching::event_card::EventCardMatcher;
use crate::matching::outcome::{FilteredReason, MatchOutcome};
use crate::matching::patterns::DetectionKeywordService;
use crate::matching::team_matcher::{MatchContext, TeamMatcher};
use crate::matching::ufc_segments::{expand_ufc_segments, MatchedStream};
use crate::models::settings::Settings;
use crate::models::{EventEpgGroup, SourceStream};
use crate::providers::ProviderRegistry;
use crate::services::channel_manager::{ChannelManager, ChannelRunContext, GroupProcessResult};
use crate::services::epg::{channel_template_vars, ChannelSchedule};
use crate::services::lifecycle::LifecycleManager;
use crate::services::stream_filter::StreamFilter;
use crate::utils::tz::{now_in, resolve_tz};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Combat-sport leagues the event-card matcher understands.
const EVENT_CARD_LEAGUES: [&str; 4] = ["ufc", "boxing", "pfl", "bellator"];

#[derive(Debug, Default, Clone, Serialize)]
pub struct GroupRunStats {
    pub group_name: String,
    pub total_streams: usize,
    pub filtered: usize,
    pub matched: usize,
    pub cache_hits: usize,
    pub failed: usize,
    pub excluded: usize,
    pub channels: GroupProcessResult,
}

/// Everything one tick produces for downstream EPG assembly.
#[derive(Default)]
pub struct TickOutput {
    pub stats: Vec<GroupRunStats>,
    pub schedules: Vec<ChannelSchedule>,
}

pub struct Orchestrator {
    database: Database,
    registry: ProviderRegistry,
    dispatcharr: DispatcharrClient,
    patterns: DetectionKeywordService,
    channel_manager: ChannelManager,
}

impl Orchestrator {
    pub fn new(
        database: Database,
        registry: ProviderRegistry,
        dispatcharr: DispatcharrClient,
        patterns: DetectionKeywordService,
    ) -> Self {
        let channel_manager = ChannelManager::new(database.clone(), dispatcharr.clone());
        Self {
            database,
            registry,
            dispatcharr,
            patterns,
            channel_manager,
        }
    }

    pub fn channel_manager(&self) -> &ChannelManager {
        &self.channel_manager
    }

    /// Run the full pipeline for every enabled group. The generation counter
    /// increments once per invocation; parents run before their children so
    /// child streams find parent channels.
    pub async fn process_all_groups(&self, settings: &Settings) -> anyhow::Result<TickOutput> {
        let pool = self.database.pool();
        let generation = database::settings::next_processing_generation(pool).await?;
        let user_tz = resolve_tz(&settings.user_timezone);

        // Refresh classifier patterns from user overrides once per tick
        let overrides = database::keywords::list_detection_keywords(pool).await?;
        self.patterns.invalidate(&overrides);

        let lifecycle = LifecycleManager::new(
            settings.lifecycle.channel_create_timing,
            settings.lifecycle.channel_delete_timing,
            settings.durations.clone(),
            settings.epg.include_final_events,
            user_tz,
        );
        let keywords = database::keywords::list_exception_keywords(pool, true).await?;

        let groups = database::groups::list_groups(pool, false).await?;
        let (parents, children): (Vec<_>, Vec<_>) =
            groups.into_iter().partition(|g| g.parent_group_id.is_none());

        let mut output = TickOutput::default();

        for group in &parents {
            let ctx = ChannelRunContext {
                lifecycle: &lifecycle,
                keywords: &keywords,
                templates: &settings.epg.templates,
                profile_ids: settings.dispatcharr.default_channel_profile_ids.clone(),
                user_tz,
            };
            match self
                .process_group(group, settings, &lifecycle, generation, user_tz)
                .await
            {
                Ok((mut stats, matches, live_stream_ids)) => {
                    stats.channels = self
                        .channel_manager
                        .process_group_matches(group, &matches, &ctx)
                        .await;
                    // Live-list pruning only makes sense when the source
                    // actually answered; an empty fetch must not strip
                    // every stream from every channel
                    if !live_stream_ids.is_empty() {
                        if let Err(e) = self
                            .channel_manager
                            .prune_missing_streams(group, &live_stream_ids)
                            .await
                        {
                            warn!("Stream pruning failed for '{}': {}", group.name, e);
                        }
                    }
                    output.stats.push(stats);
                }
                Err(e) => {
                    warn!("Group '{}' failed: {}", group.name, e);
                }
            }
        }

        for group in &children {
            let Some(parent_id) = group.parent_group_id else {
                continue;
            };
            match self
                .process_group(group, settings, &lifecycle, generation, user_tz)
                .await
            {
                Ok((stats, matches, _live_stream_ids)) => {
                    let child_result = self
                        .channel_manager
                        .process_child_matches(group, parent_id, &matches, &keywords)
                        .await;
                    debug!(
                        "Child group '{}': {} matched, {} attached",
                        group.name, stats.matched, child_result.streams_added
                    );
                    output.stats.push(stats);
                }
                Err(e) => {
                    warn!("Child group '{}' failed: {}", group.name, e);
                }
            }
        }

        // Background cleanup: entries ≥2 generations old age out here
        match database::match_cache::cleanup_stale(pool, generation).await {
            Ok(0) => {}
            Ok(evicted) => info!("Evicted {} stale match cache entries", evicted),
            Err(e) => warn!("Match cache cleanup failed: {}", e),
        }

        output.schedules = self.build_channel_schedules(settings, user_tz).await?;
        Ok(output)
    }

    /// One group: fetch -> filter -> classify -> match -> expand.
    async fn process_group(
        &self,
        group: &EventEpgGroup,
        settings: &Settings,
        lifecycle: &LifecycleManager,
        generation: i64,
        user_tz: Tz,
    ) -> anyhow::Result<(GroupRunStats, Vec<MatchedStream>, Vec<i64>)> {
        let pool = self.database.pool();
        let mut stats = GroupRunStats {
            group_name: group.name.clone(),
            ..Default::default()
        };

        let streams = self.fetch_group_streams(group).await;
        let live_stream_ids: Vec<i64> = streams.iter().map(|s| s.id).collect();
        stats.total_streams = streams.len();
        database::groups::update_group_stream_count(pool, group.id, streams.len() as i64).await?;

        let filter = StreamFilter::from_group(group);
        let filtered = filter.filter(streams);
        stats.filtered = filtered.filtered_include + filtered.filtered_exclude;

        let classifier = Classifier::new(self.patterns.clone());
        let team_matcher = TeamMatcher::new(pool.clone(), self.registry.clone());
        let card_matcher = EventCardMatcher::new(pool.clone(), self.registry.clone());

        let target_date = now_in(user_tz).date_naive();
        let ctx = MatchContext {
            group_id: group.id,
            group_leagues: group.league_codes(),
            target_date,
            generation,
            user_tz,
        };
        let now = Utc::now();

        let mut matches = Vec::new();
        for stream in filtered.passed {
            let outcome = self.match_one_stream(
                &stream,
                group,
                &filter,
                &classifier,
                &team_matcher,
                &card_matcher,
                &ctx,
            )
            .await;

            match outcome {
                MatchOutcome::Matched {
                    event,
                    method,
                    origin_method,
                    detected_league,
                    confidence,
                } => {
                    if method == crate::matching::outcome::MatchMethod::Cache {
                        stats.cache_hits += 1;
                    }
                    // Matching reports the match; lifecycle decides eligibility
                    if let Some(reason) = lifecycle.categorize_event(&event, now) {
                        debug!(
                            "Stream '{}' matched but excluded: {:?}",
                            stream.name, reason
                        );
                        stats.excluded += 1;
                        continue;
                    }
                    stats.matched += 1;

                    let classified = classifier
                        .classify(crate::matching::normalizer::normalize(&stream.name));
                    matches.push(MatchedStream {
                        stream,
                        event: *event,
                        method,
                        origin_method,
                        league: detected_league,
                        confidence,
                        card_segment: classified.card_segment,
                        extracted_time: classified.normalized.extracted_time,
                        segment: None,
                    });
                }
                MatchOutcome::Filtered { reason, detail } => {
                    debug!("Stream '{}' filtered ({:?}): {}", stream.name, reason, detail);
                    stats.filtered += 1;
                }
                MatchOutcome::Failed { reason, detail } => {
                    debug!("Stream '{}' failed ({:?}): {}", stream.name, reason, detail);
                    stats.failed += 1;
                }
                MatchOutcome::Excluded { .. } => {
                    stats.excluded += 1;
                }
            }
        }

        let patterns = self.patterns.current();
        let matches = expand_ufc_segments(
            matches,
            &patterns,
            settings.durations.mma,
            user_tz,
        );

        info!(
            "Group '{}': {} streams, {} matched ({} cached), {} filtered, {} failed, {} excluded",
            group.name,
            stats.total_streams,
            stats.matched,
            stats.cache_hits,
            stats.filtered,
            stats.failed,
            stats.excluded,
        );

        Ok((stats, matches, live_stream_ids))
    }

    /// Route one stream through classification to the right matcher.
    #[allow(clippy::too_many_arguments)]
    async fn match_one_stream(
        &self,
        stream: &SourceStream,
        group: &EventEpgGroup,
        filter: &StreamFilter,
        classifier: &Classifier,
        team_matcher: &TeamMatcher,
        card_matcher: &EventCardMatcher,
        ctx: &MatchContext,
    ) -> MatchOutcome {
        let normalized = crate::matching::normalizer::normalize(&stream.name);
        let mut classified = classifier.classify(normalized);

        // Group-level team extraction overrides beat the classifier's tokens
        if classified.category == StreamCategory::TeamVsTeam {
            if let Some(extraction) = filter.extract_teams(&classified.normalized.normalized) {
                classified.side_tokens = Some((extraction.team1, extraction.team2));
            }
        }

        match classified.category {
            StreamCategory::Placeholder => {
                MatchOutcome::filtered(FilteredReason::Placeholder, "Placeholder stream")
            }
            StreamCategory::Unknown => {
                MatchOutcome::filtered(FilteredReason::NotEvent, "No event structure detected")
            }
            StreamCategory::EventCard => {
                let league = self.resolve_card_league(&classified.league_hints, group);
                card_matcher.match_stream(&classified, &league, ctx).await
            }
            StreamCategory::TeamVsTeam => team_matcher.match_stream(&classified, ctx).await,
        }
    }

    /// Combat league for an event-card stream: the stream's own hint first,
    /// then the group's configured combat league, then UFC.
    fn resolve_card_league(&self, hints: &[String], group: &EventEpgGroup) -> String {
        if let Some(hint) = hints
            .iter()
            .find(|h| EVENT_CARD_LEAGUES.contains(&h.as_str()))
        {
            return hint.clone();
        }
        if let Some(league) = group
            .league_codes()
            .into_iter()
            .find(|l| EVENT_CARD_LEAGUES.contains(&l.as_str()))
        {
            return league;
        }
        "ufc".to_string()
    }

    async fn fetch_group_streams(&self, group: &EventEpgGroup) -> Vec<SourceStream> {
        let result = self
            .dispatcharr
            .list_streams(group.m3u_group_id, group.m3u_account_id)
            .await;
        match result.data {
            Some(streams) if result.success => streams,
            _ => {
                if self.dispatcharr.is_enabled() {
                    warn!(
                        "Could not list streams for group '{}': {:?}",
                        group.name, result.error
                    );
                }
                Vec::new()
            }
        }
    }

    /// Per-channel EPG schedules from the current active channel set. Event
    /// timing comes from the stored denormalized fields; UFC segment
    /// channels run half the MMA duration.
    async fn build_channel_schedules(
        &self,
        settings: &Settings,
        user_tz: Tz,
    ) -> anyhow::Result<Vec<ChannelSchedule>> {
        let pool = self.database.pool();
        let mut schedules = Vec::new();

        for channel in database::channels::get_all_active_channels(pool).await? {
            let Some(start) = channel
                .event_date
                .as_deref()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|dt| dt.with_timezone(&Utc))
            else {
                continue;
            };

            let sport = channel.sport.as_deref().unwrap_or("unknown");
            let duration_hours = if channel.card_segment.is_some() {
                settings.durations.mma / 2.0
            } else {
                settings.durations.for_sport(sport)
            };
            let stop = start + Duration::seconds((duration_hours * 3600.0) as i64);

            let vars: HashMap<String, String> = channel_template_vars(&channel, user_tz);
            schedules.push(ChannelSchedule {
                tvg_id: channel.tvg_id.clone(),
                display_name: channel.channel_name.clone(),
                icon: channel.logo_url.clone(),
                event_start: start,
                event_stop: stop,
                vars,
            });
        }

        Ok(schedules)
    }
}
