//! Managed channel lifecycle (C12)
//!
//! Turns expanded matches into durable channel records: idempotent upserts
//! keyed by (group, event, keyword, segment), duplicate-mode routing,
//! exception-keyword consolidation, child-group stream attachment, channel
//! numbering, downstream sync, and scheduled deletions.

use crate::database::{channel_numbers, channels, history, streams, Database};
use crate::database::channels::NewChannelFields;
use crate::dispatcharr::DispatcharrClient;
use crate::matching::ufc_segments::MatchedStream;
use crate::models::settings::TemplateSettings;
use crate::models::{
    DuplicateMode, EventEpgGroup, ExceptionBehavior, ExceptionKeyword, ManagedChannel,
    SourceGroupType,
};
use crate::services::epg::render_template;
use crate::services::lifecycle::LifecycleManager;
use crate::utils::fuzzy::normalize_for_matching;
use anyhow::Result;
use chrono_tz::Tz;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-run inputs shared across one group's upserts.
pub struct ChannelRunContext<'a> {
    pub lifecycle: &'a LifecycleManager,
    pub keywords: &'a [ExceptionKeyword],
    pub templates: &'a TemplateSettings,
    pub profile_ids: Vec<i64>,
    pub user_tz: Tz,
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct GroupProcessResult {
    pub channels_created: usize,
    pub channels_existing: usize,
    pub streams_added: usize,
    pub streams_skipped: usize,
    pub keyword_ignored: usize,
    pub create_deferred: usize,
    pub errors: usize,
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ChildProcessResult {
    pub streams_added: usize,
    pub streams_existing: usize,
    pub streams_skipped: usize,
    pub errors: usize,
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct DeletionResult {
    pub deleted: usize,
    pub errors: usize,
}

#[derive(Clone)]
pub struct ChannelManager {
    database: Database,
    dispatcharr: DispatcharrClient,
}

impl ChannelManager {
    pub fn new(database: Database, dispatcharr: DispatcharrClient) -> Self {
        Self {
            database,
            dispatcharr,
        }
    }

    /// Upsert channels and attach streams for one main group's matches.
    /// Per-stream errors are isolated; one bad stream never kills the batch.
    pub async fn process_group_matches(
        &self,
        group: &EventEpgGroup,
        matches: &[MatchedStream],
        ctx: &ChannelRunContext<'_>,
    ) -> GroupProcessResult {
        let mut result = GroupProcessResult::default();
        let _guard = self.database.acquire_channel_update_lock().await;

        for matched in matches {
            match self.process_one_match(group, matched, ctx).await {
                Ok(outcome) => outcome.tally(&mut result),
                Err(e) => {
                    warn!(
                        "Failed to process stream '{}' in group '{}': {}",
                        matched.stream.name, group.name, e
                    );
                    result.errors += 1;
                }
            }
        }

        info!(
            "Group '{}': created={} existing={} streams_added={} skipped={} deferred={}",
            group.name,
            result.channels_created,
            result.channels_existing,
            result.streams_added,
            result.streams_skipped,
            result.create_deferred,
        );
        result
    }

    async fn process_one_match(
        &self,
        group: &EventEpgGroup,
        matched: &MatchedStream,
        ctx: &ChannelRunContext<'_>,
    ) -> Result<MatchDisposition> {
        let pool = self.database.pool();
        let stream = &matched.stream;
        let event = &matched.event;

        // Keyword routing decides both the channel key and the effective mode
        let keyword_hit =
            crate::database::keywords::check_exception_keyword(&stream.name, ctx.keywords);
        let (keyword_label, mode) = match &keyword_hit {
            Some((_, ExceptionBehavior::Ignore)) => {
                debug!("Stream '{}' ignored by exception keyword", stream.name);
                return Ok(MatchDisposition::KeywordIgnored);
            }
            Some((label, ExceptionBehavior::Separate)) => {
                (Some(label.clone()), DuplicateMode::Separate)
            }
            Some((label, ExceptionBehavior::Consolidate)) => {
                (Some(label.clone()), DuplicateMode::Consolidate)
            }
            None => (None, group.duplicate_mode),
        };

        let segment_code = matched.segment.as_ref().map(|s| s.code.clone());

        let existing = channels::find_existing_channel(
            pool,
            group.id,
            &event.id,
            &event.provider,
            mode,
            keyword_label.as_deref(),
            Some(stream.id),
            segment_code.as_deref(),
        )
        .await?;

        let channel = match existing {
            Some(channel) => {
                if mode == DuplicateMode::Ignore
                    && channel.primary_stream_id != Some(stream.id)
                {
                    // Ignore mode: first stream won the channel, the rest drop
                    return Ok(MatchDisposition::StreamSkipped);
                }
                ChannelRef::Existing(channel)
            }
            None => {
                let decision = ctx.lifecycle.should_create_channel(event, true);
                if !decision.should_act {
                    debug!(
                        "Deferring channel for event {}: {}",
                        event.id, decision.reason
                    );
                    return Ok(MatchDisposition::CreateDeferred);
                }
                ChannelRef::Created(
                    self.create_channel(group, matched, keyword_label.as_deref(), mode, ctx)
                        .await?,
                )
            }
        };

        let (channel_id, created) = match &channel {
            ChannelRef::Existing(c) => (c.id, false),
            ChannelRef::Created(id) => (*id, true),
        };

        // Attach the stream unless it's already on the channel
        if streams::stream_exists_on_channel(pool, channel_id, stream.id).await? {
            return Ok(if created {
                MatchDisposition::ChannelCreated
            } else {
                MatchDisposition::StreamExisting
            });
        }

        let priority = streams::get_next_stream_priority(pool, channel_id).await?;
        streams::add_stream_to_channel(
            pool,
            channel_id,
            stream.id,
            Some(&stream.name),
            priority,
            Some(group.id),
            SourceGroupType::Main,
            stream.m3u_account_id,
            stream.m3u_account_name.as_deref(),
            keyword_label.as_deref(),
        )
        .await?;

        self.sync_channel_streams(channel_id).await;

        Ok(if created {
            MatchDisposition::ChannelCreated
        } else {
            MatchDisposition::StreamAdded
        })
    }

    async fn create_channel(
        &self,
        group: &EventEpgGroup,
        matched: &MatchedStream,
        keyword: Option<&str>,
        mode: DuplicateMode,
        ctx: &ChannelRunContext<'_>,
    ) -> Result<Uuid> {
        let pool = self.database.pool();
        let event = &matched.event;
        let segment = matched.segment.as_ref();

        let channel_number =
            channel_numbers::get_next_channel_number(pool, group.id, true).await?;

        let (event_start, _event_end) = match segment {
            Some(info) => (info.start, info.end),
            None => (event.start_time, ctx.lifecycle.event_end_time(event)),
        };

        let vars = event_vars(event, ctx.user_tz, event_start);
        let mut channel_name = render_template(&ctx.templates.channel_name_format, &vars);
        if channel_name.is_empty() {
            channel_name = event.name.clone();
        }
        if let Some(info) = segment {
            if !info.display.is_empty() {
                channel_name = format!("{channel_name} - {}", info.display);
            }
        }
        if let Some(keyword) = keyword {
            channel_name = format!("{channel_name} - {keyword}");
        }

        let tvg_id = build_tvg_id(
            group,
            &event.provider,
            &event.id,
            segment.map(|s| s.code.as_str()),
            keyword,
            mode,
            matched.stream.id,
        );

        let scheduled_delete_at = ctx.lifecycle.calculate_delete_time(event);

        let fields = NewChannelFields {
            channel_number,
            logo_url: event
                .home_team
                .as_ref()
                .and_then(|t| t.logo_url.clone())
                .or_else(|| event.away_team.as_ref().and_then(|t| t.logo_url.clone())),
            channel_group_id: None,
            channel_profile_ids: (!ctx.profile_ids.is_empty()).then(|| ctx.profile_ids.clone()),
            primary_stream_id: Some(matched.stream.id),
            exception_keyword: keyword.map(String::from),
            card_segment: segment.map(|s| s.code.clone()),
            home_team: event.home_team.as_ref().map(|t| t.name.clone()),
            home_team_abbrev: event.home_team.as_ref().and_then(|t| t.abbreviation.clone()),
            home_team_logo: event.home_team.as_ref().and_then(|t| t.logo_url.clone()),
            away_team: event.away_team.as_ref().map(|t| t.name.clone()),
            away_team_abbrev: event.away_team.as_ref().and_then(|t| t.abbreviation.clone()),
            away_team_logo: event.away_team.as_ref().and_then(|t| t.logo_url.clone()),
            event_date: Some(event_start.to_rfc3339()),
            event_name: Some(event.name.clone()),
            league: Some(matched.league.clone()),
            sport: Some(event.sport.clone()),
            venue: event.venue.clone(),
            broadcast: (!event.broadcasts.is_empty()).then(|| event.broadcasts.join(", ")),
            scheduled_delete_at,
        };

        let channel_id = channels::create_managed_channel(
            pool,
            group.id,
            &event.id,
            &event.provider,
            &tvg_id,
            &channel_name,
            fields,
        )
        .await?;

        history::log_channel_history(
            pool,
            channel_id,
            "created",
            "epg_generation",
            Some(&format!("Matched stream '{}'", matched.stream.name)),
        )
        .await?;

        // Create downstream if configured; a failure leaves sync_status
        // pending for the reconciler to retry
        if self.dispatcharr.is_enabled() {
            let result = self
                .dispatcharr
                .create_channel(
                    &channel_name,
                    channel_number,
                    &[matched.stream.id],
                    &tvg_id,
                    None,
                    &ctx.profile_ids,
                )
                .await;
            match result.data {
                Some(downstream) if result.success => {
                    channels::set_dispatcharr_ids(
                        pool,
                        channel_id,
                        downstream.id,
                        downstream.uuid.as_deref(),
                    )
                    .await?;
                }
                _ => {
                    warn!(
                        "Downstream create failed for '{}': {:?}",
                        channel_name, result.error
                    );
                    channels::set_sync_status(pool, channel_id, "error").await?;
                }
            }
        }

        Ok(channel_id)
    }

    /// Attach a child group's matched streams to the parent's channels.
    /// Child groups never create channels: a missing keyword channel falls
    /// back to the parent's main channel, and a missing main channel skips
    /// the stream until the parent creates it.
    pub async fn process_child_matches(
        &self,
        child_group: &EventEpgGroup,
        parent_group_id: Uuid,
        matches: &[MatchedStream],
        keywords: &[ExceptionKeyword],
    ) -> ChildProcessResult {
        let mut result = ChildProcessResult::default();
        let pool = self.database.pool();

        for matched in matches {
            let stream = &matched.stream;
            let event = &matched.event;

            let keyword_hit =
                crate::database::keywords::check_exception_keyword(&stream.name, keywords);
            let keyword_label = match &keyword_hit {
                Some((_, ExceptionBehavior::Ignore)) => {
                    result.streams_skipped += 1;
                    continue;
                }
                Some((label, _)) => Some(label.clone()),
                None => None,
            };
            let segment_code = matched.segment.as_ref().map(|s| s.code.clone());

            let lookup = async {
                let mut channel = channels::find_parent_channel_for_event(
                    pool,
                    parent_group_id,
                    &event.id,
                    &event.provider,
                    keyword_label.as_deref(),
                    segment_code.as_deref(),
                )
                .await?;

                // Keyword channel missing: fall back to the parent's main
                if channel.is_none() && keyword_label.is_some() {
                    channel = channels::find_parent_channel_for_event(
                        pool,
                        parent_group_id,
                        &event.id,
                        &event.provider,
                        None,
                        segment_code.as_deref(),
                    )
                    .await?;
                    if channel.is_some() {
                        debug!(
                            "Keyword channel missing for '{}', using main channel for event {}",
                            keyword_label.as_deref().unwrap_or(""),
                            event.id
                        );
                    }
                }
                anyhow::Ok(channel)
            };

            let channel = match lookup.await {
                Ok(Some(channel)) => channel,
                Ok(None) => {
                    result.streams_skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Parent channel lookup failed for '{}': {}", stream.name, e);
                    result.errors += 1;
                    continue;
                }
            };

            let attach = async {
                if streams::stream_exists_on_channel(pool, channel.id, stream.id).await? {
                    return anyhow::Ok(false);
                }
                let priority = streams::get_next_stream_priority(pool, channel.id).await?;
                streams::add_stream_to_channel(
                    pool,
                    channel.id,
                    stream.id,
                    Some(&stream.name),
                    priority,
                    Some(child_group.id),
                    SourceGroupType::Child,
                    stream.m3u_account_id,
                    stream.m3u_account_name.as_deref(),
                    keyword_label.as_deref(),
                )
                .await?;
                history::log_channel_history(
                    pool,
                    channel.id,
                    "stream_added",
                    "epg_generation",
                    Some(&format!(
                        "Added stream '{}' from child group '{}'",
                        stream.name, child_group.name
                    )),
                )
                .await?;
                anyhow::Ok(true)
            };

            match attach.await {
                Ok(true) => {
                    result.streams_added += 1;
                    self.sync_channel_streams(channel.id).await;
                }
                Ok(false) => result.streams_existing += 1,
                Err(e) => {
                    warn!("Failed to attach child stream '{}': {}", stream.name, e);
                    result.errors += 1;
                }
            }
        }

        info!(
            "Child group '{}': added={} existing={} skipped={} errors={}",
            child_group.name,
            result.streams_added,
            result.streams_existing,
            result.streams_skipped,
            result.errors,
        );
        result
    }

    /// Soft-remove streams that vanished from the group's live stream list.
    /// This is the live-list leg of reconciliation: a channel whose last
    /// stream disappears is handled by lifecycle/deletion, not here.
    pub async fn prune_missing_streams(
        &self,
        group: &EventEpgGroup,
        live_stream_ids: &[i64],
    ) -> Result<usize> {
        let pool = self.database.pool();
        let live: std::collections::HashSet<i64> = live_stream_ids.iter().copied().collect();
        let mut removed = 0;

        for channel in channels::get_channels_for_group(pool, group.id, false).await? {
            let mut changed = false;
            for stream in streams::get_channel_streams(pool, channel.id).await? {
                let from_this_group = stream.source_group_id == Some(group.id);
                if from_this_group && !live.contains(&stream.dispatcharr_stream_id) {
                    streams::remove_stream_from_channel(
                        pool,
                        channel.id,
                        stream.dispatcharr_stream_id,
                        Some("stream_removed_upstream"),
                    )
                    .await?;
                    removed += 1;
                    changed = true;
                }
            }
            if changed {
                self.sync_channel_streams(channel.id).await;
            }
        }

        if removed > 0 {
            info!(
                "Group '{}': removed {} stream(s) no longer in the source list",
                group.name, removed
            );
        }
        Ok(removed)
    }

    /// Recompute stream priorities for every active channel from the current
    /// rule list, then push the new ordering downstream where it changed.
    pub async fn apply_stream_ordering(
        &self,
        ordering: &crate::services::stream_ordering::StreamOrderingService,
    ) -> Result<usize> {
        if !ordering.has_rules() {
            return Ok(0);
        }

        let pool = self.database.pool();
        let mut reordered = 0;

        for channel in channels::get_all_active_channels(pool).await? {
            let channel_streams = streams::get_channel_streams(pool, channel.id).await?;
            let mut changed = false;
            for stream in &channel_streams {
                let new_priority = ordering.compute_priority(stream);
                if stream.priority != new_priority {
                    streams::update_stream_priority(pool, stream.id, new_priority).await?;
                    changed = true;
                }
            }
            if changed {
                reordered += 1;
                self.sync_channel_streams(channel.id).await;
            }
        }

        if reordered > 0 {
            info!("Reordered streams on {} channel(s)", reordered);
        }
        Ok(reordered)
    }

    /// Soft-delete channels whose scheduled delete time has passed, removing
    /// the downstream channel first.
    pub async fn process_scheduled_deletions(&self) -> DeletionResult {
        let mut result = DeletionResult::default();
        let pool = self.database.pool();

        let pending = match channels::get_channels_pending_deletion(pool).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!("Could not list channels pending deletion: {}", e);
                result.errors += 1;
                return result;
            }
        };

        for channel in pending {
            if let Some(downstream_id) = channel.dispatcharr_channel_id {
                let delete = self.dispatcharr.delete_channel(downstream_id).await;
                if !delete.success && self.dispatcharr.is_enabled() {
                    warn!(
                        "Downstream delete failed for channel {}: {:?}",
                        channel.id, delete.error
                    );
                }
            }

            match channels::mark_channel_deleted(pool, channel.id, Some("scheduled_delete")).await
            {
                Ok(true) => {
                    result.deleted += 1;
                    let _ = history::log_channel_history(
                        pool,
                        channel.id,
                        "deleted",
                        "scheduler",
                        Some("Scheduled delete time reached"),
                    )
                    .await;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Soft delete failed for channel {}: {}", channel.id, e);
                    result.errors += 1;
                }
            }
        }

        if result.deleted > 0 {
            info!("Deleted {} expired channel(s)", result.deleted);
        }
        result
    }

    /// Push the current ordered stream list to the downstream channel.
    async fn sync_channel_streams(&self, channel_id: Uuid) {
        if !self.dispatcharr.is_enabled() {
            return;
        }
        let pool = self.database.pool();
        let Ok(Some(channel)) = channels::get_managed_channel(pool, channel_id).await else {
            return;
        };
        let Some(downstream_id) = channel.dispatcharr_channel_id else {
            return;
        };
        let Ok(stream_ids) = streams::get_ordered_stream_ids(pool, channel_id).await else {
            return;
        };

        let result = self
            .dispatcharr
            .update_channel(downstream_id, json!({ "streams": stream_ids }))
            .await;
        if !result.success {
            debug!(
                "Downstream stream sync failed for channel {}: {:?}",
                channel_id, result.error
            );
        }
    }
}

enum ChannelRef {
    Existing(ManagedChannel),
    Created(Uuid),
}

enum MatchDisposition {
    ChannelCreated,
    StreamAdded,
    StreamExisting,
    StreamSkipped,
    KeywordIgnored,
    CreateDeferred,
}

impl MatchDisposition {
    fn tally(self, result: &mut GroupProcessResult) {
        match self {
            Self::ChannelCreated => {
                result.channels_created += 1;
                result.streams_added += 1;
            }
            Self::StreamAdded => {
                result.channels_existing += 1;
                result.streams_added += 1;
            }
            Self::StreamExisting => result.channels_existing += 1,
            Self::StreamSkipped => result.streams_skipped += 1,
            Self::KeywordIgnored => result.keyword_ignored += 1,
            Self::CreateDeferred => result.create_deferred += 1,
        }
    }
}

/// Stable tvg_id for a channel. Group-scoped so the same event in two groups
/// never collides under the live-row uniqueness index; separate-mode
/// channels additionally carry the stream id. `mode` is the effective mode
/// for this stream (a keyword's behavior can override the group's).
fn build_tvg_id(
    group: &EventEpgGroup,
    provider: &str,
    event_id: &str,
    segment: Option<&str>,
    keyword: Option<&str>,
    mode: DuplicateMode,
    stream_id: i64,
) -> String {
    let mut tvg_id = format!(
        "matcharr.{}.{}.{}",
        &group.id.simple().to_string()[..8],
        provider,
        event_id
    );
    if let Some(segment) = segment {
        tvg_id.push('.');
        tvg_id.push_str(segment);
    }
    if let Some(keyword) = keyword {
        tvg_id.push('.');
        tvg_id.push_str(&normalize_for_matching(keyword).replace(' ', "-"));
    }
    if mode == DuplicateMode::Separate {
        tvg_id.push_str(&format!(".s{stream_id}"));
    }
    tvg_id
}

fn event_vars(
    event: &crate::models::Event,
    user_tz: Tz,
    event_start: chrono::DateTime<chrono::Utc>,
) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    let team_field = |team: &Option<crate::models::Team>, f: fn(&crate::models::Team) -> String| {
        team.as_ref().map(f).unwrap_or_default()
    };

    vars.insert(
        "home_team".to_string(),
        team_field(&event.home_team, |t| t.name.clone()),
    );
    vars.insert(
        "away_team".to_string(),
        team_field(&event.away_team, |t| t.name.clone()),
    );
    vars.insert(
        "home_team_abbrev".to_string(),
        team_field(&event.home_team, |t| {
            t.abbreviation.clone().unwrap_or_else(|| t.name.clone())
        }),
    );
    vars.insert(
        "away_team_abbrev".to_string(),
        team_field(&event.away_team, |t| {
            t.abbreviation.clone().unwrap_or_else(|| t.name.clone())
        }),
    );
    vars.insert("event_name".to_string(), event.name.clone());
    vars.insert("league".to_string(), event.league.to_uppercase());
    vars.insert("sport".to_string(), event.sport.clone());
    vars.insert("venue".to_string(), event.venue.clone().unwrap_or_default());

    let local = event_start.with_timezone(&user_tz);
    vars.insert("game_time".to_string(), local.format("%-I:%M %p").to_string());
    vars.insert("game_date".to_string(), local.format("%b %-d").to_string());
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn group(mode: DuplicateMode) -> EventEpgGroup {
        EventEpgGroup {
            id: Uuid::new_v4(),
            name: "Test".to_string(),
            m3u_account_id: None,
            m3u_group_id: None,
            leagues: "[]".to_string(),
            parent_group_id: None,
            channel_assignment_mode: crate::models::ChannelAssignmentMode::Manual,
            channel_start_number: Some(101),
            total_stream_count: 0,
            sort_order: 0,
            duplicate_mode: mode,
            stream_include_regex: None,
            stream_include_regex_enabled: false,
            stream_exclude_regex: None,
            stream_exclude_regex_enabled: false,
            custom_teams_regex: None,
            custom_teams_regex_enabled: false,
            skip_builtin_extractor: false,
            enabled: true,
            created_at: Utc::now().naive_utc(),
            updated_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_tvg_id_distinguishes_keyword_and_segment() {
        let g = group(DuplicateMode::Consolidate);
        let plain = build_tvg_id(&g, "espn", "401", None, None, DuplicateMode::Consolidate, 1);
        let keyword = build_tvg_id(
            &g,
            "espn",
            "401",
            None,
            Some("Spanish"),
            DuplicateMode::Consolidate,
            1,
        );
        let segment = build_tvg_id(
            &g,
            "espn",
            "401",
            Some("prelims"),
            None,
            DuplicateMode::Consolidate,
            1,
        );
        assert_ne!(plain, keyword);
        assert_ne!(plain, segment);
        assert!(keyword.ends_with(".spanish"));
    }

    #[test]
    fn test_tvg_id_separate_mode_is_stream_scoped() {
        let g = group(DuplicateMode::Separate);
        let a = build_tvg_id(&g, "espn", "401", None, None, DuplicateMode::Separate, 1);
        let b = build_tvg_id(&g, "espn", "401", None, None, DuplicateMode::Separate, 2);
        assert_ne!(a, b);
    }
}
