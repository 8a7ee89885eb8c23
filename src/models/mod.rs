use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub mod event;
pub mod settings;

pub use event::{Event, EventStatus, Team};

/// One M3U stream group being matched against sports schedules.
///
/// A child group (parent_group_id set) never creates channels; its streams
/// attach to channels owned by the parent.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventEpgGroup {
    pub id: Uuid,
    pub name: String,
    pub m3u_account_id: Option<i64>,
    pub m3u_group_id: Option<i64>,
    pub leagues: String, // JSON array of league codes
    pub parent_group_id: Option<Uuid>,
    pub channel_assignment_mode: ChannelAssignmentMode,
    pub channel_start_number: Option<i64>,
    pub total_stream_count: i64,
    pub sort_order: i64,
    pub duplicate_mode: DuplicateMode,
    pub stream_include_regex: Option<String>,
    pub stream_include_regex_enabled: bool,
    pub stream_exclude_regex: Option<String>,
    pub stream_exclude_regex_enabled: bool,
    pub custom_teams_regex: Option<String>,
    pub custom_teams_regex_enabled: bool,
    pub skip_builtin_extractor: bool,
    pub enabled: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl EventEpgGroup {
    /// League codes configured for this group (empty = all cached leagues).
    pub fn league_codes(&self) -> Vec<String> {
        serde_json::from_str(&self.leagues).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelAssignmentMode {
    Manual,
    Auto,
}

/// How multiple streams matched to the same event are turned into channels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DuplicateMode {
    Consolidate,
    Separate,
    Ignore,
}

/// Engine-owned channel record, independent of the downstream representation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ManagedChannel {
    pub id: Uuid,
    pub event_epg_group_id: Uuid,
    pub event_id: String,
    pub event_provider: String,
    pub tvg_id: String,
    pub channel_name: String,
    pub channel_number: Option<i64>,
    pub logo_url: Option<String>,
    pub dispatcharr_channel_id: Option<i64>,
    pub dispatcharr_uuid: Option<String>,
    pub dispatcharr_logo_id: Option<i64>,
    pub channel_group_id: Option<i64>,
    pub channel_profile_ids: Option<String>, // JSON array
    pub primary_stream_id: Option<i64>,
    pub exception_keyword: Option<String>,
    pub card_segment: Option<String>,
    pub home_team: Option<String>,
    pub home_team_abbrev: Option<String>,
    pub home_team_logo: Option<String>,
    pub away_team: Option<String>,
    pub away_team_abbrev: Option<String>,
    pub away_team_logo: Option<String>,
    pub event_date: Option<String>,
    pub event_name: Option<String>,
    pub league: Option<String>,
    pub sport: Option<String>,
    pub venue: Option<String>,
    pub broadcast: Option<String>,
    pub scheduled_delete_at: Option<DateTime<Utc>>,
    pub sync_status: String,
    pub created_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
    pub delete_reason: Option<String>,
}

impl ManagedChannel {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A stream attached to a managed channel. Soft-removed via `removed_at`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ManagedChannelStream {
    pub id: Uuid,
    pub managed_channel_id: Uuid,
    pub dispatcharr_stream_id: i64,
    pub stream_name: Option<String>,
    pub priority: i64,
    pub source_group_id: Option<Uuid>,
    pub source_group_type: SourceGroupType,
    pub m3u_account_id: Option<i64>,
    pub m3u_account_name: Option<String>,
    pub exception_keyword: Option<String>,
    pub added_at: NaiveDateTime,
    pub removed_at: Option<NaiveDateTime>,
    pub remove_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceGroupType {
    Main,
    Child,
}

/// Consolidation exception keyword configuration.
///
/// `label` doubles as the channel-name suffix and template variable;
/// `match_terms` is a comma-separated list of phrases to find in stream names.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExceptionKeyword {
    pub id: Uuid,
    pub label: String,
    pub match_terms: String,
    pub behavior: ExceptionBehavior,
    pub enabled: bool,
    pub created_at: NaiveDateTime,
}

impl ExceptionKeyword {
    pub fn match_term_list(&self) -> Vec<String> {
        self.match_terms
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExceptionBehavior {
    Consolidate,
    Separate,
    Ignore,
}

/// One stream ordering rule. Rules are evaluated ascending by priority;
/// the first match wins and non-matching streams get priority 999.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StreamOrderingRule {
    pub id: Uuid,
    pub rule_type: OrderingRuleType,
    pub value: String,
    pub priority: i64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderingRuleType {
    M3u,
    Group,
    Regex,
}

/// Append-only channel audit entry.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChannelHistoryEntry {
    pub id: i64,
    pub managed_channel_id: Uuid,
    pub change_type: String,
    pub change_source: String,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

/// A followed team for team-based EPG channels.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FollowedTeam {
    pub id: Uuid,
    pub name: String,
    pub provider: String,
    pub provider_team_id: String,
    pub league: String,
    pub sport: String,
    pub logo_url: Option<String>,
    pub tvg_id: String,
    pub enabled: bool,
    pub created_at: NaiveDateTime,
}

/// Non-event TV group passed through to the downstream lineup.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RegularTvGroup {
    pub id: Uuid,
    pub name: String,
    pub m3u_account_id: Option<i64>,
    pub m3u_group_id: Option<i64>,
    pub channel_start_number: Option<i64>,
    pub channel_group_id: Option<i64>,
    pub enabled: bool,
    pub created_at: NaiveDateTime,
}

/// A team entry from the team cache.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TeamCacheEntry {
    pub provider: String,
    pub provider_team_id: String,
    pub league: String,
    pub team_name: String,
    pub team_abbrev: Option<String>,
    pub team_short_name: Option<String>,
    pub sport: String,
    pub logo_url: Option<String>,
}

/// A league entry (configured or discovered).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeagueEntry {
    pub league_slug: String,
    pub provider: String,
    pub league_name: Option<String>,
    pub sport: String,
    pub logo_url: Option<String>,
    pub team_count: i64,
    pub import_enabled: bool,
    pub league_alias: Option<String>,
}

/// Configured league mapping row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeagueMapping {
    pub league_code: String,
    pub provider: String,
    pub provider_league_id: String,
    pub provider_league_name: Option<String>,
    pub sport: String,
    pub display_name: Option<String>,
    pub logo_url: Option<String>,
    pub league_alias: Option<String>,
    pub league_id: Option<String>,
    pub fallback_provider: Option<String>,
    pub fallback_league_id: Option<String>,
    pub import_enabled: bool,
    pub enabled: bool,
    pub cached_team_count: i64,
}

/// Team/league cache refresh statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub last_refresh: Option<DateTime<Utc>>,
    pub leagues_count: i64,
    pub teams_count: i64,
    pub refresh_duration_seconds: f64,
    pub is_stale: bool,
    pub refresh_in_progress: bool,
    pub last_error: Option<String>,
}

/// A raw stream as listed by the downstream channel manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStream {
    pub id: i64,
    pub name: String,
    pub url: Option<String>,
    pub m3u_account_id: Option<i64>,
    pub m3u_account_name: Option<String>,
    pub group_title: Option<String>,
}

/// Request bodies for the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCreateRequest {
    pub name: String,
    pub m3u_account_id: Option<i64>,
    pub m3u_group_id: Option<i64>,
    #[serde(default)]
    pub leagues: Vec<String>,
    pub parent_group_id: Option<Uuid>,
    pub channel_assignment_mode: Option<ChannelAssignmentMode>,
    pub channel_start_number: Option<i64>,
    pub sort_order: Option<i64>,
    pub duplicate_mode: Option<DuplicateMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordCreateRequest {
    pub label: String,
    pub match_terms: String,
    pub behavior: ExceptionBehavior,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}
