//! Settings singleton sections
//!
//! All engine behavior is settings-driven from one `settings` row. Sections
//! are stored as JSON blobs so new knobs deserialize with serde defaults
//! instead of requiring a migration per field.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub schema_version: i64,
    pub user_timezone: String,
    pub dispatcharr: DispatcharrSettings,
    pub lifecycle: LifecycleSettings,
    pub scheduler: SchedulerSettings,
    pub epg: EpgSettings,
    pub durations: DurationSettings,
    pub reconciliation: ReconciliationSettings,
    pub processing_generation: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DispatcharrSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub epg_id: Option<i64>,
    #[serde(default)]
    pub default_channel_profile_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSettings {
    #[serde(default)]
    pub channel_create_timing: CreateTiming,
    #[serde(default)]
    pub channel_delete_timing: DeleteTiming,
    #[serde(default = "default_range_start")]
    pub channel_range_start: i64,
    #[serde(default)]
    pub channel_range_end: Option<i64>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            channel_create_timing: CreateTiming::default(),
            channel_delete_timing: DeleteTiming::default(),
            channel_range_start: default_range_start(),
            channel_range_end: None,
        }
    }
}

fn default_range_start() -> i64 {
    101
}

/// When to create a channel, as an offset from midnight of the event day
/// in the user timezone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CreateTiming {
    #[serde(rename = "stream_available")]
    StreamAvailable,
    #[default]
    #[serde(rename = "same_day")]
    SameDay,
    #[serde(rename = "day_before")]
    DayBefore,
    #[serde(rename = "2_days_before")]
    TwoDaysBefore,
    #[serde(rename = "3_days_before")]
    ThreeDaysBefore,
    #[serde(rename = "1_week_before")]
    OneWeekBefore,
}

/// When to delete a channel, as an offset from end-of-day of the event's
/// END date (start + sport duration; matters for midnight-crossing games).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeleteTiming {
    #[serde(rename = "stream_removed")]
    StreamRemoved,
    #[serde(rename = "6_hours_after")]
    SixHoursAfter,
    #[serde(rename = "same_day")]
    SameDay,
    #[default]
    #[serde(rename = "day_after")]
    DayAfter,
    #[serde(rename = "2_days_after")]
    TwoDaysAfter,
    #[serde(rename = "3_days_after")]
    ThreeDaysAfter,
    #[serde(rename = "1_week_after")]
    OneWeekAfter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval")]
    pub interval_minutes: u64,
    /// Optional cron expression; takes precedence over interval_minutes.
    #[serde(default)]
    pub cron_expression: Option<String>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_interval(),
            cron_expression: None,
        }
    }
}

fn default_interval() -> u64 {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpgSettings {
    #[serde(default = "default_team_days")]
    pub team_schedule_days_ahead: i64,
    #[serde(default = "default_match_days")]
    pub event_match_days_ahead: i64,
    #[serde(default = "default_output_days")]
    pub epg_output_days_ahead: i64,
    #[serde(default = "default_lookback")]
    pub epg_lookback_hours: i64,
    #[serde(default = "default_tz")]
    pub epg_timezone: String,
    #[serde(default)]
    pub epg_output_path: Option<String>,
    #[serde(default)]
    pub include_final_events: bool,
    #[serde(default)]
    pub midnight_crossover_mode: MidnightCrossoverMode,
    #[serde(default = "default_pregame_minutes")]
    pub pregame_minutes: i64,
    #[serde(default)]
    pub templates: TemplateSettings,
}

impl Default for EpgSettings {
    fn default() -> Self {
        serde_json::from_str("{}").expect("EpgSettings defaults")
    }
}

fn default_team_days() -> i64 {
    14
}
fn default_match_days() -> i64 {
    1
}
fn default_output_days() -> i64 {
    14
}
fn default_lookback() -> i64 {
    6
}
fn default_tz() -> String {
    "America/New_York".to_string()
}
fn default_pregame_minutes() -> i64 {
    30
}

/// How a programme that crosses local midnight is placed in the guide.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MidnightCrossoverMode {
    /// Keep the programme on the start day's channel slot
    #[default]
    StartDay,
    /// Split the programme at midnight into two slots
    Split,
}

/// Template strings rendered against denormalized event fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSettings {
    #[serde(default = "default_title")]
    pub title_format: String,
    #[serde(default = "default_channel_name")]
    pub channel_name_format: String,
    #[serde(default = "default_description")]
    pub description_format: String,
    #[serde(default = "default_pregame_title")]
    pub pregame_title: String,
    #[serde(default = "default_pregame_description")]
    pub pregame_description: String,
    #[serde(default = "default_postgame_title")]
    pub postgame_title: String,
    #[serde(default = "default_postgame_description")]
    pub postgame_description: String,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        serde_json::from_str("{}").expect("TemplateSettings defaults")
    }
}

fn default_title() -> String {
    "{away_team} @ {home_team}".to_string()
}
fn default_channel_name() -> String {
    "{away_team_abbrev} @ {home_team_abbrev}".to_string()
}
fn default_description() -> String {
    "{away_team} @ {home_team} | {venue}".to_string()
}
fn default_pregame_title() -> String {
    "Pregame Coverage".to_string()
}
fn default_pregame_description() -> String {
    "{away_team} @ {home_team} starts at {game_time}".to_string()
}
fn default_postgame_title() -> String {
    "Postgame Recap".to_string()
}
fn default_postgame_description() -> String {
    "{away_team} @ {home_team}".to_string()
}

/// Expected event durations in hours, used for event-end estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationSettings {
    #[serde(default = "d3")]
    pub default: f64,
    #[serde(default = "d3")]
    pub basketball: f64,
    #[serde(default = "d3_5")]
    pub football: f64,
    #[serde(default = "d3")]
    pub hockey: f64,
    #[serde(default = "d3_5")]
    pub baseball: f64,
    #[serde(default = "d2_5")]
    pub soccer: f64,
    #[serde(default = "d5")]
    pub mma: f64,
    #[serde(default = "d2_5")]
    pub rugby: f64,
    #[serde(default = "d4")]
    pub boxing: f64,
    #[serde(default = "d3")]
    pub tennis: f64,
    #[serde(default = "d5")]
    pub golf: f64,
    #[serde(default = "d4")]
    pub racing: f64,
    #[serde(default = "d8")]
    pub cricket: f64,
}

impl Default for DurationSettings {
    fn default() -> Self {
        serde_json::from_str("{}").expect("DurationSettings defaults")
    }
}

fn d2_5() -> f64 {
    2.5
}
fn d3() -> f64 {
    3.0
}
fn d3_5() -> f64 {
    3.5
}
fn d4() -> f64 {
    4.0
}
fn d5() -> f64 {
    5.0
}
fn d8() -> f64 {
    8.0
}

impl DurationSettings {
    /// Duration in hours for a sport code, falling back to the default.
    pub fn for_sport(&self, sport: &str) -> f64 {
        match sport {
            "basketball" => self.basketball,
            "football" => self.football,
            "hockey" => self.hockey,
            "baseball" => self.baseball,
            "soccer" => self.soccer,
            "mma" => self.mma,
            "rugby" => self.rugby,
            "boxing" => self.boxing,
            "tennis" => self.tennis,
            "golf" => self.golf,
            "racing" => self.racing,
            "cricket" => self.cricket,
            _ => self.default,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationSettings {
    #[serde(default = "default_true")]
    pub reconcile_on_epg_generation: bool,
    #[serde(default = "default_true")]
    pub reconcile_on_startup: bool,
    #[serde(default)]
    pub auto_fix_orphan_matcharr: bool,
    #[serde(default)]
    pub auto_fix_orphan_dispatcharr: bool,
    #[serde(default = "default_true")]
    pub auto_fix_duplicates: bool,
    #[serde(default)]
    pub default_duplicate_event_handling: Option<String>,
    #[serde(default = "default_retention")]
    pub channel_history_retention_days: i64,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        serde_json::from_str("{}").expect("ReconciliationSettings defaults")
    }
}

fn default_retention() -> i64 {
    90
}
fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_serde_values() {
        let t: CreateTiming = serde_json::from_str("\"2_days_before\"").unwrap();
        assert_eq!(t, CreateTiming::TwoDaysBefore);
        let t: DeleteTiming = serde_json::from_str("\"6_hours_after\"").unwrap();
        assert_eq!(t, DeleteTiming::SixHoursAfter);
        assert_eq!(
            serde_json::to_string(&DeleteTiming::DayAfter).unwrap(),
            "\"day_after\""
        );
    }

    #[test]
    fn test_sections_deserialize_from_empty() {
        let epg: EpgSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(epg.epg_output_days_ahead, 14);
        assert_eq!(epg.epg_timezone, "America/New_York");

        let durations: DurationSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(durations.for_sport("mma"), 5.0);
        assert_eq!(durations.for_sport("curling"), 3.0);
    }
}
