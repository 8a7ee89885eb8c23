//! EPG generation and XMLTV output
//!
//! Builds per-channel programme lists (pregame filler in daily chunks, the
//! event itself, postgame filler to the window end) and serializes them as
//! XMLTV. The output file is written atomically via rename-from-temp with
//! the previous file kept as `.bak`.

use crate::models::settings::{EpgSettings, TemplateSettings};
use crate::models::ManagedChannel;
use crate::utils::tz::{format_datetime_xmltv, local_midnight};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use quick_xml::events::{BytesDecl, BytesText, Event as XmlEvent};
use quick_xml::Writer;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use tracing::{info, warn};

/// One XMLTV programme slot.
#[derive(Debug, Clone)]
pub struct Programme {
    pub channel_id: String,
    pub title: String,
    pub sub_title: Option<String>,
    pub description: Option<String>,
    pub category: String,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub icon: Option<String>,
}

/// A channel with a concrete event slot to fill programmes around.
#[derive(Debug, Clone)]
pub struct ChannelSchedule {
    pub tvg_id: String,
    pub display_name: String,
    pub icon: Option<String>,
    pub event_start: DateTime<Utc>,
    pub event_stop: DateTime<Utc>,
    pub vars: HashMap<String, String>,
}

/// Substitute `{variable}` placeholders from the vars map; unknown
/// variables resolve to empty.
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                if let Some(value) = vars.get(key) {
                    result.push_str(value);
                }
                rest = &after[close + 1..];
            }
            None => {
                result.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Template variables from a managed channel's denormalized event fields.
pub fn channel_template_vars(channel: &ManagedChannel, user_tz: Tz) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    let mut put = |key: &str, value: &Option<String>| {
        vars.insert(key.to_string(), value.clone().unwrap_or_default());
    };
    put("home_team", &channel.home_team);
    put("home_team_abbrev", &channel.home_team_abbrev);
    put("away_team", &channel.away_team);
    put("away_team_abbrev", &channel.away_team_abbrev);
    put("event_name", &channel.event_name);
    put("league", &channel.league);
    put("sport", &channel.sport);
    put("venue", &channel.venue);
    put("broadcast", &channel.broadcast);
    put("exception_keyword", &channel.exception_keyword);

    if let Some(start) = channel
        .event_date
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
    {
        let local = start.with_timezone(&user_tz);
        vars.insert("game_time".to_string(), local.format("%-I:%M %p").to_string());
        vars.insert("game_date".to_string(), local.format("%b %-d").to_string());
    }
    vars.insert(
        "matchup".to_string(),
        match (&channel.away_team, &channel.home_team) {
            (Some(away), Some(home)) => format!("{away} @ {home}"),
            _ => channel.event_name.clone().unwrap_or_default(),
        },
    );
    vars
}

pub struct EpgGenerator {
    epg: EpgSettings,
    user_tz: Tz,
}

impl EpgGenerator {
    pub fn new(epg: EpgSettings, user_tz: Tz) -> Self {
        Self { epg, user_tz }
    }

    /// Programmes for one channel: pregame filler from the window start in
    /// daily chunks, the event programme (starting pregame_minutes early,
    /// under its own title), then postgame filler in daily chunks to the
    /// window end.
    pub fn generate_programmes(&self, schedule: &ChannelSchedule) -> Vec<Programme> {
        self.generate_programmes_at(schedule, Utc::now())
    }

    pub fn generate_programmes_at(
        &self,
        schedule: &ChannelSchedule,
        now: DateTime<Utc>,
    ) -> Vec<Programme> {
        let templates = &self.epg.templates;
        let mut programmes = Vec::new();

        let window_start = (now - Duration::hours(self.epg.epg_lookback_hours))
            .with_timezone(&self.user_tz);
        let window_start = local_midnight(window_start.date_naive(), self.user_tz)
            .with_timezone(&Utc);
        let window_end = window_start + Duration::days(self.epg.epg_output_days_ahead);

        // The event programme absorbs the pregame window: it runs under its
        // own title from pregame_minutes before kickoff.
        let event_slot_start =
            schedule.event_start - Duration::minutes(self.epg.pregame_minutes);

        // Pregame filler: daily chunks from window start up to the event slot
        let mut cursor = window_start;
        while cursor < event_slot_start {
            let chunk_end = next_day_boundary(cursor, self.user_tz).min(event_slot_start);
            programmes.push(Programme {
                channel_id: schedule.tvg_id.clone(),
                title: render_template(&templates.pregame_title, &schedule.vars),
                sub_title: None,
                description: Some(render_template(&templates.pregame_description, &schedule.vars)),
                category: "Sports".to_string(),
                start: cursor,
                stop: chunk_end,
                icon: schedule.icon.clone(),
            });
            cursor = chunk_end;
        }

        // The event itself, starting at the absorbed pregame instant
        programmes.push(Programme {
            channel_id: schedule.tvg_id.clone(),
            title: render_template(&templates.title_format, &schedule.vars),
            sub_title: schedule.vars.get("venue").filter(|v| !v.is_empty()).cloned(),
            description: Some(render_template(&templates.description_format, &schedule.vars)),
            category: "Sports".to_string(),
            start: event_slot_start,
            stop: schedule.event_stop,
            icon: schedule.icon.clone(),
        });

        // Postgame filler in daily chunks to the window end
        let mut cursor = schedule.event_stop;
        while cursor < window_end {
            let chunk_end = next_day_boundary(cursor, self.user_tz).min(window_end);
            programmes.push(Programme {
                channel_id: schedule.tvg_id.clone(),
                title: render_template(&templates.postgame_title, &schedule.vars),
                sub_title: None,
                description: Some(render_template(&templates.postgame_description, &schedule.vars)),
                category: "Sports".to_string(),
                start: cursor,
                stop: chunk_end,
                icon: schedule.icon.clone(),
            });
            cursor = chunk_end;
        }

        programmes
    }
}

/// Next local-midnight boundary strictly after the given instant.
fn next_day_boundary(instant: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = instant.with_timezone(&tz);
    let next_day = local.date_naive() + Duration::days(1);
    local_midnight(next_day, tz).with_timezone(&Utc)
}

/// Serialize channels and programmes as an XMLTV document.
pub fn write_xmltv(
    channels: &[(String, String, Option<String>)],
    programmes: &[Programme],
) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer
        .create_element("tv")
        .with_attribute(("generator-info-name", "matcharr"))
        .write_inner_content(|tv| {
            for (tvg_id, display_name, icon) in channels {
                tv.create_element("channel")
                    .with_attribute(("id", tvg_id.as_str()))
                    .write_inner_content(|ch| {
                        ch.create_element("display-name")
                            .write_text_content(BytesText::new(display_name))?;
                        if let Some(icon) = icon {
                            ch.create_element("icon")
                                .with_attribute(("src", icon.as_str()))
                                .write_empty()?;
                        }
                        Ok::<(), quick_xml::Error>(())
                    })?;
            }

            for programme in programmes {
                tv.create_element("programme")
                    .with_attribute(("start", format_datetime_xmltv(programme.start).as_str()))
                    .with_attribute(("stop", format_datetime_xmltv(programme.stop).as_str()))
                    .with_attribute(("channel", programme.channel_id.as_str()))
                    .write_inner_content(|p| {
                        p.create_element("title")
                            .with_attribute(("lang", "en"))
                            .write_text_content(BytesText::new(&programme.title))?;
                        if let Some(sub_title) = &programme.sub_title {
                            p.create_element("sub-title")
                                .write_text_content(BytesText::new(sub_title))?;
                        }
                        if let Some(description) = &programme.description {
                            p.create_element("desc")
                                .with_attribute(("lang", "en"))
                                .write_text_content(BytesText::new(description))?;
                        }
                        p.create_element("category")
                            .write_text_content(BytesText::new(&programme.category))?;
                        if let Some(icon) = &programme.icon {
                            p.create_element("icon")
                                .with_attribute(("src", icon.as_str()))
                                .write_empty()?;
                        }
                        Ok::<(), quick_xml::Error>(())
                    })?;
            }
            Ok::<(), quick_xml::Error>(())
        })?;

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

/// Atomic file write: temp + rename, previous file kept as `.bak`.
pub fn write_xmltv_file(path: &str, content: &str) -> Result<()> {
    let target = Path::new(path);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if target.exists() {
        let backup = target.with_extension("xml.bak");
        if let Err(e) = std::fs::copy(target, &backup) {
            warn!("Could not create EPG backup: {}", e);
        }
    }

    let temp = target.with_extension("xml.tmp");
    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, target)?;

    info!("EPG written to {} ({} bytes)", path, content.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule(start: DateTime<Utc>, stop: DateTime<Utc>) -> ChannelSchedule {
        let mut vars = HashMap::new();
        vars.insert("away_team".to_string(), "Lions".to_string());
        vars.insert("home_team".to_string(), "Packers".to_string());
        ChannelSchedule {
            tvg_id: "matcharr.test.1".to_string(),
            display_name: "DET @ GB".to_string(),
            icon: None,
            event_start: start,
            event_stop: stop,
            vars,
        }
    }

    #[test]
    fn test_render_template() {
        let mut vars = HashMap::new();
        vars.insert("away_team".to_string(), "Lions".to_string());
        vars.insert("home_team".to_string(), "Packers".to_string());
        assert_eq!(
            render_template("{away_team} @ {home_team}", &vars),
            "Lions @ Packers"
        );
        // Unknown variables collapse cleanly
        assert_eq!(render_template("{away_team} | {nope}", &vars), "Lions |");
    }

    #[test]
    fn test_programmes_cover_window_contiguously() {
        let epg = EpgSettings::default();
        let generator = EpgGenerator::new(epg, chrono_tz::America::New_York);

        let now = Utc.with_ymd_and_hms(2025, 1, 10, 15, 0, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2025, 1, 11, 1, 0, 0).unwrap();
        let stop = start + Duration::hours(3);
        let programmes = generator.generate_programmes_at(&schedule(start, stop), now);

        // Contiguous: each slot starts where the previous one stopped
        for pair in programmes.windows(2) {
            assert_eq!(pair[0].stop, pair[1].start);
        }
        // The event slot absorbs the pregame window: it starts
        // pregame_minutes before kickoff under the matchup title
        let event_slot = programmes.iter().find(|p| p.stop == stop).unwrap();
        assert_eq!(event_slot.start, start - Duration::minutes(30));
        assert_eq!(event_slot.title, "Lions @ Packers");
        // No separately-titled slot sits between the filler and the event
        assert!(!programmes
            .iter()
            .any(|p| p.title != "Lions @ Packers" && p.stop > event_slot.start && p.start < stop));
        // Filler spans multiple days after the event
        let last = programmes.last().unwrap();
        assert!(last.stop > start + Duration::days(10));
    }

    #[test]
    fn test_xmltv_output_shape() {
        let start = Utc.with_ymd_and_hms(2024, 11, 28, 18, 0, 0).unwrap();
        let programmes = vec![Programme {
            channel_id: "matcharr.espn.401".to_string(),
            title: "Lions @ Packers".to_string(),
            sub_title: None,
            description: Some("Week 13".to_string()),
            category: "Sports".to_string(),
            start,
            stop: start + Duration::hours(3),
            icon: None,
        }];
        let channels = vec![(
            "matcharr.espn.401".to_string(),
            "DET @ GB".to_string(),
            None,
        )];

        let xml = write_xmltv(&channels, &programmes).unwrap();
        assert!(xml.contains("<tv generator-info-name=\"matcharr\">"));
        assert!(xml.contains("start=\"20241128180000 +0000\""));
        assert!(xml.contains("stop=\"20241128210000 +0000\""));
        assert!(xml.contains("<display-name>DET @ GB</display-name>"));
    }
}
