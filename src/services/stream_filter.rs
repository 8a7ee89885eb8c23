//! Per-group stream filtering and team extraction
//!
//! Order is fixed: include regex (must match), exclude regex (must not
//! match), then optional custom team-extraction regex with named groups
//! `team1`/`team2` or the first two unnamed groups. Filter counts are
//! reported by reason so "why did my stream disappear" has an answer.

use crate::models::{EventEpgGroup, SourceStream};
use regex::Regex;

#[derive(Debug, Clone, Default)]
pub struct StreamFilterConfig {
    pub include_regex: Option<String>,
    pub include_enabled: bool,
    pub exclude_regex: Option<String>,
    pub exclude_enabled: bool,
    pub custom_teams_regex: Option<String>,
    pub custom_teams_enabled: bool,
    pub skip_builtin: bool,
}

impl StreamFilterConfig {
    pub fn from_group(group: &EventEpgGroup) -> Self {
        Self {
            include_regex: group.stream_include_regex.clone(),
            include_enabled: group.stream_include_regex_enabled,
            exclude_regex: group.stream_exclude_regex.clone(),
            exclude_enabled: group.stream_exclude_regex_enabled,
            custom_teams_regex: group.custom_teams_regex.clone(),
            custom_teams_enabled: group.custom_teams_regex_enabled,
            skip_builtin: group.skip_builtin_extractor,
        }
    }
}

#[derive(Debug, Default)]
pub struct FilterResult {
    pub passed: Vec<SourceStream>,
    pub total_input: usize,
    /// Didn't match the include pattern
    pub filtered_include: usize,
    /// Matched the exclude pattern
    pub filtered_exclude: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamExtraction {
    pub team1: String,
    pub team2: String,
    /// 'custom' or 'builtin'
    pub method: &'static str,
}

pub struct StreamFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
    teams: Option<Regex>,
    skip_builtin: bool,
}

impl StreamFilter {
    pub fn new(config: &StreamFilterConfig) -> Self {
        Self {
            include: config
                .include_enabled
                .then(|| compile_pattern(config.include_regex.as_deref()))
                .flatten(),
            exclude: config
                .exclude_enabled
                .then(|| compile_pattern(config.exclude_regex.as_deref()))
                .flatten(),
            teams: config
                .custom_teams_enabled
                .then(|| compile_pattern(config.custom_teams_regex.as_deref()))
                .flatten(),
            skip_builtin: config.skip_builtin,
        }
    }

    pub fn from_group(group: &EventEpgGroup) -> Self {
        Self::new(&StreamFilterConfig::from_group(group))
    }

    /// Apply include/exclude filters, keeping per-reason counts.
    pub fn filter(&self, streams: Vec<SourceStream>) -> FilterResult {
        let mut result = FilterResult {
            total_input: streams.len(),
            ..Default::default()
        };

        for stream in streams {
            if let Some(include) = &self.include {
                if !include.is_match(&stream.name) {
                    result.filtered_include += 1;
                    continue;
                }
            }
            if let Some(exclude) = &self.exclude {
                if exclude.is_match(&stream.name) {
                    result.filtered_exclude += 1;
                    continue;
                }
            }
            result.passed.push(stream);
        }

        result
    }

    /// Extract team names: custom pattern first, then builtin separators
    /// unless the group opts out.
    pub fn extract_teams(&self, stream_name: &str) -> Option<TeamExtraction> {
        if let Some(teams) = &self.teams {
            if let Some(caps) = teams.captures(stream_name) {
                // Named groups take precedence
                if let (Some(team1), Some(team2)) = (caps.name("team1"), caps.name("team2")) {
                    return Some(TeamExtraction {
                        team1: team1.as_str().trim().to_string(),
                        team2: team2.as_str().trim().to_string(),
                        method: "custom",
                    });
                }
                let unnamed: Vec<&str> = caps
                    .iter()
                    .skip(1)
                    .flatten()
                    .map(|m| m.as_str())
                    .collect();
                if unnamed.len() >= 2 {
                    return Some(TeamExtraction {
                        team1: unnamed[0].trim().to_string(),
                        team2: unnamed[1].trim().to_string(),
                        method: "custom",
                    });
                }
            }
        }

        if self.skip_builtin {
            return None;
        }

        extract_teams_builtin(stream_name)
    }
}

fn compile_pattern(pattern: Option<&str>) -> Option<Regex> {
    let pattern = pattern?.trim();
    if pattern.is_empty() {
        return None;
    }
    match Regex::new(&format!("(?i){pattern}")) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("Invalid stream filter pattern '{}': {}", pattern, e);
            None
        }
    }
}

/// Builtin extraction for the common "Team A <sep> Team B" formats.
fn extract_teams_builtin(stream_name: &str) -> Option<TeamExtraction> {
    const PATTERNS: &[&str] = &[
        r"(?i)(.+?)\s+(?:vs\.?|versus)\s+(.+?)(?:\s*[\|\-\[]|$)",
        r"(?i)(.+?)\s+@\s+(.+?)(?:\s*[\|\-\[]|$)",
        r"(?i)(.+?)\s+at\s+(.+?)(?:\s*[\|\-\[]|$)",
        r"(?i)(.+?)\s+v\s+(.+?)(?:\s*[\|\-\[]|$)",
        r"(?i)(.+?)\s+-\s+(.+?)(?:\s*[\|\-\[]|$)",
    ];

    for pattern in PATTERNS {
        if let Ok(re) = Regex::new(pattern) {
            if let Some(caps) = re.captures(stream_name) {
                let team1 = caps[1].trim().to_string();
                let team2 = caps[2].trim().to_string();
                if !team1.is_empty() && !team2.is_empty() {
                    return Some(TeamExtraction {
                        team1,
                        team2,
                        method: "builtin",
                    });
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(id: i64, name: &str) -> SourceStream {
        SourceStream {
            id,
            name: name.to_string(),
            url: None,
            m3u_account_id: None,
            m3u_account_name: None,
            group_title: None,
        }
    }

    #[test]
    fn test_include_exclude_order_and_counts() {
        let filter = StreamFilter::new(&StreamFilterConfig {
            include_regex: Some("NFL".to_string()),
            include_enabled: true,
            exclude_regex: Some("Spanish".to_string()),
            exclude_enabled: true,
            ..Default::default()
        });

        let result = filter.filter(vec![
            stream(1, "NFL: Lions vs Packers"),
            stream(2, "NFL: Lions vs Packers Spanish"),
            stream(3, "NHL: Wings vs Hawks"),
        ]);

        assert_eq!(result.total_input, 3);
        assert_eq!(result.passed.len(), 1);
        assert_eq!(result.filtered_include, 1);
        assert_eq!(result.filtered_exclude, 1);
    }

    #[test]
    fn test_custom_extraction_named_groups() {
        let filter = StreamFilter::new(&StreamFilterConfig {
            custom_teams_regex: Some(r"(?P<team1>.+?) battles (?P<team2>.+)".to_string()),
            custom_teams_enabled: true,
            ..Default::default()
        });

        let extraction = filter.extract_teams("Lions battles Packers").unwrap();
        assert_eq!(extraction.team1, "Lions");
        assert_eq!(extraction.team2, "Packers");
        assert_eq!(extraction.method, "custom");
    }

    #[test]
    fn test_builtin_extraction() {
        let filter = StreamFilter::new(&StreamFilterConfig::default());
        let extraction = filter.extract_teams("Detroit Lions @ Green Bay Packers").unwrap();
        assert_eq!(extraction.team1, "Detroit Lions");
        assert_eq!(extraction.team2, "Green Bay Packers");
        assert_eq!(extraction.method, "builtin");
    }

    #[test]
    fn test_builtin_stops_at_delimiters() {
        let filter = StreamFilter::new(&StreamFilterConfig::default());
        let extraction = filter.extract_teams("Lions vs Packers | HD Feed").unwrap();
        assert_eq!(extraction.team2, "Packers");
    }

    #[test]
    fn test_builtin_dash_separator() {
        let filter = StreamFilter::new(&StreamFilterConfig::default());
        let extraction = filter.extract_teams("Real Madrid - Barcelona").unwrap();
        assert_eq!(extraction.team1, "Real Madrid");
        assert_eq!(extraction.team2, "Barcelona");
        assert_eq!(extraction.method, "builtin");
    }

    #[test]
    fn test_skip_builtin() {
        let filter = StreamFilter::new(&StreamFilterConfig {
            skip_builtin: true,
            ..Default::default()
        });
        assert!(filter.extract_teams("Lions vs Packers").is_none());
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        let filter = StreamFilter::new(&StreamFilterConfig {
            include_regex: Some("([unclosed".to_string()),
            include_enabled: true,
            ..Default::default()
        });
        // Invalid include pattern compiles to None; everything passes
        let result = filter.filter(vec![stream(1, "anything")]);
        assert_eq!(result.passed.len(), 1);
    }
}
