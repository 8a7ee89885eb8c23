//! Rule-based stream ordering
//!
//! Rules are evaluated ascending by priority; the first matching rule
//! assigns its priority, non-matching streams get 999. The final sort is
//! (computed_priority, added_at) for stable output.

use crate::models::{ManagedChannelStream, OrderingRuleType, StreamOrderingRule};
use regex::Regex;
use std::collections::HashMap;
use uuid::Uuid;

/// Priority for streams no rule matches; sorts to the end.
pub const NO_MATCH_PRIORITY: i64 = 999;

pub struct StreamOrderingService {
    rules: Vec<StreamOrderingRule>,
    compiled_regex: HashMap<String, Option<Regex>>,
    /// source_group_id -> group name, pre-fetched by the caller
    group_names: HashMap<Uuid, String>,
}

impl StreamOrderingService {
    pub fn new(mut rules: Vec<StreamOrderingRule>, group_names: HashMap<Uuid, String>) -> Self {
        rules.retain(|r| r.enabled);
        rules.sort_by_key(|r| r.priority);

        // Pre-compile regex rules; invalid patterns warn once and never match
        let mut compiled_regex = HashMap::new();
        for rule in rules.iter().filter(|r| r.rule_type == OrderingRuleType::Regex) {
            let compiled = match Regex::new(&format!("(?i){}", rule.value)) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!("Invalid ordering rule pattern '{}': {}", rule.value, e);
                    None
                }
            };
            compiled_regex.insert(rule.value.clone(), compiled);
        }

        Self {
            rules,
            compiled_regex,
            group_names,
        }
    }

    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Priority for one stream: first matching rule wins.
    pub fn compute_priority(&self, stream: &ManagedChannelStream) -> i64 {
        for rule in &self.rules {
            if self.matches(stream, rule) {
                return rule.priority;
            }
        }
        NO_MATCH_PRIORITY
    }

    /// Sort streams by (computed priority, added_at).
    pub fn sort_streams(&self, mut streams: Vec<ManagedChannelStream>) -> Vec<ManagedChannelStream> {
        if self.rules.is_empty() {
            streams.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.added_at.cmp(&b.added_at)));
            return streams;
        }

        streams.sort_by(|a, b| {
            self.compute_priority(a)
                .cmp(&self.compute_priority(b))
                .then(a.added_at.cmp(&b.added_at))
        });
        streams
    }

    fn matches(&self, stream: &ManagedChannelStream, rule: &StreamOrderingRule) -> bool {
        match rule.rule_type {
            OrderingRuleType::M3u => stream
                .m3u_account_name
                .as_deref()
                .map(|name| name.eq_ignore_ascii_case(&rule.value))
                .unwrap_or(false),
            OrderingRuleType::Group => stream
                .source_group_id
                .and_then(|id| self.group_names.get(&id))
                .map(|name| name.eq_ignore_ascii_case(&rule.value))
                .unwrap_or(false),
            OrderingRuleType::Regex => stream
                .stream_name
                .as_deref()
                .and_then(|name| {
                    self.compiled_regex
                        .get(&rule.value)
                        .and_then(|re| re.as_ref())
                        .map(|re| re.is_match(name))
                })
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceGroupType;
    use chrono::{Duration, Utc};

    fn rule(rule_type: OrderingRuleType, value: &str, priority: i64) -> StreamOrderingRule {
        StreamOrderingRule {
            id: Uuid::new_v4(),
            rule_type,
            value: value.to_string(),
            priority,
            enabled: true,
        }
    }

    fn stream(
        name: &str,
        account: Option<&str>,
        group: Option<Uuid>,
        added_offset_secs: i64,
    ) -> ManagedChannelStream {
        ManagedChannelStream {
            id: Uuid::new_v4(),
            managed_channel_id: Uuid::new_v4(),
            dispatcharr_stream_id: 1,
            stream_name: Some(name.to_string()),
            priority: 0,
            source_group_id: group,
            source_group_type: SourceGroupType::Main,
            m3u_account_id: None,
            m3u_account_name: account.map(String::from),
            exception_keyword: None,
            added_at: (Utc::now() + Duration::seconds(added_offset_secs)).naive_utc(),
            removed_at: None,
            remove_reason: None,
        }
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let service = StreamOrderingService::new(
            vec![
                rule(OrderingRuleType::M3u, "Premium", 1),
                rule(OrderingRuleType::Regex, "premium", 5),
            ],
            HashMap::new(),
        );
        let s = stream("Premium Feed", Some("Premium"), None, 0);
        assert_eq!(service.compute_priority(&s), 1);
    }

    #[test]
    fn test_no_match_gets_999() {
        let service = StreamOrderingService::new(
            vec![rule(OrderingRuleType::M3u, "Premium", 1)],
            HashMap::new(),
        );
        let s = stream("Backup Feed", Some("Budget"), None, 0);
        assert_eq!(service.compute_priority(&s), NO_MATCH_PRIORITY);
    }

    #[test]
    fn test_group_rule_uses_lookup() {
        let group_id = Uuid::new_v4();
        let mut names = HashMap::new();
        names.insert(group_id, "Sports Backup".to_string());

        let service =
            StreamOrderingService::new(vec![rule(OrderingRuleType::Group, "sports backup", 3)], names);
        let s = stream("Any", None, Some(group_id), 0);
        assert_eq!(service.compute_priority(&s), 3);
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let service = StreamOrderingService::new(
            vec![rule(OrderingRuleType::Regex, "([bad", 1)],
            HashMap::new(),
        );
        let s = stream("([bad", None, None, 0);
        assert_eq!(service.compute_priority(&s), NO_MATCH_PRIORITY);
    }

    #[test]
    fn test_sort_ties_break_on_added_at() {
        let service = StreamOrderingService::new(
            vec![rule(OrderingRuleType::Regex, "feed", 1)],
            HashMap::new(),
        );
        let older = stream("Feed A", None, None, 0);
        let newer = stream("Feed B", None, None, 60);
        let older_id = older.id;

        let sorted = service.sort_streams(vec![newer, older]);
        assert_eq!(sorted[0].id, older_id);
    }
}
