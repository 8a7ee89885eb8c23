//! Detection pattern tables
//!
//! These tables are the classifier's domain knowledge: combat-sport keywords,
//! league/sport hints, placeholder markers, card segments, exclusions, and
//! game separators. Users can override them through the `detection_keywords`
//! table; `DetectionKeywordService` compiles the union and swaps the whole
//! compiled set atomically on invalidation.

use regex::Regex;
use std::sync::{Arc, RwLock};

/// Keywords that indicate combat sports (EVENT_CARD category).
const COMBAT_SPORTS_KEYWORDS: &[&str] = &[
    "ufc", "mma", "bellator", "pfl", "one championship", "one fc", "cage warriors", "invicta",
    "boxing", "fight night", "main card", "prelims", "early prelims",
];

/// League hint patterns. A hint may map to several codes for umbrella brands.
const LEAGUE_HINT_PATTERNS: &[(&str, &[&str])] = &[
    (r"\bNFL\b", &["nfl"]),
    (r"\bNBA\b", &["nba"]),
    (r"\bWNBA\b", &["wnba"]),
    (r"\bMLB\b", &["mlb"]),
    (r"\bNHL\b", &["nhl"]),
    (r"\bAHL\b", &["ahl"]),
    (r"\bCFL\b", &["cfl"]),
    (r"\bMLS\b", &["usa.1"]),
    (r"\bNCAAF\b|college football", &["college-football"]),
    (r"\bNCAAM\b|college basketball", &["mens-college-basketball"]),
    (r"\bNCAA\b", &["college-football", "mens-college-basketball", "womens-college-basketball"]),
    (r"premier league|\bEPL\b", &["eng.1"]),
    (r"la liga", &["esp.1"]),
    (r"bundesliga", &["ger.1"]),
    (r"serie a", &["ita.1"]),
    (r"ligue 1", &["fra.1"]),
    (r"liga mx", &["mex.1"]),
    (r"champions league|\bUCL\b", &["uefa.champions"]),
    (r"europa league", &["uefa.europa"]),
    (r"\bUFC\b", &["ufc"]),
    (r"\bPFL\b", &["pfl"]),
    (r"bellator", &["bellator"]),
];

/// Sport hint patterns.
const SPORT_HINT_PATTERNS: &[(&str, &str)] = &[
    (r"\bhockey\b", "hockey"),
    (r"\bbasketball\b", "basketball"),
    (r"american football|\bNFL\b|\bNCAAF\b", "football"),
    (r"\bsoccer\b|\bfutbol\b|premier league|la liga|bundesliga|serie a|ligue 1", "soccer"),
    (r"\bbaseball\b|\bMLB\b", "baseball"),
    (r"\bMMA\b|\bUFC\b|bellator|\bPFL\b", "mma"),
    (r"\bboxing\b", "boxing"),
    (r"\brugby\b", "rugby"),
    (r"\bcricket\b", "cricket"),
    (r"\btennis\b", "tennis"),
    (r"\bgolf\b", "golf"),
];

/// Placeholder/filler stream patterns. These are filtered, not failed.
const PLACEHOLDER_PATTERNS: &[&str] = &[
    r"no\s+event",
    r"no\s+game",
    r"placeholder",
    r"off\s*air",
    r"coming\s+soon",
    r"\bTBA\b|to\s+be\s+announced",
    r"\bTBD\b",
    r"stand\s*by",
    r"24/7",
    r"^channel\s+\d+$",
];

/// Card segment patterns. Early prelims must be checked before prelims:
/// first match wins and "early prelims" contains "prelims".
const CARD_SEGMENT_PATTERNS: &[(&str, &str)] = &[
    (r"early\s+prelims?", "early_prelims"),
    (r"prelims?", "prelims"),
    (r"main\s+card|main\s+event", "main_card"),
    (r"full\s+card|entire\s+card|combined", "combined"),
];

/// Combat-sports content that is not the event itself.
const COMBAT_SPORTS_EXCLUDE_PATTERNS: &[&str] = &[
    r"weigh[\s-]?ins?",
    r"press\s+conference",
    r"\bpresser\b",
    r"post[\s-]?fight",
    r"face[\s-]?offs?",
    r"\bembedded\b",
    r"\bcountdown\b",
    r"ceremonial",
];

/// Game separator tokens, checked in this order.
const GAME_SEPARATORS: &[&str] = &[" vs ", " @ ", " at ", " v "];

/// A user-defined pattern override from the `detection_keywords` table.
#[derive(Debug, Clone)]
pub struct DetectionKeywordRow {
    pub category: String,
    pub pattern: String,
    pub value: Option<String>,
}

/// Compiled pattern set. Rebuilt wholesale on invalidation so readers always
/// see a consistent snapshot.
pub struct PatternSet {
    pub combat_keywords: Vec<String>,
    pub league_hints: Vec<(Regex, Vec<String>)>,
    pub sport_hints: Vec<(Regex, String)>,
    pub placeholder_patterns: Vec<Regex>,
    pub card_segment_patterns: Vec<(Regex, String)>,
    pub exclusion_patterns: Vec<Regex>,
    pub separators: Vec<String>,
}

impl PatternSet {
    /// Compile the builtin tables plus any user overrides.
    pub fn build(overrides: &[DetectionKeywordRow]) -> Self {
        let mut set = Self {
            combat_keywords: COMBAT_SPORTS_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            league_hints: compile_hint_table(LEAGUE_HINT_PATTERNS),
            sport_hints: SPORT_HINT_PATTERNS
                .iter()
                .filter_map(|(p, v)| compile(p).map(|re| (re, v.to_string())))
                .collect(),
            placeholder_patterns: PLACEHOLDER_PATTERNS.iter().filter_map(|p| compile(p)).collect(),
            card_segment_patterns: CARD_SEGMENT_PATTERNS
                .iter()
                .filter_map(|(p, v)| compile(p).map(|re| (re, v.to_string())))
                .collect(),
            exclusion_patterns: COMBAT_SPORTS_EXCLUDE_PATTERNS
                .iter()
                .filter_map(|p| compile(p))
                .collect(),
            separators: GAME_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        };

        for row in overrides {
            match row.category.as_str() {
                "combat_keyword" => set.combat_keywords.push(row.pattern.to_lowercase()),
                "league_hint" => {
                    if let (Some(re), Some(value)) = (compile(&row.pattern), &row.value) {
                        let codes = value.split(',').map(|c| c.trim().to_string()).collect();
                        set.league_hints.push((re, codes));
                    }
                }
                "sport_hint" => {
                    if let (Some(re), Some(value)) = (compile(&row.pattern), &row.value) {
                        set.sport_hints.push((re, value.clone()));
                    }
                }
                "placeholder" => {
                    if let Some(re) = compile(&row.pattern) {
                        set.placeholder_patterns.push(re);
                    }
                }
                "card_segment" => {
                    if let (Some(re), Some(value)) = (compile(&row.pattern), &row.value) {
                        set.card_segment_patterns.push((re, value.clone()));
                    }
                }
                "combat_exclusion" => {
                    if let Some(re) = compile(&row.pattern) {
                        set.exclusion_patterns.push(re);
                    }
                }
                other => {
                    tracing::warn!("Unknown detection keyword category '{}'", other);
                }
            }
        }

        set
    }

    pub fn is_combat_sport(&self, text: &str) -> bool {
        let text_lower = text.to_lowercase();
        self.combat_keywords.iter().any(|k| text_lower.contains(k))
    }

    pub fn detect_leagues(&self, text: &str) -> Option<Vec<String>> {
        self.league_hints
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|(_, codes)| codes.clone())
    }

    pub fn detect_sport(&self, text: &str) -> Option<String> {
        self.sport_hints
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|(_, sport)| sport.clone())
    }

    pub fn is_placeholder(&self, text: &str) -> bool {
        self.placeholder_patterns.iter().any(|re| re.is_match(text))
    }

    pub fn detect_card_segment(&self, text: &str) -> Option<String> {
        self.card_segment_patterns
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|(_, segment)| segment.clone())
    }

    pub fn is_excluded(&self, text: &str) -> bool {
        self.exclusion_patterns.iter().any(|re| re.is_match(text))
    }

    /// Find the first game separator present in the text.
    pub fn find_separator(&self, text: &str) -> Option<(String, usize)> {
        let text_lower = text.to_lowercase();
        for sep in &self.separators {
            if let Some(pos) = text_lower.find(sep.as_str()) {
                return Some((sep.clone(), pos));
            }
        }
        None
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(&format!("(?i){pattern}")) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("Invalid detection pattern '{}': {}", pattern, e);
            None
        }
    }
}

fn compile_hint_table(table: &[(&str, &[&str])]) -> Vec<(Regex, Vec<String>)> {
    table
        .iter()
        .filter_map(|(pattern, codes)| {
            compile(pattern).map(|re| (re, codes.iter().map(|c| c.to_string()).collect()))
        })
        .collect()
}

/// Process-wide pattern service. Reads are lock-cheap Arc clones; updates
/// replace the whole compiled set atomically.
#[derive(Clone)]
pub struct DetectionKeywordService {
    inner: Arc<RwLock<Arc<PatternSet>>>,
}

impl Default for DetectionKeywordService {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl DetectionKeywordService {
    pub fn new(overrides: &[DetectionKeywordRow]) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(PatternSet::build(overrides)))),
        }
    }

    /// Current compiled pattern set snapshot.
    pub fn current(&self) -> Arc<PatternSet> {
        self.inner.read().expect("pattern lock poisoned").clone()
    }

    /// Rebuild patterns after the `detection_keywords` table changed.
    pub fn invalidate(&self, overrides: &[DetectionKeywordRow]) {
        let rebuilt = Arc::new(PatternSet::build(overrides));
        *self.inner.write().expect("pattern lock poisoned") = rebuilt;
        tracing::info!("Detection pattern cache invalidated and rebuilt");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_segment_order() {
        let set = PatternSet::build(&[]);
        // "early prelims" must win over the bare "prelims" pattern
        assert_eq!(
            set.detect_card_segment("UFC 315 Early Prelims").as_deref(),
            Some("early_prelims")
        );
        assert_eq!(
            set.detect_card_segment("UFC 315 Prelims").as_deref(),
            Some("prelims")
        );
        assert_eq!(
            set.detect_card_segment("UFC 315 Main Card").as_deref(),
            Some("main_card")
        );
    }

    #[test]
    fn test_umbrella_league_hint() {
        let set = PatternSet::build(&[]);
        let codes = set.detect_leagues("NCAA Game 5").unwrap();
        assert!(codes.len() > 1);
        assert!(codes.contains(&"college-football".to_string()));
    }

    #[test]
    fn test_exclusion_patterns() {
        let set = PatternSet::build(&[]);
        assert!(set.is_excluded("UFC 315 Weigh-In"));
        assert!(set.is_excluded("UFC 315 Press Conference"));
        assert!(!set.is_excluded("UFC 315 Main Card"));
    }

    #[test]
    fn test_separator_order() {
        let set = PatternSet::build(&[]);
        let (sep, _) = set.find_separator("Lions vs Packers").unwrap();
        assert_eq!(sep, " vs ");
        let (sep, pos) = set.find_separator("Lions @ Packers").unwrap();
        assert_eq!(sep, " @ ");
        assert_eq!(pos, 5);
    }

    #[test]
    fn test_user_override() {
        let rows = vec![DetectionKeywordRow {
            category: "placeholder".to_string(),
            pattern: r"dead\s+feed".to_string(),
            value: None,
        }];
        let set = PatternSet::build(&rows);
        assert!(set.is_placeholder("Dead Feed 3"));
    }

    #[test]
    fn test_invalidate_swaps_set() {
        let service = DetectionKeywordService::default();
        assert!(!service.current().is_placeholder("dead feed"));
        service.invalidate(&[DetectionKeywordRow {
            category: "placeholder".to_string(),
            pattern: "dead feed".to_string(),
            value: None,
        }]);
        assert!(service.current().is_placeholder("dead feed"));
    }
}
