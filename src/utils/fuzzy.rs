//! Fuzzy string matching for team and event names
//!
//! Generates searchable patterns per team (full name, mascot-stripped name,
//! short name, abbreviation) and scores them against normalized stream text
//! using a strategy ladder: exact substring, word-boundary for short
//! patterns, token-set ratio, then partial ratio.

use crate::models::Team;
use deunicode::deunicode;
use regex::Regex;
use std::collections::BTreeSet;

/// Common abbreviations to expand before matching.
/// Sorted longest-first at use so "ufc fn" wins over "fn".
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("ufc fn", "ufc fight night"),
    ("fn", "fight night"),
    ("ppv", "pay per view"),
    ("vs", "versus"),
    ("v", "versus"),
];

/// Mascot/suffix words stripped to produce city-style patterns
/// ("Florida Atlantic Owls" -> "Florida Atlantic").
const MASCOT_WORDS: &[&str] = &[
    // Generic
    "team", "club", "fc", "sc", "cf", "united", "city",
    // NFL / NBA / NHL / MLB mascots
    "eagles", "owls", "lions", "tigers", "bears", "wolves", "hawks", "falcons", "panthers",
    "jaguars", "bengals", "colts", "broncos", "chargers", "raiders", "ravens", "cardinals",
    "seahawks", "dolphins", "bills", "jets", "giants", "patriots", "steelers", "browns",
    "packers", "vikings", "saints", "buccaneers", "cowboys", "commanders", "49ers", "rams",
    "chiefs", "texans", "titans", "cavaliers", "celtics", "bulls", "pistons", "pacers", "heat",
    "magic", "hornets", "wizards", "knicks", "nets", "76ers", "sixers", "raptors", "bucks",
    "timberwolves", "thunder", "blazers", "warriors", "kings", "lakers", "clippers", "suns",
    "nuggets", "jazz", "grizzlies", "pelicans", "spurs", "mavericks", "rockets", "bruins",
    "canadiens", "red wings", "blackhawks", "blues", "avalanche", "stars", "wild", "predators",
    "hurricanes", "lightning", "rangers", "islanders", "devils", "flyers", "penguins",
    "capitals", "blue jackets", "senators", "maple leafs", "sabres", "kraken", "golden knights",
    "flames", "oilers", "canucks", "sharks", "ducks", "coyotes",
    // College
    "bulldogs", "wildcats", "huskies", "cougars", "badgers", "gophers", "wolverines",
    "buckeyes", "spartans", "hoosiers", "boilermakers", "hawkeyes", "cornhuskers", "cyclones",
    "jayhawks", "sooners", "longhorns", "aggies", "razorbacks", "volunteers", "commodores",
    "crimson tide", "gators", "seminoles", "yellow jackets", "tar heels", "wolfpack", "hokies",
    "terrapins", "nittany lions", "orange", "mountaineers", "red raiders", "horned frogs",
    "mustangs", "golden eagles", "blue devils", "demon deacons", "fighting irish", "trojans",
    "beavers", "sun devils", "buffaloes", "utes", "rebels", "aztecs", "rainbow warriors",
    "retrievers", "black knights", "musketeers", "beacons", "lancers", "governors", "skyhawks",
    "tornados", "runnin' bulldogs",
    // Soccer
    "rovers", "wanderers", "albion", "athletic", "sporting", "real", "dynamo", "racing",
    "deportivo", "atletico", "inter", "ac", "as", "ss", "us",
    // Misc
    "mammoth", "roar", "glory", "phoenix", "rush", "black bears",
];

/// Minimum pattern length for substring matching. Shorter patterns
/// ("CHI", "TOR") use word-boundary matching so they can't land inside
/// city names.
const MIN_SUBSTRING_LENGTH: usize = 5;

#[derive(Debug, Clone)]
pub struct FuzzyMatchResult {
    pub matched: bool,
    pub score: f64,
    pub pattern_used: Option<String>,
}

impl FuzzyMatchResult {
    fn miss() -> Self {
        Self {
            matched: false,
            score: 0.0,
            pattern_used: None,
        }
    }

    fn hit(score: f64, pattern: &str) -> Self {
        Self {
            matched: true,
            score,
            pattern_used: Some(pattern.to_string()),
        }
    }
}

/// Fuzzy string matcher for team/event names.
pub struct FuzzyMatcher {
    /// Minimum score for a best_match full-string comparison (0-100)
    pub threshold: f64,
    /// Minimum score for token/partial strategies (0-100)
    pub partial_threshold: f64,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self {
            threshold: 85.0,
            partial_threshold: 90.0,
        }
    }
}

/// Normalize a name the same way stream text is normalized for matching:
/// accent fold, lowercase, punctuation to spaces, collapsed whitespace.
pub fn normalize_for_matching(value: &str) -> String {
    let folded = deunicode(value).to_lowercase();
    let cleaned: String = folded
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl FuzzyMatcher {
    pub fn new(threshold: f64, partial_threshold: f64) -> Self {
        Self {
            threshold,
            partial_threshold,
        }
    }

    /// Generate searchable patterns for a team, most specific first.
    pub fn generate_team_patterns(&self, team: &Team) -> Vec<String> {
        let mut patterns = Vec::new();
        let mut seen = BTreeSet::new();

        let mut add = |value: Option<&str>, patterns: &mut Vec<String>| {
            if let Some(value) = value {
                let normalized = normalize_for_matching(value);
                if normalized.len() >= 2 && seen.insert(normalized.clone()) {
                    patterns.push(normalized);
                }
            }
        };

        // Full name: "Florida Atlantic Owls"
        add(Some(&team.name), &mut patterns);
        // Name without mascot: "Florida Atlantic"
        let stripped = strip_mascot(&team.name);
        if stripped != team.name {
            add(Some(&stripped), &mut patterns);
        }
        // Short name and abbreviation
        add(team.short_name.as_deref(), &mut patterns);
        add(team.abbreviation.as_deref(), &mut patterns);

        patterns
    }

    /// Check whether any pattern matches within the text.
    pub fn matches_any(&self, patterns: &[String], text: &str) -> FuzzyMatchResult {
        let text_lower = expand_abbreviations(text);

        // Strategy 1: exact substring, long patterns only
        for pattern in patterns {
            if pattern.len() >= MIN_SUBSTRING_LENGTH && text_lower.contains(pattern.as_str()) {
                return FuzzyMatchResult::hit(100.0, pattern);
            }
        }

        // Strategy 2: word boundary for short patterns (abbreviations)
        for pattern in patterns {
            if pattern.len() < MIN_SUBSTRING_LENGTH {
                let word_pattern = format!(r"\b{}\b", regex::escape(pattern));
                if let Ok(re) = Regex::new(&word_pattern) {
                    if re.is_match(&text_lower) {
                        return FuzzyMatchResult::hit(100.0, pattern);
                    }
                }
            }
        }

        // Strategy 3: token set ratio (word order, extra words)
        for pattern in patterns {
            if pattern.len() >= MIN_SUBSTRING_LENGTH {
                let score = token_set_ratio(pattern, &text_lower);
                if score >= self.partial_threshold {
                    return FuzzyMatchResult::hit(score, pattern);
                }
            }
        }

        // Strategy 4: partial ratio (substrings)
        for pattern in patterns {
            if pattern.len() >= MIN_SUBSTRING_LENGTH {
                let score = partial_ratio(pattern, &text_lower);
                if score >= self.partial_threshold {
                    return FuzzyMatchResult::hit(score, pattern);
                }
            }
        }

        FuzzyMatchResult::miss()
    }

    /// Best raw score (0-100) of any pattern against the text, without
    /// threshold gating. Callers that need graded confidence (the team
    /// matcher's 60/75/85 ladder) use this instead of `matches_any`.
    pub fn score_patterns(&self, patterns: &[String], text: &str) -> f64 {
        let text_lower = expand_abbreviations(text);
        let mut best: f64 = 0.0;

        for pattern in patterns {
            let score = if pattern.len() >= MIN_SUBSTRING_LENGTH {
                if text_lower.contains(pattern.as_str()) {
                    100.0
                } else {
                    token_set_ratio(pattern, &text_lower).max(partial_ratio(pattern, &text_lower))
                }
            } else {
                let word_pattern = format!(r"\b{}\b", regex::escape(pattern));
                match Regex::new(&word_pattern) {
                    Ok(re) if re.is_match(&text_lower) => 100.0,
                    _ => 0.0,
                }
            };
            if score > best {
                best = score;
            }
            if best >= 100.0 {
                break;
            }
        }
        best
    }

    /// Find the best matching candidate for a pattern.
    pub fn best_match<'a>(&self, pattern: &str, candidates: &'a [String]) -> Option<(&'a str, f64)> {
        let pattern_lower = pattern.to_lowercase();
        let mut best: Option<(&str, f64)> = None;

        for candidate in candidates {
            let candidate_lower = candidate.to_lowercase();
            let score = ratio(&pattern_lower, &candidate_lower)
                .max(token_set_ratio(&pattern_lower, &candidate_lower))
                .max(partial_ratio(&pattern_lower, &candidate_lower));
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((candidate.as_str(), score));
            }
        }

        best.filter(|(_, score)| *score >= self.threshold)
    }
}

/// Strip mascot/suffix words from a team name.
///
/// "Toronto Maple Leafs" -> "Toronto", "Columbus Blue Jackets" -> "Columbus".
pub fn strip_mascot(name: &str) -> String {
    let mut name = name.to_string();
    let name_lower = name.to_lowercase();

    // Multi-word mascots first, longest wins, only one stripped from the end
    let mut multi_word: Vec<&&str> = MASCOT_WORDS.iter().filter(|m| m.contains(' ')).collect();
    multi_word.sort_by_key(|m| std::cmp::Reverse(m.len()));
    for mascot in multi_word {
        if name_lower.ends_with(&format!(" {mascot}")) {
            name.truncate(name.len() - mascot.len() - 1);
            break;
        }
    }

    // Then single-word mascots anywhere
    let kept: Vec<&str> = name
        .split_whitespace()
        .filter(|word| {
            let clean = word.to_lowercase();
            let clean = clean.trim_matches(|c: char| "'\".,".contains(c));
            !MASCOT_WORDS.contains(&clean)
        })
        .collect();

    if kept.is_empty() {
        name
    } else {
        kept.join(" ")
    }
}

/// Expand known abbreviations in text, longest first.
fn expand_abbreviations(text: &str) -> String {
    let mut result = text.to_lowercase();
    let mut abbrevs: Vec<&(&str, &str)> = ABBREVIATIONS.iter().collect();
    abbrevs.sort_by_key(|(abbrev, _)| std::cmp::Reverse(abbrev.len()));

    for (abbrev, expansion) in abbrevs {
        let pattern = format!(r"\b{}\b", regex::escape(abbrev));
        if let Ok(re) = Regex::new(&pattern) {
            result = re.replace_all(&result, *expansion).to_string();
        }
    }
    result
}

/// Plain similarity ratio (0-100) via normalized Levenshtein.
pub fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b) * 100.0
}

/// Token-set ratio: compares sorted word intersections and remainders so
/// word order and extra words don't hurt the score.
/// "atlanta falcons" vs "falcons @ atlanta" scores 100.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let diff_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let diff_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    let sect = intersection.join(" ");
    let sect_a = if diff_a.is_empty() {
        sect.clone()
    } else if sect.is_empty() {
        diff_a.join(" ")
    } else {
        format!("{} {}", sect, diff_a.join(" "))
    };
    let sect_b = if diff_b.is_empty() {
        sect.clone()
    } else if sect.is_empty() {
        diff_b.join(" ")
    } else {
        format!("{} {}", sect, diff_b.join(" "))
    };

    if !sect.is_empty() && (diff_a.is_empty() || diff_b.is_empty()) {
        return 100.0;
    }

    ratio(&sect, &sect_a)
        .max(ratio(&sect, &sect_b))
        .max(ratio(&sect_a, &sect_b))
}

/// Partial ratio: best score of the shorter string slid across same-length
/// windows of the longer one. "florida atlantic" scores 100 inside
/// "florida atlantic owls".
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };

    let short_chars: Vec<char> = shorter.chars().collect();
    let long_chars: Vec<char> = longer.chars().collect();

    if short_chars.is_empty() {
        return 0.0;
    }
    if short_chars.len() == long_chars.len() {
        return ratio(shorter, longer);
    }

    let window = short_chars.len();
    let mut best: f64 = 0.0;
    for start in 0..=(long_chars.len() - window) {
        let slice: String = long_chars[start..start + window].iter().collect();
        let score = ratio(shorter, &slice);
        if score > best {
            best = score;
        }
        if best >= 100.0 {
            break;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(name: &str, short: Option<&str>, abbrev: Option<&str>) -> Team {
        Team {
            id: "1".to_string(),
            name: name.to_string(),
            short_name: short.map(String::from),
            abbreviation: abbrev.map(String::from),
            logo_url: None,
            sport: None,
        }
    }

    #[test]
    fn test_pattern_generation_strips_mascot() {
        let matcher = FuzzyMatcher::default();
        let patterns =
            matcher.generate_team_patterns(&team("Florida Atlantic Owls", Some("FAU"), None));
        assert!(patterns.contains(&"florida atlantic owls".to_string()));
        assert!(patterns.contains(&"florida atlantic".to_string()));
        assert!(patterns.contains(&"fau".to_string()));
    }

    #[test]
    fn test_multi_word_mascot() {
        assert_eq!(strip_mascot("Toronto Maple Leafs"), "Toronto");
        assert_eq!(strip_mascot("Columbus Blue Jackets"), "Columbus");
        assert_eq!(strip_mascot("Chicago Blackhawks"), "Chicago");
    }

    #[test]
    fn test_short_pattern_word_boundary() {
        let matcher = FuzzyMatcher::default();
        let patterns = vec!["chi".to_string()];
        // "chi" must not land inside "chicago"
        assert!(!matcher.matches_any(&patterns, "chicago fire tv").matched);
        // but matches as a standalone word
        assert!(matcher.matches_any(&patterns, "chi @ det").matched);
    }

    #[test]
    fn test_substring_match_long_pattern() {
        let matcher = FuzzyMatcher::default();
        let patterns = vec!["detroit lions".to_string()];
        let result = matcher.matches_any(&patterns, "detroit lions vs green bay packers");
        assert!(result.matched);
        assert_eq!(result.score, 100.0);
    }

    #[test]
    fn test_token_set_handles_word_order() {
        let score = token_set_ratio("atlanta falcons", "falcons @ atlanta");
        assert!(score >= 95.0, "score was {score}");
    }

    #[test]
    fn test_partial_ratio_substring() {
        let score = partial_ratio("florida atlantic", "florida atlantic owls");
        assert!(score >= 99.0, "score was {score}");
    }

    #[test]
    fn test_abbreviation_expansion() {
        let matcher = FuzzyMatcher::default();
        let patterns = vec!["ufc fight night".to_string()];
        assert!(matcher.matches_any(&patterns, "UFC FN Prelims").matched);
    }

    #[test]
    fn test_normalize_for_matching_folds_accents() {
        assert_eq!(normalize_for_matching("Atlético Madrid"), "atletico madrid");
        assert_eq!(normalize_for_matching("Saint-Étienne"), "saint etienne");
    }

    #[test]
    fn test_best_match_picks_highest_scorer() {
        let matcher = FuzzyMatcher::default();
        let candidates = vec![
            "detroit lions".to_string(),
            "detroit red wings".to_string(),
            "dallas cowboys".to_string(),
        ];
        let (best, score) = matcher.best_match("detroit lions", &candidates).unwrap();
        assert_eq!(best, "detroit lions");
        assert_eq!(score, 100.0);

        assert!(matcher.best_match("zzzzz", &candidates).is_none());
    }
}
