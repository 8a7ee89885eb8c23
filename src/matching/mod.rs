//! Stream-to-event matching
//!
//! The pipeline: `normalizer` cleans a raw stream name, `classifier` buckets
//! it, then `team_matcher` / `event_card` resolve it to a provider event, and
//! `ufc_segments` expands UFC matches into per-segment channels. All outcomes
//! are discriminated values in `outcome`, never errors.

pub mod classifier;
pub mod event_card;
pub mod normalizer;
pub mod outcome;
pub mod patterns;
pub mod team_matcher;
pub mod ufc_segments;

/// How far back to search for events when matching streams. Past events
/// still match so just-finished games can attach scores; the lifecycle
/// layer excludes them afterwards.
pub const MATCH_WINDOW_DAYS: i64 = 30;

/// Bump when the normalizer output changes shape. Fingerprint cache entries
/// written under an older version are invisible and get evicted, because a
/// drifted normalization silently orphans historical cache keys.
pub const NORMALIZATION_VERSION: i64 = 1;
