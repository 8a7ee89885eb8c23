pub mod channel_manager;
pub mod epg;
pub mod league_mappings;
pub mod lifecycle;
pub mod progress;
pub mod reconciler;
pub mod stream_filter;
pub mod stream_ordering;
pub mod team_cache;
