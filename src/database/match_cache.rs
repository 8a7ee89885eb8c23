//! Fingerprint cache (stream_match_cache)
//!
//! Keyed by (group, fingerprint) where the fingerprint is the stable
//! normalized stream name. A stored entry carries a serialized Event
//! snapshot so cached streams resolve without any provider call, plus the
//! generation that last confirmed it and the normalization version that
//! produced the key. Entries are not time-evicted: date-mismatched hits are
//! skipped at read time and generation cleanup ages out the rest.

use crate::matching::outcome::MatchMethod;
use crate::matching::NORMALIZATION_VERSION;
use crate::models::Event;
use anyhow::Result;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct MatchCacheEntry {
    pub event_id: String,
    pub league: String,
    pub event: Event,
    /// The method that originally produced this match (never CACHE).
    pub match_method: Option<MatchMethod>,
    pub generation: i64,
}

/// Look up a cached match. Entries written under a different normalization
/// version are invisible: a drifted normalizer would otherwise silently key
/// new lookups away from old entries.
pub async fn get(
    pool: &Pool<Sqlite>,
    group_id: Uuid,
    fingerprint: &str,
) -> Result<Option<MatchCacheEntry>> {
    let row: Option<(String, String, String, String, i64)> = sqlx::query_as(
        "SELECT event_id, league, cached_event, match_method, generation
         FROM stream_match_cache
         WHERE event_epg_group_id = ? AND fingerprint = ? AND normalization_version = ?",
    )
    .bind(group_id)
    .bind(fingerprint)
    .bind(NORMALIZATION_VERSION)
    .fetch_optional(pool)
    .await?;

    let Some((event_id, league, cached_event, match_method, generation)) = row else {
        return Ok(None);
    };

    let event: Event = match serde_json::from_str(&cached_event) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                "Dropping unreadable cache entry for fingerprint '{}': {}",
                fingerprint,
                e
            );
            delete(pool, group_id, fingerprint).await?;
            return Ok(None);
        }
    };

    Ok(Some(MatchCacheEntry {
        event_id,
        league,
        event,
        match_method: MatchMethod::parse(&match_method),
        generation,
    }))
}

/// Store a successful match. The caller passes the ORIGINAL match method —
/// even when the immediate source was itself a cache hit — so diagnostics
/// can always report "Cache (origin: fuzzy)".
pub async fn set(
    pool: &Pool<Sqlite>,
    group_id: Uuid,
    fingerprint: &str,
    event: &Event,
    league: &str,
    generation: i64,
    match_method: MatchMethod,
) -> Result<()> {
    let snapshot = serde_json::to_string(event)?;
    sqlx::query(
        r#"
        INSERT INTO stream_match_cache
            (event_epg_group_id, fingerprint, event_id, league, cached_event,
             match_method, generation, normalization_version, last_touched)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
        ON CONFLICT (event_epg_group_id, fingerprint) DO UPDATE SET
            event_id = excluded.event_id,
            league = excluded.league,
            cached_event = excluded.cached_event,
            match_method = excluded.match_method,
            generation = excluded.generation,
            normalization_version = excluded.normalization_version,
            last_touched = excluded.last_touched
        "#,
    )
    .bind(group_id)
    .bind(fingerprint)
    .bind(&event.id)
    .bind(league)
    .bind(snapshot)
    .bind(match_method.as_str())
    .bind(generation)
    .bind(NORMALIZATION_VERSION)
    .execute(pool)
    .await?;
    Ok(())
}

/// Refresh an entry's generation and touch timestamp on a cache hit.
pub async fn touch(
    pool: &Pool<Sqlite>,
    group_id: Uuid,
    fingerprint: &str,
    generation: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE stream_match_cache
         SET generation = ?, last_touched = datetime('now')
         WHERE event_epg_group_id = ? AND fingerprint = ?",
    )
    .bind(generation)
    .bind(group_id)
    .bind(fingerprint)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &Pool<Sqlite>, group_id: Uuid, fingerprint: &str) -> Result<()> {
    sqlx::query(
        "DELETE FROM stream_match_cache WHERE event_epg_group_id = ? AND fingerprint = ?",
    )
    .bind(group_id)
    .bind(fingerprint)
    .execute(pool)
    .await?;
    Ok(())
}

/// Remove entries ≥2 generations behind, plus anything written under an
/// older normalization version.
pub async fn cleanup_stale(pool: &Pool<Sqlite>, current_generation: i64) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM stream_match_cache
         WHERE generation <= ? OR normalization_version < ?",
    )
    .bind(current_generation - 2)
    .bind(NORMALIZATION_VERSION)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn entry_count(pool: &Pool<Sqlite>) -> Result<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM stream_match_cache")
            .fetch_one(pool)
            .await?,
    )
}
