//! Settings singleton load/update
//!
//! One row (id = 1) holds every knob; sections are JSON blobs deserialized
//! through serde with per-field defaults, so unknown or missing keys never
//! break a load.

use crate::models::settings::{
    DispatcharrSettings, DurationSettings, EpgSettings, LifecycleSettings,
    ReconciliationSettings, SchedulerSettings, Settings,
};
use anyhow::Result;
use sqlx::{Pool, Sqlite};

pub async fn get_settings(pool: &Pool<Sqlite>) -> Result<Settings> {
    let row: (i64, String, String, String, String, String, String, String, i64) = sqlx::query_as(
        "SELECT schema_version, user_timezone, dispatcharr, lifecycle, scheduler,
                epg, durations, reconciliation, processing_generation
         FROM settings WHERE id = 1",
    )
    .fetch_one(pool)
    .await?;

    let (
        schema_version,
        user_timezone,
        dispatcharr,
        lifecycle,
        scheduler,
        epg,
        durations,
        reconciliation,
        processing_generation,
    ) = row;

    Ok(Settings {
        schema_version,
        user_timezone,
        dispatcharr: parse_section(&dispatcharr, "dispatcharr"),
        lifecycle: parse_section(&lifecycle, "lifecycle"),
        scheduler: parse_section(&scheduler, "scheduler"),
        epg: parse_section(&epg, "epg"),
        durations: parse_section(&durations, "durations"),
        reconciliation: parse_section(&reconciliation, "reconciliation"),
        processing_generation,
    })
}

fn parse_section<T: serde::de::DeserializeOwned + Default>(raw: &str, name: &str) -> T {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("Settings section '{}' unreadable ({}), using defaults", name, e);
        T::default()
    })
}

pub async fn update_user_timezone(pool: &Pool<Sqlite>, timezone: &str) -> Result<()> {
    sqlx::query("UPDATE settings SET user_timezone = ? WHERE id = 1")
        .bind(timezone)
        .execute(pool)
        .await?;
    Ok(())
}

macro_rules! section_updater {
    ($fn_name:ident, $column:literal, $ty:ty) => {
        pub async fn $fn_name(pool: &Pool<Sqlite>, section: &$ty) -> Result<()> {
            let raw = serde_json::to_string(section)?;
            sqlx::query(concat!("UPDATE settings SET ", $column, " = ? WHERE id = 1"))
                .bind(raw)
                .execute(pool)
                .await?;
            Ok(())
        }
    };
}

section_updater!(update_dispatcharr_settings, "dispatcharr", DispatcharrSettings);
section_updater!(update_lifecycle_settings, "lifecycle", LifecycleSettings);
section_updater!(update_scheduler_settings, "scheduler", SchedulerSettings);
section_updater!(update_epg_settings, "epg", EpgSettings);
section_updater!(update_duration_settings, "durations", DurationSettings);
section_updater!(
    update_reconciliation_settings,
    "reconciliation",
    ReconciliationSettings
);

/// Increment and return the processing generation. Called once at the start
/// of each full engine run; fingerprint-cache staleness is measured against
/// this counter.
pub async fn next_processing_generation(pool: &Pool<Sqlite>) -> Result<i64> {
    sqlx::query("UPDATE settings SET processing_generation = processing_generation + 1 WHERE id = 1")
        .execute(pool)
        .await?;
    Ok(
        sqlx::query_scalar("SELECT processing_generation FROM settings WHERE id = 1")
            .fetch_one(pool)
            .await?,
    )
}
