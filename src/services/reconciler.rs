//! Reconciliation (C13)
//!
//! Three-way diff between the engine database, the downstream channel
//! manager, and the live channel-number space. Issues are tagged variants;
//! auto-fixes are individually gated by the reconciliation settings. Runs
//! detect-only on schedule and optionally fixing on demand or at startup.

use crate::database::{channel_numbers, channels, history, Database};
use crate::dispatcharr::DispatcharrClient;
use crate::models::settings::ReconciliationSettings;
use crate::models::ManagedChannel;
use anyhow::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};
use uuid::Uuid;

/// Engine-owned channels downstream are recognized by this tvg_id prefix.
const ENGINE_TVG_PREFIX: &str = "matcharr.";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileIssue {
    /// Channel in the engine DB with no downstream counterpart
    OrphanEngine {
        channel_id: Uuid,
        channel_name: String,
        downstream_id: Option<i64>,
    },
    /// Downstream channel carrying our tvg_id convention that we don't own
    OrphanDownstream {
        downstream_id: i64,
        name: String,
        tvg_id: String,
    },
    /// Multiple active channels for the same (group, event, keyword, segment)
    Duplicate {
        kept_channel_id: Uuid,
        duplicate_channel_ids: Vec<Uuid>,
        event_id: String,
    },
    /// Channel number outside the group's effective range
    OutOfRange {
        channel_id: Uuid,
        channel_number: i64,
    },
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ReconcileReport {
    pub issues: Vec<ReconcileIssue>,
    pub actions_taken: Vec<String>,
    pub summary: HashMap<String, usize>,
}

#[derive(Clone)]
pub struct Reconciler {
    database: Database,
    dispatcharr: DispatcharrClient,
}

impl Reconciler {
    pub fn new(database: Database, dispatcharr: DispatcharrClient) -> Self {
        Self {
            database,
            dispatcharr,
        }
    }

    pub async fn reconcile(
        &self,
        settings: &ReconciliationSettings,
        auto_fix: bool,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let pool = self.database.pool();

        let engine_channels = channels::get_all_active_channels(pool).await?;

        // Downstream state; a disabled or failing downstream skips the
        // orphan checks rather than inventing issues
        let downstream = if self.dispatcharr.is_enabled() {
            let result = self.dispatcharr.list_channels().await;
            if result.success {
                result.data
            } else {
                warn!("Reconcile: downstream unavailable: {:?}", result.error);
                None
            }
        } else {
            None
        };

        if let Some(downstream_channels) = &downstream {
            let downstream_ids: HashSet<i64> =
                downstream_channels.iter().map(|c| c.id).collect();
            let engine_downstream_ids: HashSet<i64> = engine_channels
                .iter()
                .filter_map(|c| c.dispatcharr_channel_id)
                .collect();

            // Orphan-engine: we think it exists downstream, it doesn't
            for channel in &engine_channels {
                let missing = match channel.dispatcharr_channel_id {
                    Some(id) => !downstream_ids.contains(&id),
                    None => false,
                };
                if missing {
                    report.issues.push(ReconcileIssue::OrphanEngine {
                        channel_id: channel.id,
                        channel_name: channel.channel_name.clone(),
                        downstream_id: channel.dispatcharr_channel_id,
                    });
                    if auto_fix {
                        if settings.auto_fix_orphan_matcharr {
                            self.refix_orphan_engine(channel, &mut report).await;
                        } else {
                            let _ = channels::set_sync_status(pool, channel.id, "orphaned").await;
                            report
                                .actions_taken
                                .push(format!("Marked {} as orphaned", channel.channel_name));
                        }
                    }
                }
            }

            // Orphan-downstream: our naming convention, not our record.
            // Fix is off by default: downstream may hold manual channels.
            for downstream_channel in downstream_channels {
                let ours = downstream_channel
                    .tvg_id
                    .as_deref()
                    .map(|t| t.starts_with(ENGINE_TVG_PREFIX))
                    .unwrap_or(false);
                if ours && !engine_downstream_ids.contains(&downstream_channel.id) {
                    report.issues.push(ReconcileIssue::OrphanDownstream {
                        downstream_id: downstream_channel.id,
                        name: downstream_channel.name.clone(),
                        tvg_id: downstream_channel.tvg_id.clone().unwrap_or_default(),
                    });
                    if auto_fix && settings.auto_fix_orphan_dispatcharr {
                        let result = self.dispatcharr.delete_channel(downstream_channel.id).await;
                        if result.success {
                            report.actions_taken.push(format!(
                                "Deleted downstream orphan '{}'",
                                downstream_channel.name
                            ));
                        }
                    }
                }
            }
        }

        // Duplicates: keep the oldest active channel per identity
        for duplicate_set in channels::find_duplicate_channels(pool).await? {
            let mut sorted = duplicate_set;
            sorted.sort_by_key(|c| c.created_at);
            let kept = sorted.remove(0);
            let duplicate_ids: Vec<Uuid> = sorted.iter().map(|c| c.id).collect();

            report.issues.push(ReconcileIssue::Duplicate {
                kept_channel_id: kept.id,
                duplicate_channel_ids: duplicate_ids.clone(),
                event_id: kept.event_id.clone(),
            });

            if auto_fix && settings.auto_fix_duplicates {
                for duplicate in sorted {
                    if let Some(downstream_id) = duplicate.dispatcharr_channel_id {
                        let _ = self.dispatcharr.delete_channel(downstream_id).await;
                    }
                    if channels::mark_channel_deleted(pool, duplicate.id, Some("duplicate"))
                        .await
                        .unwrap_or(false)
                    {
                        let _ = history::log_channel_history(
                            pool,
                            duplicate.id,
                            "deleted",
                            "reconciler",
                            Some(&format!("Duplicate of {}", kept.id)),
                        )
                        .await;
                        report
                            .actions_taken
                            .push(format!("Soft-deleted duplicate {}", duplicate.id));
                    }
                }
            }
        }

        // Out-of-range channel numbers
        for channel in &engine_channels {
            let Some(number) = channel.channel_number else {
                continue;
            };
            let in_range = channel_numbers::validate_channel_in_range(
                pool,
                channel.event_epg_group_id,
                number,
            )
            .await
            .unwrap_or(true);
            if !in_range {
                report.issues.push(ReconcileIssue::OutOfRange {
                    channel_id: channel.id,
                    channel_number: number,
                });
                if auto_fix {
                    if let Ok(Some(new_number)) = channel_numbers::reassign_out_of_range_channel(
                        pool,
                        channel.event_epg_group_id,
                        channel.id,
                        number,
                    )
                    .await
                    {
                        report
                            .actions_taken
                            .push(format!("Reassigned {} -> {}", number, new_number));
                    }
                }
            }
        }

        for issue in &report.issues {
            let key = match issue {
                ReconcileIssue::OrphanEngine { .. } => "orphan_engine",
                ReconcileIssue::OrphanDownstream { .. } => "orphan_downstream",
                ReconcileIssue::Duplicate { .. } => "duplicate",
                ReconcileIssue::OutOfRange { .. } => "out_of_range",
            };
            *report.summary.entry(key.to_string()).or_insert(0) += 1;
        }

        if !report.issues.is_empty() {
            info!(
                "Reconciliation found {} issue(s): {:?}",
                report.issues.len(),
                report.summary
            );
        }

        Ok(report)
    }

    /// Recreate the downstream channel for an engine orphan.
    async fn refix_orphan_engine(&self, channel: &ManagedChannel, report: &mut ReconcileReport) {
        let pool = self.database.pool();
        let stream_ids = crate::database::streams::get_ordered_stream_ids(pool, channel.id)
            .await
            .unwrap_or_default();

        let result = self
            .dispatcharr
            .create_channel(
                &channel.channel_name,
                channel.channel_number,
                &stream_ids,
                &channel.tvg_id,
                channel.channel_group_id,
                &[],
            )
            .await;

        match result.data {
            Some(downstream) if result.success => {
                let _ = channels::set_dispatcharr_ids(
                    pool,
                    channel.id,
                    downstream.id,
                    downstream.uuid.as_deref(),
                )
                .await;
                report.actions_taken.push(format!(
                    "Recreated downstream channel for '{}'",
                    channel.channel_name
                ));
            }
            _ => {
                warn!(
                    "Could not recreate downstream channel for '{}': {:?}",
                    channel.channel_name, result.error
                );
                let _ = channels::set_sync_status(pool, channel.id, "error").await;
            }
        }
    }
}
