//! Channel numbering and range management
//!
//! Two assignment modes, both inside the global `[range_start, range_end]`:
//! - MANUAL: the group's channel_start_number anchors sequential assignment;
//!   groups without one get auto-assigned the next x1 boundary (101, 111, …)
//! - AUTO: the effective start is computed from sort_order by packing
//!   ⌈stream_count/10⌉ blocks of 10 for each preceding auto group; the
//!   group's block ends where the next group's begins

use crate::models::{ChannelAssignmentMode, EventEpgGroup};
use anyhow::Result;
use sqlx::{Pool, Sqlite};
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

pub const MAX_CHANNEL: i64 = 9999;

/// Global channel range from settings. range_end may be None (unbounded).
pub async fn get_global_channel_range(pool: &Pool<Sqlite>) -> Result<(i64, Option<i64>)> {
    let settings = super::settings::get_settings(pool).await?;
    Ok((
        settings.lifecycle.channel_range_start,
        settings.lifecycle.channel_range_end,
    ))
}

/// Next available channel number for a group, or None when the range is
/// exhausted or the group has no usable start.
pub async fn get_next_channel_number(
    pool: &Pool<Sqlite>,
    group_id: Uuid,
    auto_assign: bool,
) -> Result<Option<i64>> {
    let Some(group) = super::groups::get_group(pool, group_id).await? else {
        return Ok(None);
    };

    let mut channel_start = group.channel_start_number;
    let mut block_end: Option<i64> = None;

    match group.channel_assignment_mode {
        ChannelAssignmentMode::Auto => {
            channel_start = calculate_auto_channel_start(pool, &group).await?;
            let Some(start) = channel_start else {
                warn!("Could not calculate auto channel start for group {group_id}");
                return Ok(None);
            };
            let blocks = blocks_needed(group.total_stream_count);
            block_end = Some(start + blocks * 10 - 1);
        }
        ChannelAssignmentMode::Manual => {
            if channel_start.is_none() && auto_assign {
                channel_start = next_available_range_start(pool).await?;
                if let Some(start) = channel_start {
                    sqlx::query(
                        "UPDATE event_epg_groups SET channel_start_number = ? WHERE id = ?",
                    )
                    .bind(start)
                    .bind(group_id)
                    .execute(pool)
                    .await?;
                    info!("Auto-assigned channel start {start} to manual group {group_id}");
                } else {
                    warn!("Could not auto-assign channel start for group {group_id}");
                }
            }
        }
    }

    let Some(channel_start) = channel_start else {
        return Ok(None);
    };

    // Numbers already used by live channels in this group
    let used_rows: Vec<(Option<i64>,)> = sqlx::query_as(
        "SELECT channel_number FROM managed_channels
         WHERE event_epg_group_id = ? AND deleted_at IS NULL",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;
    let used: HashSet<i64> = used_rows.into_iter().filter_map(|(n,)| n).collect();

    let mut next = channel_start;
    while used.contains(&next) {
        next += 1;
    }

    if let Some(end) = block_end {
        if next > end {
            warn!("Group {group_id} auto range exhausted ({channel_start}-{end})");
            return Ok(None);
        }
    }

    if next > MAX_CHANNEL {
        warn!("Channel number {next} exceeds max {MAX_CHANNEL}");
        return Ok(None);
    }

    Ok(Some(next))
}

fn blocks_needed(stream_count: i64) -> i64 {
    if stream_count > 0 {
        (stream_count + 9) / 10
    } else {
        1
    }
}

/// Effective start for an AUTO group: the global range start plus the blocks
/// reserved by every enabled auto parent group with a lower sort order.
async fn calculate_auto_channel_start(
    pool: &Pool<Sqlite>,
    group: &EventEpgGroup,
) -> Result<Option<i64>> {
    let (range_start, range_end) = get_global_channel_range(pool).await?;
    let effective_end = range_end.unwrap_or(MAX_CHANNEL);

    let auto_groups: Vec<(Uuid, i64)> = sqlx::query_as(
        "SELECT id, total_stream_count FROM event_epg_groups
         WHERE channel_assignment_mode = 'auto'
           AND parent_group_id IS NULL
           AND enabled = 1
         ORDER BY sort_order ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut current_start = range_start;
    for (id, stream_count) in auto_groups {
        if id == group.id {
            if current_start > effective_end {
                warn!(
                    "Auto group {} would start at {current_start}, past range end {effective_end}",
                    group.id
                );
                return Ok(None);
            }
            return Ok(Some(current_start));
        }
        current_start += blocks_needed(stream_count) * 10;
    }

    Ok(None)
}

/// Next x1 boundary (101, 111, 121, …) past every existing reservation, for
/// a new MANUAL group.
async fn next_available_range_start(pool: &Pool<Sqlite>) -> Result<Option<i64>> {
    let (range_start, range_end) = get_global_channel_range(pool).await?;
    let effective_end = range_end.unwrap_or(MAX_CHANNEL);

    let groups: Vec<(Option<i64>, i64)> = sqlx::query_as(
        "SELECT channel_start_number, total_stream_count FROM event_epg_groups
         WHERE enabled = 1 AND channel_start_number IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;

    let mut highest_used = range_start - 1;
    for (start, stream_count) in groups {
        let Some(start) = start else { continue };
        let count = if stream_count > 0 { stream_count } else { 10 };
        let end = start + count - 1;
        if end > highest_used {
            highest_used = end;
        }
    }

    // Next x1 boundary after the highest reservation
    let mut next = (highest_used / 10 + 1) * 10 + 1;
    if next < range_start {
        next = (range_start - 1) / 10 * 10 + 1;
        if next < range_start {
            next += 10;
        }
    }

    if next > effective_end {
        warn!("No available channel range (would start at {next})");
        return Ok(None);
    }
    Ok(Some(next))
}

/// The effective (start, end) range for a group, for range validation.
pub async fn get_group_channel_range(
    pool: &Pool<Sqlite>,
    group_id: Uuid,
) -> Result<(Option<i64>, Option<i64>)> {
    let Some(group) = super::groups::get_group(pool, group_id).await? else {
        return Ok((None, None));
    };

    match group.channel_assignment_mode {
        ChannelAssignmentMode::Auto => {
            let Some(start) = calculate_auto_channel_start(pool, &group).await? else {
                return Ok((None, None));
            };
            let end = start + blocks_needed(group.total_stream_count) * 10 - 1;
            Ok((Some(start), Some(end)))
        }
        ChannelAssignmentMode::Manual => {
            let Some(start) = group.channel_start_number else {
                return Ok((None, None));
            };
            let end = start + group.total_stream_count.max(10) - 1;
            Ok((Some(start), Some(end)))
        }
    }
}

pub async fn validate_channel_in_range(
    pool: &Pool<Sqlite>,
    group_id: Uuid,
    channel_number: i64,
) -> Result<bool> {
    let (start, end) = get_group_channel_range(pool, group_id).await?;
    let Some(start) = start else {
        return Ok(false);
    };
    if channel_number < start {
        return Ok(false);
    }
    if let Some(end) = end {
        if channel_number > end {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Move an out-of-range channel to the group's next free number.
pub async fn reassign_out_of_range_channel(
    pool: &Pool<Sqlite>,
    group_id: Uuid,
    channel_id: Uuid,
    current_number: i64,
) -> Result<Option<i64>> {
    let Some(new_number) = get_next_channel_number(pool, group_id, true).await? else {
        warn!("Could not reassign channel {channel_id} - no available numbers");
        return Ok(None);
    };

    sqlx::query("UPDATE managed_channels SET channel_number = ? WHERE id = ?")
        .bind(new_number)
        .bind(channel_id)
        .execute(pool)
        .await?;

    info!("Reassigned channel {channel_id}: {current_number} -> {new_number}");
    Ok(Some(new_number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_needed() {
        assert_eq!(blocks_needed(0), 1);
        assert_eq!(blocks_needed(1), 1);
        assert_eq!(blocks_needed(10), 1);
        assert_eq!(blocks_needed(11), 2);
        assert_eq!(blocks_needed(16), 2);
        assert_eq!(blocks_needed(250), 25);
    }
}
