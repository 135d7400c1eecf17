use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::core::client::ChannelId;
use crate::core::context::AppContext;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CapacityReport {
    pub evicted: Vec<ChannelId>,
    pub active_after: usize,
    /// The ceiling was still reached but nothing was eligible to evict.
    pub no_candidate: bool,
}

/// Make room for the helper to join `target`.
///
/// While the active-membership count is at or above the ceiling, the
/// helper leaves the channel it joined longest ago. The target and every
/// protected channel are never chosen. A failed leave still clears the
/// membership flag. At most `max_evictions_per_call` channels are evicted.
pub async fn ensure_capacity(ctx: &AppContext, target: ChannelId) -> Result<CapacityReport> {
    let ceiling = ctx.config.max_user_channels;
    let mut report = CapacityReport::default();

    if let Some(record) = ctx.store.get_channel(target).await?
        && record.helper_member
    {
        report.active_after = ctx.store.count_active().await?;
        return Ok(report);
    }

    for _ in 0..ctx.config.max_evictions_per_call {
        let active = ctx.store.count_active().await?;
        report.active_after = active;
        if active < ceiling {
            return Ok(report);
        }

        let protected = ctx.protected.snapshot();
        let candidate = ctx
            .store
            .active_by_join_age()
            .await?
            .into_iter()
            .find(|r| r.channel_id != target && !protected.contains(&r.channel_id));

        let Some(victim) = candidate else {
            warn!(
                "[CAPACITY] {} of {} memberships in use and no channel is eligible for eviction",
                active, ceiling
            );
            report.no_candidate = true;
            return Ok(report);
        };

        info!(
            "[CAPACITY] {}/{} memberships in use, helper leaving {} (joined {})",
            active,
            ceiling,
            victim.channel_id,
            victim
                .helper_joined_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".into())
        );
        let left = ctx
            .call_policy()
            .run("leave", || ctx.helper.leave(victim.channel_id))
            .await;
        if let Err(e) = left.result {
            warn!(
                "[CAPACITY] Leave of {} failed ({}), clearing membership anyway",
                victim.channel_id, e
            );
        }
        ctx.store
            .record_helper_left(victim.channel_id, Utc::now())
            .await?;
        report.evicted.push(victim.channel_id);

        tokio::time::sleep(ctx.config.eviction_pause()).await;
    }

    report.active_after = ctx.store.count_active().await?;
    if report.active_after >= ceiling {
        warn!(
            "[CAPACITY] Eviction budget spent with {} of {} memberships still in use",
            report.active_after, ceiling
        );
    }
    Ok(report)
}
