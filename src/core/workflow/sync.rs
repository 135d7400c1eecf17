use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{error, info, warn};

use super::explain;
use crate::core::capacity::ensure_capacity;
use crate::core::context::AppContext;
use crate::core::helper::{HelperPresence, ensure_helper_in_channel};
use crate::core::installer::{desired_delta, install_agents};
use crate::core::queue::TaskQueue;
use crate::core::status::{OwnerNotifier, Progress};
use crate::core::store::ChannelRecord;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub total: usize,
    pub updated: usize,
    pub rejoined: usize,
    pub errors: usize,
    /// Channels already matching the configured agents.
    pub unchanged: usize,
}

impl SyncReport {
    pub fn progress_text(&self, index: usize) -> String {
        format!(
            "🔄 Syncing...\n\nProgress: {}/{}\n✅ Updated: {}\n🔄 Rejoined: {}\n❌ Errors: {}",
            index, self.total, self.updated, self.rejoined, self.errors
        )
    }

    pub fn summary_text(&self) -> String {
        format!(
            "✅ Sync finished!\n\n📊 Total channels: {}\n📝 Updated: {}\n🔄 Rejoined: {}\n⚠️ Errors: {}",
            self.total, self.updated, self.rejoined, self.errors
        )
    }
}

/// Re-converge every known channel to the configured agent list.
///
/// Yields to queued setups: before each channel it waits until the queue is
/// idle, then holds the helper lease for that one channel only. A failure
/// in one channel is reported to its owner and the sweep continues.
pub async fn request_sync(
    ctx: &AppContext,
    queue: &TaskQueue,
    owners: &dyn OwnerNotifier,
    progress: &Progress,
) -> Result<SyncReport> {
    let Some(_slot) = ctx.begin_sync() else {
        bail!("a sync is already running");
    };

    let channels = ctx.store.list_channels().await?;
    let mut report = SyncReport {
        total: channels.len(),
        ..SyncReport::default()
    };
    if channels.is_empty() {
        return Ok(report);
    }
    info!("[SYNC] Starting sync of {} channels", report.total);

    for (index, record) in channels.iter().enumerate() {
        let index = index + 1;
        let (to_add, to_remove) =
            desired_delta(&ctx.config.bots_to_add, &record.installed_agents);

        if to_add.is_empty() && to_remove.is_empty() {
            report.unchanged += 1;
        } else {
            let mut announced = false;
            while queue.is_busy().await {
                if !announced {
                    info!("[SYNC] Paused while a setup is running");
                    progress
                        .say("⏸️ Paused...\nPriority setup running, will resume shortly.")
                        .await;
                    announced = true;
                }
                tokio::time::sleep(ctx.config.sync_poll_interval()).await;
            }

            let outcome = {
                let _lease = ctx.lease_helper().await;
                let _guard = ctx.protected.protect(record.channel_id);
                sync_channel(ctx, record, &to_add, &to_remove).await
            };
            match outcome {
                Ok(rejoined) => {
                    report.updated += 1;
                    if rejoined {
                        report.rejoined += 1;
                    }
                    info!("[SYNC] Synced channel {}", record.channel_id);
                }
                Err(e) => {
                    report.errors += 1;
                    error!("[SYNC] Channel {} failed: {:#}", record.channel_id, e);
                    let reason: String = e.to_string().chars().take(200).collect();
                    let text = format!(
                        "⚠️ Agent sync failed\n\n🆔 Channel: {}\n❌ Error: {}\n\nPlease run /setup {} again to fix it.",
                        record.channel_id, reason, record.channel_id
                    );
                    if let Err(e) = owners.notify(record.owner_id, &text).await {
                        warn!("[SYNC] Could not notify owner {}: {}", record.owner_id, e);
                    }
                }
            }
            tokio::time::sleep(ctx.config.channel_delay()).await;
        }

        if index == 1 || index % 5 == 0 {
            progress.say(&report.progress_text(index)).await;
        }
    }

    info!(
        "[SYNC] Finished: {} updated, {} rejoined, {} errors",
        report.updated, report.rejoined, report.errors
    );
    Ok(report)
}

/// Returns whether the helper had to rejoin.
async fn sync_channel(
    ctx: &AppContext,
    record: &ChannelRecord,
    to_add: &[String],
    to_remove: &[String],
) -> Result<bool> {
    let channel = record.channel_id;
    ensure_capacity(ctx, channel).await?;
    let presence = ensure_helper_in_channel(ctx, channel, record.owner_id)
        .await
        .map_err(explain)?;
    let rejoined = presence == HelperPresence::Joined;
    if rejoined {
        info!("[SYNC] Rejoined {}, letting rights settle", channel);
        tokio::time::sleep(ctx.config.rejoin_settle_delay()).await;
    }

    let report = install_agents(ctx, channel, to_add, to_remove, &Progress::silent()).await;
    if report.channel_gone {
        ctx.store.record_helper_left(channel, Utc::now()).await?;
        bail!("the channel is no longer reachable");
    }
    let next = report.apply(&record.installed_agents, to_add, to_remove);
    ctx.store.update_installed(channel, &next).await?;
    if !report.failed.is_empty() {
        warn!(
            "[SYNC] {} agent(s) failed in {}: {}",
            report.failed.len(),
            channel,
            report.failed.join(", ")
        );
    }
    Ok(rejoined)
}
