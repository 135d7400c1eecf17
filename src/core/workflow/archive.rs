use anyhow::Result;
use tracing::{error, info, warn};

use super::check::{CheckMode, OperatorCheckError, check_operator};
use super::explain;
use crate::core::capacity::ensure_capacity;
use crate::core::client::{ChannelId, MemberStatus};
use crate::core::context::AppContext;
use crate::core::helper::{ensure_helper_in_channel, expel_helper};
use crate::core::installer::install_agents;
use crate::core::queue::{Enqueued, PositionNotifier, TaskDescriptor, TaskKind, TaskQueue};
use crate::core::status::{Progress, StatusHandle};

#[derive(Debug)]
pub enum ArchiveOutcome {
    Enqueued(Enqueued),
    AlreadyQueued,
    /// The channel already has a regular setup; archive mode would conflict.
    Blocked,
    Rejected(OperatorCheckError),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiveSweepReport {
    pub total: usize,
    pub expelled: usize,
    pub errors: usize,
}

/// Admission for archive mode, requested from inside the channel. The bot
/// must hold every right. The owner is read from the administrator list,
/// falling back to `requester`.
pub async fn request_archive(
    ctx: &AppContext,
    queue: &TaskQueue,
    notifier: &PositionNotifier,
    channel: ChannelId,
    requester: Option<i64>,
    status: StatusHandle,
) -> Result<ArchiveOutcome> {
    if ctx.store.get_channel(channel).await?.is_some() {
        return Ok(ArchiveOutcome::Blocked);
    }
    if queue.contains(channel).await {
        return Ok(ArchiveOutcome::AlreadyQueued);
    }
    if let Err(e) = check_operator(ctx, channel, CheckMode::Strict).await {
        info!("[ARCHIVE] Request for {} rejected: {}", channel, e);
        return Ok(ArchiveOutcome::Rejected(e));
    }

    let owner_id = match ctx
        .call_policy()
        .run("administrators", || ctx.operator.administrators(channel))
        .await
        .into_result()
    {
        Ok(admins) => admins
            .iter()
            .find(|m| m.status == MemberStatus::Owner)
            .map(|m| m.user_id),
        Err(e) => {
            warn!("[ARCHIVE] Could not list administrators of {}: {}", channel, e);
            None
        }
    }
    .or(requester)
    .unwrap_or_else(|| {
        warn!("[ARCHIVE] Owner of {} unknown, recording 0", channel);
        0
    });

    let task = TaskDescriptor::new(channel, owner_id, TaskKind::Archive, status);
    let enqueued = queue.enqueue(task.clone()).await?;
    notifier.record(&task).await;
    Ok(ArchiveOutcome::Enqueued(enqueued))
}

/// The queued archive job: bring the helper in, install every configured
/// agent, record the result, then have the bot remove the helper again.
/// The helper never stays behind, even when a step fails.
pub async fn run_archive(ctx: &AppContext, task: &TaskDescriptor, progress: &Progress) -> Result<String> {
    let channel = task.channel_id;
    info!("[ARCHIVE] Setup started for {}", channel);

    let result = install_archive(ctx, task, progress).await;

    let expelled = match expel_helper(ctx, channel).await {
        Ok(()) => {
            info!("[ARCHIVE] Helper removed from {}", channel);
            true
        }
        Err(e) => {
            error!("[ARCHIVE] Could not remove helper from {}: {}", channel, e);
            false
        }
    };
    // Archive channels never keep a regular record, whatever happened above.
    ctx.store.delete_channel(channel).await?;
    if !expelled && ctx.store.get_archive(channel).await?.is_none() {
        // Leaves the channel to the archive sweep, which retries the removal.
        ctx.store.save_archive(channel, task.owner_id, &[]).await?;
    }

    let (added, failed) = result?;
    let configured = ctx.config.bots_to_add.len();
    let farewell = if expelled {
        "🙏 Thank you! The helper account has left the channel."
    } else {
        "⚠️ The helper account could not leave the channel yet. The next archive sync removes it."
    };
    let mut text = format!(
        "✅ Archive setup complete!\n\n📢 Channel: {}\n🤖 Agents added: {}/{}\n\n{}",
        channel,
        added.len(),
        configured,
        farewell
    );
    if !failed.is_empty() {
        text.push_str(&format!("\n⚠️ Failed: {}", failed.join(", ")));
    }
    Ok(text)
}

async fn install_archive(
    ctx: &AppContext,
    task: &TaskDescriptor,
    progress: &Progress,
) -> Result<(Vec<String>, Vec<String>)> {
    let channel = task.channel_id;

    progress.say("➕ Preparing helper account with full access...").await;
    ensure_capacity(ctx, channel).await?;
    ensure_helper_in_channel(ctx, channel, task.owner_id)
        .await
        .map_err(explain)?;
    tokio::time::sleep(ctx.config.settle_delay()).await;

    progress.say("🤖 Adding archive agents...").await;
    let report = install_agents(ctx, channel, &ctx.config.bots_to_add, &[], progress).await;
    ctx.store
        .save_archive(channel, task.owner_id, &report.succeeded)
        .await?;
    Ok((report.succeeded, report.failed))
}

/// Make sure the helper is gone from every archive channel.
pub async fn sweep_archive(ctx: &AppContext, progress: &Progress) -> Result<ArchiveSweepReport> {
    let channels = ctx.store.list_archive().await?;
    let mut report = ArchiveSweepReport {
        total: channels.len(),
        ..Default::default()
    };
    info!("[ARCHIVE] Sweep started for {} channels", report.total);

    for (index, record) in channels.iter().enumerate() {
        let index = index + 1;
        if index % 5 == 0 {
            progress
                .say(&format!(
                    "♻️ Archive sync...\nProgress: {}/{}",
                    index, report.total
                ))
                .await;
        }

        let lease = ctx.lease_helper().await;
        let present = ctx
            .call_policy()
            .run("helper membership", || {
                ctx.helper.own_membership(record.channel_id)
            })
            .await
            .into_result();
        match present {
            Ok(member) if member.is_present() => {
                info!("[ARCHIVE] Helper found in {}, removing", record.channel_id);
                match expel_helper(ctx, record.channel_id).await {
                    Ok(()) => {
                        report.expelled += 1;
                        ctx.store.delete_channel(record.channel_id).await?;
                    }
                    Err(e) => {
                        error!("[ARCHIVE] Removal from {} failed: {}", record.channel_id, e);
                        report.errors += 1;
                    }
                }
            }
            Ok(_) => {}
            Err(e) if e.is_channel_gone() => {}
            Err(e) => {
                warn!("[ARCHIVE] Check of {} failed: {}", record.channel_id, e);
                report.errors += 1;
            }
        }
        drop(lease);
        tokio::time::sleep(ctx.config.channel_delay()).await;
    }

    Ok(report)
}
