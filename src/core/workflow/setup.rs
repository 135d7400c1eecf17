use anyhow::{Result, bail};
use chrono::Utc;
use tracing::info;

use super::check::{CheckMode, OperatorCheckError, check_operator};
use super::explain;
use crate::core::capacity::ensure_capacity;
use crate::core::client::ChannelId;
use crate::core::context::AppContext;
use crate::core::helper::{HelperPresence, ensure_helper_in_channel};
use crate::core::installer::{desired_delta, install_agents};
use crate::core::queue::{Enqueued, PositionNotifier, TaskDescriptor, TaskKind, TaskQueue};
use crate::core::status::{Progress, StatusHandle};

#[derive(Debug)]
pub enum SetupOutcome {
    Enqueued(Enqueued),
    /// Waiting at `Some(position)`, or already running.
    AlreadyQueued(Option<usize>),
    AlreadyComplete,
    Rejected(OperatorCheckError),
}

/// Admission for a channel setup: reject duplicates and finished channels,
/// check the bot's own rights, then queue the work.
pub async fn request_setup(
    ctx: &AppContext,
    queue: &TaskQueue,
    notifier: &PositionNotifier,
    channel: ChannelId,
    owner_id: i64,
    status: StatusHandle,
) -> Result<SetupOutcome> {
    if queue.contains(channel).await {
        return Ok(SetupOutcome::AlreadyQueued(queue.position(channel).await));
    }

    if let Some(record) = ctx.store.get_channel(channel).await? {
        let (to_add, to_remove) =
            desired_delta(&ctx.config.bots_to_add, &record.installed_agents);
        if to_add.is_empty() && to_remove.is_empty() {
            return Ok(SetupOutcome::AlreadyComplete);
        }
    }

    if let Err(e) = check_operator(ctx, channel, CheckMode::Setup).await {
        info!("[QUEUE] Setup for {} rejected: {}", channel, e);
        return Ok(SetupOutcome::Rejected(e));
    }

    let task = TaskDescriptor::new(channel, owner_id, TaskKind::Setup, status);
    let enqueued = queue.enqueue(task.clone()).await?;
    notifier.record(&task).await;
    Ok(SetupOutcome::Enqueued(enqueued))
}

/// The queued setup: capacity, helper, agents, record.
pub async fn run_setup(ctx: &AppContext, task: &TaskDescriptor, progress: &Progress) -> Result<String> {
    let channel = task.channel_id;

    progress.say("➕ Preparing helper...").await;
    let capacity = ensure_capacity(ctx, channel).await?;
    if !capacity.evicted.is_empty() {
        info!(
            "[CAPACITY] Made room for {} by leaving {:?}",
            channel, capacity.evicted
        );
    }
    let presence = ensure_helper_in_channel(ctx, channel, task.owner_id)
        .await
        .map_err(explain)?;
    if presence == HelperPresence::Joined {
        info!("[HELPER] Helper ready in {}", channel);
    }

    let installed = ctx
        .store
        .get_channel(channel)
        .await?
        .map(|r| r.installed_agents)
        .unwrap_or_default();
    let configured = &ctx.config.bots_to_add;
    let (_, to_remove) = desired_delta(configured, &installed);

    progress.say("🤖 Adding agents...").await;
    let report = install_agents(ctx, channel, configured, &to_remove, progress).await;
    if report.channel_gone {
        ctx.store.record_helper_left(channel, Utc::now()).await?;
        bail!("the channel became unreachable during setup");
    }
    let next = report.apply(&installed, configured, &to_remove);
    ctx.store.save_setup(channel, task.owner_id, &next).await?;

    let added = configured
        .iter()
        .filter(|a| report.succeeded.contains(a))
        .count();
    let active = ctx.store.count_active().await?;
    let mut text = format!(
        "✅ Setup complete!\n\n📢 Channel: {}\n🤖 Added: {}/{}\n📊 Active: {}/{}",
        channel,
        added,
        configured.len(),
        active,
        ctx.config.max_user_channels
    );
    if !report.failed.is_empty() {
        text.push_str(&format!("\n⚠️ Failed: {}", report.failed.join(", ")));
    }
    Ok(text)
}
