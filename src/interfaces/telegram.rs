use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::ApiError;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, MessageId};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::client::ChannelId;
use crate::core::context::AppContext;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::queue::{PositionNotifier, TaskQueue};
use crate::core::status::{OwnerNotifier, Progress, StatusHandle, StatusSink};
use crate::core::workflow::{
    ArchiveOutcome, SetupOutcome, request_archive, request_setup, request_sync, sweep_archive,
};

const HELP_TEXT: &str = "\
🤖 linkerx

I install our companion agents into your channel.

1. Add me to your channel as administrator with the rights \"Invite Users via Link\" and \"Add New Admins\".
2. Send me /setup <channel_id> here.

/setup <channel_id> - queue the setup of a channel
/list - your channels
/help - this message

Archive mode: post /helparchive inside the channel (the bot needs every right).";

/// Status edits and owner messages, both sent by the operator bot.
pub struct BotMessenger {
    bot: Bot,
}

impl BotMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl StatusSink for BotMessenger {
    async fn update(&self, handle: &StatusHandle, text: &str) -> Result<()> {
        match self
            .bot
            .edit_message_text(ChatId(handle.chat_id), MessageId(handle.message_id), text)
            .await
        {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl OwnerNotifier for BotMessenger {
    async fn notify(&self, user_id: i64, text: &str) -> Result<()> {
        self.bot.send_message(ChatId(user_id), text).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Help,
    /// `None` when the argument is missing or not a channel id.
    Setup(Option<ChannelId>),
    List,
    Sync,
    Stats,
    HelpArchive,
    SyncArchive,
    StatsArchive,
}

/// `/name[@bot] [args]`; anything else is not a command.
pub(crate) fn parse_command(text: &str) -> Option<Command> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?.strip_prefix('/')?;
    let name = head.split_once('@').map_or(head, |(n, _)| n);
    let command = match name.to_ascii_lowercase().as_str() {
        "start" | "help" => Command::Help,
        "setup" => Command::Setup(parts.next().and_then(|a| a.parse().ok())),
        "list" => Command::List,
        "sync" => Command::Sync,
        "stats" => Command::Stats,
        "helparchive" => Command::HelpArchive,
        "syncarchive" => Command::SyncArchive,
        "statsarchive" => Command::StatsArchive,
        _ => return None,
    };
    Some(command)
}

struct Shared {
    ctx: Arc<AppContext>,
    queue: Arc<TaskQueue>,
    notifier: Arc<PositionNotifier>,
    messenger: Arc<BotMessenger>,
}

impl Shared {
    /// Post a status message the workflow can keep editing.
    async fn status(&self, bot: &Bot, chat: ChatId, text: &str) -> Option<StatusHandle> {
        match bot.send_message(chat, text).await {
            Ok(sent) => Some(StatusHandle {
                chat_id: sent.chat.id.0,
                message_id: sent.id.0,
            }),
            Err(e) => {
                warn!("[TELEGRAM] Could not post status message in {}: {}", chat, e);
                None
            }
        }
    }

    async fn edit(&self, handle: StatusHandle, text: &str) {
        if let Err(e) = self.messenger.update(&handle, text).await {
            warn!("[TELEGRAM] Could not edit status message: {}", e);
        }
    }
}

/// The command surface of the operator bot.
pub struct TelegramInterface {
    bot: Bot,
    shared: Arc<Shared>,
    running: Option<JoinHandle<()>>,
}

impl TelegramInterface {
    pub fn new(
        bot: Bot,
        ctx: Arc<AppContext>,
        queue: Arc<TaskQueue>,
        notifier: Arc<PositionNotifier>,
        messenger: Arc<BotMessenger>,
    ) -> Self {
        Self {
            bot,
            shared: Arc::new(Shared {
                ctx,
                queue,
                notifier,
                messenger,
            }),
            running: None,
        }
    }

    async fn start_bot(&mut self) -> Result<()> {
        let commands = vec![
            BotCommand::new("help", "How to use this bot"),
            BotCommand::new("setup", "Set up a channel: /setup <channel_id>"),
            BotCommand::new("list", "Your channels"),
        ];
        if let Err(e) = self.bot.set_my_commands(commands).await {
            error!("[TELEGRAM] Failed to set bot commands: {}", e);
        }

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(on_message))
            .branch(Update::filter_channel_post().endpoint(on_message));
        let bot = self.bot.clone();
        let shared = self.shared.clone();
        self.running = Some(tokio::spawn(async move {
            Dispatcher::builder(bot, handler)
                .dependencies(dptree::deps![shared])
                .default_handler(|_| async {})
                .build()
                .dispatch()
                .await;
        }));
        Ok(())
    }
}

async fn on_message(bot: Bot, msg: Message, shared: Arc<Shared>) -> ResponseResult<()> {
    let Some(command) = msg.text().and_then(parse_command) else {
        return Ok(());
    };
    let user_id = msg.from.as_ref().map(|u| u.id.0 as i64);
    info!(
        "[TELEGRAM] Command {:?} in chat {} from {:?}",
        command, msg.chat.id, user_id
    );

    let owner_only = matches!(
        command,
        Command::Sync | Command::Stats | Command::SyncArchive | Command::StatsArchive
    );
    if owner_only && !user_id.is_some_and(|id| shared.ctx.config.is_owner(id)) {
        bot.send_message(msg.chat.id, "⛔ This command is for the bot owner only.")
            .await?;
        return Ok(());
    }

    match command {
        Command::Help => {
            bot.send_message(msg.chat.id, HELP_TEXT).await?;
        }
        Command::Setup(channel) => {
            if !msg.chat.is_private() {
                bot.send_message(msg.chat.id, "Send /setup to me in a private chat.")
                    .await?;
                return Ok(());
            }
            match (channel, user_id) {
                (Some(channel), Some(owner)) => setup(&bot, &msg, &shared, channel, owner).await,
                _ => {
                    bot.send_message(
                        msg.chat.id,
                        "Usage: /setup <channel_id>\nExample: /setup -1001234567890",
                    )
                    .await?;
                }
            }
        }
        Command::List => {
            let Some(owner) = user_id else {
                return Ok(());
            };
            let text = match shared.ctx.store.list_channels_by_owner(owner).await {
                Ok(channels) if channels.is_empty() => {
                    "📭 You have no channels yet. Use /setup <channel_id>.".to_string()
                }
                Ok(channels) => {
                    let lines: Vec<String> = channels
                        .iter()
                        .map(|c| {
                            format!(
                                "{} {} - {} agent(s)",
                                if c.helper_member { "🟢" } else { "⚪️" },
                                c.channel_id,
                                c.installed_agents.len()
                            )
                        })
                        .collect();
                    format!("📋 Your channels ({}):\n\n{}", channels.len(), lines.join("\n"))
                }
                Err(e) => {
                    error!("[TELEGRAM] Listing channels of {} failed: {}", owner, e);
                    "❌ Could not read your channels, try again later.".to_string()
                }
            };
            bot.send_message(msg.chat.id, text).await?;
        }
        Command::Sync => {
            if shared.ctx.sync_running() {
                bot.send_message(msg.chat.id, "⏳ A sync is already running.")
                    .await?;
                return Ok(());
            }
            let Some(handle) = shared.status(&bot, msg.chat.id, "🔄 Sync starting...").await else {
                return Ok(());
            };
            let shared = shared.clone();
            tokio::spawn(async move {
                let progress = Progress::new(shared.messenger.clone(), handle);
                let text = match request_sync(
                    &shared.ctx,
                    &shared.queue,
                    shared.messenger.as_ref(),
                    &progress,
                )
                .await
                {
                    Ok(report) => report.summary_text(),
                    Err(e) => format!("❌ Sync failed: {}", e),
                };
                shared.edit(handle, &text).await;
            });
        }
        Command::Stats => {
            let ctx = &shared.ctx;
            let text = match ctx.store.global_stats().await {
                Ok(stats) => format!(
                    "📊 Statistics\n\n📢 Channels: {}\n👥 Owners: {}\n🤖 Installed agents: {}\n🔗 Helper memberships: {}/{}\n📋 Queue: {} waiting{}\n🔄 Sync: {}",
                    stats.total_channels,
                    stats.unique_owners,
                    stats.total_installs,
                    stats.active_memberships,
                    ctx.config.max_user_channels,
                    shared.queue.waiting_len().await,
                    if ctx.helper_busy() { ", helper busy" } else { "" },
                    if ctx.sync_running() { "running" } else { "idle" },
                ),
                Err(e) => format!("❌ Could not read statistics: {}", e),
            };
            bot.send_message(msg.chat.id, text).await?;
        }
        Command::HelpArchive => {
            if !msg.chat.is_channel() {
                bot.send_message(msg.chat.id, "Post /helparchive inside the channel itself.")
                    .await?;
                return Ok(());
            }
            archive(&bot, &msg, &shared, user_id).await;
        }
        Command::SyncArchive => {
            let Some(handle) = shared
                .status(&bot, msg.chat.id, "♻️ Archive sync starting...")
                .await
            else {
                return Ok(());
            };
            let shared = shared.clone();
            tokio::spawn(async move {
                let progress = Progress::new(shared.messenger.clone(), handle);
                let text = match sweep_archive(&shared.ctx, &progress).await {
                    Ok(report) => format!(
                        "✅ Archive sync finished!\n\n📊 Channels: {}\n🧹 Helper removed: {}\n⚠️ Errors: {}",
                        report.total, report.expelled, report.errors
                    ),
                    Err(e) => format!("❌ Archive sync failed: {}", e),
                };
                shared.edit(handle, &text).await;
            });
        }
        Command::StatsArchive => {
            let text = match shared.ctx.store.archive_stats().await {
                Ok(stats) => format!(
                    "🗄 Archive statistics\n\n📢 Channels: {}\n👥 Owners: {}\n🤖 Installed agents: {}",
                    stats.total_channels, stats.unique_owners, stats.total_installs
                ),
                Err(e) => format!("❌ Could not read archive statistics: {}", e),
            };
            bot.send_message(msg.chat.id, text).await?;
        }
    }
    Ok(())
}

async fn setup(bot: &Bot, msg: &Message, shared: &Shared, channel: ChannelId, owner: i64) {
    let Some(handle) = shared
        .status(bot, msg.chat.id, "🔍 Checking channel...")
        .await
    else {
        return;
    };
    let text = match request_setup(
        &shared.ctx,
        &shared.queue,
        &shared.notifier,
        channel,
        owner,
        handle,
    )
    .await
    {
        // The position notifier already posted the queue position.
        Ok(SetupOutcome::Enqueued(_)) => return,
        Ok(SetupOutcome::AlreadyQueued(Some(position))) => {
            format!("⏳ This channel is already queued.\nPosition: {}", position)
        }
        Ok(SetupOutcome::AlreadyQueued(None)) => {
            "⏳ The setup of this channel is running right now.".to_string()
        }
        Ok(SetupOutcome::AlreadyComplete) => {
            "✅ All agents are already installed in this channel.".to_string()
        }
        Ok(SetupOutcome::Rejected(e)) => format!(
            "❌ {}\n\n💡 Make me an administrator of the channel with \"Invite Users via Link\" and \"Add New Admins\", then try again.",
            e
        ),
        Err(e) => {
            error!("[TELEGRAM] Setup request for {} failed: {:#}", channel, e);
            format!("❌ Could not queue the setup: {}", e)
        }
    };
    shared.edit(handle, &text).await;
}

async fn archive(bot: &Bot, msg: &Message, shared: &Shared, requester: Option<i64>) {
    let channel = msg.chat.id.0;
    let Some(handle) = shared
        .status(bot, msg.chat.id, "🔍 Checking archive request...")
        .await
    else {
        return;
    };
    let text = match request_archive(
        &shared.ctx,
        &shared.queue,
        &shared.notifier,
        channel,
        requester,
        handle,
    )
    .await
    {
        Ok(ArchiveOutcome::Enqueued(_)) => return,
        Ok(ArchiveOutcome::AlreadyQueued) => "⏳ This channel is already queued.".to_string(),
        Ok(ArchiveOutcome::Blocked) => {
            "⛔ This channel already has a regular setup; archive mode is not available here."
                .to_string()
        }
        Ok(ArchiveOutcome::Rejected(e)) => format!(
            "❌ {}\n\n💡 Archive mode needs me as administrator with every right.",
            e
        ),
        Err(e) => {
            error!("[TELEGRAM] Archive request for {} failed: {:#}", channel, e);
            format!("❌ Could not queue the archive setup: {}", e)
        }
    };
    shared.edit(handle, &text).await;
}

#[async_trait]
impl LifecycleComponent for TelegramInterface {
    async fn on_init(&mut self) -> Result<()> {
        info!("[TELEGRAM] Interface initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        info!("[TELEGRAM] Interface starting...");
        if let Err(e) = self.start_bot().await {
            error!("[TELEGRAM] Bot failed to start: {}", e);
        }
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        if let Some(handle) = self.running.take() {
            handle.abort();
        }
        info!("[TELEGRAM] Interface stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_parsed_with_and_without_bot_suffix() {
        assert_eq!(parse_command("/start"), Some(Command::Help));
        assert_eq!(
            parse_command("/setup@linker_bot -1001234"),
            Some(Command::Setup(Some(-1001234)))
        );
        assert_eq!(parse_command("/SYNC"), Some(Command::Sync));
        assert_eq!(parse_command("/helparchive"), Some(Command::HelpArchive));
    }

    #[test]
    fn bad_setup_arguments_and_plain_text() {
        assert_eq!(parse_command("/setup"), Some(Command::Setup(None)));
        assert_eq!(parse_command("/setup mychannel"), Some(Command::Setup(None)));
        assert_eq!(parse_command("hello /setup 1"), None);
        assert_eq!(parse_command("/unknown"), None);
    }
}
