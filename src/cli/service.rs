use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::doctor::{helper_client, operator_bot};
use crate::core::client::{OperatorClient, PlatformClient};
use crate::core::config::Config;
use crate::core::context::AppContext;
use crate::core::lifecycle::LifecycleManager;
use crate::core::queue::{PositionNotifier, QueueWorker, TaskQueue};
use crate::core::store::Store;
use crate::core::terminal::{self, GuideSection};
use crate::core::workflow::{Workflows, announce_interrupted};
use crate::interfaces::telegram::{BotMessenger, TelegramInterface};
use crate::logging;

/// Build the context, restore the queue and run until Ctrl-C.
pub async fn run_service(data_dir: &Path) -> Result<()> {
    let config = Config::load(data_dir).await?;
    logging::init(&data_dir.join("run"), &config.log_level);
    config.validate()?;
    let config = Arc::new(config);

    let bot = operator_bot(&config)?;
    let operator: Arc<dyn PlatformClient> = Arc::new(OperatorClient::new(bot.clone()));
    let helper: Arc<dyn PlatformClient> = Arc::new(helper_client(&config)?);
    let operator_me = operator.me().await?;
    let helper_me = helper.me().await?;
    info!(
        "Operator {} and helper {} connected",
        operator_me.id, helper_me.id
    );

    let store = Arc::new(Store::open(data_dir).await?);
    let ctx = Arc::new(AppContext::new(operator, helper, store.clone(), config.clone()));
    let messenger = Arc::new(BotMessenger::new(bot.clone()));

    let (queue, interrupted) = TaskQueue::restore(store.clone(), config.clone()).await?;
    let queue = Arc::new(queue);
    if let Some(task) = interrupted {
        announce_interrupted(messenger.as_ref(), &task).await;
    }
    let notifier = Arc::new(PositionNotifier::new(
        queue.clone(),
        messenger.clone(),
        config.clone(),
    ));

    let mut lifecycle = LifecycleManager::new().await?;
    notifier.clone().schedule(&lifecycle.scheduler).await?;
    let worker = QueueWorker::new(
        ctx.clone(),
        queue.clone(),
        Arc::new(Workflows::new(ctx.clone())),
        messenger.clone(),
        notifier.clone(),
    );
    lifecycle.attach("queue worker", Arc::new(Mutex::new(worker)));
    let telegram = TelegramInterface::new(bot, ctx.clone(), queue.clone(), notifier, messenger);
    lifecycle.attach("telegram", Arc::new(Mutex::new(telegram)));
    lifecycle.start().await?;

    terminal::print_banner();
    GuideSection::new("linkerx is running")
        .status(
            "Operator",
            &format!(
                "@{}",
                operator_me.username.as_deref().unwrap_or("unknown")
            ),
        )
        .status("Helper", &helper_me.id.to_string())
        .status("Agents", &config.bots_to_add.join(", "))
        .status("Queued tasks", &queue.waiting_len().await.to_string())
        .status(
            "Helper memberships",
            &format!(
                "{}/{}",
                store.count_active().await?,
                config.max_user_channels
            ),
        )
        .blank()
        .text("Press Ctrl+C to stop.")
        .print();
    println!();

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await?;
    terminal::print_goodbye();
    Ok(())
}
