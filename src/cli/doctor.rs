use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use teloxide::prelude::*;

use crate::core::client::{BridgeClient, OperatorClient, PlatformClient};
use crate::core::config::{CONFIG_FILE, Config};
use crate::core::store::Store;
use crate::core::terminal::{
    GuideSection, print_error, print_info, print_step, print_success, print_warn,
};

pub(crate) fn operator_bot(config: &Config) -> Result<Bot> {
    let mut bot = Bot::new(&config.bot_token);
    if let Some(api) = &config.operator_api_url {
        bot = bot.set_api_url(url::Url::parse(api)?);
    }
    Ok(bot)
}

pub(crate) fn helper_client(config: &Config) -> Result<BridgeClient> {
    let base = url::Url::parse(&config.helper_api_url)?;
    Ok(BridgeClient::new(base, config.helper_token.clone()))
}

async fn check_identity(label: &str, client: Arc<dyn PlatformClient>) -> bool {
    match client.me().await {
        Ok(me) => {
            print_success(&format!(
                "{} reachable: {} (@{})",
                label,
                me.id,
                me.username.as_deref().unwrap_or("-")
            ));
            true
        }
        Err(e) => {
            print_error(&format!("{} unreachable: {}", label, e));
            false
        }
    }
}

/// Validate settings, open the store and reach both identities.
pub async fn run_doctor(data_dir: &Path) -> Result<()> {
    print_step("Checking linkerx setup...");
    println!();

    let config_path = data_dir.join(CONFIG_FILE);
    if config_path.exists() {
        print_success(&format!("Config file found: {}", config_path.display()));
    } else {
        print_info(&format!(
            "No {} in {}; using environment variables only.",
            CONFIG_FILE,
            data_dir.display()
        ));
    }

    let config = match Config::load(data_dir).await {
        Ok(config) => config,
        Err(e) => {
            print_error(&format!("Config could not be read: {:#}", e));
            return Ok(());
        }
    };
    let mut healthy = true;
    match config.validate() {
        Ok(warnings) => {
            print_success("Required settings present.");
            for w in warnings {
                print_warn(&w);
            }
        }
        Err(e) => {
            print_error(&format!("{:#}", e));
            healthy = false;
        }
    }

    match Store::open(data_dir).await {
        Ok(store) => {
            let stats = store.global_stats().await?;
            print_success(&format!(
                "Store opened at {}: {} channel(s), {} helper membership(s).",
                store
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "memory".to_string()),
                stats.total_channels,
                stats.active_memberships
            ));
        }
        Err(e) => {
            print_error(&format!("Store could not be opened: {:#}", e));
            healthy = false;
        }
    }

    if healthy {
        let operator = Arc::new(OperatorClient::new(operator_bot(&config)?));
        healthy &= check_identity("Operator bot", operator).await;
        let helper = Arc::new(helper_client(&config)?);
        healthy &= check_identity("Helper account", helper).await;
    }

    GuideSection::new("Effective settings")
        .status("Data directory", &data_dir.display().to_string())
        .status("Agents", &config.bots_to_add.join(", "))
        .status("Membership ceiling", &config.max_user_channels.to_string())
        .status("Evictions per call", &config.max_evictions_per_call.to_string())
        .status(
            "Delays (action/channel/settle)",
            &format!(
                "{}s / {}s / {}s",
                config.sync_action_delay, config.sync_channel_delay, config.helper_settle_delay
            ),
        )
        .status(
            "Grant retries",
            &format!("{} x {}s", config.grant_retry_attempts, config.grant_retry_delay),
        )
        .status(
            "Owner commands",
            if config.owner_commands_enabled() {
                "enabled"
            } else {
                "disabled"
            },
        )
        .print();
    println!();

    if healthy {
        print_success("All checks passed.");
    } else {
        print_warn("Some checks failed; fix them before running the service.");
    }
    Ok(())
}
