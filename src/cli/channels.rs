use anyhow::Result;
use console::style;
use std::path::Path;

use crate::core::client::ChannelId;
use crate::core::store::{ChannelRecord, Store};
use crate::core::terminal::{GuideSection, print_info, print_success, print_warn};

fn row(record: &ChannelRecord) -> String {
    let state = if record.helper_member {
        style("active").green()
    } else {
        style("inactive").dim()
    };
    format!(
        "{:<16} owner {:<12} {:<8} {}",
        record.channel_id,
        record.owner_id,
        state,
        if record.installed_agents.is_empty() {
            "-".to_string()
        } else {
            record.installed_agents.join(", ")
        }
    )
}

pub async fn list_channels(data_dir: &Path, owner: Option<i64>) -> Result<()> {
    let store = Store::open(data_dir).await?;
    let records = match owner {
        Some(owner) => store.list_channels_by_owner(owner).await?,
        None => store.list_channels().await?,
    };
    if records.is_empty() {
        print_info("No channels recorded.");
        return Ok(());
    }

    let title = match owner {
        Some(owner) => format!("Channels of {} ({})", owner, records.len()),
        None => format!("Channels ({})", records.len()),
    };
    records
        .iter()
        .fold(GuideSection::new(&title), |section, r| section.text(&row(r)))
        .print();
    println!();
    Ok(())
}

pub async fn print_stats(data_dir: &Path) -> Result<()> {
    let store = Store::open(data_dir).await?;
    let stats = store.global_stats().await?;
    let archive = store.archive_stats().await?;

    GuideSection::new("Channels")
        .status("Total", &stats.total_channels.to_string())
        .status("Owners", &stats.unique_owners.to_string())
        .status("Installed agents", &stats.total_installs.to_string())
        .status("Helper memberships", &stats.active_memberships.to_string())
        .status(
            "Oldest membership",
            &stats
                .oldest_membership
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
        )
        .print();
    GuideSection::new("Archive")
        .status("Total", &archive.total_channels.to_string())
        .status("Owners", &archive.unique_owners.to_string())
        .status("Installed agents", &archive.total_installs.to_string())
        .print();
    println!();
    Ok(())
}

pub async fn purge_channel(data_dir: &Path, channel: ChannelId) -> Result<()> {
    let store = Store::open(data_dir).await?;
    if store.delete_channel(channel).await? {
        print_success(&format!("Record of channel {} deleted.", channel));
    } else {
        print_warn(&format!("No record for channel {}.", channel));
    }
    Ok(())
}
