use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::client::ChannelId;

/// Bookkeeping for one channel the service has set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelRecord {
    pub channel_id: ChannelId,
    pub owner_id: i64,
    pub installed_agents: Vec<String>,
    pub helper_member: bool,
    pub helper_joined_at: Option<DateTime<Utc>>,
    pub helper_left_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveRecord {
    pub channel_id: ChannelId,
    pub owner_id: i64,
    pub installed_agents: Vec<String>,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GlobalStats {
    pub total_channels: usize,
    pub unique_owners: usize,
    pub total_installs: usize,
    pub active_memberships: usize,
    pub oldest_membership: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveStats {
    pub total_channels: usize,
    pub unique_owners: usize,
    pub total_installs: usize,
}
