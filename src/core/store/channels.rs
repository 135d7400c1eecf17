use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Row, params};

use super::types::{ChannelRecord, GlobalStats};
use super::{Store, parse_agents, parse_ts, ts};
use crate::core::client::ChannelId;

const CHANNEL_COLUMNS: &str = "channel_id, owner_id, installed_agents, helper_member, helper_joined_at, helper_left_at, updated_at";

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelRecord> {
    let agents: String = row.get(2)?;
    let updated: String = row.get(6)?;
    Ok(ChannelRecord {
        channel_id: row.get(0)?,
        owner_id: row.get(1)?,
        installed_agents: parse_agents(&agents),
        helper_member: row.get::<_, i64>(3)? != 0,
        helper_joined_at: parse_ts(row.get(4)?),
        helper_left_at: parse_ts(row.get(5)?),
        updated_at: parse_ts(Some(updated)).unwrap_or_else(Utc::now),
    })
}

impl Store {
    pub async fn get_channel(&self, channel_id: ChannelId) -> Result<Option<ChannelRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM channels WHERE channel_id = ?1 LIMIT 1",
            CHANNEL_COLUMNS
        ))?;
        let mut rows = stmt.query(params![channel_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(channel_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// All channel records in registration order.
    /// Regular channels only; ids that hold an archive record are left out.
    pub async fn list_channels(&self) -> Result<Vec<ChannelRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM channels
             WHERE channel_id NOT IN (SELECT channel_id FROM archive_channels)
             ORDER BY rowid ASC",
            CHANNEL_COLUMNS
        ))?;
        let rows = stmt.query_map([], channel_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn list_channels_by_owner(&self, owner_id: i64) -> Result<Vec<ChannelRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM channels WHERE owner_id = ?1 ORDER BY rowid ASC",
            CHANNEL_COLUMNS
        ))?;
        let rows = stmt.query_map(params![owner_id], channel_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Record the outcome of a setup: owner and installed agents.
    pub async fn save_setup(
        &self,
        channel_id: ChannelId,
        owner_id: i64,
        installed: &[String],
    ) -> Result<()> {
        let db = self.db.lock().await;
        let agents = serde_json::to_string(installed)?;
        db.execute(
            "INSERT INTO channels (channel_id, owner_id, installed_agents, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(channel_id) DO UPDATE SET
                owner_id = excluded.owner_id,
                installed_agents = excluded.installed_agents,
                updated_at = excluded.updated_at",
            params![channel_id, owner_id, agents, ts(Utc::now())],
        )?;
        Ok(())
    }

    pub async fn update_installed(&self, channel_id: ChannelId, installed: &[String]) -> Result<bool> {
        let db = self.db.lock().await;
        let agents = serde_json::to_string(installed)?;
        let rows = db.execute(
            "UPDATE channels SET installed_agents = ?1, updated_at = ?2 WHERE channel_id = ?3",
            params![agents, ts(Utc::now()), channel_id],
        )?;
        Ok(rows > 0)
    }

    /// Mark the helper as present. Creates the record on first contact; an
    /// existing owner is kept.
    pub async fn record_helper_joined(
        &self,
        channel_id: ChannelId,
        owner_id: i64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO channels (channel_id, owner_id, helper_member, helper_joined_at, updated_at)
             VALUES (?1, ?2, 1, ?3, ?3)
             ON CONFLICT(channel_id) DO UPDATE SET
                helper_member = 1,
                helper_joined_at = excluded.helper_joined_at,
                updated_at = excluded.updated_at",
            params![channel_id, owner_id, ts(at)],
        )?;
        Ok(())
    }

    /// Refresh the membership flag without touching the join time. Used when
    /// the helper turns out to be present already.
    pub async fn confirm_helper_present(&self, channel_id: ChannelId, owner_id: i64) -> Result<()> {
        let now = ts(Utc::now());
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO channels (channel_id, owner_id, helper_member, helper_joined_at, updated_at)
             VALUES (?1, ?2, 1, ?3, ?3)
             ON CONFLICT(channel_id) DO UPDATE SET
                helper_member = 1,
                helper_joined_at = COALESCE(channels.helper_joined_at, excluded.helper_joined_at),
                updated_at = excluded.updated_at",
            params![channel_id, owner_id, now],
        )?;
        Ok(())
    }

    pub async fn record_helper_left(&self, channel_id: ChannelId, at: DateTime<Utc>) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE channels SET helper_member = 0, helper_left_at = ?1, updated_at = ?1
             WHERE channel_id = ?2",
            params![ts(at), channel_id],
        )?;
        Ok(rows > 0)
    }

    pub async fn count_active(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM channels WHERE helper_member = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Active memberships, oldest join first. Channels with no join time
    /// sort first.
    pub async fn active_by_join_age(&self) -> Result<Vec<ChannelRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM channels WHERE helper_member = 1
             ORDER BY helper_joined_at IS NOT NULL, helper_joined_at ASC, rowid ASC",
            CHANNEL_COLUMNS
        ))?;
        let rows = stmt.query_map([], channel_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Administrative cleanup; nothing else deletes channel records.
    pub async fn delete_channel(&self, channel_id: ChannelId) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "DELETE FROM channels WHERE channel_id = ?1",
            params![channel_id],
        )?;
        Ok(rows > 0)
    }

    pub async fn global_stats(&self) -> Result<GlobalStats> {
        let db = self.db.lock().await;
        let (total, owners, installs, active): (i64, i64, i64, i64) = db.query_row(
            "SELECT COUNT(*),
                    COUNT(DISTINCT owner_id),
                    COALESCE(SUM(json_array_length(installed_agents)), 0),
                    COALESCE(SUM(helper_member), 0)
             FROM channels",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        let oldest: Option<String> = db.query_row(
            "SELECT MIN(helper_joined_at) FROM channels WHERE helper_member = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(GlobalStats {
            total_channels: total as usize,
            unique_owners: owners as usize,
            total_installs: installs as usize,
            active_memberships: active as usize,
            oldest_membership: parse_ts(oldest),
        })
    }
}
