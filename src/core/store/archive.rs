use anyhow::Result;
use chrono::Utc;
use rusqlite::{Row, params};

use super::types::{ArchiveRecord, ArchiveStats};
use super::{Store, parse_agents, parse_ts, ts};
use crate::core::client::ChannelId;

fn archive_from_row(row: &Row<'_>) -> rusqlite::Result<ArchiveRecord> {
    let agents: String = row.get(2)?;
    let archived: String = row.get(3)?;
    Ok(ArchiveRecord {
        channel_id: row.get(0)?,
        owner_id: row.get(1)?,
        installed_agents: parse_agents(&agents),
        archived_at: parse_ts(Some(archived)).unwrap_or_else(Utc::now),
    })
}

impl Store {
    pub async fn save_archive(
        &self,
        channel_id: ChannelId,
        owner_id: i64,
        installed: &[String],
    ) -> Result<()> {
        let db = self.db.lock().await;
        let agents = serde_json::to_string(installed)?;
        db.execute(
            "INSERT INTO archive_channels (channel_id, owner_id, installed_agents, archived_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(channel_id) DO UPDATE SET
                owner_id = excluded.owner_id,
                installed_agents = excluded.installed_agents,
                archived_at = excluded.archived_at",
            params![channel_id, owner_id, agents, ts(Utc::now())],
        )?;
        Ok(())
    }

    pub async fn get_archive(&self, channel_id: ChannelId) -> Result<Option<ArchiveRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT channel_id, owner_id, installed_agents, archived_at
             FROM archive_channels WHERE channel_id = ?1 LIMIT 1",
        )?;
        let mut rows = stmt.query(params![channel_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(archive_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn list_archive(&self) -> Result<Vec<ArchiveRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT channel_id, owner_id, installed_agents, archived_at
             FROM archive_channels ORDER BY archived_at ASC",
        )?;
        let rows = stmt.query_map([], archive_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn archive_stats(&self) -> Result<ArchiveStats> {
        let db = self.db.lock().await;
        let (total, owners, installs): (i64, i64, i64) = db.query_row(
            "SELECT COUNT(*),
                    COUNT(DISTINCT owner_id),
                    COALESCE(SUM(json_array_length(installed_agents)), 0)
             FROM archive_channels",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(ArchiveStats {
            total_channels: total as usize,
            unique_owners: owners as usize,
            total_installs: installs as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn archive_records_are_separate_from_channels() {
        let store = Store::open_in_memory().unwrap();
        store
            .save_archive(-5, 3, &["@a".to_string(), "@b".to_string()])
            .await
            .unwrap();
        assert!(store.get_channel(-5).await.unwrap().is_none());

        let rec = store.get_archive(-5).await.unwrap().unwrap();
        assert_eq!(rec.owner_id, 3);
        assert_eq!(rec.installed_agents.len(), 2);

        let stats = store.archive_stats().await.unwrap();
        assert_eq!(stats.total_channels, 1);
        assert_eq!(stats.unique_owners, 1);
        assert_eq!(stats.total_installs, 2);
    }

    #[tokio::test]
    async fn resaving_replaces_the_agent_list() {
        let store = Store::open_in_memory().unwrap();
        store.save_archive(-5, 3, &["@a".to_string()]).await.unwrap();
        store.save_archive(-5, 3, &[]).await.unwrap();
        let all = store.list_archive().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].installed_agents.is_empty());
    }
}
