mod archive;
mod channels;
mod state;
pub mod types;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::platform::{NativePlatform, Platform};

pub use types::{ArchiveRecord, ArchiveStats, ChannelRecord, GlobalStats};

pub const DB_FILE: &str = "linkerx.db";

/// Durable state: channel records, archive records and keyed system-state
/// snapshots, all in one SQLite file. Every write is a single-row upsert.
pub struct Store {
    db: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS channels (
        channel_id INTEGER PRIMARY KEY,
        owner_id INTEGER NOT NULL,
        installed_agents TEXT NOT NULL DEFAULT '[]',
        helper_member INTEGER NOT NULL DEFAULT 0,
        helper_joined_at TEXT,
        helper_left_at TEXT,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_channels_owner ON channels(owner_id)",
    "CREATE INDEX IF NOT EXISTS idx_channels_active_joined ON channels(helper_member, helper_joined_at)",
    "CREATE TABLE IF NOT EXISTS archive_channels (
        channel_id INTEGER PRIMARY KEY,
        owner_id INTEGER NOT NULL,
        installed_agents TEXT NOT NULL DEFAULT '[]',
        archived_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS system_state (
        key TEXT PRIMARY KEY,
        value_json TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

fn init_schema(db: &Connection) -> Result<()> {
    for stmt in SCHEMA {
        db.execute(stmt, [])?;
    }
    Ok(())
}

/// Fixed-width UTC timestamps so that text ordering is time ordering.
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

pub(crate) fn parse_agents(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

impl Store {
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        if !data_dir.exists() {
            tokio::fs::create_dir_all(data_dir).await?;
        }
        NativePlatform::restrict_dir_permissions(data_dir);

        let path = data_dir.join(DB_FILE);
        let db = Connection::open(&path)?;
        NativePlatform::restrict_file_permissions(&path);
        init_schema(&db)?;
        info!("Store opened at {}", path.display());

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            path: Some(path),
        })
    }

    /// Non-persistent store; used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        init_schema(&db)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Make every write fail until switched back.
    #[cfg(test)]
    pub(crate) async fn set_read_only(&self, on: bool) -> Result<()> {
        let db = self.db.lock().await;
        db.pragma_update(None, "query_only", on)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_file_store_and_reopens_with_data() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path()).await.unwrap();
            store.save_setup(-100, 7, &["@a".to_string()]).await.unwrap();
        }
        let store = Store::open(dir.path()).await.unwrap();
        let rec = store.get_channel(-100).await.unwrap().unwrap();
        assert_eq!(rec.installed_agents, vec!["@a"]);
        assert_eq!(store.path(), Some(dir.path().join(DB_FILE).as_path()));
    }

    #[test]
    fn timestamps_sort_lexicographically() {
        let early = DateTime::parse_from_rfc3339("2026-01-01T00:00:01Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = DateTime::parse_from_rfc3339("2026-01-01T00:00:10.5Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(ts(early) < ts(late));
        assert_eq!(parse_ts(Some(ts(late))), Some(late));
    }
}
