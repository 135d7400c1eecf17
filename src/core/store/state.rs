use anyhow::Result;
use chrono::Utc;
use rusqlite::params;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{Store, ts};

impl Store {
    /// Upsert a JSON snapshot under a fixed key.
    pub async fn put_state<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO system_state (key, value_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value_json = excluded.value_json,
                updated_at = excluded.updated_at",
            params![key, json, ts(Utc::now())],
        )?;
        Ok(())
    }

    pub async fn get_state<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT value_json FROM system_state WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => {
                let raw: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    pub async fn delete_state(&self, key: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.execute("DELETE FROM system_state WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        items: Vec<i64>,
    }

    #[tokio::test]
    async fn state_roundtrip_and_overwrite() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_state::<Snapshot>("k").await.unwrap().is_none());

        store.put_state("k", &Snapshot { items: vec![1, 2] }).await.unwrap();
        store.put_state("k", &Snapshot { items: vec![3] }).await.unwrap();
        assert_eq!(
            store.get_state::<Snapshot>("k").await.unwrap(),
            Some(Snapshot { items: vec![3] })
        );

        store.delete_state("k").await.unwrap();
        assert!(store.get_state::<Snapshot>("k").await.unwrap().is_none());
    }
}
