use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::core::client::ChannelId;
use crate::core::status::StatusHandle;

/// Which workflow runs the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Setup,
    Archive,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Setup => write!(f, "setup"),
            TaskKind::Archive => write!(f, "archive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub id: Uuid,
    pub channel_id: ChannelId,
    pub owner_id: i64,
    pub kind: TaskKind,
    pub status: StatusHandle,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskDescriptor {
    pub fn new(channel_id: ChannelId, owner_id: i64, kind: TaskKind, status: StatusHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel_id,
            owner_id,
            kind,
            status,
            enqueued_at: Utc::now(),
        }
    }
}

/// What is persisted after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub waiting: Vec<TaskDescriptor>,
    #[serde(default)]
    pub active: Option<TaskDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    /// 1-based place among waiting tasks.
    pub position: usize,
    pub eta: Duration,
}
