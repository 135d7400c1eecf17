use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A message the caller can keep editing to show progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusHandle {
    pub chat_id: i64,
    pub message_id: i32,
}

#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn update(&self, handle: &StatusHandle, text: &str) -> Result<()>;
}

/// Direct messages to channel owners, outside any status message.
#[async_trait]
pub trait OwnerNotifier: Send + Sync {
    async fn notify(&self, user_id: i64, text: &str) -> Result<()>;
}

/// Progress reporting for one workflow. Failures to report never fail the
/// workflow itself.
#[derive(Clone, Default)]
pub struct Progress {
    sink: Option<Arc<dyn StatusSink>>,
    handle: Option<StatusHandle>,
}

impl Progress {
    pub fn new(sink: Arc<dyn StatusSink>, handle: StatusHandle) -> Self {
        Self {
            sink: Some(sink),
            handle: Some(handle),
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub async fn say(&self, text: &str) {
        if let (Some(sink), Some(handle)) = (&self.sink, &self.handle)
            && let Err(e) = sink.update(handle, text).await
        {
            debug!("Status update for chat {} dropped: {}", handle.chat_id, e);
        }
    }
}
