mod notifier;
mod types;
mod worker;

use anyhow::{Result, bail};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::client::ChannelId;
use crate::core::config::Config;
use crate::core::store::Store;

pub use notifier::PositionNotifier;
pub use types::{Enqueued, QueueSnapshot, TaskDescriptor, TaskKind};
pub use worker::{QueueWorker, TaskHandler};

pub const SNAPSHOT_KEY: &str = "setup_queue";

/// Single-consumer FIFO of privileged tasks. The snapshot is written to the
/// store after every transition so waiting work survives a restart.
pub struct TaskQueue {
    store: Arc<Store>,
    config: Arc<Config>,
    state: Mutex<QueueSnapshot>,
    wake: Notify,
}

impl TaskQueue {
    pub fn new(store: Arc<Store>, config: Arc<Config>) -> Self {
        Self {
            store,
            config,
            state: Mutex::new(QueueSnapshot::default()),
            wake: Notify::new(),
        }
    }

    /// Rebuild the queue from the last snapshot. Waiting tasks keep their
    /// order. A task that was running when the process stopped is returned
    /// separately and not replayed.
    pub async fn restore(
        store: Arc<Store>,
        config: Arc<Config>,
    ) -> Result<(Self, Option<TaskDescriptor>)> {
        let snapshot: QueueSnapshot = store.get_state(SNAPSHOT_KEY).await?.unwrap_or_default();
        let interrupted = snapshot.active;
        let waiting = snapshot.waiting;
        if !waiting.is_empty() {
            info!("[QUEUE] Replaying {} waiting task(s)", waiting.len());
        }
        if let Some(task) = &interrupted {
            warn!(
                "[QUEUE] {} task for channel {} was interrupted and will not be replayed",
                task.kind, task.channel_id
            );
        }

        let queue = Self::new(store, config);
        {
            let mut state = queue.state.lock().await;
            state.waiting = waiting;
            queue.persist(&state).await?;
        }
        queue.wake.notify_one();
        Ok((queue, interrupted))
    }

    async fn persist(&self, state: &QueueSnapshot) -> Result<()> {
        self.store.put_state(SNAPSHOT_KEY, state).await
    }

    pub async fn enqueue(&self, task: TaskDescriptor) -> Result<Enqueued> {
        let position = {
            let mut state = self.state.lock().await;
            let duplicate = state.active.as_ref().map(|t| t.channel_id) == Some(task.channel_id)
                || state.waiting.iter().any(|t| t.channel_id == task.channel_id);
            if duplicate {
                bail!("channel {} is already queued", task.channel_id);
            }
            info!(
                "[QUEUE] Enqueued {} for channel {} (owner {})",
                task.kind, task.channel_id, task.owner_id
            );
            let mut pending = state.clone();
            pending.waiting.push(task);
            self.persist(&pending).await?;
            *state = pending;
            state.waiting.len()
        };
        self.wake.notify_one();
        Ok(Enqueued {
            position,
            eta: self.config.eta(position),
        })
    }

    /// 1-based place of `channel` among waiting tasks.
    pub async fn position(&self, channel: ChannelId) -> Option<usize> {
        let state = self.state.lock().await;
        state
            .waiting
            .iter()
            .position(|t| t.channel_id == channel)
            .map(|i| i + 1)
    }

    /// Waiting or running.
    pub async fn contains(&self, channel: ChannelId) -> bool {
        let state = self.state.lock().await;
        state.active.as_ref().is_some_and(|t| t.channel_id == channel)
            || state.waiting.iter().any(|t| t.channel_id == channel)
    }

    pub async fn is_busy(&self) -> bool {
        let state = self.state.lock().await;
        state.active.is_some() || !state.waiting.is_empty()
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        self.state.lock().await.clone()
    }

    pub async fn waiting_len(&self) -> usize {
        self.state.lock().await.waiting.len()
    }

    /// Wait for the head task and mark it active.
    pub async fn next(&self) -> Result<TaskDescriptor> {
        loop {
            {
                let mut state = self.state.lock().await;
                if !state.waiting.is_empty() {
                    let mut pending = state.clone();
                    let task = pending.waiting.remove(0);
                    pending.active = Some(task.clone());
                    self.persist(&pending).await?;
                    *state = pending;
                    return Ok(task);
                }
            }
            self.wake.notified().await;
        }
    }

    /// Retire the active task, whatever its outcome.
    pub async fn finish(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.active.as_ref().is_some_and(|t| t.id == id) {
            state.active = None;
            self.persist(&state).await?;
        }
        Ok(())
    }
}
