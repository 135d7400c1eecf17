use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{PositionNotifier, TaskDescriptor, TaskQueue};
use crate::core::context::AppContext;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::status::{Progress, StatusSink};

/// Runs one dequeued task. The returned text is the final status shown to
/// the caller.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &TaskDescriptor, progress: &Progress) -> Result<String>;
}

/// The only consumer of the [`TaskQueue`]. Tasks run strictly one after
/// another, each under the helper-session lease.
pub struct QueueWorker {
    ctx: Arc<AppContext>,
    queue: Arc<TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    sink: Arc<dyn StatusSink>,
    notifier: Arc<PositionNotifier>,
    running: Option<JoinHandle<()>>,
}

impl QueueWorker {
    pub fn new(
        ctx: Arc<AppContext>,
        queue: Arc<TaskQueue>,
        handler: Arc<dyn TaskHandler>,
        sink: Arc<dyn StatusSink>,
        notifier: Arc<PositionNotifier>,
    ) -> Self {
        Self {
            ctx,
            queue,
            handler,
            sink,
            notifier,
            running: None,
        }
    }

    /// Drain the queue forever.
    pub async fn run(&self) {
        loop {
            let task = match self.queue.next().await {
                Ok(task) => task,
                Err(e) => {
                    error!("[QUEUE] Dequeue failed: {:#}", e);
                    tokio::time::sleep(self.ctx.config.queue_cooldown()).await;
                    continue;
                }
            };
            if let Err(e) = self.process(task).await {
                error!("[QUEUE] Could not retire task: {:#}", e);
            }
        }
    }

    /// Run one task that `next` already marked active, then retire it and
    /// cool down. Handler errors and panics stay inside the task.
    pub async fn process(&self, task: TaskDescriptor) -> Result<()> {
        // Also waits for a queued notice still being posted for this task.
        self.notifier.refresh(true).await;

        let lease = self.ctx.lease_helper().await;
        let guard = self.ctx.protected.protect(task.channel_id);
        info!(
            "[QUEUE] Starting {} for channel {} (owner {})",
            task.kind, task.channel_id, task.owner_id
        );

        let progress = Progress::new(self.sink.clone(), task.status);
        let handler = self.handler.clone();
        let job = {
            let task = task.clone();
            let progress = progress.clone();
            tokio::spawn(async move { handler.handle(&task, &progress).await })
        };

        match job.await {
            Ok(Ok(summary)) => {
                info!("[QUEUE] Completed {} for channel {}", task.kind, task.channel_id);
                progress.say(&summary).await;
            }
            Ok(Err(e)) => {
                warn!(
                    "[QUEUE] {} for channel {} failed: {:#}",
                    task.kind, task.channel_id, e
                );
                progress.say(&format!("❌ {} failed: {}", task.kind, e)).await;
            }
            Err(e) => {
                error!(
                    "[QUEUE] {} for channel {} aborted: {}",
                    task.kind, task.channel_id, e
                );
                progress
                    .say(&format!("❌ {} aborted by an internal error.", task.kind))
                    .await;
            }
        }

        drop(guard);
        drop(lease);
        self.queue.finish(task.id).await?;
        tokio::time::sleep(self.ctx.config.queue_cooldown()).await;
        Ok(())
    }
}

#[async_trait]
impl LifecycleComponent for QueueWorker {
    async fn on_init(&mut self) -> Result<()> {
        info!("[QUEUE] Worker initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let worker = QueueWorker {
            ctx: self.ctx.clone(),
            queue: self.queue.clone(),
            handler: self.handler.clone(),
            sink: self.sink.clone(),
            notifier: self.notifier.clone(),
            running: None,
        };
        self.running = Some(tokio::spawn(async move { worker.run().await }));
        info!("[QUEUE] Worker started");
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        if let Some(handle) = self.running.take() {
            handle.abort();
        }
        info!("[QUEUE] Worker stopped");
        Ok(())
    }
}
