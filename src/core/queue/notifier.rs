use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error};
use uuid::Uuid;

use super::{TaskDescriptor, TaskQueue};
use crate::core::config::Config;
use crate::core::status::StatusSink;

struct Sent {
    position: usize,
    at: Instant,
}

/// Keeps waiting callers informed of their place in line. A status message
/// is edited only when its position changed, and at most once per notify
/// interval unless forced.
pub struct PositionNotifier {
    queue: Arc<TaskQueue>,
    sink: Arc<dyn StatusSink>,
    config: Arc<Config>,
    sent: Mutex<HashMap<Uuid, Sent>>,
}

pub fn queued_text(position: usize, eta: Duration) -> String {
    let minutes = eta.as_secs().div_ceil(60).max(1);
    format!(
        "📋 Queued. Position: {}\n⏱ Estimated wait: ~{} min",
        position, minutes
    )
}

/// Six-field cron expression firing every `interval`.
pub(crate) fn cron_for(interval: Duration) -> String {
    let secs = interval.as_secs().max(1);
    if secs < 60 {
        format!("0/{} * * * * *", secs)
    } else {
        format!("0 0/{} * * * *", (secs / 60).min(59))
    }
}

impl PositionNotifier {
    pub fn new(queue: Arc<TaskQueue>, sink: Arc<dyn StatusSink>, config: Arc<Config>) -> Self {
        Self {
            queue,
            sink,
            config,
            sent: Mutex::new(HashMap::new()),
        }
    }

    /// Post the first queue position of a freshly enqueued task. Nothing is
    /// sent once the worker has taken the task, so its running status is
    /// never overwritten.
    pub async fn record(&self, task: &TaskDescriptor) {
        let mut sent = self.sent.lock().await;
        let Some(position) = self.queue.position(task.channel_id).await else {
            return;
        };
        let text = queued_text(position, self.config.eta(position));
        if let Err(e) = self.sink.update(&task.status, &text).await {
            debug!("[QUEUE] Queued notice for {} failed: {}", task.channel_id, e);
        }
        sent.insert(
            task.id,
            Sent {
                position,
                at: Instant::now(),
            },
        );
    }

    /// Edit the status of every waiting task whose position moved. Returns
    /// the number of edits sent.
    pub async fn refresh(&self, force: bool) -> usize {
        let waiting = self.queue.snapshot().await.waiting;
        let interval = self.config.queue_notify_interval();
        let mut sent = self.sent.lock().await;
        sent.retain(|id, _| waiting.iter().any(|t| t.id == *id));

        let mut edits = 0;
        for (index, task) in waiting.iter().enumerate() {
            let position = index + 1;
            if let Some(prev) = sent.get(&task.id)
                && (prev.position == position || (!force && prev.at.elapsed() < interval))
            {
                continue;
            }
            let text = queued_text(position, self.config.eta(position));
            match self.sink.update(&task.status, &text).await {
                Ok(()) => edits += 1,
                Err(e) => debug!("[QUEUE] Position update for {} failed: {}", task.channel_id, e),
            }
            sent.insert(
                task.id,
                Sent {
                    position,
                    at: Instant::now(),
                },
            );
        }
        edits
    }

    pub async fn schedule(self: Arc<Self>, scheduler: &JobScheduler) -> Result<()> {
        let cron = cron_for(self.config.queue_notify_interval());
        let notifier = self.clone();
        match Job::new_async(cron.as_str(), move |_uuid, mut _l| {
            let notifier = notifier.clone();
            Box::pin(async move {
                notifier.refresh(false).await;
            })
        }) {
            Ok(job) => {
                scheduler.add(job).await?;
            }
            Err(e) => {
                error!("[QUEUE] Failed to create position notifier job: {}", e);
            }
        }
        Ok(())
    }
}
