use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::fakes::{RecordingSink, config, harness};
use crate::core::client::ChannelId;
use crate::core::context::AppContext;
use crate::core::queue::{PositionNotifier, QueueWorker, TaskDescriptor, TaskHandler, TaskKind, TaskQueue};
use crate::core::status::{Progress, StatusHandle};

/// Fails channel -2, panics on -3, succeeds otherwise.
struct ScriptedHandler {
    ctx: Arc<AppContext>,
    seen: Mutex<Vec<(ChannelId, bool, bool)>>,
}

#[async_trait]
impl TaskHandler for ScriptedHandler {
    async fn handle(&self, task: &TaskDescriptor, progress: &Progress) -> Result<String> {
        let protected = self.ctx.protected.contains(task.channel_id);
        let leased = self.ctx.helper_busy();
        self.seen
            .lock()
            .unwrap()
            .push((task.channel_id, protected, leased));
        progress.say("working").await;
        match task.channel_id {
            -2 => bail!("boom"),
            -3 => panic!("handler panicked"),
            c => Ok(format!("done {}", c)),
        }
    }
}

fn status(channel: ChannelId) -> StatusHandle {
    StatusHandle {
        chat_id: 9,
        message_id: channel.unsigned_abs() as i32,
    }
}

#[tokio::test(start_paused = true)]
async fn tasks_run_in_order_and_failures_stay_contained() {
    let h = harness(config(&["@alpha"]));
    let queue = Arc::new(TaskQueue::new(h.ctx.store.clone(), h.ctx.config.clone()));
    let sink = Arc::new(RecordingSink::default());
    let notifier = Arc::new(PositionNotifier::new(queue.clone(), sink.clone(), h.ctx.config.clone()));
    let handler = Arc::new(ScriptedHandler {
        ctx: h.ctx.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let worker = QueueWorker::new(h.ctx.clone(), queue.clone(), handler.clone(), sink.clone(), notifier);

    for c in [-1, -2, -3, -4] {
        queue
            .enqueue(TaskDescriptor::new(c, 1, TaskKind::Setup, status(c)))
            .await
            .unwrap();
    }
    for _ in 0..4 {
        let task = queue.next().await.unwrap();
        worker.process(task).await.unwrap();
    }

    let seen = handler.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            (-1, true, true),
            (-2, true, true),
            (-3, true, true),
            (-4, true, true)
        ]
    );

    assert_eq!(sink.last_for(status(-1)).as_deref(), Some("done -1"));
    assert!(sink.last_for(status(-2)).unwrap().contains("failed: boom"));
    assert!(sink.last_for(status(-3)).unwrap().contains("aborted"));
    assert_eq!(sink.last_for(status(-4)).as_deref(), Some("done -4"));

    assert!(!queue.is_busy().await);
    assert_eq!(queue.waiting_len().await, 0);
    assert!(h.ctx.protected.is_empty());
    assert!(!h.ctx.helper_busy());
}

#[tokio::test(start_paused = true)]
async fn running_worker_drains_tasks_enqueued_later() {
    use crate::core::lifecycle::LifecycleComponent;

    let h = harness(config(&["@alpha"]));
    let queue = Arc::new(TaskQueue::new(h.ctx.store.clone(), h.ctx.config.clone()));
    let sink = Arc::new(RecordingSink::default());
    let notifier = Arc::new(PositionNotifier::new(queue.clone(), sink.clone(), h.ctx.config.clone()));
    let handler = Arc::new(ScriptedHandler {
        ctx: h.ctx.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let mut worker = QueueWorker::new(h.ctx.clone(), queue.clone(), handler.clone(), sink.clone(), notifier);
    worker.on_start().await.unwrap();

    queue
        .enqueue(TaskDescriptor::new(-5, 1, TaskKind::Setup, status(-5)))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_secs(10)).await;

    assert_eq!(sink.last_for(status(-5)).as_deref(), Some("done -5"));
    assert!(!queue.is_busy().await);
    worker.on_shutdown().await.unwrap();
}
