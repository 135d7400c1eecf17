mod archive;
mod check;
mod setup;
mod sync;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::core::context::AppContext;
use crate::core::helper::HelperError;
use crate::core::queue::{TaskDescriptor, TaskHandler, TaskKind};
use crate::core::status::{Progress, StatusSink};

pub use archive::{ArchiveOutcome, ArchiveSweepReport, request_archive, sweep_archive};
pub use check::{CheckMode, OperatorCheckError, check_operator};
pub use setup::{SetupOutcome, request_setup};
pub use sync::{SyncReport, request_sync};

/// Attach the owner-facing remedy to a helper failure.
pub(crate) fn explain(e: HelperError) -> anyhow::Error {
    anyhow!("{}\n💡 {}", e, e.hint())
}

/// Dispatches queued tasks to their workflow.
pub struct Workflows {
    ctx: Arc<AppContext>,
}

impl Workflows {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskHandler for Workflows {
    async fn handle(&self, task: &TaskDescriptor, progress: &Progress) -> Result<String> {
        match task.kind {
            TaskKind::Setup => setup::run_setup(&self.ctx, task, progress).await,
            TaskKind::Archive => archive::run_archive(&self.ctx, task, progress).await,
        }
    }
}

/// Tell the caller of a task that stopped with the process that it has to
/// be requested again.
pub async fn announce_interrupted(sink: &dyn StatusSink, task: &TaskDescriptor) {
    let text = match task.kind {
        TaskKind::Setup => format!(
            "⚠️ The setup of {} was interrupted by a restart.\nPlease run /setup {} again.",
            task.channel_id, task.channel_id
        ),
        TaskKind::Archive => format!(
            "⚠️ The archive setup of {} was interrupted by a restart.\nPlease run /helparchive again.",
            task.channel_id
        ),
    };
    if let Err(e) = sink.update(&task.status, &text).await {
        warn!("[QUEUE] Could not notify interrupted task {}: {}", task.channel_id, e);
    }
}
