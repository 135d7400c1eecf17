use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::JobScheduler;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Initializing,
    Starting,
    Running,
    Stopped,
}

/// A long-running part of the service (command interface, queue worker).
#[async_trait::async_trait]
pub trait LifecycleComponent {
    async fn on_init(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_start(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

pub type SharedComponent = Arc<Mutex<dyn LifecycleComponent + Send + Sync>>;

/// Starts attached components in order and owns the cron scheduler that
/// periodic jobs are registered on.
pub struct LifecycleManager {
    state: LifecycleState,
    components: Vec<(&'static str, SharedComponent)>,
    pub scheduler: JobScheduler,
}

impl LifecycleManager {
    pub async fn new() -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            state: LifecycleState::Created,
            components: Vec::new(),
            scheduler,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn attach(&mut self, name: &'static str, component: SharedComponent) {
        self.components.push((name, component));
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("[LIFECYCLE] Initializing {} component(s)", self.components.len());
        self.state = LifecycleState::Initializing;
        for (_, comp) in &self.components {
            comp.lock().await.on_init().await?;
        }

        self.state = LifecycleState::Starting;
        for (name, comp) in &self.components {
            info!("[LIFECYCLE] Starting {}", name);
            comp.lock().await.on_start().await?;
        }

        self.scheduler.start().await?;
        self.state = LifecycleState::Running;
        info!("[LIFECYCLE] Running");
        Ok(())
    }

    /// Stops components in reverse start order. Individual failures are
    /// logged and do not stop the rest.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state == LifecycleState::Stopped {
            return Ok(());
        }
        info!("[LIFECYCLE] Shutting down");
        for (name, comp) in self.components.iter().rev() {
            if let Err(e) = comp.lock().await.on_shutdown().await {
                warn!("[LIFECYCLE] {} shutdown error: {}", name, e);
            }
        }
        if let Err(e) = self.scheduler.shutdown().await {
            warn!("[LIFECYCLE] Scheduler shutdown error: {}", e);
        }
        self.state = LifecycleState::Stopped;
        Ok(())
    }
}
