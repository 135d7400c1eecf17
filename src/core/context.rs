use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, MutexGuard};

use crate::core::client::{ChannelId, PlatformClient};
use crate::core::config::Config;
use crate::core::retry::RetryPolicy;
use crate::core::store::Store;

/// Everything the workflows share, built once at startup and passed by
/// reference.
pub struct AppContext {
    pub operator: Arc<dyn PlatformClient>,
    pub helper: Arc<dyn PlatformClient>,
    pub store: Arc<Store>,
    pub config: Arc<Config>,
    /// Channels that must not be evicted right now.
    pub protected: ProtectedChannels,
    helper_session: Mutex<()>,
    sync_running: AtomicBool,
}

impl AppContext {
    pub fn new(
        operator: Arc<dyn PlatformClient>,
        helper: Arc<dyn PlatformClient>,
        store: Arc<Store>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            operator,
            helper,
            store,
            config,
            protected: ProtectedChannels::default(),
            helper_session: Mutex::new(()),
            sync_running: AtomicBool::new(false),
        }
    }

    /// Exclusive use of the helper session. Every membership or rights
    /// mutation by the helper happens under this lease.
    pub async fn lease_helper(&self) -> MutexGuard<'_, ()> {
        self.helper_session.lock().await
    }

    /// Whether a workflow currently holds the helper session.
    pub fn helper_busy(&self) -> bool {
        self.helper_session.try_lock().is_err()
    }

    pub fn call_policy(&self) -> RetryPolicy {
        RetryPolicy::rate_limit_only(&self.config)
    }

    pub fn grant_policy(&self) -> RetryPolicy {
        RetryPolicy::propagation(&self.config)
    }

    /// Claims the single global-sync slot; `None` if a sync already runs.
    pub fn begin_sync(&self) -> Option<SyncSlot<'_>> {
        self.sync_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncSlot { flag: &self.sync_running })
    }

    pub fn sync_running(&self) -> bool {
        self.sync_running.load(Ordering::Acquire)
    }
}

pub struct SyncSlot<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SyncSlot<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// The set of channels with a workflow in flight. Membership is held by a
/// [`ProtectGuard`] and released when it drops.
#[derive(Clone, Default)]
pub struct ProtectedChannels {
    inner: Arc<StdMutex<HashSet<ChannelId>>>,
}

impl ProtectedChannels {
    pub fn protect(&self, channel: ChannelId) -> ProtectGuard {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(channel);
        ProtectGuard {
            inner: self.inner.clone(),
            channel,
        }
    }

    pub fn contains(&self, channel: ChannelId) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&channel)
    }

    pub fn snapshot(&self) -> HashSet<ChannelId> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

pub struct ProtectGuard {
    inner: Arc<StdMutex<HashSet<ChannelId>>>,
    channel: ChannelId,
}

impl Drop for ProtectGuard {
    fn drop(&mut self) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_releases_protection_on_drop() {
        let protected = ProtectedChannels::default();
        {
            let _a = protected.protect(-1);
            let _b = protected.protect(-2);
            assert_eq!(protected.snapshot().len(), 2);
            assert!(protected.contains(-1));
        }
        assert!(protected.is_empty());
    }
}
