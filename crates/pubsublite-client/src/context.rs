//! Execution context shared by every background task of a publisher.
//!
//! Partition workers and the partition count refresher are spawned through
//! an `ExecutionContext` rather than onto an ambient runtime. The context
//! remembers every task it spawned, so its owner can wait for all of them
//! to finish when it shuts down, and hands out child cancellation tokens
//! that are all cancelled together.

use crate::error::{ClientError, Result};
use std::future::Future;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    handle: Handle,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl ExecutionContext {
    /// Context on the runtime the caller is running in.
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| ClientError::Internal(format!("no tokio runtime available: {}", e)))?;
        Ok(Self::from_handle(handle))
    }

    /// Context spawning onto an explicit runtime.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn_on(task, &self.handle);
    }

    /// Token cancelled when this context shuts down.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Number of spawned tasks that have not finished yet.
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel every child token and wait for all spawned tasks to exit.
    pub async fn shutdown(&self) {
        debug!(active_tasks = self.tracker.len(), "Shutting down execution context");
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
