//! Bounded concurrent execution of change tasks

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

/// Runs submitted tasks with at most `permits` executing at once
///
/// Submitting while saturated waits for a free slot. A task's slot is
/// released when the task finishes, panics included.
pub struct Dispatcher {
    semaphore: Arc<Semaphore>,
    permits: u32,
}

impl Dispatcher {
    pub fn new(permits: usize) -> Self {
        let permits = u32::try_from(permits.max(1)).unwrap_or(u32::MAX);
        Self {
            semaphore: Arc::new(Semaphore::new(permits as usize)),
            permits,
        }
    }

    /// Wait for a slot, then spawn `task` holding it
    pub async fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
            warn!("Dispatcher closed; dropping task");
            return;
        };

        tokio::spawn(async move {
            task.await;
            drop(permit);
        });
    }

    /// Wait until every submitted task has finished
    pub async fn wait_idle(&self) {
        if let Ok(all) = self.semaphore.acquire_many(self.permits).await {
            drop(all);
        }
    }

    /// Tasks currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.permits as usize - self.semaphore.available_permits()
    }

    /// Maximum concurrent tasks
    pub fn capacity(&self) -> usize {
        self.permits as usize
    }
}
