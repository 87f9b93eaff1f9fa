//! Bounded pool of blocking extraction workers.
//!
//! Jobs run on Tokio's blocking thread pool, but only `pool_size` of them at
//! once: a job first waits for a permit, then holds it until it returns.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::error::TunnelError;
use crate::observability::metrics;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Wait for a free worker, then run `job` on it.
    pub async fn spawn<F, T>(&self, job: F) -> Result<JoinHandle<T>, TunnelError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TunnelError::ExtractionFailure("worker pool closed".into()))?;

        metrics::set_busy_workers(self.busy());
        let occupied = Occupied {
            permit: Some(permit),
            permits: self.permits.clone(),
            size: self.size,
        };
        Ok(tokio::task::spawn_blocking(move || {
            let _occupied = occupied;
            job()
        }))
    }

    /// Workers currently running a job.
    pub fn busy(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Holds a worker slot; frees it and refreshes the gauge even if the job panics.
struct Occupied {
    permit: Option<OwnedSemaphorePermit>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl Drop for Occupied {
    fn drop(&mut self) {
        self.permit.take();
        metrics::set_busy_workers(self.size - self.permits.available_permits());
    }
}
