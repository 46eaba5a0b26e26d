//! Elastic pool of workers draining a [`WorkQueue`].
//!
//! Workers are tokio tasks. While below the core size, each submission
//! starts a new worker with the unit as its first task, bypassing the queue.
//! Beyond that, units queue and the pool grows up to the max size while more
//! units wait than workers are idle.
//! Workers above the core size retire after sitting idle for the keep-alive.

use rawork_core::{PoolSettings, WorkId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use crate::coordinator::WorkCoordinator;
use crate::queue::{AdmissionError, QueuedWork, WorkQueue};

/// Point-in-time view of a [`DispatchPool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    /// Pool id
    pub id: String,
    /// Configured core size
    pub core_pool_size: usize,
    /// Configured max size
    pub max_pool_size: usize,
    /// Live workers
    pub pool_size: usize,
    /// Workers executing a unit
    pub active_count: usize,
    /// Most workers ever executing at once
    pub peak_active_count: usize,
    /// Units waiting
    pub queued: usize,
    /// Units executed to completion
    pub completed: u64,
}

struct PoolInner {
    id: String,
    settings: PoolSettings,
    queue: WorkQueue,
    pool_size: AtomicUsize,
    idle: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    completed: AtomicU64,
    shutdown: CancellationToken,
    workers: TaskTracker,
}

enum Next {
    Work(QueuedWork),
    Idle,
    Closed,
}

impl PoolInner {
    /// Start a core worker that runs `coordinator` first. Hands the unit back
    /// when the pool already has its core workers or is shutting down.
    fn start_core_worker(
        self: &Arc<Self>,
        coordinator: Arc<WorkCoordinator>,
    ) -> Result<(), Arc<WorkCoordinator>> {
        let mut size = self.pool_size.load(Ordering::SeqCst);
        loop {
            if size >= self.settings.core_pool_size
                || self.shutdown.is_cancelled()
                || self.queue.is_closed()
            {
                return Err(coordinator);
            }

            match self
                .pool_size
                .compare_exchange(size, size + 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(actual) => size = actual,
            }
        }

        // The queue is skipped, its probe events are not.
        coordinator.on_queued();
        coordinator.on_dequeued(Duration::ZERO);

        let inner = self.clone();
        self.workers.spawn(async move { inner.run_worker(Some(coordinator)).await });
        trace!("thread-pool [{}] started worker {} with a first unit", self.id, size + 1);
        Ok(())
    }

    /// Start a worker if the pool wants one. Returns whether one started.
    fn ensure_worker(self: &Arc<Self>) -> bool {
        let mut size = self.pool_size.load(Ordering::SeqCst);
        loop {
            let wanted = size < self.settings.core_pool_size
                || (size < self.settings.max_pool_size
                    && self.queue.len() > self.idle.load(Ordering::SeqCst));
            if !wanted || self.shutdown.is_cancelled() {
                return false;
            }

            match self
                .pool_size
                .compare_exchange(size, size + 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(actual) => size = actual,
            }
        }

        // New workers count as idle until they take a unit.
        self.idle.fetch_add(1, Ordering::SeqCst);
        let inner = self.clone();
        self.workers.spawn(async move { inner.run_worker(None).await });
        trace!("thread-pool [{}] started worker {}", self.id, size + 1);
        true
    }

    /// Retire an idle worker if the pool is above its core size.
    fn try_retire(&self) -> bool {
        let mut size = self.pool_size.load(Ordering::SeqCst);
        while size > self.settings.core_pool_size {
            match self
                .pool_size
                .compare_exchange(size, size - 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(actual) => size = actual,
            }
        }
        false
    }

    async fn next(&self) -> Next {
        let above_core = self.pool_size.load(Ordering::SeqCst) > self.settings.core_pool_size;
        let dequeue = async {
            if above_core {
                match tokio::time::timeout(self.settings.keep_alive(), self.queue.dequeue()).await {
                    Ok(Some(item)) => Next::Work(item),
                    Ok(None) => Next::Closed,
                    Err(_) => Next::Idle,
                }
            } else {
                match self.queue.dequeue().await {
                    Some(item) => Next::Work(item),
                    None => Next::Closed,
                }
            }
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Next::Closed,
            next = dequeue => next,
        }
    }

    async fn run_worker(self: Arc<Self>, first: Option<Arc<WorkCoordinator>>) {
        if let Some(coordinator) = first {
            self.dispatch(coordinator).await;
            self.idle.fetch_add(1, Ordering::SeqCst);
        }

        loop {
            match self.next().await {
                Next::Work(item) => {
                    self.idle.fetch_sub(1, Ordering::SeqCst);
                    self.dispatch(item.into_coordinator()).await;
                    self.idle.fetch_add(1, Ordering::SeqCst);
                }
                Next::Idle => {
                    if self.try_retire() {
                        self.idle.fetch_sub(1, Ordering::SeqCst);
                        trace!("thread-pool [{}] retired an idle worker", self.id);
                        // A unit queued while this worker retired must not strand.
                        if !self.queue.is_empty() {
                            self.ensure_worker();
                        }
                        return;
                    }
                }
                Next::Closed => break,
            }
        }

        self.idle.fetch_sub(1, Ordering::SeqCst);
        self.pool_size.fetch_sub(1, Ordering::SeqCst);
    }

    async fn dispatch(&self, coordinator: Arc<WorkCoordinator>) {
        if !coordinator.begin() {
            debug!(
                "work [{}] of [{}] not started, state {}",
                coordinator.id(),
                coordinator.ra_name(),
                coordinator.state()
            );
            return;
        }

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(active, Ordering::SeqCst);
        coordinator.execute().await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// A named pool of workers with its own queue.
///
/// Cheap to clone; clones share the same workers.
#[derive(Clone)]
pub struct DispatchPool {
    inner: Arc<PoolInner>,
}

impl DispatchPool {
    /// Create a pool. Workers are started on demand.
    pub fn new(id: impl Into<String>, settings: PoolSettings) -> Self {
        let queue = WorkQueue::from_settings(&settings);
        Self {
            inner: Arc::new(PoolInner {
                id: id.into(),
                settings,
                queue,
                pool_size: AtomicUsize::new(0),
                idle: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak_active: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
                workers: TaskTracker::new(),
            }),
        }
    }

    /// Pool id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Resolved settings.
    pub fn settings(&self) -> &PoolSettings {
        &self.inner.settings
    }

    /// Hand a unit to a new core worker, or queue it and make sure a worker
    /// will pick it up.
    ///
    /// Cancel safe: dropped while waiting for queue space, the unit was
    /// neither queued nor dispatched.
    pub async fn execute(&self, coordinator: Arc<WorkCoordinator>) -> Result<(), AdmissionError> {
        let Err(coordinator) = self.inner.start_core_worker(coordinator) else {
            return Ok(());
        };
        self.inner.queue.enqueue(coordinator).await?;
        self.inner.ensure_worker();
        Ok(())
    }

    /// Take a waiting unit off the queue. Returns whether it was waiting.
    pub fn remove(&self, id: WorkId) -> bool {
        self.inner.queue.remove(id).is_some()
    }

    /// Take every waiting unit of a resource adapter off the queue.
    pub fn drain_adapter(&self, ra_name: &str) -> Vec<Arc<WorkCoordinator>> {
        self.inner
            .queue
            .drain_adapter(ra_name)
            .into_iter()
            .map(QueuedWork::into_coordinator)
            .collect()
    }

    /// Workers executing a unit now.
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Live workers.
    pub fn pool_size(&self) -> usize {
        self.inner.pool_size.load(Ordering::SeqCst)
    }

    /// Units waiting.
    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Current status.
    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            id: self.inner.id.clone(),
            core_pool_size: self.inner.settings.core_pool_size,
            max_pool_size: self.inner.settings.max_pool_size,
            pool_size: self.pool_size(),
            active_count: self.active_count(),
            peak_active_count: self.inner.peak_active.load(Ordering::SeqCst),
            queued: self.queue_len(),
            completed: self.inner.completed.load(Ordering::Relaxed),
        }
    }

    /// Stop the pool: waiting units are cancelled, running units finish,
    /// then every worker exits.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }

        let drained = self.inner.queue.close();
        for item in &drained {
            item.coordinator().cancel();
        }
        self.inner.shutdown.cancel();
        self.inner.workers.close();
        self.inner.workers.wait().await;
        info!(
            "thread-pool [{}] shut down, {} queued work units cancelled",
            self.inner.id,
            drained.len()
        );
    }
}

impl std::fmt::Debug for DispatchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchPool")
            .field("id", &self.inner.id)
            .field("settings", &self.inner.settings)
            .field("pool_size", &self.pool_size())
            .field("active", &self.active_count())
            .finish()
    }
}
