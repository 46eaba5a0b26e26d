//! Bounded FIFO of submitted units.
//!
//! Capacity is tracked by a `slots` semaphore and pending items by a `ready`
//! semaphore. Waiters on both are served in arrival order, which gives
//! blocked submitters and idle workers FIFO wake-up without a global lock
//! held across awaits.

use parking_lot::Mutex;
use rawork_core::{AdmissionPolicy, ErrorCode, PoolSettings, WorkError, WorkId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::debug;

use crate::coordinator::WorkCoordinator;

/// Why a unit was not admitted to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// The queue is full and the policy rejects
    #[error("work queue is full")]
    Full,

    /// No space freed up within the admission timeout
    #[error("timed out after {0:?} waiting for space in the work queue")]
    TimedOut(Duration),

    /// The queue no longer accepts work
    #[error("work queue is closed")]
    Closed,
}

impl AdmissionError {
    /// The rejection reported to the submitter.
    pub fn into_work_error(self) -> WorkError {
        let code = match self {
            AdmissionError::TimedOut(_) => ErrorCode::StartTimedOut,
            AdmissionError::Full | AdmissionError::Closed => ErrorCode::Internal,
        };
        WorkError::rejected(code, self.to_string())
    }
}

/// A unit waiting on the queue.
#[derive(Debug)]
pub struct QueuedWork {
    coordinator: Arc<WorkCoordinator>,
    enqueued_at: Instant,
}

impl QueuedWork {
    /// The unit.
    pub fn coordinator(&self) -> &Arc<WorkCoordinator> {
        &self.coordinator
    }

    /// Take the unit out.
    pub fn into_coordinator(self) -> Arc<WorkCoordinator> {
        self.coordinator
    }

    /// Time spent on the queue so far.
    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

#[derive(Debug, Default)]
struct Entries {
    items: VecDeque<QueuedWork>,
    closed: bool,
}

/// FIFO queue shared by the submitters and the workers of one pool.
#[derive(Debug)]
pub struct WorkQueue {
    entries: Mutex<Entries>,
    slots: Option<Semaphore>,
    ready: Semaphore,
    capacity: Option<usize>,
    policy: AdmissionPolicy,
    admission_timeout: Duration,
    enqueued_total: AtomicU64,
    dequeued_total: AtomicU64,
    removed_total: AtomicU64,
}

impl WorkQueue {
    /// Create a queue; `capacity` of `None` is unbounded.
    pub fn new(capacity: Option<usize>, policy: AdmissionPolicy, admission_timeout: Duration) -> Self {
        let capacity = capacity.map(|c| c.clamp(1, Semaphore::MAX_PERMITS));
        Self {
            entries: Mutex::new(Entries::default()),
            slots: capacity.map(Semaphore::new),
            ready: Semaphore::new(0),
            capacity,
            policy,
            admission_timeout,
            enqueued_total: AtomicU64::new(0),
            dequeued_total: AtomicU64::new(0),
            removed_total: AtomicU64::new(0),
        }
    }

    /// Create the queue described by pool settings.
    pub fn from_settings(settings: &PoolSettings) -> Self {
        Self::new(
            settings.queue_capacity,
            settings.admission_policy,
            settings.admission_timeout(),
        )
    }

    /// Append a unit, applying the admission policy when the queue is full.
    ///
    /// Emits `workQueued` before the unit becomes visible to workers.
    pub async fn enqueue(&self, coordinator: Arc<WorkCoordinator>) -> Result<(), AdmissionError> {
        if let Some(slots) = &self.slots {
            let permit = match self.policy {
                AdmissionPolicy::Reject => slots.try_acquire().map_err(|e| match e {
                    tokio::sync::TryAcquireError::Closed => AdmissionError::Closed,
                    tokio::sync::TryAcquireError::NoPermits => AdmissionError::Full,
                })?,
                AdmissionPolicy::Block => {
                    tokio::time::timeout(self.admission_timeout, slots.acquire())
                        .await
                        .map_err(|_| AdmissionError::TimedOut(self.admission_timeout))?
                        .map_err(|_| AdmissionError::Closed)?
                }
            };
            permit.forget();
        }

        {
            let mut entries = self.entries.lock();
            if entries.closed {
                drop(entries);
                self.release_slot();
                return Err(AdmissionError::Closed);
            }
            coordinator.on_queued();
            entries.items.push_back(QueuedWork {
                coordinator,
                enqueued_at: Instant::now(),
            });
        }

        self.enqueued_total.fetch_add(1, Ordering::Relaxed);
        self.ready.add_permits(1);
        Ok(())
    }

    /// Take the head of the queue, waiting while it is empty.
    ///
    /// Emits `workDequeued` and `workWaitedFor`. Returns `None` once the
    /// queue is closed. Cancel safe.
    pub async fn dequeue(&self) -> Option<QueuedWork> {
        loop {
            self.ready.acquire().await.ok()?.forget();

            // A removal may have taken the item this permit stood for.
            let Some(item) = self.entries.lock().items.pop_front() else {
                continue;
            };

            item.coordinator.on_dequeued(item.waited());
            self.dequeued_total.fetch_add(1, Ordering::Relaxed);
            self.release_slot();
            return Some(item);
        }
    }

    /// Remove a waiting unit. Emits `workDequeued` only.
    pub fn remove(&self, id: WorkId) -> Option<QueuedWork> {
        let item = {
            let mut entries = self.entries.lock();
            let position = entries.items.iter().position(|q| q.coordinator.id() == id)?;
            entries.items.remove(position)?
        };

        item.coordinator.on_removed();
        self.forget_item();
        self.removed_total.fetch_add(1, Ordering::Relaxed);
        Some(item)
    }

    /// Remove every waiting unit of a resource adapter.
    pub fn drain_adapter(&self, ra_name: &str) -> Vec<QueuedWork> {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock();
            let (drained, kept): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut entries.items)
                .into_iter()
                .partition(|q| q.coordinator.ra_name() == ra_name);
            entries.items = kept;
            Vec::from(drained)
        };

        for item in &drained {
            item.coordinator.on_removed();
            self.forget_item();
        }
        self.removed_total.fetch_add(drained.len() as u64, Ordering::Relaxed);
        if !drained.is_empty() {
            debug!("drained {} queued work units of [{}]", drained.len(), ra_name);
        }
        drained
    }

    /// Stop accepting work and hand back everything still waiting.
    ///
    /// Blocked submitters fail with [`AdmissionError::Closed`] and idle
    /// workers see `None` from [`dequeue`](Self::dequeue).
    pub fn close(&self) -> Vec<QueuedWork> {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock();
            entries.closed = true;
            entries.items.drain(..).collect()
        };

        if let Some(slots) = &self.slots {
            slots.close();
        }
        self.ready.close();

        for item in &drained {
            item.coordinator.on_removed();
        }
        self.removed_total.fetch_add(drained.len() as u64, Ordering::Relaxed);
        drained
    }

    fn release_slot(&self) {
        if let Some(slots) = &self.slots {
            slots.add_permits(1);
        }
    }

    fn forget_item(&self) {
        self.release_slot();
        if let Ok(permit) = self.ready.try_acquire() {
            permit.forget();
        }
    }

    /// Units waiting now.
    pub fn len(&self) -> usize {
        self.entries.lock().items.len()
    }

    /// Whether no unit is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the queue was closed.
    pub fn is_closed(&self) -> bool {
        self.entries.lock().closed
    }

    /// Capacity, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Units ever admitted.
    pub fn enqueued_total(&self) -> u64 {
        self.enqueued_total.load(Ordering::Relaxed)
    }

    /// Units ever handed to a worker.
    pub fn dequeued_total(&self) -> u64 {
        self.dequeued_total.load(Ordering::Relaxed)
    }

    /// Units ever taken off without being handed to a worker.
    ///
    /// Once quiescent, `len() == enqueued_total() - dequeued_total() - removed_total()`.
    pub fn removed_total(&self) -> u64 {
        self.removed_total.load(Ordering::Relaxed)
    }
}
