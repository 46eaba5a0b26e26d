//! Probe contract and the registry routing probe calls to statistics.

use parking_lot::RwLock;
use rawork_core::ProbeEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::stats::{WorkStatsProvider, WorkStatsSnapshot};

/// Lifecycle notifications emitted by the work manager.
///
/// Every method is called with the name of the resource adapter that
/// submitted the unit.
pub trait WorkProbe: Send + Sync {
    /// Unit accepted by the work manager.
    fn work_submitted(&self, _ra_name: &str) {}

    /// Unit placed on the queue.
    fn work_queued(&self, _ra_name: &str) {}

    /// Unit left the queue after waiting `elapsed_millis`.
    fn work_waited_for(&self, _ra_name: &str, _elapsed_millis: u64) {}

    /// Unit removed from the queue.
    fn work_dequeued(&self, _ra_name: &str) {}

    /// Execution begins.
    fn work_processing_started(&self, _ra_name: &str) {}

    /// Execution ends, successfully or not.
    fn work_processing_completed(&self, _ra_name: &str) {}

    /// Unit completed.
    fn work_processed(&self, _ra_name: &str) {}

    /// Unit rejected or timed out before it started.
    fn work_timed_out(&self, _ra_name: &str) {}
}

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Routes probe calls to the statistics registered for the adapter and
/// republishes them as [`ProbeEvent`]s.
///
/// Routing is a map lookup by adapter name; adapters without registered
/// statistics are only visible to event subscribers.
pub struct ProbeProvider {
    providers: RwLock<HashMap<String, Arc<WorkStatsProvider>>>,
    events: broadcast::Sender<ProbeEvent>,
}

impl ProbeProvider {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            providers: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Register statistics for an adapter, replacing earlier ones.
    pub fn register(
        &self,
        ra_name: impl Into<String>,
        dotted_name: impl Into<String>,
    ) -> Arc<WorkStatsProvider> {
        let ra_name = ra_name.into();
        let stats = Arc::new(WorkStatsProvider::new(ra_name.clone(), dotted_name));
        debug!(
            "Registered work-monitoring stats [ {} ] for [ {} ]",
            stats.dotted_name(),
            ra_name
        );
        self.providers.write().insert(ra_name, stats.clone());
        stats
    }

    /// Remove an adapter's statistics.
    pub fn unregister(&self, ra_name: &str) -> Option<Arc<WorkStatsProvider>> {
        let removed = self.providers.write().remove(ra_name);
        if let Some(stats) = &removed {
            debug!(
                "De-registered work-monitoring stats [ {} ] for [ {} ]",
                stats.dotted_name(),
                ra_name
            );
        }
        removed
    }

    /// Statistics of an adapter.
    pub fn stats(&self, ra_name: &str) -> Option<Arc<WorkStatsProvider>> {
        self.providers.read().get(ra_name).cloned()
    }

    /// Snapshots of all registered adapters, sorted by adapter name.
    pub fn snapshots(&self) -> Vec<WorkStatsSnapshot> {
        let mut snapshots: Vec<_> = self
            .providers
            .read()
            .values()
            .map(|stats| stats.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.ra_name.cmp(&b.ra_name));
        snapshots
    }

    /// Receive every probe event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProbeEvent> {
        self.events.subscribe()
    }

    fn route(&self, ra_name: &str, apply: impl FnOnce(&WorkStatsProvider)) {
        let stats = self.providers.read().get(ra_name).cloned();
        if let Some(stats) = stats {
            apply(&stats);
        }
    }

    fn publish(&self, event: impl FnOnce() -> ProbeEvent) {
        if self.events.receiver_count() == 0 {
            return;
        }
        let event = event();
        trace!(probe = event.name(), ra_name = event.ra_name(), "probe event");
        // A send only fails when every receiver is gone.
        let _ = self.events.send(event);
    }
}

impl Default for ProbeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProbeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeProvider")
            .field("adapters", &self.providers.read().len())
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}

impl WorkProbe for ProbeProvider {
    fn work_submitted(&self, ra_name: &str) {
        self.route(ra_name, |s| s.work_submitted(ra_name));
        self.publish(|| ProbeEvent::WorkSubmitted {
            ra_name: ra_name.to_string(),
        });
    }

    fn work_queued(&self, ra_name: &str) {
        self.route(ra_name, |s| s.work_queued(ra_name));
        self.publish(|| ProbeEvent::WorkQueued {
            ra_name: ra_name.to_string(),
        });
    }

    fn work_waited_for(&self, ra_name: &str, elapsed_millis: u64) {
        self.route(ra_name, |s| s.work_waited_for(ra_name, elapsed_millis));
        self.publish(|| ProbeEvent::WorkWaitedFor {
            ra_name: ra_name.to_string(),
            elapsed_time: elapsed_millis,
        });
    }

    fn work_dequeued(&self, ra_name: &str) {
        self.route(ra_name, |s| s.work_dequeued(ra_name));
        self.publish(|| ProbeEvent::WorkDequeued {
            ra_name: ra_name.to_string(),
        });
    }

    fn work_processing_started(&self, ra_name: &str) {
        self.route(ra_name, |s| s.work_processing_started(ra_name));
        self.publish(|| ProbeEvent::WorkProcessingStarted {
            ra_name: ra_name.to_string(),
        });
    }

    fn work_processing_completed(&self, ra_name: &str) {
        self.route(ra_name, |s| s.work_processing_completed(ra_name));
        self.publish(|| ProbeEvent::WorkProcessingCompleted {
            ra_name: ra_name.to_string(),
        });
    }

    fn work_processed(&self, ra_name: &str) {
        self.route(ra_name, |s| s.work_processed(ra_name));
        self.publish(|| ProbeEvent::WorkProcessed {
            ra_name: ra_name.to_string(),
        });
    }

    fn work_timed_out(&self, ra_name: &str) {
        self.route(ra_name, |s| s.work_timed_out(ra_name));
        self.publish(|| ProbeEvent::WorkTimedOut {
            ra_name: ra_name.to_string(),
        });
    }
}
