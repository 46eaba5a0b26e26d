//! Per-adapter work statistics.

use chrono::Utc;
use parking_lot::Mutex;
use rawork_core::Time;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use crate::WorkProbe;

/// A gauge that can rise and fall, remembering its high and low water marks.
///
/// Every read-modify-write happens under the gauge's own lock, so updates to
/// one gauge never contend with updates to another.
#[derive(Debug)]
pub struct RangedGauge {
    name: &'static str,
    state: Mutex<GaugeSnapshot>,
}

/// Point-in-time view of a [`RangedGauge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaugeSnapshot {
    /// Current value
    pub current: u64,
    /// Highest value observed
    pub high_water_mark: u64,
    /// Lowest value observed since the first sample
    pub low_water_mark: u64,
    /// When the value last changed
    pub last_sample_time: Option<Time>,
}

impl RangedGauge {
    /// Create a gauge at zero.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(GaugeSnapshot {
                current: 0,
                high_water_mark: 0,
                low_water_mark: 0,
                last_sample_time: None,
            }),
        }
    }

    /// Gauge name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Raise the gauge by one.
    pub fn increment(&self) {
        let mut state = self.state.lock();
        let value = state.current + 1;
        Self::record(&mut state, value);
    }

    /// Lower the gauge by one. The gauge never drops below zero.
    pub fn decrement(&self) {
        let mut state = self.state.lock();
        if state.current == 0 {
            warn!("{} decremented below zero, keeping 0", self.name);
            return;
        }
        let value = state.current - 1;
        Self::record(&mut state, value);
    }

    /// Overwrite the gauge.
    pub fn set(&self, value: u64) {
        let mut state = self.state.lock();
        Self::record(&mut state, value);
    }

    /// Current value.
    pub fn current(&self) -> u64 {
        self.state.lock().current
    }

    /// Copy of the gauge state.
    pub fn snapshot(&self) -> GaugeSnapshot {
        self.state.lock().clone()
    }

    fn record(state: &mut GaugeSnapshot, value: u64) {
        state.current = value;
        state.high_water_mark = state.high_water_mark.max(value);
        state.low_water_mark = match state.last_sample_time {
            Some(_) => state.low_water_mark.min(value),
            None => value,
        };
        state.last_sample_time = Some(Utc::now());
    }
}

/// Work statistics of one resource adapter.
///
/// Mutated only through its [`WorkProbe`] methods.
#[derive(Debug)]
pub struct WorkStatsProvider {
    ra_name: String,
    dotted_name: String,
    submitted_work_count: AtomicU64,
    rejected_work_count: AtomicU64,
    completed_work_count: AtomicU64,
    active_work_count: RangedGauge,
    wait_queue_length: RangedGauge,
    work_request_wait_time: RangedGauge,
}

/// Serializable view of a [`WorkStatsProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkStatsSnapshot {
    /// Resource adapter
    pub ra_name: String,
    /// Monitoring tree location
    pub dotted_name: String,
    /// Units accepted
    pub submitted_work_count: u64,
    /// Units rejected or timed out
    pub rejected_work_count: u64,
    /// Units completed
    pub completed_work_count: u64,
    /// Units executing
    pub active_work_count: GaugeSnapshot,
    /// Units queued
    pub wait_queue_length: GaugeSnapshot,
    /// Last queue wait in milliseconds
    pub work_request_wait_time: GaugeSnapshot,
    /// When the snapshot was taken
    pub taken_at: Time,
}

impl WorkStatsProvider {
    /// Create statistics for an adapter.
    pub fn new(ra_name: impl Into<String>, dotted_name: impl Into<String>) -> Self {
        Self {
            ra_name: ra_name.into(),
            dotted_name: dotted_name.into(),
            submitted_work_count: AtomicU64::new(0),
            rejected_work_count: AtomicU64::new(0),
            completed_work_count: AtomicU64::new(0),
            active_work_count: RangedGauge::new("activeWorkCount"),
            wait_queue_length: RangedGauge::new("waitQueueLength"),
            work_request_wait_time: RangedGauge::new("workRequestWaitTime"),
        }
    }

    /// Resource adapter these statistics belong to.
    pub fn ra_name(&self) -> &str {
        &self.ra_name
    }

    /// Monitoring tree location.
    pub fn dotted_name(&self) -> &str {
        &self.dotted_name
    }

    /// Units accepted so far.
    pub fn submitted_work_count(&self) -> u64 {
        self.submitted_work_count.load(Ordering::Acquire)
    }

    /// Units rejected or timed out so far.
    pub fn rejected_work_count(&self) -> u64 {
        self.rejected_work_count.load(Ordering::Acquire)
    }

    /// Units completed so far.
    pub fn completed_work_count(&self) -> u64 {
        self.completed_work_count.load(Ordering::Acquire)
    }

    /// Units executing now.
    pub fn active_work_count(&self) -> &RangedGauge {
        &self.active_work_count
    }

    /// Units queued now.
    pub fn wait_queue_length(&self) -> &RangedGauge {
        &self.wait_queue_length
    }

    /// Last observed queue wait.
    pub fn work_request_wait_time(&self) -> &RangedGauge {
        &self.work_request_wait_time
    }

    /// Take a snapshot.
    pub fn snapshot(&self) -> WorkStatsSnapshot {
        WorkStatsSnapshot {
            ra_name: self.ra_name.clone(),
            dotted_name: self.dotted_name.clone(),
            submitted_work_count: self.submitted_work_count(),
            rejected_work_count: self.rejected_work_count(),
            completed_work_count: self.completed_work_count(),
            active_work_count: self.active_work_count.snapshot(),
            wait_queue_length: self.wait_queue_length.snapshot(),
            work_request_wait_time: self.work_request_wait_time.snapshot(),
            taken_at: Utc::now(),
        }
    }
}

impl WorkProbe for WorkStatsProvider {
    fn work_submitted(&self, _ra_name: &str) {
        self.submitted_work_count.fetch_add(1, Ordering::AcqRel);
    }

    fn work_queued(&self, _ra_name: &str) {
        self.wait_queue_length.increment();
    }

    fn work_waited_for(&self, _ra_name: &str, elapsed_millis: u64) {
        self.work_request_wait_time.set(elapsed_millis);
    }

    fn work_dequeued(&self, _ra_name: &str) {
        self.wait_queue_length.decrement();
    }

    fn work_processing_started(&self, _ra_name: &str) {
        self.active_work_count.increment();
    }

    fn work_processing_completed(&self, _ra_name: &str) {
        self.active_work_count.decrement();
    }

    fn work_processed(&self, _ra_name: &str) {
        self.completed_work_count.fetch_add(1, Ordering::AcqRel);
    }

    fn work_timed_out(&self, _ra_name: &str) {
        self.rejected_work_count.fetch_add(1, Ordering::AcqRel);
    }
}
