//! Per-unit lifecycle coordination.
//!
//! A [`WorkCoordinator`] owns one submitted unit from acceptance to its
//! terminal state. All state changes go through a single compare-and-set on
//! a `watch` channel, so a unit is started at most once, timed out at most
//! once and never both; waiting submitters observe the same channel.

use chrono::Utc;
use parking_lot::Mutex;
use rawork_core::{ErrorCode, WaitMode, WorkError, WorkId, WorkState};
use rawork_monitor::WorkProbe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{debug, error, trace, warn};

use crate::context::ContextHandler;
use crate::work::{ExecutionContext, Work, WorkEvent, WorkEventKind, WorkListener, WorkSpec};

/// Lifecycle of one submitted work unit.
pub struct WorkCoordinator {
    id: WorkId,
    ra_name: Arc<str>,
    work: Arc<dyn Work>,
    mode: WaitMode,
    start_timeout: Option<Duration>,
    context: Option<ExecutionContext>,
    listener: Option<Arc<dyn WorkListener>>,
    probe: Option<Arc<dyn WorkProbe>>,
    context_handler: Arc<dyn ContextHandler>,
    state: watch::Sender<WorkState>,
    accepted_at: Instant,
    started_at: Mutex<Option<Instant>>,
    error: Mutex<Option<WorkError>>,
    _in_flight: Option<TaskTrackerToken>,
}

impl WorkCoordinator {
    /// Create a coordinator for a freshly submitted unit.
    pub fn new(
        ra_name: Arc<str>,
        work: Arc<dyn Work>,
        mode: WaitMode,
        spec: WorkSpec,
        probe: Option<Arc<dyn WorkProbe>>,
        context_handler: Arc<dyn ContextHandler>,
    ) -> Self {
        let (state, _) = watch::channel(WorkState::Submitted);
        Self {
            id: WorkId::new(),
            ra_name,
            work,
            mode,
            start_timeout: spec.start_timeout,
            context: spec.context,
            listener: spec.listener,
            probe,
            context_handler,
            state,
            accepted_at: Instant::now(),
            started_at: Mutex::new(None),
            error: Mutex::new(None),
            _in_flight: None,
        }
    }

    /// Hold `token` until this coordinator is dropped.
    pub fn with_in_flight_token(mut self, token: TaskTrackerToken) -> Self {
        self._in_flight = Some(token);
        self
    }

    /// Unit id.
    pub fn id(&self) -> WorkId {
        self.id
    }

    /// Submitting resource adapter.
    pub fn ra_name(&self) -> &str {
        &self.ra_name
    }

    /// How the submitter waits.
    pub fn mode(&self) -> WaitMode {
        self.mode
    }

    /// Start timeout, `None` for no limit.
    pub fn start_timeout(&self) -> Option<Duration> {
        self.start_timeout
    }

    /// Current state.
    pub fn state(&self) -> WorkState {
        *self.state.borrow()
    }

    /// Rejection reason or execution failure, if any.
    pub fn error(&self) -> Option<WorkError> {
        self.error.lock().clone()
    }

    /// Time from acceptance to start, once started.
    pub fn start_delay(&self) -> Option<Duration> {
        self.started_at
            .lock()
            .map(|started| started.duration_since(self.accepted_at))
    }

    /// Time since the unit was accepted.
    pub fn waited(&self) -> Duration {
        self.accepted_at.elapsed()
    }

    /// Whether the start timeout has passed, counted in whole milliseconds.
    /// A zero timeout still lets a unit start within its first millisecond.
    fn start_timeout_elapsed(&self) -> bool {
        self.start_timeout
            .is_some_and(|timeout| self.waited().as_millis() > timeout.as_millis())
    }

    fn transition(&self, allowed: impl Fn(WorkState) -> bool, to: WorkState) -> bool {
        self.state.send_if_modified(|state| {
            if allowed(*state) {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    fn emit(&self, notify: impl FnOnce(&dyn WorkProbe, &str)) {
        if let Some(probe) = &self.probe {
            notify(probe.as_ref(), &self.ra_name);
        }
    }

    fn notify(&self, kind: WorkEventKind) {
        let Some(listener) = &self.listener else {
            return;
        };

        let event = WorkEvent {
            work_id: self.id,
            ra_name: self.ra_name.to_string(),
            kind,
            error: self.error(),
            at: Utc::now(),
        };
        match kind {
            WorkEventKind::Accepted => listener.work_accepted(&event),
            WorkEventKind::Rejected => listener.work_rejected(&event),
            WorkEventKind::Started => listener.work_started(&event),
            WorkEventKind::Completed => listener.work_completed(&event),
        }
    }

    /// Announce acceptance: `workSubmitted` and the listener's `work_accepted`.
    pub fn accept(&self) {
        trace!("{:?} for [{}] of [{}] accepted", self.mode, self.id, self.ra_name);
        self.notify(WorkEventKind::Accepted);
        self.emit(|p, ra| p.work_submitted(ra));
    }

    /// Mark the unit queued and emit `workQueued`.
    pub(crate) fn on_queued(&self) {
        self.transition(|s| s == WorkState::Submitted, WorkState::Queued);
        self.emit(|p, ra| p.work_queued(ra));
    }

    /// Mark the unit taken off the queue after `waited`.
    pub(crate) fn on_dequeued(&self, waited: Duration) {
        self.transition(|s| s == WorkState::Queued, WorkState::Dequeued);
        let elapsed = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);
        self.emit(|p, ra| {
            p.work_dequeued(ra);
            p.work_waited_for(ra, elapsed);
        });
    }

    /// The unit left the queue without being dispatched.
    pub(crate) fn on_removed(&self) {
        self.emit(|p, ra| p.work_dequeued(ra));
    }

    /// Time the unit out unless it already started or finished.
    ///
    /// Returns `true` if this call timed it out.
    pub fn time_out(&self) -> bool {
        self.reject(WorkError::start_timed_out())
    }

    /// Reject the unit unless it already started or finished. Emits
    /// `workTimedOut` and the listener's `work_rejected`.
    ///
    /// Returns `true` if this call rejected it.
    pub fn reject(&self, err: WorkError) -> bool {
        // The error is published before the state so a woken waiter sees it.
        let mut slot = self.error.lock();
        if !self.transition(|s| s < WorkState::Started, WorkState::TimedOut) {
            return false;
        }
        debug!("work [{}] of [{}] rejected: {}", self.id, self.ra_name, err);
        *slot = Some(err);
        drop(slot);

        self.notify(WorkEventKind::Rejected);
        self.emit(|p, ra| p.work_timed_out(ra));
        true
    }

    /// Drop the unit silently: no probe event, no listener callback.
    pub(crate) fn cancel(&self) -> bool {
        let mut slot = self.error.lock();
        if !self.transition(|s| s < WorkState::Started, WorkState::Cancelled) {
            return false;
        }
        *slot = Some(WorkError::rejected(
            ErrorCode::Internal,
            format!("work manager for [{}] shut down before the work started", self.ra_name),
        ));
        true
    }

    /// Worker-side start: checks the start timeout, then moves the unit to
    /// `Started` and emits `workProcessingStarted`.
    ///
    /// Returns `false` if the unit must not run.
    pub(crate) fn begin(&self) -> bool {
        if self.start_timeout_elapsed() {
            self.time_out();
            return false;
        }

        if !self.transition(|s| s == WorkState::Dequeued, WorkState::Started) {
            return false;
        }
        *self.started_at.lock() = Some(Instant::now());

        self.emit(|p, ra| p.work_processing_started(ra));
        self.notify(WorkEventKind::Started);
        true
    }

    /// Run a started unit to completion.
    ///
    /// Payload errors and panics are caught here; `workProcessingCompleted`
    /// and `workProcessed` are emitted either way.
    pub(crate) async fn execute(&self) {
        let outcome = match self.context_handler.setup(self.id, self.context.as_ref()) {
            Ok(()) => {
                let outcome = self.run_payload().await;
                self.context_handler.release(self.id, self.context.as_ref());
                outcome
            }
            Err(err) => {
                warn!("work [{}] of [{}] could not set up its context: {}", self.id, self.ra_name, err);
                Err(err)
            }
        };

        if let Err(err) = outcome {
            *self.error.lock() = Some(err);
        }

        self.emit(|p, ra| {
            p.work_processing_completed(ra);
            p.work_processed(ra);
        });
        self.notify(WorkEventKind::Completed);
        self.transition(|s| s == WorkState::Started, WorkState::Completed);
    }

    async fn run_payload(&self) -> Result<(), WorkError> {
        let work = self.work.clone();
        match tokio::spawn(async move { work.run().await }).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                warn!("work [{}] of [{}] failed: {:#}", self.id, self.ra_name, err);
                Err(WorkError::completed(ErrorCode::Undefined, err.to_string()))
            }
            Err(join) if join.is_panic() => {
                let payload = join.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("work [{}] of [{}] panicked: {}", self.id, self.ra_name, message);
                Err(WorkError::completed(
                    ErrorCode::Internal,
                    format!("work panicked: {}", message),
                ))
            }
            Err(join) => Err(WorkError::completed(ErrorCode::Internal, join.to_string())),
        }
    }

    /// Forward a release hint to the payload.
    pub(crate) fn release_work(&self) {
        self.work.release();
    }

    /// Wait until the unit started or can no longer start, bounded by the
    /// start timeout plus the millisecond a worker may still start it in.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn wait_for_start(&self) -> bool {
        let mut rx = self.state.subscribe();
        match self.start_timeout {
            Some(timeout) => {
                let deadline = self.accepted_at + timeout + Duration::from_millis(1);
                tokio::time::timeout_at(deadline, rx.wait_for(|s| s.is_past_start()))
                    .await
                    .is_ok()
            }
            None => {
                // The sender lives in `self`, so the wait cannot fail.
                let _ = rx.wait_for(|s| s.is_past_start()).await;
                true
            }
        }
    }

    /// Wait until the unit reached a terminal state.
    pub async fn wait_for_finish(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| s.is_terminal()).await;
    }
}

impl std::fmt::Debug for WorkCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkCoordinator")
            .field("id", &self.id)
            .field("ra_name", &self.ra_name)
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish()
    }
}
