//! Work units and their callbacks.

use async_trait::async_trait;
use rawork_core::{Time, WorkError, WorkId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Asynchronous work submitted by a resource adapter.
#[async_trait]
pub trait Work: Send + Sync {
    /// Execute the work.
    async fn run(&self) -> anyhow::Result<()>;

    /// Hint that the work should finish as soon as possible.
    ///
    /// Called on units still executing when their work manager shuts down.
    fn release(&self) {}
}

/// [`Work`] backed by a closure returning a future.
pub struct FnWork<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Work for FnWork<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn run(&self) -> anyhow::Result<()> {
        (self.f)().await
    }
}

/// Wrap a closure as work.
pub fn work_fn<F, Fut>(f: F) -> Arc<dyn Work>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnWork { f })
}

/// Transaction and security context a unit runs in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Imported transaction
    pub xid: Option<String>,

    /// Timeout of the imported transaction
    pub transaction_timeout: Option<Duration>,

    /// Principal the work runs as
    pub principal: Option<String>,
}

impl ExecutionContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the imported transaction.
    pub fn with_xid(mut self, xid: impl Into<String>) -> Self {
        self.xid = Some(xid.into());
        self
    }

    /// Set the transaction timeout.
    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = Some(timeout);
        self
    }

    /// Set the principal.
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }
}

/// Kind of a listener notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkEventKind {
    /// Passed validation, about to be queued
    Accepted,
    /// Will never run
    Rejected,
    /// Began executing
    Started,
    /// Finished executing
    Completed,
}

/// Notification delivered to a [`WorkListener`].
#[derive(Debug, Clone)]
pub struct WorkEvent {
    /// Unit the event is about
    pub work_id: WorkId,

    /// Submitting resource adapter
    pub ra_name: String,

    /// What happened
    pub kind: WorkEventKind,

    /// Rejection reason or execution failure
    pub error: Option<WorkError>,

    /// When it happened
    pub at: Time,
}

/// Callbacks a resource adapter attaches to a submission.
pub trait WorkListener: Send + Sync {
    /// The unit was accepted.
    fn work_accepted(&self, _event: &WorkEvent) {}

    /// The unit was rejected and will not run.
    fn work_rejected(&self, _event: &WorkEvent) {}

    /// The unit started.
    fn work_started(&self, _event: &WorkEvent) {}

    /// The unit finished; `event.error` holds a failure, if any.
    fn work_completed(&self, _event: &WorkEvent) {}
}

/// Options of one submission.
#[derive(Clone, Default)]
pub struct WorkSpec {
    /// Longest time the unit may wait to start, `None` for no limit
    pub start_timeout: Option<Duration>,

    /// Context to apply before running
    pub context: Option<ExecutionContext>,

    /// Lifecycle callbacks
    pub listener: Option<Arc<dyn WorkListener>>,
}

impl WorkSpec {
    /// Create options with no timeout, context or listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the start timeout.
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = Some(timeout);
        self
    }

    /// Set the execution context.
    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the listener.
    pub fn with_listener(mut self, listener: Arc<dyn WorkListener>) -> Self {
        self.listener = Some(listener);
        self
    }
}

impl std::fmt::Debug for WorkSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkSpec")
            .field("start_timeout", &self.start_timeout)
            .field("context", &self.context)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}
