//! Work Management
//!
//! Accepts asynchronous work from resource adapters, queues it, dispatches
//! it to bounded pools of workers and reports every lifecycle transition to
//! the monitoring probes.
//!
//! ```text
//! submit -> WorkQueue (bounded FIFO) -> DispatchPool worker -> run
//!   |             |                           |
//!   +- workSubmitted  workQueued / workDequeued    workProcessingStarted ...
//! ```

#![warn(missing_docs)]

pub mod work;
pub mod context;
pub mod coordinator;
pub mod queue;
pub mod pool;
pub mod thread_pools;
pub mod manager;

pub use work::{work_fn, ExecutionContext, Work, WorkEvent, WorkEventKind, WorkListener, WorkSpec};
pub use context::{ContextHandler, TransactionContextHandler};
pub use coordinator::WorkCoordinator;
pub use queue::{AdmissionError, QueuedWork, WorkQueue};
pub use pool::{DispatchPool, PoolStatus};
pub use thread_pools::ThreadPoolManager;
pub use manager::{PooledWorkManager, WorkManager};
