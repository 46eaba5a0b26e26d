//! Work management service.

use async_trait::async_trait;
use parking_lot::Mutex;
use rawork_core::{
    ConnectorError, ErrorCode, MonitoringConfig, WaitMode, WorkError, WorkId, WorkState,
};
use rawork_monitor::{ProbeProvider, WorkProbe, WorkStatsProvider, WorkStatsSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::context::{ContextHandler, TransactionContextHandler};
use crate::coordinator::WorkCoordinator;
use crate::pool::DispatchPool;
use crate::queue::AdmissionError;
use crate::thread_pools::ThreadPoolManager;
use crate::work::{Work, WorkSpec};

const PRUNE_THRESHOLD: usize = 128;

/// Work management service of one resource adapter.
#[async_trait]
pub trait WorkManager: Send + Sync {
    /// Run work and wait until it finished.
    ///
    /// Returns the rejection or execution failure of the unit, if any.
    async fn do_work(&self, work: Arc<dyn Work>, spec: WorkSpec) -> Result<(), WorkError>;

    /// Submit work and wait until it started.
    ///
    /// Returns the time from acceptance to start.
    async fn start_work(&self, work: Arc<dyn Work>, spec: WorkSpec) -> Result<Duration, WorkError>;

    /// Submit work without waiting for it.
    async fn schedule_work(&self, work: Arc<dyn Work>, spec: WorkSpec) -> Result<WorkId, WorkError>;
}

/// [`WorkManager`] dispatching to a shared [`DispatchPool`].
pub struct PooledWorkManager {
    ra_name: Arc<str>,
    pool: DispatchPool,
    monitor: Arc<ProbeProvider>,
    probe: Option<Arc<dyn WorkProbe>>,
    stats: Option<Arc<WorkStatsProvider>>,
    context_handler: Arc<dyn ContextHandler>,
    accepting: AtomicBool,
    closing: CancellationToken,
    in_flight: TaskTracker,
    units: Mutex<Vec<Weak<WorkCoordinator>>>,
}

impl PooledWorkManager {
    /// Create the work manager of `ra_name`, bound to the named thread pool
    /// or the default one, and register its statistics unless the adapter
    /// is an unmonitored system adapter.
    pub fn new(
        ra_name: impl Into<String>,
        thread_pool_id: Option<&str>,
        pools: &ThreadPoolManager,
        monitor: Arc<ProbeProvider>,
        monitoring: &MonitoringConfig,
    ) -> Result<Self, ConnectorError> {
        let ra_name = ra_name.into();
        if ra_name.trim().is_empty() {
            return Err(ConnectorError::InvalidAdapterName);
        }

        let pool = pools.pool_for(thread_pool_id, &ra_name)?;
        let stats = monitoring
            .dotted_name(&ra_name)
            .map(|dotted| monitor.register(ra_name.clone(), dotted));
        let probe = stats
            .as_ref()
            .map(|_| monitor.clone() as Arc<dyn WorkProbe>);

        debug!(
            "work manager for [{}] uses thread-pool [{}], monitored: {}",
            ra_name,
            pool.id(),
            stats.is_some()
        );

        Ok(Self {
            ra_name: Arc::from(ra_name),
            pool,
            monitor,
            probe,
            stats,
            context_handler: Arc::new(TransactionContextHandler::new()),
            accepting: AtomicBool::new(true),
            closing: CancellationToken::new(),
            in_flight: TaskTracker::new(),
            units: Mutex::new(Vec::new()),
        })
    }

    /// Replace the execution context handler.
    pub fn with_context_handler(mut self, handler: Arc<dyn ContextHandler>) -> Self {
        self.context_handler = handler;
        self
    }

    /// Resource adapter this manager serves.
    pub fn ra_name(&self) -> &str {
        &self.ra_name
    }

    /// Pool the work runs on.
    pub fn pool(&self) -> &DispatchPool {
        &self.pool
    }

    /// Whether new work is accepted.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Statistics snapshot, `None` for unmonitored adapters.
    pub fn stats(&self) -> Option<WorkStatsSnapshot> {
        self.stats.as_ref().map(|s| s.snapshot())
    }

    async fn submit(
        &self,
        work: Arc<dyn Work>,
        mode: WaitMode,
        spec: WorkSpec,
    ) -> Result<Arc<WorkCoordinator>, WorkError> {
        if !self.is_accepting() {
            return Err(self.shut_down_error());
        }

        if let Err(err) = self.context_handler.validate(spec.context.as_ref()) {
            debug!("invalid execution context for [{}]: {}", self.ra_name, err);
            return Err(err);
        }

        let coordinator = Arc::new(
            WorkCoordinator::new(
                self.ra_name.clone(),
                work,
                mode,
                spec,
                self.probe.clone(),
                self.context_handler.clone(),
            )
            .with_in_flight_token(self.in_flight.token()),
        );
        coordinator.accept();
        self.track(&coordinator);

        // Submitters blocked on a full queue give up once shutdown starts.
        let admitted = tokio::select! {
            admitted = self.pool.execute(coordinator.clone()) => admitted,
            _ = self.closing.cancelled() => Err(AdmissionError::Closed),
        };
        if let Err(err) = admitted {
            let err = match err {
                AdmissionError::Closed if !self.is_accepting() => self.shut_down_error(),
                err => err.into_work_error(),
            };
            coordinator.reject(err.clone());
            return Err(err);
        }

        // Shutdown may have drained the queue while this unit was admitted.
        if !self.is_accepting() {
            self.pool.remove(coordinator.id());
            if coordinator.cancel() {
                return Err(self.shut_down_error());
            }
        }
        Ok(coordinator)
    }

    fn shut_down_error(&self) -> WorkError {
        WorkError::rejected(
            ErrorCode::Internal,
            format!("work manager for [{}] is shut down", self.ra_name),
        )
    }

    fn track(&self, coordinator: &Arc<WorkCoordinator>) {
        let mut units = self.units.lock();
        if units.len() >= PRUNE_THRESHOLD {
            units.retain(|unit| unit.strong_count() > 0);
        }
        units.push(Arc::downgrade(coordinator));
    }

    /// Wait for the unit to start, timing it out when the start timeout
    /// elapses first.
    async fn await_start(&self, coordinator: &WorkCoordinator) -> Result<(), WorkError> {
        if !coordinator.wait_for_start().await && coordinator.time_out() {
            self.pool.remove(coordinator.id());
        }

        match coordinator.state() {
            WorkState::TimedOut | WorkState::Cancelled => {
                Err(coordinator.error().unwrap_or_else(WorkError::start_timed_out))
            }
            _ => Ok(()),
        }
    }

    /// Stop accepting work, cancel this adapter's queued units, ask running
    /// units to release and wait until they finished.
    pub async fn shutdown(&self) {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return;
        }
        self.closing.cancel();

        let cancelled = {
            let drained = self.pool.drain_adapter(&self.ra_name);
            drained.iter().filter(|c| c.cancel()).count()
        };

        let released = {
            let units = std::mem::take(&mut *self.units.lock());
            units
                .iter()
                .filter_map(Weak::upgrade)
                .filter(|c| c.state() == WorkState::Started)
                .map(|c| c.release_work())
                .count()
        };

        self.in_flight.close();
        self.in_flight.wait().await;

        if self.stats.is_some() {
            self.monitor.unregister(&self.ra_name);
        }
        info!(
            "work manager for [{}] shut down: {} queued units cancelled, {} running units released",
            self.ra_name, cancelled, released
        );
    }
}

#[async_trait]
impl WorkManager for PooledWorkManager {
    async fn do_work(&self, work: Arc<dyn Work>, spec: WorkSpec) -> Result<(), WorkError> {
        let coordinator = self.submit(work, WaitMode::UntilFinish, spec).await?;
        self.await_start(&coordinator).await?;
        coordinator.wait_for_finish().await;
        match coordinator.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn start_work(&self, work: Arc<dyn Work>, spec: WorkSpec) -> Result<Duration, WorkError> {
        let coordinator = self.submit(work, WaitMode::UntilStart, spec).await?;
        self.await_start(&coordinator).await?;
        Ok(coordinator.start_delay().unwrap_or_default())
    }

    async fn schedule_work(&self, work: Arc<dyn Work>, spec: WorkSpec) -> Result<WorkId, WorkError> {
        let coordinator = self.submit(work, WaitMode::NoWait, spec).await?;
        Ok(coordinator.id())
    }
}

impl std::fmt::Debug for PooledWorkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledWorkManager")
            .field("ra_name", &self.ra_name)
            .field("pool", &self.pool.id())
            .field("monitored", &self.stats.is_some())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::{work_fn, ExecutionContext, WorkEvent, WorkEventKind, WorkListener};
    use rawork_core::{AdmissionPolicy, ProbeEvent, ThreadPoolConfig, WorkManagerConfig};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::{broadcast, Notify, Semaphore};

    struct Fixture {
        pools: ThreadPoolManager,
        monitor: Arc<ProbeProvider>,
        monitoring: MonitoringConfig,
    }

    impl Fixture {
        fn new(pool: ThreadPoolConfig) -> Self {
            let config = WorkManagerConfig {
                default_thread_pool: pool.id.clone(),
                ..WorkManagerConfig::default()
            }
            .with_pool(pool);
            Self {
                pools: ThreadPoolManager::from_config(&config).unwrap(),
                monitor: Arc::new(ProbeProvider::new()),
                monitoring: config.monitoring,
            }
        }

        fn sized(core: usize, max: usize) -> Self {
            Self::new(
                ThreadPoolConfig::new("test-pool")
                    .with_property("core-pool-size", core.to_string())
                    .with_property("max-pool-size", max.to_string()),
            )
        }

        fn manager(&self, ra_name: &str) -> PooledWorkManager {
            PooledWorkManager::new(ra_name, None, &self.pools, self.monitor.clone(), &self.monitoring)
                .unwrap()
        }
    }

    fn noop() -> Arc<dyn Work> {
        work_fn(|| async { Ok(()) })
    }

    fn gated(gate: Arc<Semaphore>) -> Arc<dyn Work> {
        work_fn(move || {
            let gate = gate.clone();
            async move {
                gate.acquire().await?.forget();
                Ok(())
            }
        })
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    fn names(rx: &mut broadcast::Receiver<ProbeEvent>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        names
    }

    #[tokio::test]
    async fn test_five_units_on_two_workers() {
        let fixture = Fixture::sized(2, 2);
        let manager = fixture.manager("my-ra");
        let mut events = fixture.monitor.subscribe();
        let gate = Arc::new(Semaphore::new(0));

        for _ in 0..5 {
            manager.schedule_work(gated(gate.clone()), WorkSpec::new()).await.unwrap();
        }
        wait_until(|| manager.pool().active_count() == 2).await;
        let stats = manager.stats().unwrap();
        assert_eq!(stats.wait_queue_length.current, 3);
        assert_eq!(stats.active_work_count.current, 2);

        gate.add_permits(5);
        wait_until(|| manager.stats().unwrap().completed_work_count == 5).await;
        wait_until(|| manager.pool().active_count() == 0).await;

        let stats = manager.stats().unwrap();
        assert_eq!(stats.wait_queue_length.current, 0);
        assert_eq!(stats.wait_queue_length.high_water_mark, 3);
        assert_eq!(stats.active_work_count.high_water_mark, 2);
        assert_eq!(stats.submitted_work_count, 5);
        assert_eq!(
            stats.submitted_work_count,
            stats.completed_work_count + stats.rejected_work_count
        );
        let names = names(&mut events);
        for name in ["workQueued", "workDequeued", "workWaitedFor", "workProcessed"] {
            assert_eq!(names.iter().filter(|n| **n == name).count(), 5, "{}", name);
        }
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_start_timeout_on_idle_pool() {
        let fixture = Fixture::sized(2, 2);
        let manager = fixture.manager("my-ra");

        // Cold pool: the unit goes to a fresh core worker.
        manager
            .do_work(noop(), WorkSpec::new().with_start_timeout(Duration::ZERO))
            .await
            .unwrap();
        manager.do_work(noop(), WorkSpec::new()).await.unwrap();
        wait_until(|| manager.pool().active_count() == 0).await;

        // Warm pool: idle workers take the units off the queue.
        for _ in 0..10 {
            manager
                .do_work(noop(), WorkSpec::new().with_start_timeout(Duration::ZERO))
                .await
                .unwrap();
        }
        let started = manager
            .start_work(noop(), WorkSpec::new().with_start_timeout(Duration::ZERO))
            .await;
        assert!(started.is_ok());
        wait_until(|| manager.pool().active_count() == 0).await;

        let stats = manager.stats().unwrap();
        assert_eq!(stats.rejected_work_count, 0);
        assert_eq!(stats.completed_work_count, 13);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_start_timeout_on_saturated_pool() {
        let fixture = Fixture::sized(1, 1);
        let manager = fixture.manager("my-ra");
        let gate = Arc::new(Semaphore::new(0));
        manager.schedule_work(gated(gate.clone()), WorkSpec::new()).await.unwrap();
        wait_until(|| manager.pool().active_count() == 1).await;

        let mut events = fixture.monitor.subscribe();
        let started = Arc::new(AtomicBool::new(false));
        let flag = started.clone();
        let work = work_fn(move || {
            let flag = flag.clone();
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        });

        let err = manager
            .do_work(work, WorkSpec::new().with_start_timeout(Duration::ZERO))
            .await
            .unwrap_err();
        assert_eq!(err, WorkError::start_timed_out());

        gate.add_permits(1);
        wait_until(|| manager.pool().active_count() == 0).await;

        assert!(!started.load(Ordering::SeqCst));
        let names = names(&mut events);
        assert_eq!(names.iter().filter(|n| **n == "workTimedOut").count(), 1);
        assert_eq!(names.iter().filter(|n| **n == "workProcessingStarted").count(), 0);

        let stats = manager.stats().unwrap();
        assert_eq!(stats.rejected_work_count, 1);
        assert_eq!(stats.wait_queue_length.current, 0);
        assert_eq!(
            stats.submitted_work_count,
            stats.completed_work_count + stats.rejected_work_count
        );
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_work_returns_start_delay() {
        let fixture = Fixture::sized(1, 1);
        let manager = fixture.manager("my-ra");
        let gate = Arc::new(Semaphore::new(0));

        let delay = manager
            .start_work(gated(gate.clone()), WorkSpec::new())
            .await
            .unwrap();
        assert!(delay < Duration::from_secs(5));
        wait_until(|| manager.pool().active_count() == 1).await;

        gate.add_permits(1);
        manager.shutdown().await;
        assert_eq!(manager.pool().active_count(), 0);
    }

    #[tokio::test]
    async fn test_start_work_times_out() {
        let fixture = Fixture::sized(1, 1);
        let manager = fixture.manager("my-ra");
        let gate = Arc::new(Semaphore::new(0));
        manager.schedule_work(gated(gate.clone()), WorkSpec::new()).await.unwrap();
        wait_until(|| manager.pool().active_count() == 1).await;

        let err = manager
            .start_work(noop(), WorkSpec::new().with_start_timeout(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::StartTimedOut);
        assert_eq!(manager.pool().queue_len(), 0);

        gate.add_permits(1);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_do_work_reports_failure() {
        let fixture = Fixture::sized(1, 1);
        let manager = fixture.manager("my-ra");

        let err = manager
            .do_work(work_fn(|| async { Err(anyhow::anyhow!("bad record")) }), WorkSpec::new())
            .await
            .unwrap_err();
        assert_eq!(err, WorkError::completed(ErrorCode::Undefined, "bad record"));

        let err = manager
            .do_work(work_fn(|| async { panic!("oops") }), WorkSpec::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);

        manager.do_work(noop(), WorkSpec::new()).await.unwrap();
        let stats = manager.stats().unwrap();
        assert_eq!(stats.completed_work_count, 3);
        assert_eq!(stats.active_work_count.current, 0);
        manager.shutdown().await;
    }

    #[derive(Default)]
    struct Recorder {
        kinds: parking_lot::Mutex<Vec<WorkEventKind>>,
    }

    impl WorkListener for Recorder {
        fn work_accepted(&self, event: &WorkEvent) {
            self.kinds.lock().push(event.kind);
        }
        fn work_rejected(&self, event: &WorkEvent) {
            self.kinds.lock().push(event.kind);
        }
        fn work_started(&self, event: &WorkEvent) {
            self.kinds.lock().push(event.kind);
        }
        fn work_completed(&self, event: &WorkEvent) {
            self.kinds.lock().push(event.kind);
        }
    }

    #[tokio::test]
    async fn test_listener_sees_lifecycle() {
        let fixture = Fixture::sized(1, 1);
        let manager = fixture.manager("my-ra");
        let recorder = Arc::new(Recorder::default());

        manager
            .do_work(noop(), WorkSpec::new().with_listener(recorder.clone()))
            .await
            .unwrap();
        assert_eq!(
            *recorder.kinds.lock(),
            vec![WorkEventKind::Accepted, WorkEventKind::Started, WorkEventKind::Completed]
        );
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_queue_is_rejected() {
        let fixture = Fixture::new(
            ThreadPoolConfig::new("tiny")
                .with_property("core-pool-size", "1")
                .with_property("max-pool-size", "1")
                .with_property("queue-capacity", "1")
                .with_property("admission-policy", "reject"),
        );
        let manager = fixture.manager("my-ra");
        let gate = Arc::new(Semaphore::new(0));
        let recorder = Arc::new(Recorder::default());

        manager.schedule_work(gated(gate.clone()), WorkSpec::new()).await.unwrap();
        wait_until(|| manager.pool().active_count() == 1).await;
        manager.schedule_work(noop(), WorkSpec::new()).await.unwrap();

        let err = manager
            .schedule_work(noop(), WorkSpec::new().with_listener(recorder.clone()))
            .await
            .unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(
            *recorder.kinds.lock(),
            vec![WorkEventKind::Accepted, WorkEventKind::Rejected]
        );
        assert_eq!(manager.stats().unwrap().rejected_work_count, 1);

        gate.add_permits(1);
        wait_until(|| manager.stats().unwrap().completed_work_count == 2).await;
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_work_in_one_transaction() {
        let fixture = Fixture::sized(2, 2);
        let manager = fixture.manager("my-ra");
        let gate = Arc::new(Semaphore::new(0));
        let context = ExecutionContext::new().with_xid("tx-7");

        manager
            .start_work(gated(gate.clone()), WorkSpec::new().with_context(context.clone()))
            .await
            .unwrap();
        let err = manager
            .do_work(noop(), WorkSpec::new().with_context(context.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TxConcurrentWorkDisallowed);

        gate.add_permits(1);
        wait_until(|| manager.pool().active_count() == 0).await;
        manager
            .do_work(noop(), WorkSpec::new().with_context(context))
            .await
            .unwrap();
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_context_rejected_without_events() {
        let fixture = Fixture::sized(1, 1);
        let manager = fixture.manager("my-ra");
        let mut events = fixture.monitor.subscribe();

        let context = ExecutionContext::new()
            .with_xid("tx")
            .with_transaction_timeout(Duration::ZERO);
        let err = manager
            .schedule_work(noop(), WorkSpec::new().with_context(context))
            .await
            .unwrap_err();
        assert!(err.is_rejected());
        assert!(names(&mut events).is_empty());
        assert_eq!(manager.stats().unwrap().submitted_work_count, 0);
    }

    struct Releasable {
        released: Notify,
        releases: AtomicUsize,
    }

    #[async_trait]
    impl Work for Releasable {
        async fn run(&self) -> anyhow::Result<()> {
            self.released.notified().await;
            Ok(())
        }

        fn release(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
            self.released.notify_one();
        }
    }

    #[tokio::test]
    async fn test_shutdown_releases_running_and_cancels_queued() {
        let fixture = Fixture::sized(1, 1);
        let manager = fixture.manager("my-ra");
        let running = Arc::new(Releasable {
            released: Notify::new(),
            releases: AtomicUsize::new(0),
        });

        manager.start_work(running.clone(), WorkSpec::new()).await.unwrap();
        let recorder = Arc::new(Recorder::default());
        manager
            .schedule_work(noop(), WorkSpec::new().with_listener(recorder.clone()))
            .await
            .unwrap();
        let mut events = fixture.monitor.subscribe();

        manager.shutdown().await;

        assert_eq!(running.releases.load(Ordering::SeqCst), 1);
        // The queued unit vanished silently.
        assert_eq!(*recorder.kinds.lock(), vec![WorkEventKind::Accepted]);
        let names = names(&mut events);
        assert!(!names.contains(&"workTimedOut"));
        assert!(!names.contains(&"workProcessingStarted"));
        assert!(fixture.monitor.stats("my-ra").is_none());

        let err = manager.schedule_work(noop(), WorkSpec::new()).await.unwrap_err();
        assert!(err.is_rejected());
        assert!(!manager.is_accepting());
    }

    #[tokio::test]
    async fn test_shutdown_turns_away_blocked_submitter() {
        let fixture = Fixture::new(
            ThreadPoolConfig::new("tiny")
                .with_property("core-pool-size", "1")
                .with_property("max-pool-size", "1")
                .with_property("queue-capacity", "1")
                .with_property("admission-policy", "block"),
        );
        let manager = Arc::new(fixture.manager("my-ra"));
        let running = Arc::new(Releasable {
            released: Notify::new(),
            releases: AtomicUsize::new(0),
        });

        manager.start_work(running.clone(), WorkSpec::new()).await.unwrap();
        manager.schedule_work(noop(), WorkSpec::new()).await.unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let blocked = {
            let manager = manager.clone();
            let flag = ran.clone();
            let work = work_fn(move || {
                let flag = flag.clone();
                async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                }
            });
            tokio::spawn(async move { manager.schedule_work(work, WorkSpec::new()).await })
        };
        wait_until(|| manager.stats().unwrap().submitted_work_count == 3).await;
        assert!(!blocked.is_finished());

        tokio::time::timeout(Duration::from_secs(5), manager.shutdown())
            .await
            .expect("shutdown waited on the blocked submitter");

        let err = blocked.await.unwrap().unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(manager.pool().queue_len(), 0);

        // Nothing sneaks onto the shared pool afterwards.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(manager.pool().active_count(), 0);
    }

    #[tokio::test]
    async fn test_system_adapters_and_jms() {
        let fixture = Fixture::sized(1, 1);
        let mut events = fixture.monitor.subscribe();

        let jdbc = fixture.manager("__xa_jdbc_ra");
        jdbc.do_work(noop(), WorkSpec::new()).await.unwrap();
        assert!(jdbc.stats().is_none());
        assert!(names(&mut events).is_empty());

        let jms = fixture.manager("jmsra");
        assert_eq!(jms.stats().unwrap().dotted_name, "jms-service/work-management");

        let app = fixture.manager("my-ra");
        assert_eq!(
            app.stats().unwrap().dotted_name,
            "connector-service/my-ra/work-management"
        );
    }

    #[test]
    fn test_construction_errors() {
        let fixture = Fixture::sized(1, 1);
        let err = PooledWorkManager::new(
            "my-ra",
            Some("missing"),
            &fixture.pools,
            fixture.monitor.clone(),
            &fixture.monitoring,
        )
        .unwrap_err();
        assert!(matches!(err, ConnectorError::ThreadPoolNotFound { .. }));

        let err = PooledWorkManager::new(
            "",
            None,
            &fixture.pools,
            fixture.monitor.clone(),
            &fixture.monitoring,
        )
        .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidAdapterName));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submitters_keep_invariants() {
        let fixture = Fixture::new(
            ThreadPoolConfig::new("busy")
                .with_property("core-pool-size", "2")
                .with_property("max-pool-size", "4")
                .with_property("queue-capacity", "8")
                .with_property("admission-policy", AdmissionPolicy::Block.to_string()),
        );
        let manager = Arc::new(fixture.manager("my-ra"));

        let submitters: Vec<_> = (0..8)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    for j in 0..10 {
                        let spec = if (i + j) % 7 == 0 {
                            WorkSpec::new().with_start_timeout(Duration::ZERO)
                        } else {
                            WorkSpec::new()
                        };
                        let work = work_fn(|| async {
                            tokio::time::sleep(Duration::from_millis(1)).await;
                            Ok(())
                        });
                        let _ = manager.do_work(work, spec).await;
                    }
                })
            })
            .collect();
        for s in submitters {
            s.await.unwrap();
        }
        wait_until(|| manager.pool().active_count() == 0).await;

        let stats = manager.stats().unwrap();
        assert_eq!(stats.submitted_work_count, 80);
        assert_eq!(
            stats.submitted_work_count,
            stats.completed_work_count + stats.rejected_work_count
        );
        assert!(stats.active_work_count.high_water_mark <= 4);
        assert_eq!(stats.active_work_count.current, 0);
        assert_eq!(stats.wait_queue_length.current, 0);
        manager.shutdown().await;
    }
}
