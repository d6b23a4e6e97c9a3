//! The job engine: bounded queue, lifecycle operations, and the worker pool.
//!
//! Jobs are persisted before their id is enqueued, and every status change
//! goes through a compare-and-set in [`JobRepository`]. The queue only
//! carries ids; workers always reload the job before running it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashSet;
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jobsync_core::config::WorkerConfig;
use jobsync_core::error::AppError;
use jobsync_core::result::AppResult;
use jobsync_core::types::JobId;
use jobsync_database::repositories::{JobEventRepository, JobRepository};
use jobsync_entity::job::{EventLevel, Job, JobEvent, JobKind, JobStatus};
use jobsync_realtime::{BusEvent, EventBus};

use crate::executor::JobExecutor;
use crate::runner::WorkerRunner;

/// Delay before a job whose claim hit a storage error is offered again.
const CLAIM_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Default and bounds for `list` limits.
const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 500;

/// Worker occupancy in a status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerCounts {
    pub active: usize,
    pub idle: usize,
}

/// Snapshot returned by `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub uptime_sec: u64,
    pub queue_depth: usize,
    pub workers: WorkerCounts,
}

/// Owns the queue and the worker pool. Shared by `Arc`.
#[derive(Debug)]
pub struct JobEngine {
    pub(crate) jobs: JobRepository,
    pub(crate) events: JobEventRepository,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) executor: Arc<JobExecutor>,
    pub(crate) receiver: Arc<Mutex<mpsc::Receiver<JobId>>>,
    pub(crate) active: DashSet<JobId>,
    pub(crate) shutdown: CancellationToken,
    sender: mpsc::Sender<JobId>,
    concurrency: usize,
    shutdown_timeout: Duration,
    started_at: Instant,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobEngine {
    /// Create an engine. Workers are not started until [`JobEngine::start`].
    pub fn new(
        pool: SqlitePool,
        bus: Arc<EventBus>,
        executor: Arc<JobExecutor>,
        config: &WorkerConfig,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        Arc::new(Self {
            jobs: JobRepository::new(pool.clone()),
            events: JobEventRepository::new(pool),
            bus,
            executor,
            receiver: Arc::new(Mutex::new(receiver)),
            active: DashSet::new(),
            shutdown: CancellationToken::new(),
            sender,
            concurrency: config.concurrency.max(1),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_seconds),
            started_at: Instant::now(),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Persist a new job and enqueue it.
    ///
    /// A queue slot is reserved first, so a full queue rejects the job
    /// without persisting anything. Once the row exists the id is always
    /// enqueued; the `job queued` event is best-effort.
    pub async fn submit(&self, kind: JobKind, payload: Value) -> AppResult<JobId> {
        let permit = self.sender.try_reserve().map_err(|_| {
            warn!(kind = %kind, "Job queue is full, rejecting submission");
            AppError::service_unavailable("Job queue is full, retry later")
        })?;

        let payload = if payload.is_null() { json!({}) } else { payload };
        let id = JobId::new();
        self.jobs.create(&id, kind, &payload).await?;
        permit.send(id.clone());

        if let Err(e) = self
            .events
            .append(&id, EventLevel::Info, "job queued", Some(&json!({ "kind": kind })))
            .await
        {
            warn!(job_id = %id, error = %e, "Failed to record job queued event");
        }
        self.bus.broadcast(&BusEvent::JobStatus {
            job_id: id.clone(),
            status: JobStatus::Queued,
        });

        info!(job_id = %id, kind = %kind, "Job queued");
        Ok(id)
    }

    /// Offer a still-queued job to the workers again after a short delay.
    pub(crate) fn requeue_later(&self, id: JobId) {
        let sender = self.sender.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(CLAIM_RETRY_DELAY) => {
                    if sender.send(id).await.is_err() {
                        debug!("Queue closed before re-queueing job");
                    }
                }
            }
        });
    }

    /// Fetch a job.
    pub async fn get(&self, id: &JobId) -> AppResult<Job> {
        self.jobs
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))
    }

    /// Most recent jobs, newest first.
    pub async fn list(&self, limit: Option<u32>) -> AppResult<Vec<Job>> {
        let limit = limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        self.jobs.list_recent(limit).await
    }

    /// A job's event log in insertion order.
    pub async fn events(&self, id: &JobId) -> AppResult<Vec<JobEvent>> {
        self.get(id).await?;
        self.events.list_for_job(id).await
    }

    /// Cancel a job.
    ///
    /// Only queued jobs are canceled. A running job keeps running and the
    /// request is recorded as a warning. Terminal jobs are left untouched.
    pub async fn cancel(&self, id: &JobId) -> AppResult<JobStatus> {
        let job = self.get(id).await?;
        if job.status.is_terminal() {
            return Ok(job.status);
        }

        if job.status == JobStatus::Queued && self.jobs.cancel_if_queued(id).await? {
            self.events
                .append(id, EventLevel::Info, "job canceled", None)
                .await?;
            self.bus.broadcast(&BusEvent::JobStatus {
                job_id: id.clone(),
                status: JobStatus::Canceled,
            });
            info!(job_id = %id, "Job canceled");
            return Ok(JobStatus::Canceled);
        }

        // Lost the race with a worker claim, or already running.
        let current = self.get(id).await?;
        if current.status == JobStatus::Running {
            self.events
                .append(
                    id,
                    EventLevel::Warn,
                    "cancel requested while running; job will run to completion",
                    None,
                )
                .await?;
        }
        Ok(current.status)
    }

    /// Uptime, queue depth, and worker occupancy.
    pub fn status_snapshot(&self) -> EngineStatus {
        let active = self.active.len();
        EngineStatus {
            uptime_sec: self.started_at.elapsed().as_secs(),
            queue_depth: self.queue_depth(),
            workers: WorkerCounts {
                active,
                idle: self.concurrency.saturating_sub(active),
            },
        }
    }

    /// Number of ids waiting in the queue.
    pub fn queue_depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Reconcile jobs left behind by a previous process.
    ///
    /// `running` jobs are failed; `queued` jobs are re-enqueued in creation
    /// order. Re-enqueueing happens in the background so a backlog larger
    /// than the queue does not block startup.
    pub async fn recover(&self) -> AppResult<()> {
        let interrupted = self.jobs.find_running_ids().await?;
        for id in &interrupted {
            let error = json!({ "message": "interrupted by restart", "kind": "internal" });
            if self.jobs.fail(id, &error).await? {
                self.events
                    .append(id, EventLevel::Error, "job failed", Some(&error))
                    .await?;
                self.bus.broadcast(&BusEvent::JobStatus {
                    job_id: id.clone(),
                    status: JobStatus::Failed,
                });
            }
        }

        let pending = self.jobs.find_queued_ids().await?;
        info!(
            interrupted = interrupted.len(),
            requeued = pending.len(),
            "Recovered jobs from previous run"
        );

        if !pending.is_empty() {
            let sender = self.sender.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                for id in pending {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        sent = sender.send(id) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
        Ok(())
    }

    /// Spawn the worker loops.
    pub async fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            return;
        }
        for worker_id in 0..self.concurrency {
            let runner = WorkerRunner::new(worker_id, Arc::clone(self));
            workers.push(tokio::spawn(runner.run()));
        }
        info!(concurrency = self.concurrency, "Worker pool started");
    }

    /// Signal handlers and workers to stop, then wait for them.
    ///
    /// Workers still running after the shutdown timeout are aborted.
    pub async fn shutdown(&self) {
        info!("Shutting down job engine");
        self.shutdown.cancel();

        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let wait = futures::future::join_all(handles);
        if tokio::time::timeout(self.shutdown_timeout, wait).await.is_err() {
            warn!("Workers did not stop in time, aborting");
            for handle in aborts {
                handle.abort();
            }
        }
        info!("Job engine stopped");
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// The shutdown token, for components that should stop with the engine.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobHandler;
    use crate::context::JobContext;
    use crate::executor::JobExecutionError;
    use crate::jobs::NoopHandler;
    use crate::testing::test_pool;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(concurrency: usize, capacity: usize) -> WorkerConfig {
        WorkerConfig {
            enabled: true,
            concurrency,
            queue_capacity: capacity,
            shutdown_timeout_seconds: 2,
        }
    }

    fn noop_executor() -> Arc<JobExecutor> {
        let mut executor = JobExecutor::new();
        executor.register(Arc::new(NoopHandler));
        Arc::new(executor)
    }

    async fn wait_for_status(engine: &JobEngine, id: &JobId, status: JobStatus) -> Job {
        for _ in 0..200 {
            let job = engine.get(id).await.unwrap();
            if job.status == status {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached {status}");
    }

    #[derive(Debug, Default)]
    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        fn kind(&self) -> JobKind {
            JobKind::Noop
        }

        async fn execute(&self, _ctx: &JobContext) -> Result<Value, JobExecutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({}))
        }
    }

    #[derive(Debug)]
    struct PanickingHandler;

    #[async_trait]
    impl JobHandler for PanickingHandler {
        fn kind(&self) -> JobKind {
            JobKind::ProcessSpawn
        }

        async fn execute(&self, _ctx: &JobContext) -> Result<Value, JobExecutionError> {
            panic!("handler exploded");
        }
    }

    #[tokio::test]
    async fn test_noop_job_succeeds_with_progress() {
        let bus = Arc::new(EventBus::new(64));
        let (_sub, mut rx) = bus.subscribe();
        let engine = JobEngine::new(test_pool().await, bus, noop_executor(), &config(1, 8));
        engine.start().await;

        let id = engine
            .submit(JobKind::Noop, json!({ "simulate_ms": 200 }))
            .await
            .unwrap();
        let job = wait_for_status(&engine, &id, JobStatus::Succeeded).await;
        assert_eq!(job.progress, 1.0);
        assert_eq!(job.result.unwrap()["steps"], 1);

        let mut statuses = Vec::new();
        let mut last_progress = 0.0;
        while let Ok(frame) = rx.try_recv() {
            let frame: Value = serde_json::from_str(&frame).unwrap();
            match frame["type"].as_str() {
                Some("job.status") => statuses.push(frame["status"].as_str().unwrap().to_string()),
                Some("job.progress") => last_progress = frame["progress"].as_f64().unwrap(),
                _ => {}
            }
        }
        assert_eq!(statuses, ["queued", "running", "succeeded"]);
        assert_eq!(last_progress, 1.0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_while_queued_skips_handler() {
        let counting = Arc::new(CountingHandler::default());
        let mut executor = JobExecutor::new();
        executor.register(counting.clone());

        let bus = Arc::new(EventBus::new(64));
        let (_sub, mut rx) = bus.subscribe();
        let engine = JobEngine::new(test_pool().await, bus, Arc::new(executor), &config(1, 8));

        let id = engine.submit(JobKind::Noop, json!({})).await.unwrap();
        assert_eq!(engine.cancel(&id).await.unwrap(), JobStatus::Canceled);

        engine.start().await;
        let marker = engine.submit(JobKind::Noop, json!({})).await.unwrap();
        wait_for_status(&engine, &marker, JobStatus::Succeeded).await;

        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.get(&id).await.unwrap().status, JobStatus::Canceled);

        let mut progress_frames = 0;
        while let Ok(frame) = rx.try_recv() {
            let frame: Value = serde_json::from_str(&frame).unwrap();
            if frame["type"] == "job.progress" && frame["job_id"] == id.as_str() {
                progress_frames += 1;
            }
        }
        assert_eq!(progress_frames, 0);

        // Canceling a terminal job is a no-op.
        assert_eq!(engine.cancel(&id).await.unwrap(), JobStatus::Canceled);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_while_running_lets_job_finish() {
        let bus = Arc::new(EventBus::new(64));
        let engine = JobEngine::new(test_pool().await, bus, noop_executor(), &config(1, 8));
        engine.start().await;

        let id = engine
            .submit(JobKind::Noop, json!({ "simulate_ms": 300 }))
            .await
            .unwrap();
        wait_for_status(&engine, &id, JobStatus::Running).await;
        assert_eq!(engine.cancel(&id).await.unwrap(), JobStatus::Running);

        let job = wait_for_status(&engine, &id, JobStatus::Succeeded).await;
        assert_eq!(job.result.unwrap(), json!({ "simulated_ms": 300, "steps": 1 }));

        let warning = engine
            .events(&id)
            .await
            .unwrap()
            .into_iter()
            .find(|event| event.level == EventLevel::Warn)
            .unwrap();
        assert_eq!(
            warning.message,
            "cancel requested while running; job will run to completion"
        );
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_enqueues_even_when_event_log_fails() {
        let counting = Arc::new(CountingHandler::default());
        let mut executor = JobExecutor::new();
        executor.register(counting.clone());

        let pool = test_pool().await;
        let bus = Arc::new(EventBus::new(64));
        let engine = JobEngine::new(pool.clone(), bus, Arc::new(executor), &config(1, 8));
        engine.start().await;

        sqlx::query("DROP TABLE job_events").execute(&pool).await.unwrap();
        let id = engine.submit(JobKind::Noop, json!({})).await.unwrap();

        wait_for_status(&engine, &id, JobStatus::Succeeded).await;
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_claim_error_requeues_job() {
        let pool = test_pool().await;
        let bus = Arc::new(EventBus::new(64));
        let engine = JobEngine::new(pool.clone(), bus, noop_executor(), &config(1, 8));
        let id = engine.submit(JobKind::Noop, json!({})).await.unwrap();

        sqlx::query("ALTER TABLE jobs RENAME TO jobs_hidden")
            .execute(&pool)
            .await
            .unwrap();
        engine.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.status_snapshot().queue_depth, 0);

        sqlx::query("ALTER TABLE jobs_hidden RENAME TO jobs")
            .execute(&pool)
            .await
            .unwrap();
        wait_for_status(&engine, &id, JobStatus::Succeeded).await;
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_handler_fails_job_and_worker_survives() {
        let mut executor = JobExecutor::new();
        executor.register(Arc::new(NoopHandler));
        executor.register(Arc::new(PanickingHandler));

        let bus = Arc::new(EventBus::new(64));
        let engine = JobEngine::new(test_pool().await, bus, Arc::new(executor), &config(1, 8));
        engine.start().await;

        let bad = engine.submit(JobKind::ProcessSpawn, json!({})).await.unwrap();
        let failed = wait_for_status(&engine, &bad, JobStatus::Failed).await;
        let error = failed.error.unwrap();
        assert_eq!(error["kind"], "internal");
        assert!(error["message"].as_str().unwrap().contains("handler exploded"));

        let good = engine.submit(JobKind::Noop, json!({})).await.unwrap();
        wait_for_status(&engine, &good, JobStatus::Succeeded).await;
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_persisting() {
        let bus = Arc::new(EventBus::new(8));
        let engine = JobEngine::new(test_pool().await, bus, noop_executor(), &config(1, 1));

        engine.submit(JobKind::Noop, json!({})).await.unwrap();
        let err = engine.submit(JobKind::Noop, json!({})).await.unwrap_err();
        assert_eq!(err.kind, jobsync_core::error::ErrorKind::ServiceUnavailable);
        assert_eq!(engine.list(None).await.unwrap().len(), 1);
        assert_eq!(engine.status_snapshot().queue_depth, 1);
    }

    #[tokio::test]
    async fn test_recover_fails_running_and_requeues_queued() {
        let pool = test_pool().await;
        let repo = JobRepository::new(pool.clone());
        let stale = JobId::new();
        repo.create(&stale, JobKind::Noop, &json!({})).await.unwrap();
        repo.claim(&stale).await.unwrap();
        let pending = JobId::new();
        repo.create(&pending, JobKind::Noop, &json!({})).await.unwrap();

        let bus = Arc::new(EventBus::new(8));
        let engine = JobEngine::new(pool, bus, noop_executor(), &config(1, 8));
        engine.recover().await.unwrap();
        engine.start().await;

        let failed = engine.get(&stale).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.unwrap()["message"], "interrupted by restart");
        wait_for_status(&engine, &pending, JobStatus::Succeeded).await;
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_list_clamps_limit_and_orders_newest_first() {
        let bus = Arc::new(EventBus::new(8));
        let engine = JobEngine::new(test_pool().await, bus, noop_executor(), &config(1, 8));
        let first = engine.submit(JobKind::Noop, json!({})).await.unwrap();
        let second = engine.submit(JobKind::Noop, json!({})).await.unwrap();

        let jobs = engine.list(Some(0)).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, second);

        let jobs = engine.list(None).await.unwrap();
        assert_eq!(jobs.iter().map(|j| j.id.clone()).collect::<Vec<_>>(), [second, first.clone()]);

        let events = engine.events(&first).await.unwrap();
        assert_eq!(events[0].message, "job queued");
        assert!(engine.events(&JobId::new()).await.is_err());
    }
}
