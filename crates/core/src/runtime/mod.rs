//! Background job runtime.
//!
//! Jobs run on tokio tasks bounded by a per-kind semaphore (transcription
//! defaults to one at a time). Every job gets a cancellation flag checked at
//! safe points and a progress channel that broadcasts over the WebSocket
//! only. Scheduled jobs are reentrant-safe: a trigger while one is already
//! running is a no-op.

mod cancel;

pub use cancel::CancelFlag;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{broadcast, Semaphore};

use crate::events::EventHandle;
use crate::store::{Job, JobKind, JobStatus, JobStore, StoreError};

/// Context handed to running jobs.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: String,
    pub cancel: CancelFlag,
    events: EventHandle,
}

impl JobContext {
    /// Emit a progress update (WebSocket only, never persisted).
    pub fn progress(&self, phase: &str, fraction: f64, message: &str) {
        self.events.emit(
            "job_update",
            serde_json::json!({
                "job_id": self.job_id,
                "phase": phase,
                "progress": fraction.clamp(0.0, 1.0),
                "message": message,
            }),
        );
    }

    pub fn events(&self) -> &EventHandle {
        &self.events
    }
}

/// A job body: runs to completion and returns stats or an error message.
pub type JobWork = Box<dyn FnOnce(JobContext) -> BoxFuture<'static, Result<serde_json::Value, String>> + Send>;

pub struct JobRunner {
    jobs: JobStore,
    events: EventHandle,
    semaphores: HashMap<JobKind, Arc<Semaphore>>,
    cancel_flags: Arc<Mutex<HashMap<String, CancelFlag>>>,
}

impl JobRunner {
    pub fn new(jobs: JobStore, events: EventHandle, max_whisper_concurrent: usize) -> Self {
        let mut semaphores = HashMap::new();
        for kind in [
            JobKind::Translate,
            JobKind::ProviderSearch,
            JobKind::Batch,
            JobKind::WantedScan,
            JobKind::Transcribe,
            JobKind::Sync,
        ] {
            let limit = match kind {
                JobKind::Transcribe => max_whisper_concurrent.max(1),
                JobKind::WantedScan => 1,
                _ => 4,
            };
            semaphores.insert(kind, Arc::new(Semaphore::new(limit)));
        }
        Self {
            jobs,
            events,
            semaphores,
            cancel_flags: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.jobs
    }

    /// Submit a background job; returns the persisted job immediately.
    pub fn submit(
        &self,
        kind: JobKind,
        file_path: Option<&str>,
        request: Option<serde_json::Value>,
        work: JobWork,
    ) -> Result<Job, StoreError> {
        let job = self.jobs.create(kind, file_path, request.as_ref())?;
        let context = JobContext {
            job_id: job.id.clone(),
            cancel: CancelFlag::new(),
            events: self.events.clone(),
        };
        self.cancel_flags
            .lock()
            .unwrap()
            .insert(job.id.clone(), context.cancel.clone());

        let semaphore = Arc::clone(
            self.semaphores
                .get(&kind)
                .expect("semaphore exists for every kind"),
        );
        let jobs = self.jobs.clone();
        let cancel_flags = Arc::clone(&self.cancel_flags);
        let job_id = job.id.clone();

        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;

            if context.cancel.is_cancelled() {
                let _ = jobs.finish(&job_id, JobStatus::Failed, None, Some("cancelled"));
                cancel_flags.lock().unwrap().remove(&job_id);
                return;
            }

            let _ = jobs.mark_running(&job_id);
            context.progress("started", 0.0, "");

            let result = work(context.clone()).await;

            match result {
                Ok(stats) => {
                    let _ = jobs.finish(&job_id, JobStatus::Completed, Some(&stats), None);
                    context.progress("completed", 1.0, "");
                }
                Err(error) => {
                    let _ = jobs.finish(&job_id, JobStatus::Failed, None, Some(&error));
                    context.progress("failed", 1.0, &error);
                    tracing::warn!(job = %job_id, "Job failed: {}", error);
                }
            }
            cancel_flags.lock().unwrap().remove(&job_id);
        });

        Ok(job)
    }

    /// Run a job inline (for synchronous API variants) and return the final
    /// job record.
    pub async fn run_now(
        &self,
        kind: JobKind,
        file_path: Option<&str>,
        request: Option<serde_json::Value>,
        work: JobWork,
    ) -> Result<Job, StoreError> {
        let job = self.jobs.create(kind, file_path, request.as_ref())?;
        let context = JobContext {
            job_id: job.id.clone(),
            cancel: CancelFlag::new(),
            events: self.events.clone(),
        };

        self.jobs.mark_running(&job.id)?;
        match work(context).await {
            Ok(stats) => {
                self.jobs
                    .finish(&job.id, JobStatus::Completed, Some(&stats), None)?;
            }
            Err(error) => {
                self.jobs
                    .finish(&job.id, JobStatus::Failed, None, Some(&error))?;
            }
        }
        self.jobs.get(&job.id)
    }

    /// Request cancellation; the worker exits at its next safe point.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.cancel_flags.lock().unwrap().get(job_id) {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }

    /// Reentrancy guard for scheduled jobs.
    pub fn has_active(&self, kind: JobKind) -> Result<bool, StoreError> {
        self.jobs.has_active(kind)
    }
}

/// A fixed-interval background schedule.
pub struct Scheduler {
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { shutdown_tx }
    }

    /// Spawn a loop that runs `task` every `period`. The first run happens
    /// after one full period, not at startup.
    pub fn spawn_interval(
        &self,
        name: &'static str,
        period: Duration,
        task: Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>,
    ) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            tracing::info!(task = name, period_secs = period.as_secs(), "Schedule started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!(task = name, "Schedule stopped");
                        break;
                    }
                    _ = tokio::time::sleep(period) => {
                        task().await;
                    }
                }
            }
        });
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::create_event_bus;
    use crate::store::Database;

    fn runner() -> JobRunner {
        let db = Database::in_memory().unwrap();
        let (events, _dispatcher) = create_event_bus(vec![], None, 64, 4);
        JobRunner::new(JobStore::new(db), events, 1)
    }

    #[tokio::test]
    async fn test_submit_runs_to_completion() {
        let runner = runner();
        let job = runner
            .submit(
                JobKind::Translate,
                Some("/m/a.mkv"),
                None,
                Box::new(|_ctx| {
                    Box::pin(async { Ok(serde_json::json!({"lines": 3})) })
                }),
            )
            .unwrap();

        // Poll until terminal
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if runner.store().get(&job.id).unwrap().status.is_terminal() {
                break;
            }
        }
        let finished = runner.store().get(&job.id).unwrap();
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.stats.unwrap()["lines"], 3);
    }

    #[tokio::test]
    async fn test_submit_records_failure() {
        let runner = runner();
        let job = runner
            .submit(
                JobKind::Translate,
                None,
                None,
                Box::new(|_ctx| Box::pin(async { Err("boom".to_string()) })),
            )
            .unwrap();

        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if runner.store().get(&job.id).unwrap().status.is_terminal() {
                break;
            }
        }
        let finished = runner.store().get(&job.id).unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert_eq!(finished.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_cancel_stops_job_at_safe_point() {
        let runner = runner();
        let job = runner
            .submit(
                JobKind::Translate,
                None,
                None,
                Box::new(|ctx| {
                    Box::pin(async move {
                        for _ in 0..100 {
                            if ctx.cancel.is_cancelled() {
                                return Err("cancelled".to_string());
                            }
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                        Ok(serde_json::json!({}))
                    })
                }),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(runner.cancel(&job.id));

        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if runner.store().get(&job.id).unwrap().status.is_terminal() {
                break;
            }
        }
        let finished = runner.store().get(&job.id).unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert_eq!(finished.error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let runner = runner();
        assert!(!runner.cancel("nope"));
    }

    #[tokio::test]
    async fn test_run_now_returns_terminal_job() {
        let runner = runner();
        let job = runner
            .run_now(
                JobKind::Translate,
                None,
                None,
                Box::new(|_ctx| Box::pin(async { Ok(serde_json::json!({"ok": true})) })),
            )
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_transcribe_semaphore_serializes() {
        let runner = runner();
        let running = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut ids = Vec::new();
        for _ in 0..3 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let job = runner
                .submit(
                    JobKind::Transcribe,
                    None,
                    None,
                    Box::new(move |_ctx| {
                        Box::pin(async move {
                            let now =
                                running.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                            peak.fetch_max(now, std::sync::atomic::Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(30)).await;
                            running.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                            Ok(serde_json::json!({}))
                        })
                    }),
                )
                .unwrap();
            ids.push(job.id);
        }

        for id in &ids {
            for _ in 0..100 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if runner.store().get(id).unwrap().status.is_terminal() {
                    break;
                }
            }
        }
        // max_whisper_concurrent = 1
        assert_eq!(peak.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scheduler_runs_and_stops() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let task_counter = Arc::clone(&counter);

        scheduler.spawn_interval(
            "test",
            Duration::from_millis(20),
            Arc::new(move || {
                let counter = Arc::clone(&task_counter);
                Box::pin(async move {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                })
            }),
        );

        tokio::time::sleep(Duration::from_millis(110)).await;
        scheduler.shutdown();
        let after_shutdown = counter.load(std::sync::atomic::Ordering::SeqCst);
        assert!(after_shutdown >= 3);

        tokio::time::sleep(Duration::from_millis(60)).await;
        // No further runs after shutdown
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), after_shutdown);
    }
}
