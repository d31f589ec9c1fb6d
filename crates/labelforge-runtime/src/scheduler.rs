//! Batch job scheduling over a shared worker pool.
//!
//! The semaphore caps concurrent per-sample pipelines across every active
//! job, not per job. Cancellation stops new samples from starting;
//! in-flight pipelines always run to completion.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::pipeline::process_sample;
use crate::types::{BatchContext, BatchJob, JobState, SampleOutcome};
use labelforge_qa::QaEngine;

/// Sliding window used for post-batch quality metric snapshots.
const QUALITY_WINDOW: usize = 50;

/// Schedules batch jobs and tracks their lifecycle.
pub struct JobScheduler {
    jobs: Arc<RwLock<HashMap<String, BatchJob>>>,
    cancel_flags: Arc<RwLock<HashMap<String, Arc<AtomicBool>>>>,
    pool: Arc<Semaphore>,
    pool_size: usize,
}

impl JobScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            cancel_flags: Arc::new(RwLock::new(HashMap::new())),
            pool: Arc::new(Semaphore::new(max_concurrent)),
            pool_size: max_concurrent,
        }
    }

    /// Queue a batch and spawn its worker task. Returns the job id.
    pub fn spawn_batch(&self, ctx: BatchContext, sample_ids: Vec<i64>) -> String {
        let job_id = uuid::Uuid::new_v4().to_string();
        let job = BatchJob {
            id: job_id.clone(),
            project_id: ctx.policy.project_id,
            state: JobState::Queued,
            sample_ids: sample_ids.clone(),
            outcomes: Default::default(),
            queued_at: now_millis(),
            started_at: None,
            completed_at: None,
            error: None,
        };
        let cancel = Arc::new(AtomicBool::new(false));
        self.jobs.write().insert(job_id.clone(), job);
        self.cancel_flags.write().insert(job_id.clone(), cancel.clone());

        let jobs = self.jobs.clone();
        let pool = self.pool.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            run_batch(jobs, pool, cancel, ctx, id, sample_ids).await;
        });

        job_id
    }

    /// Get a job by id.
    pub fn job(&self, job_id: &str) -> Option<BatchJob> {
        self.jobs.read().get(job_id).cloned()
    }

    /// All jobs, newest first.
    pub fn jobs(&self) -> Vec<BatchJob> {
        let mut all: Vec<BatchJob> = self.jobs.read().values().cloned().collect();
        all.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        all
    }

    /// Request cancellation. In-flight samples finish; nothing new starts.
    /// Returns false for unknown or already-finished jobs.
    pub fn cancel(&self, job_id: &str) -> bool {
        let flags = self.cancel_flags.read();
        let Some(flag) = flags.get(job_id) else {
            return false;
        };
        let jobs = self.jobs.read();
        match jobs.get(job_id).map(|j| j.state) {
            Some(JobState::Queued) | Some(JobState::Running) => {
                flag.store(true, Ordering::SeqCst);
                info!("Cancellation requested for job {}", job_id);
                true
            }
            _ => false,
        }
    }

    /// Worker-pool occupancy: (in use, capacity).
    pub fn pool_usage(&self) -> (usize, usize) {
        (self.pool_size - self.pool.available_permits(), self.pool_size)
    }

    /// Jobs currently queued or running.
    pub fn active_jobs(&self) -> usize {
        self.jobs
            .read()
            .values()
            .filter(|j| matches!(j.state, JobState::Queued | JobState::Running))
            .count()
    }
}

async fn run_batch(
    jobs: Arc<RwLock<HashMap<String, BatchJob>>>,
    pool: Arc<Semaphore>,
    cancel: Arc<AtomicBool>,
    ctx: BatchContext,
    job_id: String,
    sample_ids: Vec<i64>,
) {
    {
        let mut registry = jobs.write();
        if let Some(job) = registry.get_mut(&job_id) {
            job.state = JobState::Running;
            job.started_at = Some(now_millis());
        }
    }
    info!(
        "Job {} running: {} samples for project {}",
        job_id,
        sample_ids.len(),
        ctx.policy.project_id
    );

    let fatal = Arc::new(AtomicBool::new(false));
    let worker = format!("job-{}", job_id);
    let mut handles = Vec::with_capacity(sample_ids.len());

    for sample_id in sample_ids {
        let pool = pool.clone();
        let cancel = cancel.clone();
        let fatal = fatal.clone();
        let jobs = jobs.clone();
        let ctx = ctx.clone();
        let job_id = job_id.clone();
        let worker = worker.clone();

        handles.push(tokio::spawn(async move {
            // Checked after the permit too: a cancellation while queued
            // must keep the sample from starting.
            if cancel.load(Ordering::SeqCst) || fatal.load(Ordering::SeqCst) {
                return;
            }
            let _permit = match pool.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            if cancel.load(Ordering::SeqCst) || fatal.load(Ordering::SeqCst) {
                return;
            }

            match process_sample(&ctx, sample_id, &worker).await {
                Ok(outcome) => {
                    let mut registry = jobs.write();
                    if let Some(job) = registry.get_mut(&job_id) {
                        job.outcomes.insert(sample_id, outcome);
                    }
                }
                Err(e) => {
                    // Storage trouble: abort the batch, leave samples for
                    // re-selection. Nothing is silently lost.
                    error!("Job {} sample {} aborted: {}", job_id, sample_id, e);
                    fatal.store(true, Ordering::SeqCst);
                    let mut registry = jobs.write();
                    if let Some(job) = registry.get_mut(&job_id) {
                        job.error = Some(e.to_string());
                    }
                }
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Job {} worker panicked: {}", job_id, e);
            fatal.store(true, Ordering::SeqCst);
        }
    }

    let final_state = {
        let mut registry = jobs.write();
        let job = registry.get_mut(&job_id);
        match job {
            Some(job) => {
                let failed = job
                    .outcomes
                    .values()
                    .any(|o| *o == SampleOutcome::Failed);
                job.state = if cancel.load(Ordering::SeqCst) {
                    JobState::Cancelled
                } else if fatal.load(Ordering::SeqCst) || failed {
                    JobState::PartiallyFailed
                } else {
                    JobState::Completed
                };
                job.completed_at = Some(now_millis());
                job.state
            }
            None => return,
        }
    };
    info!("Job {} finished: {:?}", job_id, final_state);

    // Refresh the project quality snapshot; reporting only, never blocks.
    if final_state != JobState::Cancelled {
        if let Err(e) = QaEngine::recompute_metrics(&ctx.store, ctx.policy.project_id, QUALITY_WINDOW)
        {
            warn!(
                "Quality metric refresh failed for project {}: {}",
                ctx.policy.project_id, e
            );
        }
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
