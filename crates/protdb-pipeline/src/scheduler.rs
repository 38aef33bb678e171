//! Dependency-aware job scheduler
//!
//! Walks a [`JobGraph`] with a bounded number of jobs in flight. A job becomes
//! ready once every dependency succeeded; if a dependency fails or is skipped,
//! all of its descendants are skipped without running. Results flow back to
//! the scheduler loop through a [`JoinSet`], which is the only place job state
//! is mutated.

use crate::graph::JobGraph;
use crate::job::{FailureKind, JobId, JobResult, JobSpec, JobStatus, SkipReason};
use crate::tool::JobExecutor;
use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Default number of jobs in flight
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of jobs running at once
    pub concurrency: usize,
    /// Reuse outputs an earlier run with the same date tag completed
    pub skip_existing: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            skip_existing: false,
        }
    }
}

/// Everything the scheduler observed during one run
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    /// One terminal result per job, indexed by job id
    pub results: Vec<JobResult>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Set when the run could not start, e.g. its directories are not writable
    pub aborted: Option<String>,
    pub cancelled: bool,
}

/// Per-run bookkeeping, owned by the scheduler loop
struct RunState {
    status: Vec<JobStatus>,
    unmet: Vec<usize>,
    reused: Vec<bool>,
    results: Vec<Option<JobResult>>,
}

impl RunState {
    fn new(graph: &JobGraph) -> Self {
        Self {
            status: vec![JobStatus::Pending; graph.len()],
            unmet: graph.jobs().iter().map(|job| job.depends_on.len()).collect(),
            reused: vec![false; graph.len()],
            results: vec![None; graph.len()],
        }
    }

    fn is_finished(&self, id: JobId) -> bool {
        self.results[id.0].is_some()
    }
}

pub struct Scheduler<E> {
    executor: Arc<E>,
    config: SchedulerConfig,
    cancel: CancellationToken,
    progress: ProgressBar,
}

impl<E: JobExecutor + 'static> Scheduler<E> {
    pub fn new(executor: E, config: SchedulerConfig) -> Self {
        Self {
            executor: Arc::new(executor),
            config,
            cancel: CancellationToken::new(),
            progress: ProgressBar::hidden(),
        }
    }

    /// Use an externally owned token, e.g. one tied to Ctrl-C
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Advance `progress` by one for every finished job
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every job of `graph` to a terminal state
    pub async fn run(&self, graph: &JobGraph) -> ScheduleOutcome {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut state = RunState::new(graph);
        let limit = self.config.concurrency.max(1);

        info!(
            jobs = graph.len(),
            concurrency = limit,
            skip_existing = self.config.skip_existing,
            "Starting run"
        );

        if let Err(message) = create_directories(graph.directories()).await {
            error!(error = %message, "Cannot prepare run directories, aborting");
            for job in graph.jobs() {
                self.finish(
                    &mut state,
                    JobResult::skipped(job, SkipReason::Aborted {
                        message: message.clone(),
                    }),
                );
            }
            return self.outcome(graph, state, started_at, clock, Some(message), false);
        }

        self.progress.set_length(graph.len() as u64);

        let mut ready: VecDeque<JobId> = VecDeque::new();
        for &id in graph.topological_order() {
            if state.unmet[id.0] == 0 {
                state.status[id.0] = JobStatus::Ready;
                ready.push_back(id);
            }
        }

        let mut running: JoinSet<JobResult> = JoinSet::new();
        let mut cancelled = false;

        loop {
            if !cancelled && self.cancel.is_cancelled() {
                cancelled = true;
                self.cancel_waiting(graph, &mut state, &mut ready);
            }

            while !cancelled && running.len() < limit {
                let Some(id) = ready.pop_front() else {
                    break;
                };
                let job = graph.job(id);

                if let Some(result) = self.try_reuse(job, &state).await {
                    state.reused[id.0] = true;
                    self.complete(graph, &mut state, &mut ready, result);
                    continue;
                }

                debug!(job = %job.key, running = running.len() + 1, "Dispatching job");
                state.status[id.0] = JobStatus::Running;
                running.spawn(run_job(Arc::clone(&self.executor), job.clone()));
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    warn!(running = running.len(), "Run cancelled, waiting for running jobs");
                    self.cancel_waiting(graph, &mut state, &mut ready);
                }
                joined = running.join_next() => match joined {
                    Some(Ok(result)) => self.complete(graph, &mut state, &mut ready, result),
                    Some(Err(e)) => error!(error = %e, "Job task failed"),
                    None => {},
                },
            }
        }

        self.outcome(graph, state, started_at, clock, None, cancelled)
    }

    async fn try_reuse(&self, job: &JobSpec, state: &RunState) -> Option<JobResult> {
        if !self.config.skip_existing {
            return None;
        }

        // A dependency that re-ran may have changed this job's inputs
        if !job.depends_on.iter().all(|dep| state.reused[dep.0]) {
            return None;
        }

        let result = self.executor.reuse_existing(job).await?;
        info!(job = %job.key, output = %job.output_path.display(), "Reusing existing output");
        Some(result)
    }

    /// Record a finished job and update its dependents
    fn complete(
        &self,
        graph: &JobGraph,
        state: &mut RunState,
        ready: &mut VecDeque<JobId>,
        result: JobResult,
    ) {
        let id = result.job_id;
        let succeeded = result.status.is_success();
        self.finish(state, result);

        if succeeded {
            for &dependent in graph.dependents(id) {
                state.unmet[dependent.0] -= 1;
                if state.unmet[dependent.0] == 0 && !state.is_finished(dependent) {
                    state.status[dependent.0] = JobStatus::Ready;
                    ready.push_back(dependent);
                }
            }
            return;
        }

        let failed = graph.job(id).key;
        let mut descendants: VecDeque<JobId> = graph.dependents(id).iter().copied().collect();
        while let Some(dependent) = descendants.pop_front() {
            if state.is_finished(dependent) {
                continue;
            }
            let job = graph.job(dependent);
            info!(job = %job.key, dependency = %failed, "Skipping job");
            self.finish(
                state,
                JobResult::skipped(job, SkipReason::DependencyFailed { dependency: failed }),
            );
            descendants.extend(graph.dependents(dependent));
        }
    }

    /// Skip every job that has not started
    fn cancel_waiting(&self, graph: &JobGraph, state: &mut RunState, ready: &mut VecDeque<JobId>) {
        ready.clear();
        for job in graph.jobs() {
            if matches!(state.status[job.id.0], JobStatus::Pending | JobStatus::Ready) {
                self.finish(state, JobResult::skipped(job, SkipReason::Cancelled));
            }
        }
    }

    fn finish(&self, state: &mut RunState, result: JobResult) {
        let id = result.job_id;
        state.status[id.0] = result.status;
        self.progress.set_message(result.key.to_string());
        self.progress.inc(1);
        state.results[id.0] = Some(result);
    }

    fn outcome(
        &self,
        graph: &JobGraph,
        state: RunState,
        started_at: DateTime<Utc>,
        clock: Instant,
        aborted: Option<String>,
        cancelled: bool,
    ) -> ScheduleOutcome {
        let results = state
            .results
            .into_iter()
            .zip(graph.jobs())
            .map(|(result, job)| {
                result.unwrap_or_else(|| {
                    warn!(job = %job.key, "Job has no result, recording it as failed");
                    JobResult::failed(
                        job,
                        FailureKind::Io {
                            message: "job task was lost".to_string(),
                        },
                        started_at,
                        Duration::ZERO,
                        false,
                    )
                })
            })
            .collect();

        self.progress.finish_and_clear();

        ScheduleOutcome {
            results,
            started_at,
            elapsed: clock.elapsed(),
            aborted,
            cancelled,
        }
    }
}

/// Run one job on its own task so a panicking executor fails only that job
async fn run_job<E: JobExecutor + 'static>(executor: Arc<E>, job: JobSpec) -> JobResult {
    let started_at = Utc::now();
    let span = info_span!("job", id = job.id.0, job = %job.key);

    let task = {
        let job = job.clone();
        tokio::spawn(async move { executor.execute(&job).await }.instrument(span))
    };

    match task.await {
        Ok(result) => result,
        Err(e) => {
            error!(job = %job.key, error = %e, "Job executor panicked");
            JobResult::failed(
                &job,
                FailureKind::Io {
                    message: format!("executor task failed: {}", e),
                },
                started_at,
                Duration::ZERO,
                false,
            )
        },
    }
}

async fn create_directories(dirs: Vec<PathBuf>) -> Result<(), String> {
    for dir in dirs {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| format!("cannot create {}: {}", dir.display(), e))?;
        debug!(dir = %dir.display(), "Run directory ready");
    }
    Ok(())
}
