//! Job descriptions and job outcomes

use crate::paths::PathResolver;
use chrono::{DateTime, Utc};
use protdb_common::types::{DateTag, Species, Stage, Variant};
use protdb_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Index of a job inside its [`JobGraph`](crate::graph::JobGraph)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a job: what it produces, independent of where
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub species: Species,
    pub variant: Option<Variant>,
    pub stage: Stage,
}

impl JobKey {
    pub fn new(species: Species, variant: Option<Variant>, stage: Stage) -> Self {
        Self {
            species,
            variant,
            stage,
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant {
            Some(variant) => write!(f, "{}({}, {})", self.stage, self.species, variant),
            None => write!(f, "{}({})", self.stage, self.species),
        }
    }
}

/// One unit of work, fixed when the graph is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: JobId,
    pub key: JobKey,
    pub date_tag: DateTag,
    pub output_path: PathBuf,
    pub log_path: PathBuf,
    /// Outputs of upstream jobs this job reads, in dependency order
    pub inputs: Vec<PathBuf>,
    pub depends_on: BTreeSet<JobId>,
}

impl JobSpec {
    /// Resolve the paths of a job with no dependencies yet
    pub fn new(id: JobId, key: JobKey, date_tag: &DateTag, resolver: &PathResolver) -> Result<Self> {
        Ok(Self {
            id,
            key,
            date_tag: date_tag.clone(),
            output_path: resolver.resolve(key.species, key.variant, key.stage, date_tag)?,
            log_path: resolver.resolve_log(key.species, key.variant, key.stage, date_tag)?,
            inputs: Vec::new(),
            depends_on: BTreeSet::new(),
        })
    }

    /// Add an upstream job whose output this job consumes
    pub fn depend_on(mut self, upstream: &JobSpec) -> Self {
        self.depends_on.insert(upstream.id);
        self.inputs.push(upstream.output_path.clone());
        self
    }

    pub fn species(&self) -> Species {
        self.key.species
    }

    pub fn variant(&self) -> Option<Variant> {
        self.key.variant
    }

    pub fn stage(&self) -> Stage {
        self.key.stage
    }
}

/// Lifecycle of a job inside one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
    /// Output from an earlier run with the same date tag was reused
    UpToDate,
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Ready => "ready",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
            JobStatus::UpToDate => "up-to-date",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Skipped | JobStatus::UpToDate
        )
    }

    /// Terminal and usable by dependents
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::UpToDate)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a job that ran did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// Non-zero exit, or death by signal when `exit_code` is `None`
    ToolInvocationFailed { exit_code: Option<i32> },
    /// Killed after exceeding its wall-clock budget
    Timeout { after_secs: u64 },
    /// Exited 0 without writing its output
    MissingOutput,
    Io { message: String },
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ToolInvocationFailed { exit_code: Some(code) } => {
                write!(f, "tool exited with status {}", code)
            },
            FailureKind::ToolInvocationFailed { exit_code: None } => {
                write!(f, "tool terminated by signal")
            },
            FailureKind::Timeout { after_secs } => write!(f, "timed out after {}s", after_secs),
            FailureKind::MissingOutput => write!(f, "tool exited 0 but wrote no output"),
            FailureKind::Io { message } => write!(f, "I/O error: {}", message),
        }
    }
}

/// Why a job never ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    DependencyFailed { dependency: JobKey },
    Cancelled,
    Aborted { message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DependencyFailed { dependency } => {
                write!(f, "dependency {} did not succeed", dependency)
            },
            SkipReason::Cancelled => write!(f, "run cancelled"),
            SkipReason::Aborted { message } => write!(f, "run aborted: {}", message),
        }
    }
}

/// Terminal record of one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub key: JobKey,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub output_path: PathBuf,
    pub log_path: PathBuf,
    /// Whether the tool's stdout and stderr went to `log_path`
    pub stderr_captured: bool,
    /// SHA-256 of the promoted output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl JobResult {
    /// Result of a job that finished with exit status 0
    pub fn succeeded(
        job: &JobSpec,
        started_at: DateTime<Utc>,
        duration: Duration,
        checksum: Option<String>,
    ) -> Self {
        Self {
            status: JobStatus::Succeeded,
            exit_code: Some(0),
            started_at: Some(started_at),
            duration_ms: duration.as_millis() as u64,
            stderr_captured: true,
            checksum,
            ..Self::base(job)
        }
    }

    /// Result of a job that ran and failed
    pub fn failed(
        job: &JobSpec,
        failure: FailureKind,
        started_at: DateTime<Utc>,
        duration: Duration,
        stderr_captured: bool,
    ) -> Self {
        let exit_code = match failure {
            FailureKind::ToolInvocationFailed { exit_code } => exit_code,
            FailureKind::MissingOutput => Some(0),
            _ => None,
        };

        Self {
            status: JobStatus::Failed,
            exit_code,
            failure: Some(failure),
            started_at: Some(started_at),
            duration_ms: duration.as_millis() as u64,
            stderr_captured,
            ..Self::base(job)
        }
    }

    pub fn skipped(job: &JobSpec, reason: SkipReason) -> Self {
        Self {
            status: JobStatus::Skipped,
            skip_reason: Some(reason),
            ..Self::base(job)
        }
    }

    pub fn up_to_date(job: &JobSpec, checksum: Option<String>) -> Self {
        Self {
            status: JobStatus::UpToDate,
            exit_code: Some(0),
            checksum,
            ..Self::base(job)
        }
    }

    fn base(job: &JobSpec) -> Self {
        Self {
            job_id: job.id,
            key: job.key,
            status: JobStatus::Pending,
            exit_code: None,
            failure: None,
            skip_reason: None,
            started_at: None,
            finished_at: Utc::now(),
            duration_ms: 0,
            output_path: job.output_path.clone(),
            log_path: job.log_path.clone(),
            stderr_captured: false,
            checksum: None,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Short human-readable explanation for non-successful results
    pub fn detail(&self) -> Option<String> {
        self.failure
            .as_ref()
            .map(ToString::to_string)
            .or_else(|| self.skip_reason.as_ref().map(ToString::to_string))
    }
}
