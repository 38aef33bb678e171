//! Run report
//!
//! Aggregates the scheduler's results into the final table printed to the
//! user and the `run-report.json` file kept next to the job logs.

use crate::job::{JobResult, JobStatus};
use crate::paths::temp_path_for;
use crate::scheduler::ScheduleOutcome;
use chrono::{DateTime, Utc};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use protdb_common::types::DateTag;
use protdb_common::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// File name of the persisted report inside the run's log directory
pub const REPORT_FILE_NAME: &str = "run-report.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Succeeded,
    Failed,
}

impl OverallStatus {
    pub fn as_str(&self) -> &str {
        match self {
            OverallStatus::Succeeded => "succeeded",
            OverallStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Number of jobs per terminal state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub succeeded: usize,
    pub up_to_date: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.succeeded + self.up_to_date + self.failed + self.skipped
    }
}

/// Summary of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub date_tag: DateTag,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub overall_status: OverallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub cancelled: bool,
    pub counts: StatusCounts,
    /// Ordered by species, variant, stage
    pub jobs: Vec<JobResult>,
}

impl RunReport {
    /// Build the report for a finished run
    ///
    /// The run failed if any job failed or was skipped, including skips
    /// caused by cancellation or an aborted start.
    pub fn summarize(date_tag: &DateTag, outcome: ScheduleOutcome) -> Self {
        let mut jobs = outcome.results;
        jobs.sort_by_key(|result| result.key);

        let mut counts = StatusCounts::default();
        for job in &jobs {
            match job.status {
                JobStatus::Succeeded => counts.succeeded += 1,
                JobStatus::UpToDate => counts.up_to_date += 1,
                JobStatus::Failed => counts.failed += 1,
                // non-terminal states never reach the report, count them as skipped
                JobStatus::Skipped | JobStatus::Pending | JobStatus::Ready | JobStatus::Running => {
                    counts.skipped += 1
                },
            }
        }

        let all_succeeded = jobs.iter().all(|job| job.status.is_success());
        let overall_status = if all_succeeded && outcome.aborted.is_none() && !outcome.cancelled {
            OverallStatus::Succeeded
        } else {
            OverallStatus::Failed
        };

        Self {
            run_id: Uuid::new_v4(),
            date_tag: date_tag.clone(),
            started_at: outcome.started_at,
            finished_at: Utc::now(),
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            overall_status,
            aborted: outcome.aborted,
            cancelled: outcome.cancelled,
            counts,
            jobs,
        }
    }

    /// Process exit code: 0 iff the run succeeded
    pub fn exit_code(&self) -> i32 {
        match self.overall_status {
            OverallStatus::Succeeded => 0,
            OverallStatus::Failed => 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.overall_status == OverallStatus::Succeeded
    }

    /// Per-job table keyed by species, variant and stage
    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                "Species", "Variant", "Stage", "Status", "Exit", "Duration", "Detail",
            ]);

        for job in &self.jobs {
            table.add_row(vec![
                job.key.species.to_string(),
                job.key.variant.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
                job.key.stage.to_string(),
                job.status.to_string(),
                job.exit_code
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                format_duration(job.duration_ms),
                row_detail(job),
            ]);
        }

        table.to_string()
    }

    /// One-line summary, e.g. `failed: 3 succeeded, 1 failed, 2 skipped in 4.2s`
    pub fn summary_line(&self) -> String {
        let mut parts = vec![format!("{} succeeded", self.counts.succeeded)];
        if self.counts.up_to_date > 0 {
            parts.push(format!("{} up-to-date", self.counts.up_to_date));
        }
        parts.push(format!("{} failed", self.counts.failed));
        parts.push(format!("{} skipped", self.counts.skipped));

        let mut line = format!(
            "{}: {} in {}",
            self.overall_status,
            parts.join(", "),
            format_duration(self.elapsed_ms)
        );
        if self.cancelled {
            line.push_str(" (cancelled)");
        }
        if let Some(reason) = &self.aborted {
            line.push_str(&format!(" (aborted: {})", reason));
        }
        line
    }

    /// Write `run-report.json` into `dir` atomically, returning its path
    pub fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE_NAME);
        let temp = temp_path_for(&path, &self.run_id.simple().to_string());

        let json = serde_json::to_vec_pretty(self)?;
        if let Err(e) = std::fs::write(&temp, &json).and_then(|_| std::fs::rename(&temp, &path)) {
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }

        debug!(bytes = json.len(), "Report serialized");
        info!(path = %path.display(), "Run report written");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        Ok(serde_json::from_slice(&content)?)
    }
}

fn row_detail(job: &JobResult) -> String {
    match job.detail() {
        Some(detail) if job.status == JobStatus::Failed => {
            format!("{} (see {})", detail, job.log_path.display())
        },
        Some(detail) => detail,
        None => job
            .output_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

fn format_duration(ms: u64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1_000)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::job::{FailureKind, JobId, JobKey, JobSpec, SkipReason};
    use crate::paths::PathResolver;
    use protdb_common::types::{Species, Stage, Variant};
    use std::time::Duration;
    use tempfile::TempDir;

    fn tag() -> DateTag {
        "202401".parse().unwrap()
    }

    fn spec(id: usize, species: Species, variant: Option<Variant>, stage: Stage) -> JobSpec {
        let resolver = PathResolver::new("/out", "/logs");
        JobSpec::new(JobId(id), JobKey::new(species, variant, stage), &tag(), &resolver).unwrap()
    }

    fn outcome(results: Vec<JobResult>) -> ScheduleOutcome {
        ScheduleOutcome {
            results,
            started_at: Utc::now(),
            elapsed: Duration::from_millis(1500),
            aborted: None,
            cancelled: false,
        }
    }

    fn fasta_chain() -> (JobSpec, JobSpec, JobSpec) {
        (
            spec(0, Species::Human, Some(Variant::ProSw), Stage::Fasta),
            spec(1, Species::Human, Some(Variant::ProSw), Stage::Decoy),
            spec(2, Species::Human, Some(Variant::ProSw), Stage::TargetDecoy),
        )
    }

    #[test]
    fn test_all_succeeded() {
        let (fasta, decoy, target_decoy) = fasta_chain();
        let results = [fasta, decoy]
            .iter()
            .map(|job| JobResult::succeeded(job, Utc::now(), Duration::from_millis(10), None))
            .chain([JobResult::up_to_date(&target_decoy, None)])
            .collect();

        let report = RunReport::summarize(&tag(), outcome(results));

        assert_eq!(report.overall_status, OverallStatus::Succeeded);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.counts.succeeded, 2);
        assert_eq!(report.counts.up_to_date, 1);
        assert_eq!(report.counts.total(), 3);
    }

    #[test]
    fn test_failure_and_skips_fail_the_run() {
        let (fasta, decoy, target_decoy) = fasta_chain();
        let skip = SkipReason::DependencyFailed { dependency: fasta.key };
        let results = vec![
            JobResult::skipped(&target_decoy, skip.clone()),
            JobResult::failed(
                &fasta,
                FailureKind::ToolInvocationFailed { exit_code: Some(2) },
                Utc::now(),
                Duration::from_secs(3),
                true,
            ),
            JobResult::skipped(&decoy, skip),
        ];

        let report = RunReport::summarize(&tag(), outcome(results));

        assert_eq!(report.overall_status, OverallStatus::Failed);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.counts.failed, 1);
        assert_eq!(report.counts.skipped, 2);
        let stages: Vec<Stage> = report.jobs.iter().map(|j| j.key.stage).collect();
        assert_eq!(stages, vec![Stage::Fasta, Stage::Decoy, Stage::TargetDecoy]);
    }

    #[test]
    fn test_skip_alone_fails_the_run() {
        let job = spec(0, Species::Rat, None, Stage::Categories);
        let report = RunReport::summarize(
            &tag(),
            outcome(vec![JobResult::skipped(&job, SkipReason::Cancelled)]),
        );
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_cancelled_run_fails() {
        let job = spec(0, Species::Rat, None, Stage::Categories);
        let mut outcome = outcome(vec![JobResult::succeeded(
            &job,
            Utc::now(),
            Duration::ZERO,
            None,
        )]);
        outcome.cancelled = true;

        let report = RunReport::summarize(&tag(), outcome);
        assert_eq!(report.overall_status, OverallStatus::Failed);
        assert!(report.summary_line().ends_with("(cancelled)"));
    }

    #[test]
    fn test_table_lists_every_job() {
        let (fasta, decoy, _) = fasta_chain();
        let categories = spec(3, Species::Human, None, Stage::Categories);
        let results = vec![
            JobResult::succeeded(&fasta, Utc::now(), Duration::from_millis(250), None),
            JobResult::failed(
                &decoy,
                FailureKind::Timeout { after_secs: 30 },
                Utc::now(),
                Duration::from_secs(30),
                true,
            ),
            JobResult::succeeded(&categories, Utc::now(), Duration::from_secs(90), None),
        ];

        let table = RunReport::summarize(&tag(), outcome(results)).render_table();

        assert!(table.contains("pro-sw"));
        assert!(table.contains("timed out after 30s"));
        assert!(table.contains("decoy.human-pro-sw.log"));
        assert!(table.contains("human_202401.categories.tsv"));
        assert!(table.contains("250ms"));
        assert!(table.contains("1m30s"));
    }

    #[test]
    fn test_summary_line() {
        let job = spec(0, Species::Pig, None, Stage::Categories);
        let report = RunReport::summarize(
            &tag(),
            outcome(vec![JobResult::succeeded(&job, Utc::now(), Duration::ZERO, None)]),
        );
        assert_eq!(
            report.summary_line(),
            "succeeded: 1 succeeded, 0 failed, 0 skipped in 1.5s"
        );
    }

    #[test]
    fn test_write_json_is_atomic_and_loadable() {
        let dir = TempDir::new().unwrap();
        let (fasta, _, _) = fasta_chain();
        let report = RunReport::summarize(
            &tag(),
            outcome(vec![JobResult::succeeded(
                &fasta,
                Utc::now(),
                Duration::from_millis(5),
                Some("ab".repeat(32)),
            )]),
        );

        let path = report.write_json(&dir.path().join("202401")).unwrap();

        assert_eq!(path.file_name().unwrap(), REPORT_FILE_NAME);
        let loaded = RunReport::load(&path).unwrap();
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.jobs[0].checksum, Some("ab".repeat(32)));

        let leftovers = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".tmp")
            })
            .count();
        assert_eq!(leftovers, 0);

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["overall_status"], "succeeded");
        assert_eq!(json["date_tag"], "202401");
    }
}
