//! Running one job: external tools and the built-in concatenation
//!
//! Every job writes into a hidden temporary sibling of its output path and the
//! file is renamed into place only after exit status 0. A failed, killed or
//! timed-out tool therefore never replaces an existing output, and downstream
//! jobs never see a partial file.
//!
//! The job log receives a header, the tool's combined stdout and stderr, and a
//! trailer. The last line is `# exit status: N` when the tool exited normally;
//! `--skip-existing` looks for `# exit status: 0` there.

use crate::config::{ToolCommand, ToolsConfig};
use crate::job::{FailureKind, JobResult, JobSpec};
use crate::paths::temp_path_for;
use async_trait::async_trait;
use chrono::Utc;
use protdb_common::checksum::sha256_file;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Last line of a job log after a successful run
const SUCCESS_TRAILER: &str = "# exit status: 0";

/// How many trailing bytes of a log are inspected for the trailer
const TRAILER_WINDOW: u64 = 512;

/// Runs jobs on behalf of the scheduler
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Run a job to completion; failures are reported in the result
    async fn execute(&self, job: &JobSpec) -> JobResult;

    /// Result for a job whose output from an earlier run can be kept as is
    async fn reuse_existing(&self, _job: &JobSpec) -> Option<JobResult> {
        None
    }
}

/// How a tool invocation ended
#[derive(Debug)]
enum Invocation {
    /// Exit code, `None` when killed by a signal
    Exited(Option<i32>),
    TimedOut(Duration),
    /// The tool never ran, nothing of its output reached the log
    NotStarted(std::io::Error),
    Error(std::io::Error),
}

impl Invocation {
    fn started(&self) -> bool {
        !matches!(self, Invocation::NotStarted(_))
    }
}

/// Executes jobs with the configured external tools
pub struct ToolAdapter {
    tools: ToolsConfig,
    timeout: Option<Duration>,
    run_token: String,
}

impl ToolAdapter {
    pub fn new(tools: ToolsConfig) -> Self {
        let mut run_token = Uuid::new_v4().simple().to_string();
        run_token.truncate(8);

        Self {
            tools,
            timeout: None,
            run_token,
        }
    }

    /// Wall-clock budget per job; the process is killed when it is exceeded
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Spawn `command` with `args`, appending its stdout and stderr to `log_path`
    async fn invoke(&self, command: &ToolCommand, args: &[String], log_path: &Path) -> Invocation {
        let stdout = match std::fs::OpenOptions::new().append(true).open(log_path) {
            Ok(file) => file,
            Err(e) => return Invocation::NotStarted(e),
        };
        let stderr = match stdout.try_clone() {
            Ok(file) => file,
            Err(e) => return Invocation::NotStarted(e),
        };

        let mut cmd = Command::new(&command.program);
        cmd.args(args)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        // Own process group: a terminal Ctrl-C reaches protdb only, running tools finish
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %command.program, error = %e, "Failed to spawn tool");
                return Invocation::NotStarted(e);
            },
        };
        debug!(program = %command.program, pid = ?child.id(), "Tool spawned");

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(program = %command.program, timeout_secs = limit.as_secs(), "Tool timed out, killing it");
                    terminate(&mut child).await;
                    return Invocation::TimedOut(limit);
                },
            },
            None => child.wait().await,
        };

        match status {
            Ok(status) => Invocation::Exited(status.code()),
            Err(e) => Invocation::Error(e),
        }
    }

    async fn run(&self, job: &JobSpec, temp: &Path) -> std::io::Result<Invocation> {
        let mut log = File::create(&job.log_path).await?;
        let header = match self.tools.command_for(job.stage()) {
            Some(command) => command.display_line(&command.render_args(job, temp)),
            None => format!("builtin concatenate {}", display_paths(&job.inputs)),
        };
        log.write_all(
            format!(
                "# protdb job: {}\n# started: {}\n# command: {}\n",
                job.key,
                Utc::now().to_rfc3339(),
                header
            )
            .as_bytes(),
        )
        .await?;
        log.flush().await?;

        let invocation = match self.tools.command_for(job.stage()) {
            Some(command) => {
                drop(log);
                let args = command.render_args(job, temp);
                self.invoke(command, &args, &job.log_path).await
            },
            None => match concatenate(&job.inputs, temp, &mut log).await {
                Ok(()) => Invocation::Exited(Some(0)),
                Err(e) => Invocation::Error(e),
            },
        };

        Ok(invocation)
    }
}

#[async_trait]
impl JobExecutor for ToolAdapter {
    async fn execute(&self, job: &JobSpec) -> JobResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let temp = temp_path_for(&job.output_path, &format!("{}-{}", self.run_token, job.id.0));

        info!(job = %job.key, output = %job.output_path.display(), "Running job");

        let invocation = match self.run(job, &temp).await {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!(job = %job.key, log = %job.log_path.display(), error = %e, "Cannot write job log");
                discard(&temp).await;
                return JobResult::failed(
                    job,
                    FailureKind::Io {
                        message: format!("{}: {}", job.log_path.display(), e),
                    },
                    started_at,
                    clock.elapsed(),
                    false,
                );
            },
        };

        let outcome = match &invocation {
            Invocation::Exited(Some(0)) => promote(&temp, &job.output_path).await,
            Invocation::Exited(exit_code) => Err(FailureKind::ToolInvocationFailed {
                exit_code: *exit_code,
            }),
            Invocation::TimedOut(limit) => Err(FailureKind::Timeout {
                after_secs: limit.as_secs(),
            }),
            Invocation::NotStarted(e) | Invocation::Error(e) => Err(FailureKind::Io {
                message: e.to_string(),
            }),
        };

        let trailer = match (&outcome, &invocation) {
            (Ok(_), _) => SUCCESS_TRAILER.to_string(),
            (Err(_), Invocation::Exited(Some(code))) if *code != 0 => {
                format!("# exit status: {}", code)
            },
            (Err(failure), _) => format!("# failed: {}", failure),
        };
        append_trailer(&job.log_path, &trailer).await;

        match outcome {
            Ok(checksum) => {
                info!(job = %job.key, elapsed_ms = clock.elapsed().as_millis() as u64, "Job succeeded");
                JobResult::succeeded(job, started_at, clock.elapsed(), checksum)
            },
            Err(failure) => {
                discard(&temp).await;
                warn!(job = %job.key, log = %job.log_path.display(), reason = %failure, "Job failed");
                let captured = invocation.started();
                JobResult::failed(job, failure, started_at, clock.elapsed(), captured)
            },
        }
    }

    async fn reuse_existing(&self, job: &JobSpec) -> Option<JobResult> {
        let metadata = tokio::fs::metadata(&job.output_path).await.ok()?;
        if !metadata.is_file() || metadata.len() == 0 {
            return None;
        }

        if !log_records_success(&job.log_path).await {
            debug!(job = %job.key, "Output exists but its log does not record success");
            return None;
        }

        Some(JobResult::up_to_date(job, checksum(&job.output_path).await))
    }
}

/// Kill a timed out tool along with everything else in its process group
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!(pid, error = %e, "Failed to kill tool process group");
            }
        }
    }

    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill timed out tool");
    }
}

/// Move a finished temporary file to its final name
async fn promote(temp: &Path, output: &Path) -> Result<Option<String>, FailureKind> {
    match tokio::fs::metadata(temp).await {
        Ok(_) => {},
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(FailureKind::MissingOutput),
        Err(e) => {
            return Err(FailureKind::Io {
                message: e.to_string(),
            })
        },
    }

    tokio::fs::rename(temp, output)
        .await
        .map_err(|e| FailureKind::Io {
            message: format!("cannot move {} into place: {}", temp.display(), e),
        })?;

    Ok(checksum(output).await)
}

async fn checksum(path: &Path) -> Option<String> {
    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || sha256_file(owned)).await {
        Ok(Ok(digest)) => Some(digest),
        Ok(Err(e)) => {
            warn!(path = %path.display(), error = %e, "Failed to checksum output");
            None
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Checksum task failed");
            None
        },
    }
}

async fn discard(temp: &Path) {
    match tokio::fs::remove_file(temp).await {
        Ok(()) => debug!(path = %temp.display(), "Removed partial output"),
        Err(e) if e.kind() == ErrorKind::NotFound => {},
        Err(e) => warn!(path = %temp.display(), error = %e, "Failed to remove partial output"),
    }
}

async fn append_trailer(log_path: &Path, trailer: &str) {
    let finished = format!("# finished: {}\n{}\n", Utc::now().to_rfc3339(), trailer);
    let result = async {
        let mut log = OpenOptions::new().append(true).open(log_path).await?;
        log.write_all(finished.as_bytes()).await?;
        log.flush().await
    }
    .await;

    if let Err(e) = result {
        warn!(log = %log_path.display(), error = %e, "Failed to write log trailer");
    }
}

/// Whether the last line of a job log is the success trailer
async fn log_records_success(log_path: &Path) -> bool {
    let tail = async {
        let mut file = File::open(log_path).await?;
        let len = file.metadata().await?.len();
        file.seek(SeekFrom::Start(len.saturating_sub(TRAILER_WINDOW)))
            .await?;
        let mut tail = Vec::new();
        file.read_to_end(&mut tail).await?;
        Ok::<_, std::io::Error>(String::from_utf8_lossy(&tail).into_owned())
    }
    .await;

    match tail {
        Ok(tail) => tail
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .is_some_and(|line| line.trim() == SUCCESS_TRAILER),
        Err(_) => false,
    }
}

/// Append `inputs` to `dest`, ensuring each one ends with a newline
async fn concatenate(inputs: &[PathBuf], dest: &Path, log: &mut File) -> std::io::Result<()> {
    let mut out = File::create(dest).await?;

    for input in inputs {
        let mut src = File::open(input).await?;
        let copied = tokio::io::copy(&mut src, &mut out).await?;

        if copied > 0 {
            src.seek(SeekFrom::End(-1)).await?;
            let mut last = [0u8; 1];
            src.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                out.write_all(b"\n").await?;
            }
        }

        log.write_all(format!("appended {} ({} bytes)\n", input.display(), copied).as_bytes())
            .await?;
    }

    out.flush().await?;
    out.sync_all().await?;
    log.flush().await?;
    Ok(())
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::job::{JobId, JobKey, JobStatus};
    use crate::paths::PathResolver;
    use protdb_common::types::{DateTag, Species, Stage, Variant};
    use tempfile::TempDir;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("sh", ["-c", script, "tool", "{output}", "{input}"])
    }

    fn tools(fasta: ToolCommand) -> ToolsConfig {
        ToolsConfig {
            fasta,
            ..ToolsConfig::default()
        }
    }

    fn setup() -> (TempDir, JobSpec) {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(dir.path().join("out"), dir.path().join("logs"));
        let tag: DateTag = "202401".parse().unwrap();
        let job = JobSpec::new(
            JobId(0),
            JobKey::new(Species::Human, Some(Variant::ProSw), Stage::Fasta),
            &tag,
            &resolver,
        )
        .unwrap();
        std::fs::create_dir_all(resolver.output_dir(&tag)).unwrap();
        std::fs::create_dir_all(resolver.log_dir(&tag)).unwrap();
        (dir, job)
    }

    fn leftover_temp_files(job: &JobSpec) -> usize {
        std::fs::read_dir(job.output_path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[tokio::test]
    async fn test_success_promotes_output_and_logs_output() {
        let (_dir, job) = setup();
        let adapter = ToolAdapter::new(tools(sh(
            "echo building; echo oops >&2; printf '>P1\\nMKV\\n' > \"$1\"",
        )));

        let result = adapter.execute(&job).await;

        assert_eq!(result.status, JobStatus::Succeeded);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stderr_captured);
        assert_eq!(std::fs::read_to_string(&job.output_path).unwrap(), ">P1\nMKV\n");
        assert_eq!(result.checksum.as_deref().map(str::len), Some(64));

        let log = std::fs::read_to_string(&job.log_path).unwrap();
        assert!(log.contains("# protdb job: fasta(human, pro-sw)"));
        assert!(log.contains("building"));
        assert!(log.contains("oops"));
        assert!(log.trim_end().ends_with(SUCCESS_TRAILER));
        assert_eq!(leftover_temp_files(&job), 0);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_output() {
        let (_dir, job) = setup();
        std::fs::write(&job.output_path, "previous\n").unwrap();
        let adapter = ToolAdapter::new(tools(sh("echo partial > \"$1\"; exit 3")));

        let result = adapter.execute(&job).await;

        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(
            result.failure,
            Some(FailureKind::ToolInvocationFailed { exit_code: Some(3) })
        );
        assert_eq!(std::fs::read_to_string(&job.output_path).unwrap(), "previous\n");
        assert_eq!(leftover_temp_files(&job), 0);
        let log = std::fs::read_to_string(&job.log_path).unwrap();
        assert!(log.trim_end().ends_with("# exit status: 3"));
    }

    #[tokio::test]
    async fn test_missing_output_fails() {
        let (_dir, job) = setup();
        let adapter = ToolAdapter::new(tools(sh("exit 0")));

        let result = adapter.execute(&job).await;

        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(result.failure, Some(FailureKind::MissingOutput));
        assert!(!job.output_path.exists());
        let log = std::fs::read_to_string(&job.log_path).unwrap();
        assert!(!log.trim_end().ends_with(SUCCESS_TRAILER));
    }

    #[tokio::test]
    async fn test_timeout_kills_tool() {
        let (_dir, job) = setup();
        let adapter = ToolAdapter::new(tools(sh("echo started > \"$1\"; sleep 30")))
            .with_timeout(Some(Duration::from_millis(200)));

        let clock = std::time::Instant::now();
        let result = adapter.execute(&job).await;

        assert!(clock.elapsed() < Duration::from_secs(10));
        assert_eq!(result.status, JobStatus::Failed);
        assert!(matches!(result.failure, Some(FailureKind::Timeout { .. })));
        assert!(!job.output_path.exists());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_io() {
        let (_dir, job) = setup();
        let adapter = ToolAdapter::new(tools(ToolCommand::new(
            "/nonexistent/protdb-tool",
            ["{output}"],
        )));

        let result = adapter.execute(&job).await;

        assert_eq!(result.status, JobStatus::Failed);
        assert!(matches!(result.failure, Some(FailureKind::Io { .. })));
        assert!(!result.stderr_captured);
        let log = std::fs::read_to_string(&job.log_path).unwrap();
        assert!(log.trim_end().lines().last().unwrap().starts_with("# failed:"));
    }

    #[tokio::test]
    async fn test_tool_failure_reports_captured_output() {
        let (_dir, job) = setup();
        let adapter = ToolAdapter::new(tools(sh("echo broken >&2; exit 1")));

        let result = adapter.execute(&job).await;

        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.stderr_captured);
    }

    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let (dir, job) = setup();
        let marker = dir.path().join("late");
        let script = format!(
            "(sleep 1; touch '{}') & sleep 30",
            marker.display()
        );
        let adapter = ToolAdapter::new(tools(sh(&script)))
            .with_timeout(Some(Duration::from_millis(200)));

        let result = adapter.execute(&job).await;
        assert!(matches!(result.failure, Some(FailureKind::Timeout { .. })));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_builtin_concatenation() {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(dir.path().join("out"), dir.path().join("logs"));
        let tag: DateTag = "202401".parse().unwrap();
        std::fs::create_dir_all(resolver.output_dir(&tag)).unwrap();
        std::fs::create_dir_all(resolver.log_dir(&tag)).unwrap();

        let key = |stage| JobKey::new(Species::Human, Some(Variant::ProSw), stage);
        let fasta = JobSpec::new(JobId(0), key(Stage::Fasta), &tag, &resolver).unwrap();
        let decoy = JobSpec::new(JobId(1), key(Stage::Decoy), &tag, &resolver)
            .unwrap()
            .depend_on(&fasta);
        let target_decoy = JobSpec::new(JobId(2), key(Stage::TargetDecoy), &tag, &resolver)
            .unwrap()
            .depend_on(&fasta)
            .depend_on(&decoy);

        std::fs::write(&fasta.output_path, ">T1\nMKV").unwrap();
        std::fs::write(&decoy.output_path, ">DECOY_T1\nVKM\n").unwrap();

        let adapter = ToolAdapter::new(ToolsConfig::default());
        let result = adapter.execute(&target_decoy).await;

        assert_eq!(result.status, JobStatus::Succeeded);
        assert_eq!(
            std::fs::read_to_string(&target_decoy.output_path).unwrap(),
            ">T1\nMKV\n>DECOY_T1\nVKM\n"
        );
    }

    #[tokio::test]
    async fn test_builtin_concatenation_missing_input() {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(dir.path().join("out"), dir.path().join("logs"));
        let tag: DateTag = "202401".parse().unwrap();
        std::fs::create_dir_all(resolver.output_dir(&tag)).unwrap();
        std::fs::create_dir_all(resolver.log_dir(&tag)).unwrap();

        let key = |stage| JobKey::new(Species::Rat, Some(Variant::UniSw), stage);
        let fasta = JobSpec::new(JobId(0), key(Stage::Fasta), &tag, &resolver).unwrap();
        let target_decoy = JobSpec::new(JobId(2), key(Stage::TargetDecoy), &tag, &resolver)
            .unwrap()
            .depend_on(&fasta);

        let result = ToolAdapter::new(ToolsConfig::default())
            .execute(&target_decoy)
            .await;

        assert_eq!(result.status, JobStatus::Failed);
        assert!(!target_decoy.output_path.exists());
        assert_eq!(leftover_temp_files(&target_decoy), 0);
    }

    #[tokio::test]
    async fn test_reuse_existing_requires_success_trailer() {
        let (_dir, job) = setup();
        let adapter = ToolAdapter::new(tools(sh("echo '>P1' > \"$1\"")));

        assert!(adapter.reuse_existing(&job).await.is_none());

        adapter.execute(&job).await;
        let reused = adapter.reuse_existing(&job).await.unwrap();
        assert_eq!(reused.status, JobStatus::UpToDate);
        assert!(reused.checksum.is_some());

        std::fs::write(&job.log_path, "# exit status: 1\n").unwrap();
        assert!(adapter.reuse_existing(&job).await.is_none());
    }

    #[tokio::test]
    async fn test_reuse_existing_rejects_empty_output() {
        let (_dir, job) = setup();
        std::fs::write(&job.output_path, "").unwrap();
        std::fs::write(&job.log_path, format!("{}\n", SUCCESS_TRAILER)).unwrap();

        let adapter = ToolAdapter::new(ToolsConfig::default());
        assert!(adapter.reuse_existing(&job).await.is_none());
    }
}
