//! protdb pipeline engine
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Builds the species × variant job graph for one date tag, runs it with a
//! bounded number of external tools in flight and summarizes the outcome.
//!
//! # Architecture
//!
//! ```text
//! PathResolver ──► JobGraph ──► Scheduler ──► ToolAdapter (one subprocess per job)
//!                                   │
//!                                   └──► RunReport (table + run-report.json)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use protdb_common::types::{DateTag, Species, Variant};
//! use protdb_pipeline::{
//!     Grid, JobGraph, PathResolver, PipelineConfig, RunReport, Scheduler, SchedulerConfig,
//!     ToolAdapter,
//! };
//!
//! # async fn example() -> protdb_common::Result<()> {
//! let tag: DateTag = "202401".parse()?;
//! let resolver = PathResolver::new("dbs", "logs");
//! let graph = JobGraph::build(&[Species::Human], &[Variant::ProSw], &tag, &resolver, Grid::All)?;
//!
//! let adapter = ToolAdapter::new(PipelineConfig::discover(None)?.tools);
//! let outcome = Scheduler::new(adapter, SchedulerConfig::default()).run(&graph).await;
//!
//! let report = RunReport::summarize(&tag, outcome);
//! println!("{}", report.render_table());
//! report.write_json(&resolver.log_dir(&tag))?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod graph;
pub mod job;
pub mod paths;
pub mod report;
pub mod scheduler;
pub mod tool;

pub use config::{PipelineConfig, ToolCommand, ToolsConfig};
pub use graph::{Grid, JobGraph};
pub use job::{FailureKind, JobId, JobKey, JobResult, JobSpec, JobStatus, SkipReason};
pub use paths::PathResolver;
pub use report::{OverallStatus, RunReport};
pub use scheduler::{ScheduleOutcome, Scheduler, SchedulerConfig};
pub use tool::{JobExecutor, ToolAdapter};
