//! Runs the four ETL stages as a task graph with fail-fast semantics.
//!
//! A run moves `Pending -> Extracting -> Transforming -> Loading ->
//! Aggregating -> Succeeded`. The first stage error moves it to
//! `Failed { stage, cause }`; every task downstream of the failure is recorded
//! as skipped and never executed. Rows already appended stay in the warehouse.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use super::aggregate::{trigger_aggregation, AggregationRunner};
use super::extract::extract;
use super::graph::{TaskGraph, TaskStatus};
use super::load::load;
use super::transform::transform;
use crate::constants::{DEFAULT_DELIMITER, DEFAULT_TABLE};
use crate::error::{ErrorKind, GraphError, PipelineError, StageError};
use crate::observability::metrics;
use crate::storage::Warehouse;
use crate::types::{CanonicalTable, RawTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    #[serde(rename = "extract_data")]
    Extract,
    #[serde(rename = "transform_data")]
    Transform,
    #[serde(rename = "load_to_warehouse")]
    Load,
    #[serde(rename = "run_aggregation")]
    Aggregate,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Extract, Stage::Transform, Stage::Load, Stage::Aggregate];

    /// Task name in the graph, logs, metrics and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract_data",
            Stage::Transform => "transform_data",
            Stage::Load => "load_to_warehouse",
            Stage::Aggregate => "run_aggregation",
        }
    }

    /// The stage whose output this one consumes.
    pub fn upstream(&self) -> Option<Stage> {
        match self {
            Stage::Extract => None,
            Stage::Transform => Some(Stage::Extract),
            Stage::Load => Some(Stage::Transform),
            Stage::Aggregate => Some(Stage::Load),
        }
    }

    /// Run state while this stage executes.
    pub fn running_state(&self) -> RunState {
        match self {
            Stage::Extract => RunState::Extracting,
            Stage::Transform => RunState::Transforming,
            Stage::Load => RunState::Loading,
            Stage::Aggregate => RunState::Aggregating,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Extracting,
    Transforming,
    Loading,
    Aggregating,
    Succeeded,
    Failed { stage: Stage, cause: ErrorKind },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed { .. })
    }

    /// Forward moves go one step at a time; `Failed` is reachable from any
    /// non-terminal state. Terminal states never move.
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (_, Failed { .. }) => true,
            (Pending, Extracting)
            | (Extracting, Transforming)
            | (Transforming, Loading)
            | (Loading, Aggregating)
            | (Aggregating, Succeeded) => true,
            _ => false,
        }
    }
}

/// Outcome of one task within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub task: Stage,
    pub status: TaskStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Upstream task that kept this one from running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<Stage>,
}

/// One execution of the task graph against one source file. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub source: PathBuf,
    #[serde(flatten)]
    pub state: RunState,
    pub tasks: Vec<TaskRecord>,
    pub rows_extracted: usize,
    pub rows_dropped: usize,
    pub rows_loaded: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    fn new(source: &Path) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.to_path_buf(),
            state: RunState::Pending,
            tasks: Vec::new(),
            rows_extracted: 0,
            rows_dropped: 0,
            rows_loaded: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal run transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("run state {:?} -> {:?}", self.state, next);
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn task(&self, stage: Stage) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.task == stage)
    }
}

/// Per-run settings, already resolved by the caller.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Warehouse table to append to.
    pub table: String,
    pub delimiter: u8,
    /// Working directory handed to the aggregation job.
    pub project_dir: PathBuf,
}

impl PipelineOptions {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            delimiter: DEFAULT_DELIMITER as u8,
            project_dir: project_dir.into(),
        }
    }
}

/// Stage outputs handed down the graph. Each is taken exactly once.
#[derive(Default)]
struct StageOutputs {
    raw: Option<RawTable>,
    canonical: Option<CanonicalTable>,
    loaded: Option<u64>,
}

pub struct Pipeline {
    warehouse: Arc<dyn Warehouse>,
    aggregation: Arc<dyn AggregationRunner>,
    options: PipelineOptions,
    graph: TaskGraph<Stage>,
    order: Vec<Stage>,
}

impl Pipeline {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        aggregation: Arc<dyn AggregationRunner>,
        options: PipelineOptions,
    ) -> Result<Self, GraphError> {
        let graph = etl_graph()?;
        let order = graph.execution_order()?;
        Ok(Self {
            warehouse,
            aggregation,
            options,
            graph,
            order,
        })
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Execute every stage once, in dependency order, against `source`.
    pub async fn run(&self, source: &Path) -> Result<PipelineRun, PipelineError> {
        let mut run = PipelineRun::new(source);
        let span = info_span!("pipeline_run", run_id = %run.id, source = %source.display());
        let failure = self.execute(&mut run).instrument(span).await;

        let secs = (Utc::now() - run.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        match failure {
            None => {
                run.advance(RunState::Succeeded);
                metrics::pipeline::run_succeeded(secs);
                info!(
                    "pipeline run {} succeeded: {} rows extracted, {} dropped, {} loaded",
                    run.id, run.rows_extracted, run.rows_dropped, run.rows_loaded
                );
                Ok(run)
            }
            Some((stage, cause)) => {
                metrics::pipeline::run_failed(stage.as_str(), secs);
                error!("pipeline run {} failed at {}: {}", run.id, stage, cause);
                Err(PipelineError {
                    stage,
                    cause,
                    run: Box::new(run),
                })
            }
        }
    }

    /// Walk the graph; returns the first failure, if any.
    async fn execute(&self, run: &mut PipelineRun) -> Option<(Stage, StageError)> {
        metrics::pipeline::run_started();
        info!("starting pipeline run");

        let mut statuses: HashMap<Stage, TaskStatus> = HashMap::new();
        let mut outputs = StageOutputs::default();
        let mut failure = None;

        for &stage in &self.order {
            if let Some(upstream) = self.graph.blocked_by(&stage, &statuses).ok().flatten() {
                debug!("skipping {}: upstream {} did not succeed", stage, upstream);
                statuses.insert(stage, TaskStatus::Skipped);
                run.tasks.push(TaskRecord {
                    task: stage,
                    status: TaskStatus::Skipped,
                    duration_ms: 0,
                    error: None,
                    blocked_by: Some(upstream),
                });
                continue;
            }

            run.advance(stage.running_state());
            let t0 = Instant::now();
            let result = self
                .run_stage(stage, &mut outputs, run)
                .instrument(info_span!("task", task = stage.as_str()))
                .await;
            let elapsed = t0.elapsed();
            metrics::pipeline::stage_duration(stage.as_str(), elapsed.as_secs_f64());

            let (status, error) = match result {
                Ok(()) => (TaskStatus::Succeeded, None),
                Err(e) => {
                    run.advance(RunState::Failed {
                        stage,
                        cause: e.kind(),
                    });
                    let message = e.to_string();
                    failure = Some((stage, e));
                    (TaskStatus::Failed, Some(message))
                }
            };
            statuses.insert(stage, status);
            run.tasks.push(TaskRecord {
                task: stage,
                status,
                duration_ms: elapsed.as_millis() as u64,
                error,
                blocked_by: None,
            });
        }

        failure
    }

    async fn run_stage(
        &self,
        stage: Stage,
        outputs: &mut StageOutputs,
        run: &mut PipelineRun,
    ) -> Result<(), StageError> {
        let missing = |upstream| StageError::MissingInput { stage, upstream };
        match stage {
            Stage::Extract => {
                let raw = extract(&run.source, self.options.delimiter)?;
                run.rows_extracted = raw.len();
                outputs.raw = Some(raw);
            }
            Stage::Transform => {
                let raw = outputs.raw.take().ok_or_else(|| missing(Stage::Extract))?;
                let table = transform(&raw)?;
                run.rows_dropped = table.rows_dropped;
                outputs.canonical = Some(table);
            }
            Stage::Load => {
                let table = outputs
                    .canonical
                    .take()
                    .ok_or_else(|| missing(Stage::Transform))?;
                let written = load(&table, self.warehouse.as_ref(), &self.options.table).await?;
                run.rows_loaded = written;
                outputs.loaded = Some(written);
            }
            Stage::Aggregate => {
                outputs.loaded.take().ok_or_else(|| missing(Stage::Load))?;
                trigger_aggregation(self.aggregation.as_ref(), &self.options.project_dir)
                    .await?;
            }
        }
        Ok(())
    }
}

/// The ETL stages with one predecessor edge each.
pub fn etl_graph() -> Result<TaskGraph<Stage>, GraphError> {
    let mut graph = TaskGraph::new();
    for stage in Stage::ALL {
        graph.add_task(stage)?;
    }
    for stage in Stage::ALL {
        if let Some(upstream) = stage.upstream() {
            graph.add_dependency(&stage, &upstream)?;
        }
    }
    Ok(graph)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub stage: Stage,
    pub cause: ErrorKind,
    pub message: String,
}

/// Machine-readable result of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub run: PipelineRun,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

impl From<Result<PipelineRun, PipelineError>> for RunReport {
    fn from(outcome: Result<PipelineRun, PipelineError>) -> Self {
        match outcome {
            Ok(run) => RunReport {
                status: RunStatus::Succeeded,
                run,
                failure: None,
            },
            Err(err) => RunReport {
                status: RunStatus::Failed,
                failure: Some(FailureReport {
                    stage: err.stage,
                    cause: err.cause.kind(),
                    message: err.cause.to_string(),
                }),
                run: *err.run,
            },
        }
    }
}
