// Flight ETL pipeline: stages, task graph, and the orchestrator that runs them

pub mod aggregate;
pub mod extract;
pub mod graph;
pub mod load;
pub mod orchestrator;
pub mod transform;

pub use aggregate::{trigger_aggregation, AggregationRunner, CommandRunner, ProcessOutput};
pub use extract::extract;
pub use graph::{TaskGraph, TaskStatus};
pub use load::load;
pub use orchestrator::{
    Pipeline, PipelineOptions, PipelineRun, RunReport, RunState, RunStatus, Stage, TaskRecord,
};
pub use transform::transform;
