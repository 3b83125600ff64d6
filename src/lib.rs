pub mod config;
pub mod constants;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod storage;
pub mod types;

pub use config::{PipelineSettings, WarehouseConfig};
pub use error::{PipelineError, StageError};
pub use pipeline::{Pipeline, PipelineOptions, PipelineRun, RunReport, RunState, Stage};
pub use storage::{InMemoryWarehouse, PostgresWarehouse, Warehouse};
pub use types::{CanonicalRecord, CanonicalTable, RawTable};
