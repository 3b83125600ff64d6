//! Metrics for the flight ETL pipeline.
//!
//! Metric names live in [`MetricName`] so no call site carries a magic string.
//! Each stage records through its own submodule. Without an installed
//! recorder every call is a no-op.

use std::fmt;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Runs
    RunsStarted,
    RunsSucceeded,
    RunsFailed,
    RunDuration,
    StageDuration,

    // Extract
    ExtractRowsRead,
    ExtractDuration,

    // Transform
    TransformRowsDropped,
    TransformRowsOutput,

    // Load
    LoadRowsWritten,
    LoadFailures,
    LoadDuration,

    // Aggregation
    AggregationRunsSucceeded,
    AggregationRunsFailed,
    AggregationDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RunsStarted => "flight_etl_runs_started_total",
            MetricName::RunsSucceeded => "flight_etl_runs_succeeded_total",
            MetricName::RunsFailed => "flight_etl_runs_failed_total",
            MetricName::RunDuration => "flight_etl_run_duration_seconds",
            MetricName::StageDuration => "flight_etl_stage_duration_seconds",

            MetricName::ExtractRowsRead => "flight_etl_extract_rows_read_total",
            MetricName::ExtractDuration => "flight_etl_extract_duration_seconds",

            MetricName::TransformRowsDropped => "flight_etl_transform_rows_dropped_total",
            MetricName::TransformRowsOutput => "flight_etl_transform_rows_output_total",

            MetricName::LoadRowsWritten => "flight_etl_load_rows_written_total",
            MetricName::LoadFailures => "flight_etl_load_failures_total",
            MetricName::LoadDuration => "flight_etl_load_duration_seconds",

            MetricName::AggregationRunsSucceeded => "flight_etl_aggregation_runs_succeeded_total",
            MetricName::AggregationRunsFailed => "flight_etl_aggregation_runs_failed_total",
            MetricName::AggregationDuration => "flight_etl_aggregation_duration_seconds",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            RunsStarted,
            RunsSucceeded,
            RunsFailed,
            RunDuration,
            StageDuration,
            ExtractRowsRead,
            ExtractDuration,
            TransformRowsDropped,
            TransformRowsOutput,
            LoadRowsWritten,
            LoadFailures,
            LoadDuration,
            AggregationRunsSucceeded,
            AggregationRunsFailed,
            AggregationDuration,
        ]
        .into_iter()
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the Prometheus recorder and keep its handle for in-process
/// rendering. Short-lived runs push the rendered text instead of being scraped.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))?;
    let _ = HANDLE.set(handle);
    info!("Metrics recorder installed");
    Ok(())
}

/// Current metrics in Prometheus text format, if [`init`] ran.
pub fn render() -> Option<String> {
    HANDLE.get().map(PrometheusHandle::render)
}

pub mod pipeline {
    use super::MetricName;

    pub fn run_started() {
        ::metrics::counter!(MetricName::RunsStarted.as_str()).increment(1);
    }

    pub fn run_succeeded(secs: f64) {
        ::metrics::counter!(MetricName::RunsSucceeded.as_str()).increment(1);
        ::metrics::histogram!(MetricName::RunDuration.as_str()).record(secs);
    }

    pub fn run_failed(stage: &'static str, secs: f64) {
        ::metrics::counter!(MetricName::RunsFailed.as_str(), "stage" => stage).increment(1);
        ::metrics::histogram!(MetricName::RunDuration.as_str()).record(secs);
    }

    pub fn stage_duration(stage: &'static str, secs: f64) {
        ::metrics::histogram!(MetricName::StageDuration.as_str(), "stage" => stage).record(secs);
    }
}

pub mod extract {
    use super::MetricName;

    pub fn rows_read(count: usize) {
        ::metrics::counter!(MetricName::ExtractRowsRead.as_str()).increment(count as u64);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::ExtractDuration.as_str()).record(secs);
    }
}

pub mod transform {
    use super::MetricName;

    pub fn rows_dropped(count: usize) {
        ::metrics::counter!(MetricName::TransformRowsDropped.as_str()).increment(count as u64);
    }

    pub fn rows_output(count: usize) {
        ::metrics::counter!(MetricName::TransformRowsOutput.as_str()).increment(count as u64);
    }
}

pub mod load {
    use super::MetricName;

    pub fn rows_written(count: u64) {
        ::metrics::counter!(MetricName::LoadRowsWritten.as_str()).increment(count);
    }

    pub fn failed(error_type: &'static str) {
        ::metrics::counter!(MetricName::LoadFailures.as_str(), "error_type" => error_type)
            .increment(1);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::LoadDuration.as_str()).record(secs);
    }
}

pub mod aggregation {
    use super::MetricName;

    pub fn succeeded() {
        ::metrics::counter!(MetricName::AggregationRunsSucceeded.as_str()).increment(1);
    }

    pub fn failed() {
        ::metrics::counter!(MetricName::AggregationRunsFailed.as_str()).increment(1);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::AggregationDuration.as_str()).record(secs);
    }
}
