use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::AggregationError;
use crate::observability::metrics;

/// Exit status and captured output of one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// The downstream batch job that rebuilds summary tables from the warehouse.
#[async_trait]
pub trait AggregationRunner: Send + Sync {
    /// Human-readable command line, used in logs and errors.
    fn describe(&self) -> String;

    /// Run the job in `working_dir` and wait for it to exit.
    async fn run(&self, working_dir: &Path) -> std::io::Result<ProcessOutput>;
}

/// Runs an external program, `dbt run` by default.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl AggregationRunner for CommandRunner {
    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn run(&self, working_dir: &Path) -> std::io::Result<ProcessOutput> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(working_dir)
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run the aggregation job once and block until it exits. No retries.
pub async fn trigger_aggregation(
    runner: &dyn AggregationRunner,
    working_dir: &Path,
) -> Result<ProcessOutput, AggregationError> {
    let command = runner.describe();
    info!("Running aggregation `{}` in {}", command, working_dir.display());
    let t0 = std::time::Instant::now();

    let output = runner.run(working_dir).await.map_err(|source| {
        metrics::aggregation::failed();
        AggregationError::Launch {
            command: command.clone(),
            source,
        }
    })?;
    metrics::aggregation::duration(t0.elapsed().as_secs_f64());

    if !output.success() {
        warn!("aggregation `{}` exited with {:?}", command, output.code);
        metrics::aggregation::failed();
        return Err(AggregationError::Failed {
            command,
            code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }

    debug!("aggregation stdout:\n{}", output.stdout);
    metrics::aggregation::succeeded();
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRunner(std::io::Result<ProcessOutput>);

    #[async_trait]
    impl AggregationRunner for FixedRunner {
        fn describe(&self) -> String {
            "fake aggregate".to_string()
        }

        async fn run(&self, _working_dir: &Path) -> std::io::Result<ProcessOutput> {
            match &self.0 {
                Ok(output) => Ok(output.clone()),
                Err(e) => Err(std::io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let runner = FixedRunner(Ok(ProcessOutput {
            code: Some(0),
            stdout: "Completed successfully".to_string(),
            stderr: String::new(),
        }));
        let output = trigger_aggregation(&runner, Path::new(".")).await.unwrap();
        assert!(output.success());
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_status_and_output() {
        let runner = FixedRunner(Ok(ProcessOutput {
            code: Some(2),
            stdout: "1 of 3 ERROR".to_string(),
            stderr: "model failed".to_string(),
        }));
        let err = trigger_aggregation(&runner, Path::new(".")).await.unwrap_err();
        match err {
            AggregationError::Failed {
                command,
                code,
                stdout,
                stderr,
            } => {
                assert_eq!(command, "fake aggregate");
                assert_eq!(code, Some(2));
                assert_eq!(stdout, "1 of 3 ERROR");
                assert_eq!(stderr, "model failed");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_signal_termination_is_failure() {
        let runner = FixedRunner(Ok(ProcessOutput {
            code: None,
            ..Default::default()
        }));
        let err = trigger_aggregation(&runner, Path::new(".")).await.unwrap_err();
        assert!(matches!(err, AggregationError::Failed { code: None, .. }));
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let runner = FixedRunner(Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        )));
        let err = trigger_aggregation(&runner, Path::new(".")).await.unwrap_err();
        assert!(matches!(err, AggregationError::Launch { .. }));
    }

    #[test]
    fn test_command_runner_describe() {
        let runner = CommandRunner::new("dbt", vec!["run".to_string()]);
        assert_eq!(runner.describe(), "dbt run");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_runner_captures_output_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let runner = CommandRunner::new(
            "sh",
            vec![
                "-c".to_string(),
                "cat marker.txt; echo oops >&2; exit 3".to_string(),
            ],
        );

        let output = runner.run(dir.path()).await.unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, "here");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_command_runner_missing_program() {
        let runner = CommandRunner::new("definitely-not-an-aggregation-tool", vec![]);
        let err = trigger_aggregation(&runner, Path::new(".")).await.unwrap_err();
        assert!(matches!(err, AggregationError::Launch { .. }));
    }
}
