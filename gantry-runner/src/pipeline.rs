//! Matrix orchestration
//!
//! Expands the build matrix and executes one isolated run per entry.
//! Entries share no mutable state and may run in parallel; a
//! semaphore caps how many execute at once. Within one entry, stages
//! remain strictly sequential (that lives in the executor).

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use gantry_core::manifest::Manifest;
use gantry_core::run::{Run, Trigger};
use gantry_index::IndexApi;

use crate::executor::StageExecutor;
use crate::shell::CommandRunner;

/// A whole pipeline: one run per build-matrix entry
pub struct Pipeline {
    manifest: Arc<Manifest>,
    executor: Arc<StageExecutor>,
    max_parallel: usize,
}

impl Pipeline {
    pub fn new(
        manifest: Manifest,
        runner: Arc<dyn CommandRunner>,
        index: Arc<dyn IndexApi>,
    ) -> Self {
        let manifest = Arc::new(manifest);
        let executor = Arc::new(StageExecutor::new(manifest.clone(), runner, index));
        Self {
            manifest,
            executor,
            max_parallel: 2,
        }
    }

    /// Builds a pipeline around an already-configured executor
    pub fn with_executor(manifest: Arc<Manifest>, executor: StageExecutor) -> Self {
        Self {
            manifest,
            executor: Arc::new(executor),
            max_parallel: 2,
        }
    }

    /// Caps how many matrix entries execute at once
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Executes every matrix entry for one trigger event
    ///
    /// Runs are independent; one entry failing does not stop the
    /// others, it only fails the overall report.
    pub async fn execute(&self, trigger: Trigger) -> Result<PipelineReport> {
        let matrix = self.manifest.matrix();
        info!(
            "Pipeline triggered by {} with {} matrix entr{}",
            trigger,
            matrix.len(),
            if matrix.len() == 1 { "y" } else { "ies" }
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut handles = Vec::with_capacity(matrix.len());

        for entry in matrix {
            let executor = self.executor.clone();
            let trigger = trigger.clone();
            let permit = semaphore.clone().acquire_owned().await?;

            handles.push(tokio::spawn(async move {
                let run = executor.execute(entry, trigger).await;
                drop(permit);
                run
            }));
        }

        let mut runs = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(run) => runs.push(run),
                Err(e) => {
                    warn!("Run task panicked: {}", e);
                    return Err(anyhow::anyhow!("run task panicked: {}", e));
                }
            }
        }

        Ok(PipelineReport { runs })
    }
}

/// Outcome of a whole pipeline execution
#[derive(Debug)]
pub struct PipelineReport {
    pub runs: Vec<Run>,
}

impl PipelineReport {
    /// Overall success: every matrix entry's run succeeded
    pub fn succeeded(&self) -> bool {
        !self.runs.is_empty() && self.runs.iter().all(|run| run.succeeded())
    }

    /// Process exit code for the pipeline (0 on full success)
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() { 0 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::ShellRunner;
    use async_trait::async_trait;
    use gantry_index::{Credentials, Result as IndexResult, UploadOutcome};
    use std::path::PathBuf;

    struct NullIndex;

    #[async_trait]
    impl IndexApi for NullIndex {
        async fn exists(&self, _package: &str, _version: &str) -> IndexResult<bool> {
            Ok(false)
        }

        async fn upload(
            &self,
            _package: &str,
            _version: &str,
            _artifacts: &[PathBuf],
            _credentials: &Credentials,
        ) -> IndexResult<UploadOutcome> {
            Ok(UploadOutcome::Uploaded)
        }
    }

    fn pipeline(yaml: &str) -> Pipeline {
        let manifest = Manifest::from_yaml(yaml).unwrap();
        Pipeline::new(manifest, Arc::new(ShellRunner::new()), Arc::new(NullIndex))
    }

    #[tokio::test]
    async fn test_one_run_per_matrix_entry() {
        let pipeline = pipeline(
            r#"
language: echo
runtimes: ["3.6", "3.7"]
os: [linux, osx]
script: ["true"]
"#,
        );

        let report = pipeline
            .execute(Trigger::Push {
                branch: "main".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(report.runs.len(), 4);
        assert!(report.succeeded());
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_one_failing_entry_fails_the_report() {
        // The second runtime probes fine too; failure comes from the script
        let pipeline = pipeline(
            r#"
language: echo
runtimes: ["3.7"]
script: ["test $GANTRY_RUNTIME != 3.7"]
"#,
        );

        let report = pipeline
            .execute(Trigger::Push {
                branch: "main".to_string(),
            })
            .await
            .unwrap();

        assert!(!report.succeeded());
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_entries_are_isolated() {
        let pipeline = pipeline(
            r#"
language: echo
runtimes: ["3.6", "3.7"]
script: ["test $GANTRY_RUNTIME = 3.6"]
"#,
        )
        .with_max_parallel(1);

        let report = pipeline
            .execute(Trigger::Push {
                branch: "main".to_string(),
            })
            .await
            .unwrap();

        // 3.6 passes, 3.7 fails; both still ran to completion
        assert_eq!(report.runs.len(), 2);
        assert!(!report.succeeded());
        assert_eq!(report.runs.iter().filter(|r| r.succeeded()).count(), 1);
    }
}
