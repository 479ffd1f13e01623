//! Stage executor
//!
//! Executes the stages of one pipeline run strictly in order,
//! honoring each stage's failure policy:
//! - setup, before_script and script are fatal: the first non-zero
//!   exit aborts the run and marks it Failed
//! - after_success and deploy are best-effort: failures are surfaced
//!   in the stage result but never flip an already-successful run
//!
//! The deploy stage additionally gates on the trigger condition, the
//! `skip_existing` duplicate check, and the decoded credential pair.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use gantry_core::error::StageError;
use gantry_core::log::RunLog;
use gantry_core::manifest::{DeployConfig, Manifest, MatrixEntry};
use gantry_core::run::{Run, RunState, Stage, StageOutcome, StageResult, Trigger};
use gantry_index::{Credentials, IndexApi, UploadOutcome};

use crate::shell::CommandRunner;

/// Executes all stages of a run for one matrix entry
pub struct StageExecutor {
    manifest: Arc<Manifest>,
    runner: Arc<dyn CommandRunner>,
    index: Arc<dyn IndexApi>,
    /// Credentials from the environment, overriding the manifest's
    /// secure values when present
    credential_override: Option<Credentials>,
}

impl StageExecutor {
    pub fn new(
        manifest: Arc<Manifest>,
        runner: Arc<dyn CommandRunner>,
        index: Arc<dyn IndexApi>,
    ) -> Self {
        Self {
            manifest,
            runner,
            index,
            credential_override: None,
        }
    }

    /// Overrides the manifest credentials with externally supplied ones
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credential_override = Some(credentials);
        self
    }

    /// Executes one full run for a matrix entry
    ///
    /// Stages execute strictly sequentially; there is no concurrency
    /// inside a single run.
    pub async fn execute(&self, entry: MatrixEntry, trigger: Trigger) -> Run {
        let mut run = Run::new(entry.clone(), trigger.clone());
        let log = Arc::new(RunLog::new());

        info!("Run {} starting for {} ({})", run.id, entry, trigger);

        // Environment shared by every stage command of this run
        let mut env: Vec<(String, String)> = vec![
            ("GANTRY_OS".to_string(), entry.os.clone()),
            ("GANTRY_RUNTIME".to_string(), entry.runtime.clone()),
        ];
        env.extend(self.manifest.env_pairs());

        // Setup: resolve the requested runtime, fatal if unavailable
        run.transition(RunState::Setup);
        let started = Instant::now();
        match self.run_setup(&entry, &env, &log).await {
            Ok(runtime_bin) => {
                env.push(("GANTRY_RUNTIME_BIN".to_string(), runtime_bin));
                self.record_stage(&mut run, Stage::Setup, StageOutcome::Succeeded, started, &log);
            }
            Err(err) => {
                error!("Run {} setup failed: {}", run.id, err);
                log.error(err.to_string());
                self.record_stage(
                    &mut run,
                    Stage::Setup,
                    StageOutcome::Failed { exit_code: 1 },
                    started,
                    &log,
                );
                run.transition(RunState::Failed);
                return run;
            }
        }

        // Before-script: dependency install, fatal
        run.transition(RunState::Installing);
        let started = Instant::now();
        match self
            .run_commands(&self.manifest.before_script, &env, &log)
            .await
        {
            Ok(()) => {
                self.record_stage(
                    &mut run,
                    Stage::BeforeScript,
                    StageOutcome::Succeeded,
                    started,
                    &log,
                );
            }
            Err((command, exit_code)) => {
                let err = StageError::DependencyInstall { command, exit_code };
                error!("Run {}: {}", run.id, err);
                log.error(err.to_string());
                self.record_stage(
                    &mut run,
                    Stage::BeforeScript,
                    StageOutcome::Failed { exit_code },
                    started,
                    &log,
                );
                run.transition(RunState::Failed);
                return run;
            }
        }

        // Script: install + test + docs build, fatal
        run.transition(RunState::Testing);
        let started = Instant::now();
        match self.run_commands(&self.manifest.script, &env, &log).await {
            Ok(()) => {
                self.record_stage(&mut run, Stage::Script, StageOutcome::Succeeded, started, &log);
            }
            Err((command, exit_code)) => {
                let err = StageError::TestFailure { command, exit_code };
                error!("Run {}: {}", run.id, err);
                log.error(err.to_string());
                self.record_stage(
                    &mut run,
                    Stage::Script,
                    StageOutcome::Failed { exit_code },
                    started,
                    &log,
                );
                run.transition(RunState::Failed);
                return run;
            }
        }

        // After-success: best-effort, runs only because script succeeded
        run.transition(RunState::AfterSuccess);
        let started = Instant::now();
        let outcome = match self
            .run_commands(&self.manifest.after_success, &env, &log)
            .await
        {
            Ok(()) => StageOutcome::Succeeded,
            Err((command, exit_code)) => {
                let err = StageError::BestEffortUpload { command, exit_code };
                warn!("Run {}: {}", run.id, err);
                log.warning(err.to_string());
                StageOutcome::Failed { exit_code }
            }
        };
        self.record_stage(&mut run, Stage::AfterSuccess, outcome, started, &log);

        // Deploy: gated, best-effort
        run.transition(RunState::Deploying);
        let started = Instant::now();
        let outcome = if run.fatal_stages_green() {
            self.run_deploy(&run.trigger, &log).await
        } else {
            StageOutcome::Skipped {
                reason: "a prior stage failed".to_string(),
            }
        };
        self.record_stage(&mut run, Stage::Deploy, outcome, started, &log);

        run.transition(RunState::Succeeded);
        info!("Run {} succeeded", run.id);
        run
    }

    /// Resolves the runtime binary for a matrix entry
    ///
    /// Probes `<language><version> --version` first, then the bare
    /// `<language>` binary. Both failing is fatal.
    async fn run_setup(
        &self,
        entry: &MatrixEntry,
        env: &[(String, String)],
        log: &Arc<RunLog>,
    ) -> Result<String, StageError> {
        let versioned = format!("{}{}", self.manifest.language, entry.runtime);

        let probe = format!("{} --version", versioned);
        log.info(format!("$ {}", probe));
        if let Ok(0) = self.runner.run(&probe, env, log).await {
            return Ok(versioned);
        }

        let fallback = format!("{} --version", self.manifest.language);
        log.info(format!("$ {}", fallback));
        match self.runner.run(&fallback, env, log).await {
            Ok(0) => {
                log.warning(format!(
                    "{} not found, using bare '{}' binary",
                    versioned, self.manifest.language
                ));
                Ok(self.manifest.language.clone())
            }
            Ok(code) => Err(StageError::EnvironmentUnavailable {
                language: self.manifest.language.clone(),
                runtime: entry.runtime.clone(),
                reason: format!("version probe exited with code {}", code),
            }),
            Err(err) => Err(StageError::EnvironmentUnavailable {
                language: self.manifest.language.clone(),
                runtime: entry.runtime.clone(),
                reason: err.to_string(),
            }),
        }
    }

    /// Runs a command list in order, stopping at the first failure
    ///
    /// Returns the failing command and its exit code.
    async fn run_commands(
        &self,
        commands: &[String],
        env: &[(String, String)],
        log: &Arc<RunLog>,
    ) -> Result<(), (String, i32)> {
        for command in commands {
            log.info(format!("$ {}", command));
            match self.runner.run(command, env, log).await {
                Ok(0) => {}
                Ok(code) => return Err((command.clone(), code)),
                Err(err) => {
                    log.error(err.to_string());
                    return Err((command.clone(), -1));
                }
            }
        }
        Ok(())
    }

    /// Executes the deploy stage
    ///
    /// Never aborts the run: every failure path maps to a Failed
    /// outcome that is surfaced but does not change the test result
    /// already recorded.
    async fn run_deploy(&self, trigger: &Trigger, log: &Arc<RunLog>) -> StageOutcome {
        let Some(deploy) = &self.manifest.deploy else {
            return StageOutcome::Skipped {
                reason: "no deploy configured".to_string(),
            };
        };

        if !trigger.satisfies(&deploy.condition) {
            log.info(format!("Deploy skipped: {} does not match the deploy condition", trigger));
            return StageOutcome::Skipped {
                reason: format!("deploy condition not met by {}", trigger),
            };
        }

        let credentials = match self.resolve_credentials(deploy) {
            Ok(credentials) => credentials,
            Err(err) => {
                warn!("{}", err);
                log.error(err.to_string());
                return StageOutcome::Failed { exit_code: 1 };
            }
        };

        let package = &deploy.package;

        if deploy.skip_existing {
            match self.index.exists(&package.name, &package.version).await {
                Ok(true) => {
                    let err = StageError::DuplicateVersion {
                        package: package.name.clone(),
                        version: package.version.clone(),
                    };
                    info!("{}", err);
                    log.info(err.to_string());
                    return StageOutcome::Skipped {
                        reason: format!("version {} already published", package.version),
                    };
                }
                Ok(false) => {}
                Err(err) => {
                    log.error(format!("existence probe failed: {}", err));
                    return StageOutcome::Failed { exit_code: 1 };
                }
            }
        }

        let artifacts = match collect_artifacts(&package.artifacts) {
            Ok(artifacts) => artifacts,
            Err(err) => {
                log.error(format!("failed to collect artifacts: {}", err));
                return StageOutcome::Failed { exit_code: 1 };
            }
        };

        if artifacts.is_empty() {
            log.error(format!("no artifacts found under '{}'", package.artifacts));
            return StageOutcome::Failed { exit_code: 1 };
        }

        let outcome = match self
            .index
            .upload(&package.name, &package.version, &artifacts, &credentials)
            .await
        {
            Ok(UploadOutcome::Uploaded) => {
                log.info(format!(
                    "Uploaded {} {} ({} artifact(s))",
                    package.name,
                    package.version,
                    artifacts.len()
                ));
                StageOutcome::Succeeded
            }
            Ok(UploadOutcome::AlreadyExists) => {
                log.info(format!(
                    "Index already has {} {}; nothing uploaded",
                    package.name, package.version
                ));
                StageOutcome::Skipped {
                    reason: format!("version {} already published", package.version),
                }
            }
            Err(err) if err.is_auth() => {
                let err = StageError::DeployAuth(err.to_string());
                warn!("{}", err);
                log.error(err.to_string());
                StageOutcome::Failed { exit_code: 1 }
            }
            Err(err) => {
                log.error(format!("upload failed: {}", err));
                StageOutcome::Failed { exit_code: 1 }
            }
        };

        // skip_cleanup is the default; turning it off removes the
        // artifact directory once the deploy stage is done
        if !deploy.skip_cleanup {
            if let Err(err) = std::fs::remove_dir_all(&package.artifacts) {
                log.warning(format!("artifact cleanup failed: {}", err));
            }
        }

        outcome
    }

    fn resolve_credentials(&self, deploy: &DeployConfig) -> Result<Credentials, StageError> {
        if let Some(credentials) = &self.credential_override {
            return Ok(credentials.clone());
        }
        Ok(Credentials {
            username: deploy.username.reveal()?,
            password: deploy.password.reveal()?,
        })
    }

    fn record_stage(
        &self,
        run: &mut Run,
        stage: Stage,
        outcome: StageOutcome,
        started: Instant,
        log: &Arc<RunLog>,
    ) {
        run.record(StageResult {
            stage,
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
            log: log.drain(),
        });
    }
}

/// Collects regular files under the artifact directory
fn collect_artifacts(dir: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut artifacts = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            artifacts.push(entry.path());
        }
    }
    artifacts.sort();
    Ok(artifacts)
}
