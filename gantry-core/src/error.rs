//! Failure taxonomy for pipeline runs
//!
//! Stage failures fall into fatal and best-effort categories. Fatal
//! failures abort the run and set its overall status to Failed;
//! best-effort failures are logged but never change a prior Succeeded
//! status.

use thiserror::Error;

/// Errors raised while loading or validating a manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Manifest file could not be read
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest is not valid YAML or has unknown/mistyped fields
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Manifest parsed but is semantically invalid
    #[error("invalid manifest: {0}")]
    Invalid(String),
}

/// Errors raised during stage execution
#[derive(Debug, Error)]
pub enum StageError {
    /// Requested runtime version is not available on this host
    #[error("runtime '{runtime}' for {language} is unavailable: {reason}")]
    EnvironmentUnavailable {
        language: String,
        runtime: String,
        reason: String,
    },

    /// A before_script command exited non-zero
    #[error("dependency install failed: '{command}' exited with code {exit_code}")]
    DependencyInstall { command: String, exit_code: i32 },

    /// A script command (install, test run, or docs build) exited non-zero
    #[error("script stage failed: '{command}' exited with code {exit_code}")]
    TestFailure { command: String, exit_code: i32 },

    /// An after_success command failed; reported but never fatal
    #[error("best-effort upload failed: '{command}' exited with code {exit_code}")]
    BestEffortUpload { command: String, exit_code: i32 },

    /// Credentials could not be decoded or were rejected by the index
    #[error("deploy authentication failed: {0}")]
    DeployAuth(String),

    /// The exact version already exists at the index; a no-op, not a failure
    #[error("version {version} of {package} already exists at the index")]
    DuplicateVersion { package: String, version: String },

    /// Artifact files could not be collected or cleaned
    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stage command could not be spawned at all
    #[error("failed to spawn '{command}': {reason}")]
    Spawn { command: String, reason: String },
}

impl StageError {
    /// Whether this failure aborts the run
    ///
    /// After-success and deploy failures are surfaced but do not
    /// retroactively fail an already-successful run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::EnvironmentUnavailable { .. }
                | Self::DependencyInstall { .. }
                | Self::TestFailure { .. }
        )
    }

    /// Whether this "failure" is actually a successful no-op
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateVersion { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_categories() {
        let err = StageError::TestFailure {
            command: "pytest".to_string(),
            exit_code: 1,
        };
        assert!(err.is_fatal());

        let err = StageError::DependencyInstall {
            command: "pip install -r requirements.txt".to_string(),
            exit_code: 2,
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn test_best_effort_categories() {
        let err = StageError::BestEffortUpload {
            command: "coveralls".to_string(),
            exit_code: 1,
        };
        assert!(!err.is_fatal());

        let err = StageError::DeployAuth("bad credentials".to_string());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_duplicate_is_not_a_failure() {
        let err = StageError::DuplicateVersion {
            package: "brahe".to_string(),
            version: "0.2.0".to_string(),
        };
        assert!(err.is_duplicate());
        assert!(!err.is_fatal());
    }
}
